//! Error types for the CLTV channel library
//!
//! This module defines all error types used throughout the library,
//! providing detailed error information for debugging and handling.
//!
//! Verification outcomes are not errors: a channel transaction that fails
//! the Provider's checks is reported as `Ok(false)` (or a rejection verdict).
//! The variants below describe usage errors and construction failures.

use bitcoin::{OutPoint, Txid};
use thiserror::Error;

/// The main error type for the CLTV channel library
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Redeem script and address errors
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Bitcoin transaction errors
    #[error(transparent)]
    Btx(#[from] BtxError),

    /// Channel and session errors
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Rejection reported by the broadcast collaborator
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

/// Errors raised while building or parsing the channel redeem script
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScriptError {
    /// Public key bytes are not a valid compressed secp256k1 key
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    /// Lock time is zero or does not satisfy the minimum expiry policy
    #[error("Invalid lock time {lock_time}: {reason}")]
    InvalidLockTime {
        /// The rejected consensus lock time value
        lock_time: u32,
        /// Why the lock time was rejected
        reason: String,
    },

    /// Script bytes do not match the channel template exactly
    #[error("Malformed redeem script: {0}")]
    MalformedRedeemScript(String),

    /// P2SH address could not be derived from the script
    #[error("Address derivation failed: {0}")]
    AddressDerivationFailed(String),
}

/// Errors that can occur while building or inspecting Bitcoin transactions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BtxError {
    /// Spent value cannot cover the requested amount plus fee
    #[error("Insufficient funds: available {available} < required {required}")]
    InsufficientFunds {
        /// Value available in the spent output
        available: u64,
        /// Amount plus fee the transaction needs
        required: u64,
    },

    /// No output of the commitment transaction pays the channel address
    #[error("Commitment transaction {0} has no output paying the channel script")]
    CommitmentOutputNotFound(Txid),

    /// Refunds must opt into nLockTime with a non-final sequence
    #[error("Refund input sequence must be non-final, got {0:#010x}")]
    NonFinalRefundRequired(u32),

    /// Funding output script type cannot be spent by the commitment builder
    #[error("Unsupported funding script: {0}")]
    UnsupportedFundingScript(String),

    /// Funding key does not control the funding output
    #[error("Funding key does not match the locking script of {0}")]
    FundingKeyMismatch(OutPoint),

    /// Previous output of an input is not present in the referenced transactions
    #[error("Missing referenced transaction for input spending {0}")]
    MissingReferencedTransaction(OutPoint),

    /// Signature hash computation failed
    #[error("Sighash computation failed: {0}")]
    Sighash(String),

    /// Transaction is not internally consistent
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Transaction bytes or hex could not be decoded
    #[error("Invalid transaction encoding: {0}")]
    InvalidEncoding(String),

    /// Script verification failed under consensus rules
    #[error("Script execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// Serialized transaction exceeds the standard size limit
    #[error("Transaction size exceeded: {0} bytes (max: {1} bytes)")]
    TransactionSizeExceeded(usize, usize),
}

/// Errors that can occur during channel operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChannelError {
    /// A required parameter was absent or zero
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    /// Channel transaction has no input spending the channel script
    #[error("Channel transaction has no input spending the channel script")]
    CommitmentInputNotFound,

    /// Cumulative payment would overflow
    #[error("Payment overflow: paid {paid} + increment {increment} exceeds maximum value")]
    PaymentOverflow {
        /// Amount already paid
        paid: u64,
        /// Requested increment
        increment: u64,
    },

    /// Sequence counter cannot be incremented further
    #[error("Sequence overflow: cannot increment further")]
    SequenceOverflow,

    /// Provider has not accepted any payment on this channel yet
    #[error("No payment has been accepted on this channel")]
    NoAcceptedPayment,

    /// Channel is not present in the registry
    #[error("Unknown channel")]
    UnknownChannel,

    /// Channel is already present in the registry
    #[error("Channel already registered")]
    ChannelAlreadyRegistered,

    /// Channel message could not be decoded or is inconsistent
    #[error("Invalid channel message: {0}")]
    InvalidMessage(String),
}

/// Rejection reported by a node when submitting a transaction
///
/// The reason is passed through unmodified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Broadcast rejected: {reason}")]
pub struct BroadcastError {
    /// Reason returned by the node
    pub reason: String,
}

impl BroadcastError {
    /// Creates a broadcast error from a node's rejection reason
    pub fn new(reason: impl Into<String>) -> Self { Self { reason: reason.into() } }
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, Error>;
