//! Bitcoin transaction builders for channels
//!
//! This module provides the three transactions the channel protocol produces:
//! the commitment that funds the channel, the channel (payment) transaction
//! that is rebuilt on every increment, and the refund that returns the
//! committed value after the lock time.
//!
//! Transaction builders are mechanical. They construct and sign
//! transactions but hold no session state; payment bookkeeping lives in
//! `session/`.

/// Commitment transaction builder
pub mod commitment;
/// Channel (payment) transaction builder
pub mod payment;
/// Commitment refund transaction builder
pub mod refund;
/// ScriptSig assembly for channel inputs
pub mod spend;

pub use commitment::{
    build_commitment_transaction, commitment_utxo, find_commitment_output, CommitmentTxParams,
};
pub use payment::{
    build_channel_transaction, ChannelTxParams, CHANGE_OUTPUT_INDEX, PAYMENT_OUTPUT_INDEX,
};
pub use refund::{build_refund_transaction, refund_lock_time, RefundTxParams};
pub use spend::{split_channel_script_sig, SpendDescriptor};
