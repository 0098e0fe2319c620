#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # CLTV Channel
//!
//! A Rust library for unidirectional Bitcoin micropayment channels secured
//! by OP_CHECKLOCKTIMEVERIFY.

// Bitcoin transaction layer: redeem script, addresses, signing, validation
pub mod btx;

// Channel builders, verifier and session bookkeeping
pub mod channel;

// Channel policy configuration
pub mod config;

// Error types
pub mod errors;

// Shared types and protocol constants
pub mod types;

// Re-export commonly used types and functions
pub use btx::{derive_address, RedeemScript, RedeemScriptParams, UnspentOutput};
pub use channel::{
    generate_commitment_tx_address, sign_channel_transaction, verify_channel_transaction,
    Broadcaster, ConsumerSession, ProviderChannel, ProviderRegistry,
};
pub use config::ChannelConfig;
pub use errors::{Error, Result};
pub use types::ChannelId;
