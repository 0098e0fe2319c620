//! Channel module for CLTV unidirectional payment channels
//!
//! A Consumer locks funds in a P2SH output that the Provider can claim with
//! both signatures, or the Consumer alone can reclaim after a lock time.
//! Payments are channel transactions the Consumer re-signs with a growing
//! payout; the Provider verifies each one and broadcasts only the last.
//!
//! # Structure
//!
//! - `tx/`: Commitment, channel (payment) and refund transaction builders
//! - `verifier`: Provider-side checks, signing and address confirmation
//! - `session/`: Consumer and Provider bookkeeping across payments
//! - `messages`: JSON messages exchanged between the parties
//! - `broadcast`: Seam for submitting transactions to the network

pub mod broadcast;
pub mod messages;
pub mod session;
pub mod tx;
pub mod verifier;

#[cfg(test)]
pub mod test_utils;

pub use broadcast::{Broadcaster, MemoryBroadcaster};
pub use messages::{ChannelParameters, ChannelProposal, PaymentMessage};
pub use session::consumer::ConsumerSessionParams;
pub use session::registry::SharedChannel;
pub use session::{ConsumerSession, ProviderChannel, ProviderRegistry};
pub use tx::{
    build_channel_transaction, build_commitment_transaction, build_refund_transaction,
    ChannelTxParams, CommitmentTxParams, RefundTxParams,
};
pub use verifier::{
    check_channel_transaction, generate_commitment_tx_address, reduce_payment_output,
    sign_channel_transaction, verify_channel_transaction, verify_commitment_transaction,
    Rejection, Verdict, VerifyParams,
};
