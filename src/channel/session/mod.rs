//! Channel session bookkeeping
//!
//! The builders and the verifier are stateless. Sessions carry the little
//! state a live channel needs between calls: the Consumer's cumulative
//! payment and rebuild counter, and the Provider's highest accepted payment.
//!
//! The Consumer's counters are never trusted by the Provider. A Provider
//! derives the paid amount from the signed transaction bytes alone.

/// Consumer-side session
pub mod consumer;
/// Provider-side channel ledger
pub mod provider;
/// Provider registry for many concurrent channels
pub mod registry;

pub use consumer::ConsumerSession;
pub use provider::ProviderChannel;
pub use registry::ProviderRegistry;
