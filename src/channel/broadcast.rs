//! Transaction broadcast seam
//!
//! The library never talks to a node itself. Callers plug in a
//! [`Broadcaster`] (an RPC client, an Esplora client, a test double) when
//! the Provider closes a channel or the Consumer publishes a refund.

use bitcoin::{Transaction, Txid};
use parking_lot::Mutex;

use crate::errors::BroadcastError;

/// Submits transactions to the Bitcoin network
pub trait Broadcaster {
    /// Submits a transaction
    ///
    /// # Returns
    /// The txid accepted by the node
    ///
    /// # Errors
    /// The node's rejection reason, unmodified
    fn submit(&self, tx: &Transaction) -> std::result::Result<Txid, BroadcastError>;
}

/// Broadcaster that records transactions in memory
///
/// Useful for tests and dry runs. Rejects every submission when created with
/// [`MemoryBroadcaster::rejecting`].
#[derive(Debug, Default)]
pub struct MemoryBroadcaster {
    submitted: Mutex<Vec<Transaction>>,
    reject_reason: Option<String>,
}

impl MemoryBroadcaster {
    /// Creates a broadcaster accepting every transaction
    pub fn new() -> Self { Self::default() }

    /// Creates a broadcaster rejecting every transaction with `reason`
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self { submitted: Mutex::new(Vec::new()), reject_reason: Some(reason.into()) }
    }

    /// Transactions accepted so far
    pub fn submitted(&self) -> Vec<Transaction> { self.submitted.lock().clone() }
}

impl Broadcaster for MemoryBroadcaster {
    fn submit(&self, tx: &Transaction) -> std::result::Result<Txid, BroadcastError> {
        if let Some(reason) = &self.reject_reason {
            return Err(BroadcastError::new(reason.clone()));
        }
        self.submitted.lock().push(tx.clone());
        Ok(tx.compute_txid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_utils::*;

    #[test]
    fn test_memory_broadcaster_records() {
        let broadcaster = MemoryBroadcaster::new();
        let tx = consumer_funding_transaction();
        let txid = broadcaster.submit(&tx).expect("memory broadcaster accepts");
        assert_eq!(txid, tx.compute_txid());
        assert_eq!(broadcaster.submitted(), vec![tx]);
    }

    #[test]
    fn test_memory_broadcaster_rejects() {
        let broadcaster = MemoryBroadcaster::rejecting("non-final");
        let tx = consumer_funding_transaction();
        let err = broadcaster.submit(&tx).expect_err("rejecting broadcaster refuses");
        assert_eq!(err.reason, "non-final");
        assert!(broadcaster.submitted().is_empty());
    }
}
