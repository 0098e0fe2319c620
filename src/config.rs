//! Channel configuration
//!
//! Policy knobs shared by the Consumer and Provider sides. Protocol constants
//! that never vary live in [`crate::types`].

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::errors::{ChannelError, Result};
use crate::types::MIN_EXPIRY_SECS;

/// Default fee for commitment, channel and refund transactions, in satoshis
pub const DEFAULT_FEE_SATS: u64 = 100_000;

/// Default minimum fee the Provider requires on a channel transaction
pub const DEFAULT_MIN_FEE_SATS: u64 = 10_000;

/// Channel policy configuration
///
/// Loaded from JSON with [`ChannelConfig::from_json`]; missing fields take
/// their default values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Minimum seconds between "now" and a time-based lock time, applied by
    /// [`crate::RedeemScript::build`]
    pub min_expiry_secs: u32,
    /// Channel and refund fee of a Consumer session opened without an explicit fee
    pub default_fee: u64,
    /// Minimum fee a Provider channel opened from a proposal accepts
    pub min_fee: u64,
    /// Network a Provider channel checks its payout address and commitment against
    pub network: Network,
}

impl ChannelConfig {
    /// Parses a configuration from a JSON document
    ///
    /// # Errors
    /// * `ChannelError::InvalidMessage` - If the document is not valid JSON for this shape
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChannelError::InvalidMessage(e.to_string()).into())
    }

    /// Returns a copy of this configuration for another network
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self { DEFAULT_CONFIG }
}

/// Default configuration (mainnet, 6 hour minimum expiry)
pub const DEFAULT_CONFIG: ChannelConfig = ChannelConfig {
    min_expiry_secs: MIN_EXPIRY_SECS,
    default_fee: DEFAULT_FEE_SATS,
    min_fee: DEFAULT_MIN_FEE_SATS,
    network: Network::Bitcoin,
};
