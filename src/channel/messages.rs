//! Channel messages exchanged between Consumer and Provider
//!
//! JSON shapes for channel setup and payments. Transport is up to the
//! caller; these types only fix the field layout and validate what they
//! decode.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize_hex, serialize_hex};
use bitcoin::{CompressedPublicKey, Network, Transaction};
use serde::{Deserialize, Serialize};

use crate::btx::redeem_script::{public_key_from_hex, RedeemScript, RedeemScriptParams};
use crate::btx::state::UnspentOutput;
use crate::btx::timelock::lock_time_after;
use crate::errors::{BtxError, ChannelError, Result};

/// Channel opening message
///
/// `pub_keys` is `[provider, consumer]` as compressed hex keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProposal {
    /// The funded channel output
    pub multisig_out: UnspentOutput,
    /// Value committed to the channel
    pub amount: u64,
    /// Consumer refund address, set by the Consumer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_address: Option<String>,
    /// Provider payout address, set by the Provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_address: Option<String>,
    /// Provider and Consumer public keys, in that order
    pub pub_keys: [String; 2],
    /// Channel lock time
    pub lock_time: u32,
}

impl ChannelProposal {
    /// Decodes a proposal from JSON
    ///
    /// # Errors
    /// * `ChannelError::InvalidMessage` - If the JSON does not match the proposal shape
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChannelError::InvalidMessage(e.to_string()).into())
    }

    /// Encodes the proposal as JSON
    ///
    /// # Errors
    /// * `ChannelError::InvalidMessage` - If serialization fails
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ChannelError::InvalidMessage(e.to_string()).into())
    }

    /// Rebuilds the redeem script the proposal commits to
    ///
    /// Also checks that the announced output is locked by that script.
    ///
    /// # Errors
    /// * `ScriptError::InvalidKey` - If a public key is malformed
    /// * `ScriptError::InvalidLockTime` - If the lock time is zero
    /// * `ChannelError::InvalidMessage` - If the announced locking script does not match
    pub fn redeem_script(&self) -> Result<RedeemScript> {
        let redeem_script = RedeemScript::from_params(&RedeemScriptParams {
            provider_pubkey: public_key_from_hex(&self.pub_keys[0])?,
            consumer_pubkey: public_key_from_hex(&self.pub_keys[1])?,
            lock_time: LockTime::from_consensus(self.lock_time),
        })?;
        if redeem_script.script_pubkey() != self.multisig_out.locking_script {
            return Err(ChannelError::InvalidMessage(
                "multisig_out is not locked by the proposed redeem script".to_string(),
            )
            .into());
        }
        Ok(redeem_script)
    }
}

/// A payment increment sent from Consumer to Provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMessage {
    /// Cumulative amount paid
    pub paid: u64,
    /// Consumer rebuild counter
    pub sequence: u64,
    /// Serialized channel transaction (hex)
    pub transaction: String,
}

impl PaymentMessage {
    /// Creates a payment message for `tx`
    pub fn new(paid: u64, sequence: u64, tx: &Transaction) -> Self {
        Self { paid, sequence, transaction: serialize_hex(tx) }
    }

    /// Decodes the carried channel transaction
    ///
    /// # Errors
    /// * `BtxError::InvalidEncoding` - If the hex is not a transaction
    pub fn decode_transaction(&self) -> Result<Transaction> {
        deserialize_hex(&self.transaction).map_err(|e| BtxError::InvalidEncoding(e.to_string()).into())
    }
}

/// Parameters a Consumer announces before funding a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParameters {
    /// Value the Consumer intends to commit
    pub satoshis: u64,
    /// Channel lock time (UNIX seconds)
    pub lock_time: u32,
    /// Consumer public key (compressed hex)
    pub pubkey: String,
    /// Network the channel lives on
    pub network: Network,
}

impl ChannelParameters {
    /// Proposes parameters for a channel lasting `duration_secs` from `now`
    ///
    /// # Errors
    /// * `ScriptError::InvalidLockTime` - If `now + duration_secs` is not a valid timestamp
    pub fn propose(
        satoshis: u64,
        duration_secs: u32,
        pubkey: CompressedPublicKey,
        network: Network,
        now: u32,
    ) -> Result<Self> {
        let lock_time = lock_time_after(now, duration_secs)?;
        Ok(Self {
            satoshis,
            lock_time: lock_time.to_consensus_u32(),
            pubkey: pubkey.to_string(),
            network,
        })
    }
}
