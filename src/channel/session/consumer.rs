//! Consumer session
//!
//! Tracks the cumulative amount paid and rebuilds the channel transaction on
//! every increment. Only the most recent transaction matters: each one pays
//! the Provider the full cumulative amount.

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Address, Transaction};

use crate::btx::redeem_script::RedeemScript;
use crate::channel::messages::{ChannelProposal, PaymentMessage};
use crate::channel::tx::commitment::commitment_utxo;
use crate::channel::tx::payment::{build_channel_transaction, ChannelTxParams};
use crate::channel::tx::refund::{build_refund_transaction, RefundTxParams};
use crate::channel::tx::spend::public_key_of;
use crate::config::ChannelConfig;
use crate::errors::{ChannelError, Result, ScriptError};

/// Inputs to [`ConsumerSession::new`]
#[derive(Debug, Clone)]
pub struct ConsumerSessionParams {
    /// Channel redeem script
    pub redeem_script: RedeemScript,
    /// Transaction funding the channel
    pub commitment_tx: Transaction,
    /// Consumer signing key
    pub consumer_key: SecretKey,
    /// Provider payout address
    pub payment_address: Address,
    /// Consumer change and refund address
    pub refund_address: Address,
    /// Fee for channel and refund transactions; `None` takes the configured default
    pub fee: Option<u64>,
}

/// Consumer side of an open channel
#[derive(Debug, Clone)]
pub struct ConsumerSession {
    paid: u64,
    sequence: u64,
    committed_amount: u64,
    fee: u64,
    params: ConsumerSessionParams,
}

impl ConsumerSession {
    /// Opens a session over a funded commitment with the default configuration
    ///
    /// # Errors
    /// See [`Self::with_config`].
    pub fn new(params: ConsumerSessionParams) -> Result<Self> {
        Self::with_config(params, &ChannelConfig::default())
    }

    /// Opens a session over a funded commitment
    ///
    /// A missing `params.fee` is taken from `config.default_fee`.
    ///
    /// # Errors
    /// * `BtxError::CommitmentOutputNotFound` - If the commitment does not pay the redeem script
    /// * `ScriptError::InvalidKey` - If `consumer_key` does not match the redeem script
    pub fn with_config(params: ConsumerSessionParams, config: &ChannelConfig) -> Result<Self> {
        if public_key_of(&params.consumer_key) != params.redeem_script.consumer_pubkey() {
            return Err(ScriptError::InvalidKey(
                "consumer key does not match redeem script".to_string(),
            )
            .into());
        }
        let committed_amount = commitment_utxo(&params.redeem_script, &params.commitment_tx)?.amount;
        let fee = params.fee.unwrap_or(config.default_fee);
        Ok(Self { paid: 0, sequence: 0, committed_amount, fee, params })
    }

    /// Cumulative amount paid so far
    pub fn paid(&self) -> u64 { self.paid }

    /// Number of channel transactions built so far
    pub fn sequence(&self) -> u64 { self.sequence }

    /// Value locked in the channel output
    pub fn committed_amount(&self) -> u64 { self.committed_amount }

    /// Channel redeem script
    pub fn redeem_script(&self) -> &RedeemScript { &self.params.redeem_script }

    /// Transaction funding the channel
    pub fn commitment_tx(&self) -> &Transaction { &self.params.commitment_tx }

    /// Fee paid by channel and refund transactions
    pub fn fee(&self) -> u64 { self.fee }

    /// Value still available for payments
    pub fn remaining(&self) -> u64 {
        self.committed_amount.saturating_sub(self.paid).saturating_sub(self.fee)
    }

    /// Builds the channel transaction paying `paid` to the Provider
    ///
    /// # Errors
    /// * `BtxError::InsufficientFunds` - If `paid + fee` exceeds the committed value
    pub fn channel_transaction(&self) -> Result<Transaction> { self.build_payment(self.paid) }

    /// Pays the Provider `delta` more
    ///
    /// State only advances once the new transaction is built; a failed
    /// increment leaves `paid` and `sequence` untouched.
    ///
    /// # Returns
    /// The serialized channel transaction (hex), signed by the Consumer only
    ///
    /// # Errors
    /// * `ChannelError::PaymentOverflow` - If the cumulative amount overflows
    /// * `ChannelError::SequenceOverflow` - If the rebuild counter overflows
    /// * `BtxError::InsufficientFunds` - If the channel cannot cover the new total plus fee
    pub fn increment_payment_by(&mut self, delta: u64) -> Result<String> {
        Ok(self.increment(delta)?.transaction)
    }

    /// Like [`Self::increment_payment_by`] but returns the full payment message
    ///
    /// # Errors
    /// Same as [`Self::increment_payment_by`]
    pub fn increment(&mut self, delta: u64) -> Result<PaymentMessage> {
        let paid = self
            .paid
            .checked_add(delta)
            .ok_or(ChannelError::PaymentOverflow { paid: self.paid, increment: delta })?;
        let sequence = self.sequence.checked_add(1).ok_or(ChannelError::SequenceOverflow)?;

        let transaction = self.build_payment(paid)?;
        self.paid = paid;
        self.sequence = sequence;

        tracing::debug!(paid, sequence, delta, "consumer payment incremented");
        Ok(PaymentMessage::new(paid, sequence, &transaction))
    }

    /// Builds the refund returning the committed value after the lock time
    ///
    /// # Errors
    /// * `BtxError::InsufficientFunds` - If the fee exceeds the committed value
    pub fn refund_transaction(&self) -> Result<Transaction> {
        build_refund_transaction(&RefundTxParams {
            commitment_tx: self.params.commitment_tx.clone(),
            redeem_script: self.params.redeem_script.clone(),
            consumer_key: self.params.consumer_key,
            to_address: self.params.refund_address.clone(),
            fee: self.fee,
            sequence: None,
            lock_time: None,
        })
    }

    /// Hex of the refund transaction
    ///
    /// # Errors
    /// Same as [`Self::refund_transaction`]
    pub fn refund_transaction_hex(&self) -> Result<String> {
        Ok(serialize_hex(&self.refund_transaction()?))
    }

    /// Channel opening message for the Provider
    ///
    /// # Errors
    /// * `BtxError::CommitmentOutputNotFound` - If the commitment does not pay the redeem script
    pub fn proposal(&self) -> Result<ChannelProposal> {
        let multisig_out = commitment_utxo(&self.params.redeem_script, &self.params.commitment_tx)?;
        let script = &self.params.redeem_script;
        Ok(ChannelProposal {
            multisig_out,
            amount: self.committed_amount,
            refund_address: Some(self.params.refund_address.to_string()),
            payment_address: None,
            pub_keys: [script.provider_pubkey().to_string(), script.consumer_pubkey().to_string()],
            lock_time: script.lock_time().to_consensus_u32(),
        })
    }

    fn build_payment(&self, payment_amount: u64) -> Result<Transaction> {
        build_channel_transaction(&ChannelTxParams {
            commitment_tx: self.params.commitment_tx.clone(),
            redeem_script: self.params.redeem_script.clone(),
            consumer_key: self.params.consumer_key,
            provider_key: None,
            payment_amount,
            to_address: self.params.payment_address.clone(),
            change_address: self.params.refund_address.clone(),
            fee: self.fee,
            sequence: None,
        })
    }
}
