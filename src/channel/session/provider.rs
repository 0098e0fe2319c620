//! Provider channel ledger
//!
//! Holds the highest payment the Provider has accepted on one channel and
//! the transaction that proves it. Incoming transactions are untrusted:
//! anything that fails verification or does not strictly raise the payment
//! is refused without touching the ledger.

use std::slice;

use bitcoin::consensus::encode::deserialize_hex;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Address, Transaction, Txid};

use crate::btx::redeem_script::RedeemScript;
use crate::channel::broadcast::Broadcaster;
use crate::channel::messages::{ChannelProposal, PaymentMessage};
use crate::channel::tx::spend::public_key_of;
use crate::channel::verifier::{
    check_channel_transaction, sign_channel_transaction, verify_commitment_transaction, Verdict,
    VerifyParams,
};
use crate::config::ChannelConfig;
use crate::errors::{ChannelError, Result, ScriptError};
use crate::types::ChannelId;

/// Provider side of an open channel
#[derive(Debug, Clone)]
pub struct ProviderChannel {
    redeem_script: RedeemScript,
    commitment_tx: Transaction,
    provider_key: SecretKey,
    payment_address: Address,
    min_fee: u64,
    current_amount: u64,
    latest: Option<Transaction>,
}

impl ProviderChannel {
    /// Creates a ledger for a channel funded by `commitment_tx`
    ///
    /// # Errors
    /// * `ScriptError::InvalidKey` - If `provider_key` does not match the redeem script
    /// * `ChannelError::MissingParameter` - If `min_fee` is zero
    pub fn new(
        redeem_script: RedeemScript,
        commitment_tx: Transaction,
        provider_key: SecretKey,
        payment_address: Address,
        min_fee: u64,
    ) -> Result<Self> {
        if min_fee == 0 {
            return Err(ChannelError::MissingParameter("min_fee").into());
        }
        if public_key_of(&provider_key) != redeem_script.provider_pubkey() {
            return Err(ScriptError::InvalidKey(
                "provider key does not match redeem script".to_string(),
            )
            .into());
        }
        Ok(Self {
            redeem_script,
            commitment_tx,
            provider_key,
            payment_address,
            min_fee,
            current_amount: 0,
            latest: None,
        })
    }

    /// Creates a ledger from a Consumer's channel proposal
    ///
    /// The redeem script is rebuilt from the proposed keys and lock time, and
    /// `commitment_tx` must be the announced transaction paying the committed
    /// amount to the derived address. Minimum fee and network come from
    /// `config`.
    ///
    /// # Errors
    /// * `ChannelError::InvalidMessage` - If the proposal and commitment disagree
    /// * `ScriptError::InvalidKey` - If a key is malformed or `provider_key` is not the proposed one
    /// * `ScriptError::AddressDerivationFailed` - If `payment_address` is not for the configured network
    /// * `ChannelError::MissingParameter` - If the configured minimum fee is zero
    pub fn from_proposal(
        proposal: &ChannelProposal,
        commitment_tx: Transaction,
        provider_key: SecretKey,
        payment_address: Address,
        config: &ChannelConfig,
    ) -> Result<Self> {
        if !payment_address.as_unchecked().is_valid_for_network(config.network) {
            return Err(ScriptError::AddressDerivationFailed(format!(
                "payment address {} is not valid for {}",
                payment_address, config.network
            ))
            .into());
        }
        let redeem_script = proposal.redeem_script()?;
        if proposal.multisig_out.txid != commitment_tx.compute_txid() {
            return Err(ChannelError::InvalidMessage(
                "multisig_out does not reference the commitment transaction".to_string(),
            )
            .into());
        }
        if !verify_commitment_transaction(
            &commitment_tx,
            &redeem_script,
            config.network,
            Some(proposal.amount),
        ) {
            return Err(ChannelError::InvalidMessage(
                "commitment does not fund the proposed channel".to_string(),
            )
            .into());
        }
        Self::new(redeem_script, commitment_tx, provider_key, payment_address, config.min_fee)
    }

    /// Channel identifier (HASH160 of the redeem script)
    pub fn channel_id(&self) -> ChannelId { self.redeem_script.script_hash() }

    /// Highest accepted payment
    pub fn current_amount(&self) -> u64 { self.current_amount }

    /// Channel redeem script
    pub fn redeem_script(&self) -> &RedeemScript { &self.redeem_script }

    /// Latest accepted channel transaction, as signed by the Consumer
    pub fn latest_transaction(&self) -> Option<&Transaction> { self.latest.as_ref() }

    /// Evaluates a channel transaction from the Consumer
    ///
    /// The paid amount is read from the single output paying the Provider's
    /// address and must strictly exceed the current amount. A transaction
    /// paying that address more than once is refused. On acceptance the ledger
    /// advances and the transaction is kept for [`Self::close`].
    ///
    /// # Returns
    /// `Ok(true)` if the payment was accepted, `Ok(false)` if it was refused
    pub fn accept_payment(&mut self, channel_tx: &Transaction) -> Result<bool> {
        let payment_script = self.payment_address.script_pubkey();
        let payouts: Vec<u64> = channel_tx
            .output
            .iter()
            .filter(|output| output.script_pubkey == payment_script)
            .map(|output| output.value.to_sat())
            .collect();
        let amount = match payouts.as_slice() {
            [amount] if *amount > 0 => *amount,
            _ => {
                tracing::debug!(
                    channel = %self.channel_id(),
                    outputs = payouts.len(),
                    "refused payment: expected one non-zero output to provider address"
                );
                return Ok(false);
            }
        };

        let verdict = check_channel_transaction(&VerifyParams {
            channel_tx,
            redeem_script: &self.redeem_script,
            referenced_txs: slice::from_ref(&self.commitment_tx),
            expected_output_address: &self.payment_address,
            expected_output_amount: amount,
            min_fee: self.min_fee,
            allow_extra_inputs: false,
        })?;
        if let Verdict::Reject(reason) = verdict {
            tracing::debug!(channel = %self.channel_id(), %reason, "refused payment");
            return Ok(false);
        }

        if amount <= self.current_amount {
            tracing::warn!(
                channel = %self.channel_id(),
                amount,
                current = self.current_amount,
                "refused payment that does not increase the channel balance"
            );
            return Ok(false);
        }

        self.current_amount = amount;
        self.latest = Some(channel_tx.clone());
        tracing::info!(
            channel = %self.channel_id(),
            amount,
            txid = %channel_tx.compute_txid(),
            "accepted payment"
        );
        Ok(true)
    }

    /// Like [`Self::accept_payment`] for a serialized transaction
    ///
    /// Undecodable input is refused, not an error.
    pub fn accept_payment_hex(&mut self, raw: &str) -> Result<bool> {
        match deserialize_hex::<Transaction>(raw) {
            Ok(tx) => self.accept_payment(&tx),
            Err(e) => {
                tracing::debug!(channel = %self.channel_id(), error = %e, "refused undecodable payment");
                Ok(false)
            }
        }
    }

    /// Like [`Self::accept_payment`] for a payment message
    ///
    /// The message's `paid` and `sequence` are informational; only the
    /// transaction decides.
    pub fn accept_payment_message(&mut self, message: &PaymentMessage) -> Result<bool> {
        self.accept_payment_hex(&message.transaction)
    }

    /// Latest accepted transaction, co-signed by the Provider
    ///
    /// # Errors
    /// * `ChannelError::NoAcceptedPayment` - If no payment has been accepted
    pub fn payment_transaction(&self) -> Result<Transaction> {
        let latest = self.latest.as_ref().ok_or(ChannelError::NoAcceptedPayment)?;
        sign_channel_transaction(latest, slice::from_ref(&self.commitment_tx), &self.provider_key)
    }

    /// Signs the latest accepted transaction and submits it
    ///
    /// # Errors
    /// * `ChannelError::NoAcceptedPayment` - If no payment has been accepted
    /// * `BroadcastError` - The broadcaster's rejection, unmodified
    pub fn close(&self, broadcaster: &dyn Broadcaster) -> Result<Txid> {
        let signed = self.payment_transaction()?;
        let txid = broadcaster.submit(&signed).map_err(|e| {
            tracing::warn!(channel = %self.channel_id(), reason = %e, "channel close rejected");
            e
        })?;
        tracing::info!(
            channel = %self.channel_id(),
            %txid,
            amount = self.current_amount,
            "closed channel"
        );
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::consensus::encode::serialize_hex;
    use bitcoin::{Amount, TxOut};

    use super::*;
    use crate::btx::validation::verify_bitcoin_transaction;
    use crate::channel::broadcast::MemoryBroadcaster;
    use crate::channel::session::consumer::{ConsumerSession, ConsumerSessionParams};
    use crate::channel::test_utils::*;
    use crate::config::DEFAULT_MIN_FEE_SATS;
    use crate::errors::BroadcastError;
    use crate::Error;

    fn consumer(commitment_tx: Transaction) -> ConsumerSession {
        ConsumerSession::new(ConsumerSessionParams {
            redeem_script: test_redeem_script(),
            commitment_tx,
            consumer_key: test_keys().consumer_secret,
            payment_address: provider_address(),
            refund_address: consumer_address(),
            fee: Some(TEST_FEE),
        })
        .expect("session should open")
    }

    fn test_config() -> ChannelConfig { ChannelConfig::default().with_network(TEST_NETWORK) }

    fn provider(commitment_tx: Transaction) -> ProviderChannel {
        ProviderChannel::new(
            test_redeem_script(),
            commitment_tx,
            test_keys().provider_secret,
            provider_address(),
            DEFAULT_MIN_FEE_SATS,
        )
        .expect("provider channel should open")
    }

    #[test]
    fn test_accepts_increasing_payments() {
        let (commitment, _) = test_commitment();
        let mut consumer = consumer(commitment.clone());
        let mut provider = provider(commitment);

        let first = consumer.increment_payment_by(10_000_000).expect("increment");
        assert!(provider.accept_payment_hex(&first).expect("no usage error"));
        assert_eq!(provider.current_amount(), 10_000_000);

        let second = consumer.increment(5_000_000).expect("increment");
        assert!(provider.accept_payment_message(&second).expect("no usage error"));
        assert_eq!(provider.current_amount(), 15_000_000);

        assert!(!provider.accept_payment_hex(&first).expect("no usage error"));
        assert_eq!(provider.current_amount(), 15_000_000);
    }

    #[test]
    fn test_same_amount_refused() {
        let (commitment, _) = test_commitment();
        let mut consumer = consumer(commitment.clone());
        let mut provider = provider(commitment);

        let hex = consumer.increment_payment_by(1_000).expect("increment");
        assert!(provider.accept_payment_hex(&hex).expect("no usage error"));
        assert!(!provider.accept_payment_hex(&hex).expect("no usage error"));
    }

    #[test]
    fn test_refuses_garbage_and_zero_payment() {
        let (commitment, _) = test_commitment();
        let mut consumer = consumer(commitment.clone());
        let mut provider = provider(commitment);

        assert!(!provider.accept_payment_hex("not a transaction").expect("no usage error"));

        let zero = consumer.increment_payment_by(0).expect("zero increment");
        assert!(!provider.accept_payment_hex(&zero).expect("no usage error"));
        assert_eq!(provider.current_amount(), 0);
        assert!(provider.latest_transaction().is_none());
    }

    #[test]
    fn test_refuses_payment_to_other_address() {
        let (commitment, _) = test_commitment();
        let mut provider = provider(commitment.clone());
        let mut session = ConsumerSession::new(ConsumerSessionParams {
            redeem_script: test_redeem_script(),
            commitment_tx: commitment,
            consumer_key: test_keys().consumer_secret,
            payment_address: consumer_address(),
            refund_address: consumer_address(),
            fee: Some(TEST_FEE),
        })
        .expect("session should open");
        let hex = session.increment_payment_by(1_000).expect("increment");
        assert!(!provider.accept_payment_hex(&hex).expect("no usage error"));
    }

    #[test]
    fn test_close_signs_and_submits() {
        let (commitment, _) = test_commitment();
        let mut consumer = consumer(commitment.clone());
        let mut provider = provider(commitment.clone());

        let broadcaster = MemoryBroadcaster::new();
        let result = provider.close(&broadcaster);
        assert!(matches!(result, Err(Error::Channel(ChannelError::NoAcceptedPayment))));

        let hex = consumer.increment_payment_by(10_000_000).expect("increment");
        assert!(provider.accept_payment_hex(&hex).expect("no usage error"));

        let txid = provider.close(&broadcaster).expect("close should submit");
        let submitted = broadcaster.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].compute_txid(), txid);
        assert_ne!(serialize_hex(&submitted[0]), hex);
        verify_bitcoin_transaction(&submitted[0], &[commitment])
            .expect("provider-signed transaction should be valid");
    }

    #[test]
    fn test_close_passes_broadcast_error_through() {
        let (commitment, _) = test_commitment();
        let mut consumer = consumer(commitment.clone());
        let mut provider = provider(commitment);
        let hex = consumer.increment_payment_by(1_000).expect("increment");
        assert!(provider.accept_payment_hex(&hex).expect("no usage error"));

        let broadcaster = MemoryBroadcaster::rejecting("txn-mempool-conflict");
        let result = provider.close(&broadcaster);
        assert!(matches!(
            result,
            Err(Error::Broadcast(BroadcastError { ref reason })) if reason == "txn-mempool-conflict"
        ));
    }

    #[test]
    fn test_from_proposal() {
        let (commitment, _) = test_commitment();
        let proposal = consumer(commitment.clone()).proposal().expect("proposal");

        let channel = ProviderChannel::from_proposal(
            &proposal,
            commitment.clone(),
            test_keys().provider_secret,
            provider_address(),
            &test_config(),
        )
        .expect("proposal should be accepted");
        assert_eq!(channel.channel_id(), test_redeem_script().script_hash());

        let mut inflated = proposal.clone();
        inflated.amount += 1;
        let result = ProviderChannel::from_proposal(
            &inflated,
            commitment.clone(),
            test_keys().provider_secret,
            provider_address(),
            &test_config(),
        );
        assert!(matches!(result, Err(Error::Channel(ChannelError::InvalidMessage(_)))));

        let result = ProviderChannel::from_proposal(
            &proposal,
            commitment,
            test_keys().consumer_secret,
            provider_address(),
            &test_config(),
        );
        assert!(matches!(result, Err(Error::Script(ScriptError::InvalidKey(_)))));
    }

    #[test]
    fn test_from_proposal_uses_config() {
        let (commitment, _) = test_commitment();
        let proposal = consumer(commitment.clone()).proposal().expect("proposal");

        let mainnet = ProviderChannel::from_proposal(
            &proposal,
            commitment.clone(),
            test_keys().provider_secret,
            provider_address(),
            &ChannelConfig::default(),
        );
        assert!(matches!(mainnet, Err(Error::Script(ScriptError::AddressDerivationFailed(_)))));

        let zero_fee = ChannelConfig { min_fee: 0, ..test_config() };
        let result = ProviderChannel::from_proposal(
            &proposal,
            commitment.clone(),
            test_keys().provider_secret,
            provider_address(),
            &zero_fee,
        );
        assert!(matches!(result, Err(Error::Channel(ChannelError::MissingParameter("min_fee")))));

        // A minimum above the channel fee refuses every payment.
        let strict = ChannelConfig { min_fee: TEST_FEE + 1, ..test_config() };
        let mut channel = ProviderChannel::from_proposal(
            &proposal,
            commitment.clone(),
            test_keys().provider_secret,
            provider_address(),
            &strict,
        )
        .expect("proposal should be accepted");
        let hex = consumer(commitment).increment_payment_by(1_000).expect("increment");
        assert!(!channel.accept_payment_hex(&hex).expect("no usage error"));
    }

    #[test]
    fn test_zero_min_fee_rejected() {
        let (commitment, _) = test_commitment();
        let result = ProviderChannel::new(
            test_redeem_script(),
            commitment,
            test_keys().provider_secret,
            provider_address(),
            0,
        );
        assert!(matches!(result, Err(Error::Channel(ChannelError::MissingParameter("min_fee")))));
    }

    #[test]
    fn test_refuses_witness_on_commitment_input() {
        let (commitment, _) = test_commitment();
        let mut consumer = consumer(commitment.clone());
        let mut provider = provider(commitment);

        let hex = consumer.increment_payment_by(1_000).expect("increment");
        let mut tx: Transaction = deserialize_hex(&hex).expect("hex should decode");
        tx.input[0].witness.push([0xde, 0xad]);

        assert!(!provider.accept_payment(&tx).expect("no usage error"));
        assert_eq!(provider.current_amount(), 0);
        assert!(provider.latest_transaction().is_none());
    }

    #[test]
    fn test_refuses_second_output_to_provider() {
        let (commitment, _) = test_commitment();
        let mut consumer = consumer(commitment.clone());
        let mut provider = provider(commitment);

        let hex = consumer.increment_payment_by(10_000_000).expect("increment");
        let mut tx: Transaction = deserialize_hex(&hex).expect("hex should decode");
        // SIGHASH_SINGLE leaves the Consumer signature valid over extra outputs.
        tx.output.push(TxOut {
            value: Amount::from_sat(1_000),
            script_pubkey: provider_address().script_pubkey(),
        });

        assert!(!provider.accept_payment(&tx).expect("no usage error"));
        assert!(provider.latest_transaction().is_none());

        tx.output.pop();
        assert!(provider.accept_payment(&tx).expect("no usage error"));
        assert_eq!(provider.current_amount(), 10_000_000);
    }
}
