//! Channel (payment) transaction builder
//!
//! A channel transaction spends the commitment output and splits it between
//! the Consumer's change (output 0) and the Provider's payment (output 1). It
//! is rebuilt from scratch on every payment increment and only ever
//! broadcast by the Provider.
//!
//! The Consumer signs with SIGHASH_SINGLE, committing to its own change
//! output only. The Provider can therefore lower its payment output to raise
//! the fee without invalidating the Consumer's signature.

use bitcoin::absolute::LockTime;
use bitcoin::secp256k1::SecretKey;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{Address, Amount, Sequence, Transaction, TxOut};

use crate::btx::redeem_script::RedeemScript;
use crate::channel::tx::commitment::commitment_utxo;
use crate::channel::tx::spend::{channel_input, sign_channel_input, SpendDescriptor};
use crate::errors::{BtxError, Result};
use crate::types::TX_VERSION;

/// Index of the Consumer's change output in a channel transaction
pub const CHANGE_OUTPUT_INDEX: usize = 0;

/// Index of the Provider's payment output in a channel transaction
pub const PAYMENT_OUTPUT_INDEX: usize = 1;

/// Parameters for [`build_channel_transaction`]
#[derive(Debug, Clone)]
pub struct ChannelTxParams {
    /// Transaction holding the channel output
    pub commitment_tx: Transaction,
    /// Channel redeem script
    pub redeem_script: RedeemScript,
    /// Consumer signing key
    pub consumer_key: SecretKey,
    /// Provider signing key; only the Provider itself ever sets this
    pub provider_key: Option<SecretKey>,
    /// Cumulative amount paid to the Provider
    pub payment_amount: u64,
    /// Provider payout address
    pub to_address: Address,
    /// Consumer change address
    pub change_address: Address,
    /// Transaction fee in satoshis
    pub fee: u64,
    /// Input sequence; defaults to final
    pub sequence: Option<Sequence>,
}

/// Builds a channel transaction paying `payment_amount` to the Provider
///
/// Outputs are `[change, payment]` with
/// `change = committed - payment_amount - fee`. nLockTime is zero.
///
/// # Arguments
/// * `params` - Commitment, keys, amounts and addresses
///
/// # Returns
/// A transaction carrying the Consumer's SIGHASH_SINGLE signature, plus the
/// Provider's SIGHASH_ALL signature when `provider_key` is set
///
/// # Errors
/// * `BtxError::CommitmentOutputNotFound` - If no commitment output pays the redeem script
/// * `BtxError::InsufficientFunds` - If `payment_amount + fee` exceeds the committed value
/// * `ScriptError::InvalidKey` - If a key does not match its role in the redeem script
pub fn build_channel_transaction(params: &ChannelTxParams) -> Result<Transaction> {
    let utxo = commitment_utxo(&params.redeem_script, &params.commitment_tx)?;

    let available = utxo.amount;
    let required = params.payment_amount.saturating_add(params.fee);
    if required > available {
        return Err(BtxError::InsufficientFunds { available, required }.into());
    }
    let change = available - required;

    let mut transaction = Transaction {
        version: TX_VERSION,
        lock_time: LockTime::ZERO,
        input: vec![channel_input(&utxo, params.sequence.unwrap_or(Sequence::MAX))],
        output: vec![
            TxOut {
                value: Amount::from_sat(change),
                script_pubkey: params.change_address.script_pubkey(),
            },
            TxOut {
                value: Amount::from_sat(params.payment_amount),
                script_pubkey: params.to_address.script_pubkey(),
            },
        ],
    };

    let consumer_signature = sign_channel_input(
        &transaction,
        0,
        &params.redeem_script,
        &params.consumer_key,
        params.redeem_script.consumer_pubkey(),
        EcdsaSighashType::Single,
    )?;

    let provider_signature = params
        .provider_key
        .as_ref()
        .map(|key| {
            sign_channel_input(
                &transaction,
                0,
                &params.redeem_script,
                key,
                params.redeem_script.provider_pubkey(),
                EcdsaSighashType::All,
            )
        })
        .transpose()?;

    transaction.input[0].script_sig = SpendDescriptor {
        redeem_script: &params.redeem_script,
        consumer_signature,
        provider_signature,
    }
    .script_sig()?;

    tracing::debug!(
        txid = %transaction.compute_txid(),
        payment = params.payment_amount,
        change,
        provider_signed = params.provider_key.is_some(),
        "built channel transaction"
    );

    Ok(transaction)
}
