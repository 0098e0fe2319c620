//! Provider-side channel transaction verification
//!
//! The Provider accepts a channel transaction from the Consumer using nothing
//! but the redeem script it derived itself and the previous transactions the
//! inputs reference. Checks run in a fixed order and stop at the first
//! failure:
//!
//! 1. every input references a supplied previous transaction
//! 2. exactly one input spends through the redeem script
//! 3. the referenced commitment transaction is well formed and pays the redeem script
//! 4. that input carries no witness and its Consumer signature is canonical and valid
//! 5. the fee is non-negative and at least the minimum
//! 6. every input sequence is final
//! 7. exactly one output pays the expected amount to the expected address
//! 8. extra inputs are either forbidden or individually valid
//!
//! A failed check is a verdict, not an error: [`verify_channel_transaction`]
//! returns `Ok(false)` and [`check_channel_transaction`] names the reason.

use bitcoin::absolute::LockTime;
use bitcoin::secp256k1::SecretKey;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{Address, Amount, CompressedPublicKey, Network, OutPoint, Transaction};
use thiserror::Error;

use crate::btx::address::derive_address;
use crate::btx::redeem_script::{RedeemScript, RedeemScriptParams};
use crate::btx::script::script_sig_pushes;
use crate::btx::sighash::verify_legacy_signature;
use crate::btx::state::find_spent_output;
use crate::btx::timelock::is_finalized;
use crate::btx::validation::{check_transaction, transaction_fee, verify_input_script};
use crate::channel::tx::spend::{
    public_key_of, sign_channel_input, split_channel_script_sig, with_provider_signature,
};
use crate::channel::tx::CHANGE_OUTPUT_INDEX;
use crate::errors::{BtxError, ChannelError, Result};

/// Inputs to [`verify_channel_transaction`]
#[derive(Debug, Clone, Copy)]
pub struct VerifyParams<'a> {
    /// Transaction received from the Consumer
    pub channel_tx: &'a Transaction,
    /// Redeem script the Provider derived for this channel
    pub redeem_script: &'a RedeemScript,
    /// Previous transactions, one per input of `channel_tx`
    pub referenced_txs: &'a [Transaction],
    /// Provider payout address
    pub expected_output_address: &'a Address,
    /// Amount the Provider expects to be paid
    pub expected_output_amount: u64,
    /// Minimum acceptable fee
    pub min_fee: u64,
    /// Whether inputs other than the commitment input may fund the transaction
    pub allow_extra_inputs: bool,
}

/// Reason a channel transaction was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Rejection {
    /// Channel transaction itself is malformed
    #[error("channel transaction is malformed: {0}")]
    MalformedTransaction(String),

    /// Number of inputs differs from the number of referenced transactions
    #[error("{inputs} inputs but {referenced} referenced transactions")]
    InputCountMismatch {
        /// Inputs in the channel transaction
        inputs: usize,
        /// Referenced transactions supplied
        referenced: usize,
    },

    /// An input's previous output is not among the referenced transactions
    #[error("no referenced transaction for input spending {0}")]
    MissingReferencedOutput(OutPoint),

    /// No input carries the redeem script as its last push
    #[error("no input spends through the redeem script")]
    NoCommitmentInput,

    /// More than one input carries the redeem script
    #[error("{0} inputs spend through the redeem script")]
    MultipleCommitmentInputs(usize),

    /// Referenced commitment transaction is not internally consistent
    #[error("commitment transaction is invalid: {0}")]
    InvalidCommitmentTransaction(String),

    /// Commitment input spends an output not locked by the redeem script
    #[error("commitment input does not spend the channel output")]
    CommitmentOutputMismatch,

    /// Commitment input scriptSig has non-push opcodes
    #[error("commitment input scriptSig is not push-only")]
    ScriptSigNotPushOnly,

    /// No push precedes the redeem script
    #[error("commitment input has no consumer signature")]
    MissingConsumerSignature,

    /// Commitment input carries witness data, which a P2SH spend must not
    #[error("commitment input {0} carries an unexpected witness")]
    UnexpectedWitness(usize),

    /// Consumer signature is non-canonical or does not verify
    #[error("consumer signature is invalid")]
    InvalidConsumerSignature,

    /// Outputs claim more than the inputs provide
    #[error("outputs exceed inputs by {0} sat")]
    NegativeFee(u64),

    /// Fee below the Provider's minimum
    #[error("fee {fee} below minimum {min_fee}")]
    FeeTooLow {
        /// Fee paid
        fee: u64,
        /// Minimum required
        min_fee: u64,
    },

    /// An input opts into nLockTime
    #[error("input {0} sequence is not final")]
    NonFinalSequence(usize),

    /// Expected payout output missing or duplicated
    #[error("{0} outputs match the expected payment, expected exactly 1")]
    ExpectedOutputCount(usize),

    /// Commitment input value does not equal outputs plus fee
    #[error("commitment input value {input} differs from outputs plus fee {required}")]
    ValueMismatch {
        /// Value of the commitment input
        input: u64,
        /// Sum of outputs plus fee
        required: u64,
    },

    /// An extra input fails script verification
    #[error("extra input {0} fails script verification")]
    InvalidExtraInput(usize),
}

/// Outcome of [`check_channel_transaction`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Transaction passed every check
    Accept,
    /// Transaction failed the named check
    Reject(Rejection),
}

impl Verdict {
    /// Returns true for [`Verdict::Accept`]
    pub fn is_accepted(&self) -> bool { matches!(self, Verdict::Accept) }
}

/// Verifies a channel transaction on behalf of the Provider
///
/// # Returns
/// `Ok(true)` if every check passes, `Ok(false)` otherwise
///
/// # Errors
/// * `ChannelError::MissingParameter` - If `referenced_txs` is empty or
///   `expected_output_amount` or `min_fee` is zero
pub fn verify_channel_transaction(params: &VerifyParams<'_>) -> Result<bool> {
    Ok(check_channel_transaction(params)?.is_accepted())
}

/// Verifies a channel transaction and reports the first failed check
///
/// # Errors
/// * `ChannelError::MissingParameter` - If a required parameter is absent or zero
pub fn check_channel_transaction(params: &VerifyParams<'_>) -> Result<Verdict> {
    if params.referenced_txs.is_empty() {
        return Err(ChannelError::MissingParameter("referenced_txs").into());
    }
    if params.expected_output_amount == 0 {
        return Err(ChannelError::MissingParameter("expected_output_amount").into());
    }
    if params.min_fee == 0 {
        return Err(ChannelError::MissingParameter("min_fee").into());
    }

    let verdict = match evaluate(params) {
        Ok(()) => Verdict::Accept,
        Err(rejection) => {
            tracing::debug!(
                txid = %params.channel_tx.compute_txid(),
                reason = %rejection,
                "rejected channel transaction"
            );
            Verdict::Reject(rejection)
        }
    };
    Ok(verdict)
}

fn evaluate(params: &VerifyParams<'_>) -> std::result::Result<(), Rejection> {
    let tx = params.channel_tx;
    let referenced = params.referenced_txs;

    check_transaction(tx).map_err(|e| Rejection::MalformedTransaction(e.to_string()))?;

    // 1. One referenced transaction per input, each actually referenced
    if tx.input.len() != referenced.len() {
        return Err(Rejection::InputCountMismatch {
            inputs: tx.input.len(),
            referenced: referenced.len(),
        });
    }
    for input in &tx.input {
        if find_spent_output(referenced, &input.previous_output).is_none() {
            return Err(Rejection::MissingReferencedOutput(input.previous_output));
        }
    }

    // 2. Exactly one input whose last push is the redeem script
    let redeem_bytes = params.redeem_script.as_bytes();
    let matching: Vec<usize> = tx
        .input
        .iter()
        .enumerate()
        .filter(|(_, input)| {
            script_sig_pushes(&input.script_sig)
                .and_then(|mut pushes| pushes.pop())
                .is_some_and(|last| last == redeem_bytes)
        })
        .map(|(idx, _)| idx)
        .collect();
    let commitment_index = match matching.as_slice() {
        [] => return Err(Rejection::NoCommitmentInput),
        [idx] => *idx,
        many => return Err(Rejection::MultipleCommitmentInputs(many.len())),
    };
    let commitment_input = &tx.input[commitment_index];

    // 3. The commitment transaction is well formed and pays the redeem script
    let commitment_tx = referenced
        .iter()
        .find(|prev| prev.compute_txid() == commitment_input.previous_output.txid)
        .ok_or(Rejection::MissingReferencedOutput(commitment_input.previous_output))?;
    check_transaction(commitment_tx)
        .map_err(|e| Rejection::InvalidCommitmentTransaction(e.to_string()))?;
    let spent = commitment_tx
        .output
        .get(commitment_input.previous_output.vout as usize)
        .ok_or(Rejection::MissingReferencedOutput(commitment_input.previous_output))?;
    if spent.script_pubkey != params.redeem_script.script_pubkey() {
        return Err(Rejection::CommitmentOutputMismatch);
    }

    // 4. Consumer signature
    if !commitment_input.witness.is_empty() {
        return Err(Rejection::UnexpectedWitness(commitment_index));
    }
    if !commitment_input.script_sig.is_push_only() {
        return Err(Rejection::ScriptSigNotPushOnly);
    }
    let pushes =
        script_sig_pushes(&commitment_input.script_sig).ok_or(Rejection::ScriptSigNotPushOnly)?;
    let consumer_signature = pushes
        .len()
        .checked_sub(2)
        .map(|idx| &pushes[idx])
        .ok_or(Rejection::MissingConsumerSignature)?;
    let valid = verify_legacy_signature(
        tx,
        commitment_index,
        params.redeem_script.as_script(),
        consumer_signature,
        &params.redeem_script.consumer_pubkey(),
    )
    .unwrap_or(false);
    if !valid {
        return Err(Rejection::InvalidConsumerSignature);
    }

    // 5. Fee
    let fee = transaction_fee(tx, referenced)
        .map_err(|_| Rejection::MissingReferencedOutput(commitment_input.previous_output))?;
    if fee < 0 {
        return Err(Rejection::NegativeFee(u64::try_from(-fee).unwrap_or(u64::MAX)));
    }
    let fee = u64::try_from(fee).unwrap_or(u64::MAX);
    if fee < params.min_fee {
        return Err(Rejection::FeeTooLow { fee, min_fee: params.min_fee });
    }

    // 6. Final sequences
    if let Some(idx) = tx.input.iter().position(|input| !is_finalized(input.sequence)) {
        return Err(Rejection::NonFinalSequence(idx));
    }

    // 7. Exactly one output paying the expected amount to the expected address
    let expected_script = params.expected_output_address.script_pubkey();
    let expected_value = Amount::from_sat(params.expected_output_amount);
    let matches = tx
        .output
        .iter()
        .filter(|output| output.script_pubkey == expected_script && output.value == expected_value)
        .count();
    if matches != 1 {
        return Err(Rejection::ExpectedOutputCount(matches));
    }

    // 8. Extra inputs
    if params.allow_extra_inputs {
        for (idx, input) in tx.input.iter().enumerate() {
            if idx == commitment_index {
                continue;
            }
            let valid = find_spent_output(referenced, &input.previous_output)
                .map(|spent| verify_input_script(tx, idx, spent).is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(Rejection::InvalidExtraInput(idx));
            }
        }
    } else {
        let input_value = spent.value.to_sat();
        let output_total: u64 = tx.output.iter().map(|output| output.value.to_sat()).sum();
        let required = output_total.saturating_add(fee);
        if input_value != required {
            return Err(Rejection::ValueMismatch { input: input_value, required });
        }
    }

    Ok(())
}

/// Attaches the Provider's SIGHASH_ALL signature to a channel transaction
///
/// Locates the input whose scriptSig ends in a channel redeem script naming
/// `provider_key` as the Provider and whose previous output is among
/// `referenced_txs`. Does not re-run verification.
///
/// # Errors
/// * `ChannelError::CommitmentInputNotFound` - If no input spends a channel output for this Provider
/// * `BtxError::MissingReferencedTransaction` - If that input's previous transaction is absent
pub fn sign_channel_transaction(
    channel_tx: &Transaction,
    referenced_txs: &[Transaction],
    provider_key: &SecretKey,
) -> Result<Transaction> {
    let provider_pubkey = public_key_of(provider_key);

    let (index, redeem_script) = channel_tx
        .input
        .iter()
        .enumerate()
        .find_map(|(idx, input)| {
            split_channel_script_sig(&input.script_sig)
                .filter(|(_, script)| script.provider_pubkey() == provider_pubkey)
                .map(|(_, script)| (idx, script))
        })
        .ok_or(ChannelError::CommitmentInputNotFound)?;

    let outpoint = channel_tx.input[index].previous_output;
    if find_spent_output(referenced_txs, &outpoint).is_none() {
        return Err(BtxError::MissingReferencedTransaction(outpoint).into());
    }

    let signature = sign_channel_input(
        channel_tx,
        index,
        &redeem_script,
        provider_key,
        provider_pubkey,
        EcdsaSighashType::All,
    )?;

    let mut signed = channel_tx.clone();
    signed.input[index].script_sig =
        with_provider_signature(&channel_tx.input[index].script_sig, Some(signature))?;
    Ok(signed)
}

/// Derives the channel address both parties must agree on
///
/// # Errors
/// * `ScriptError::InvalidLockTime` - If `lock_time` is zero
pub fn generate_commitment_tx_address(
    provider_pubkey: CompressedPublicKey,
    consumer_pubkey: CompressedPublicKey,
    lock_time: LockTime,
    network: Network,
) -> Result<Address> {
    let redeem_script = RedeemScript::from_params(&RedeemScriptParams {
        provider_pubkey,
        consumer_pubkey,
        lock_time,
    })?;
    Ok(derive_address(&redeem_script, network))
}

/// Checks that an observed commitment transaction funds the channel
///
/// # Returns
/// `true` if some output pays the address derived from `redeem_script`, and
/// carries exactly `expected_amount` when one is given
pub fn verify_commitment_transaction(
    commitment_tx: &Transaction,
    redeem_script: &RedeemScript,
    network: Network,
    expected_amount: Option<u64>,
) -> bool {
    let script_pubkey = derive_address(redeem_script, network).script_pubkey();
    commitment_tx.output.iter().any(|output| {
        output.script_pubkey == script_pubkey
            && expected_amount.map_or(true, |amount| output.value.to_sat() == amount)
    })
}

/// Lowers the Provider's payout to raise the fee
///
/// The Consumer's SIGHASH_SINGLE signature covers only its change output, so
/// the payout at `payment_index` may shrink without invalidating it. Any
/// Provider signature already present is removed since it no longer matches;
/// sign again with [`sign_channel_transaction`] afterwards.
///
/// # Errors
/// * `BtxError::InvalidTransaction` - If `payment_index` is the Consumer's output or out of range
/// * `BtxError::InsufficientFunds` - If `extra_fee` exceeds the payout
pub fn reduce_payment_output(
    channel_tx: &Transaction,
    payment_index: usize,
    extra_fee: u64,
) -> Result<Transaction> {
    if payment_index == CHANGE_OUTPUT_INDEX {
        return Err(BtxError::InvalidTransaction(
            "the change output is covered by the consumer signature".to_string(),
        )
        .into());
    }
    let payout = channel_tx
        .output
        .get(payment_index)
        .ok_or_else(|| BtxError::InvalidTransaction(format!("no output {}", payment_index)))?
        .value
        .to_sat();
    if extra_fee > payout {
        return Err(BtxError::InsufficientFunds { available: payout, required: extra_fee }.into());
    }

    let mut bumped = channel_tx.clone();
    bumped.output[payment_index].value = Amount::from_sat(payout - extra_fee);
    for input in bumped.input.iter_mut() {
        if split_channel_script_sig(&input.script_sig).is_some() {
            input.script_sig = with_provider_signature(&input.script_sig, None)?;
        }
    }
    Ok(bumped)
}
