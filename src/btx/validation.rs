//! Bitcoin transaction validation
//!
//! Context-free sanity checks, value accounting against referenced previous
//! transactions, and script execution through libbitcoinconsensus.

use std::collections::HashSet;

use bitcoin::consensus::encode::serialize;
use bitcoin::consensus::validation::TxVerifyError;
use bitcoin::{Amount, OutPoint, Transaction, TxOut};

use crate::btx::state::find_spent_output;
use crate::errors::{BtxError, Result};
use crate::types::MAX_STANDARD_TX_SIZE;

// libbitcoinconsensus flag values; `bitcoin` does not re-export them.
const VERIFY_P2SH: u32 = 1;
const VERIFY_DERSIG: u32 = 1 << 2;
const VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;

/// Script verification flags applied to channel inputs
///
/// libbitcoinconsensus only accepts consensus flags; signature encoding
/// policy (low S, strict encoding, push-only scriptSig) is checked separately
/// by the verifier.
pub const CHANNEL_SCRIPT_FLAGS: u32 = VERIFY_P2SH | VERIFY_DERSIG | VERIFY_CHECKLOCKTIMEVERIFY;

/// Validates that a transaction is internally consistent
///
/// The context-free subset of Bitcoin Core's `CheckTransaction`:
/// - at least one input and one output
/// - every output value and the output total within the money range
/// - no input spends the same outpoint twice
/// - serialized size within the standard limit
///
/// # Arguments
/// * `tx` - The transaction to validate
///
/// # Errors
/// * `BtxError::InvalidTransaction` - If a structural rule is violated
/// * `BtxError::TransactionSizeExceeded` - If the transaction is too large
pub fn check_transaction(tx: &Transaction) -> Result<()> {
    if tx.input.is_empty() {
        return Err(BtxError::InvalidTransaction("no inputs".to_string()).into());
    }
    if tx.output.is_empty() {
        return Err(BtxError::InvalidTransaction("no outputs".to_string()).into());
    }

    let mut total = Amount::ZERO;
    for (idx, output) in tx.output.iter().enumerate() {
        if output.value > Amount::MAX_MONEY {
            return Err(BtxError::InvalidTransaction(format!(
                "output {} value {} exceeds the money range",
                idx, output.value
            ))
            .into());
        }
        total = total
            .checked_add(output.value)
            .filter(|sum| *sum <= Amount::MAX_MONEY)
            .ok_or_else(|| {
                BtxError::InvalidTransaction("output total exceeds the money range".to_string())
            })?;
    }

    let mut seen = HashSet::with_capacity(tx.input.len());
    for input in &tx.input {
        if !seen.insert(input.previous_output) {
            return Err(BtxError::InvalidTransaction(format!(
                "duplicate input {}",
                input.previous_output
            ))
            .into());
        }
    }

    let tx_size = serialize(tx).len();
    if tx_size > MAX_STANDARD_TX_SIZE {
        return Err(BtxError::TransactionSizeExceeded(tx_size, MAX_STANDARD_TX_SIZE).into());
    }

    Ok(())
}

/// Sum of the values of every output
pub fn total_output_value(tx: &Transaction) -> u64 {
    tx.output.iter().map(|output| output.value.to_sat()).sum()
}

/// Sum of the values spent by every input, looked up in `referenced_txs`
///
/// # Errors
/// * `BtxError::MissingReferencedTransaction` - If an input's previous output is not found
pub fn total_input_value(tx: &Transaction, referenced_txs: &[Transaction]) -> Result<u64> {
    tx.input.iter().try_fold(0u64, |acc, input| {
        let spent = spent_output(referenced_txs, &input.previous_output)?;
        Ok(acc.saturating_add(spent.value.to_sat()))
    })
}

/// Fee paid by a transaction: inputs minus outputs
///
/// Negative when the outputs claim more than the inputs provide.
///
/// # Errors
/// * `BtxError::MissingReferencedTransaction` - If an input's previous output is not found
pub fn transaction_fee(tx: &Transaction, referenced_txs: &[Transaction]) -> Result<i128> {
    let inputs = total_input_value(tx, referenced_txs)?;
    Ok(i128::from(inputs) - i128::from(total_output_value(tx)))
}

/// Looks up the output spent by `outpoint`
///
/// # Errors
/// * `BtxError::MissingReferencedTransaction` - If the output is not found
pub fn spent_output<'a>(referenced_txs: &'a [Transaction], outpoint: &OutPoint) -> Result<&'a TxOut> {
    find_spent_output(referenced_txs, outpoint)
        .ok_or_else(|| BtxError::MissingReferencedTransaction(*outpoint).into())
}

/// Executes the script of a single input under [`CHANNEL_SCRIPT_FLAGS`]
///
/// # Arguments
/// * `tx` - The spending transaction
/// * `input_index` - Input to verify
/// * `spent` - The output the input spends
///
/// # Errors
/// * `BtxError::ScriptExecutionFailed` - If script evaluation fails
pub fn verify_input_script(tx: &Transaction, input_index: usize, spent: &TxOut) -> Result<()> {
    let serialized = serialize(tx);
    spent
        .script_pubkey
        .verify_with_flags(input_index, spent.value, &serialized, CHANNEL_SCRIPT_FLAGS)
        .map_err(|e| {
            BtxError::ScriptExecutionFailed(format!("input {}: {:?}", input_index, e)).into()
        })
}

/// Validates a transaction using Bitcoin Core consensus rules
///
/// Runs [`check_transaction`] and then full script verification of every
/// input against the outputs found in `referenced_txs`.
///
/// # Errors
/// * `BtxError::MissingReferencedTransaction` - If a spent output is unknown
/// * `BtxError::ScriptExecutionFailed` - If any input's script fails
pub fn verify_bitcoin_transaction(tx: &Transaction, referenced_txs: &[Transaction]) -> Result<()> {
    check_transaction(tx)?;

    bitcoin::consensus::verify_transaction(tx, |outpoint| {
        find_spent_output(referenced_txs, outpoint).cloned()
    })
    .map_err(|e| {
        crate::Error::Btx(match e {
            TxVerifyError::UnknownSpentOutput(outpoint) =>
                BtxError::MissingReferencedTransaction(outpoint),
            TxVerifyError::ScriptVerification(err) =>
                BtxError::ScriptExecutionFailed(format!("Script verification failed: {:?}", err)),
            other => BtxError::InvalidTransaction(other.to_string()),
        })
    })
}
