//! Commitment transaction builder
//!
//! The commitment transaction moves Consumer funds into the channel's P2SH
//! output. It is the only on-chain transaction the Consumer broadcasts when
//! opening a channel.

use bitcoin::script::Builder;
use bitcoin::secp256k1::{self, Secp256k1, SecretKey};
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{
    Address, Amount, CompressedPublicKey, Network, PublicKey, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Witness,
};

use crate::btx::redeem_script::RedeemScript;
use crate::btx::script::{detect_script_type, is_locked_to_key, ScriptType};
use crate::btx::sighash::{sign_legacy_input, sign_p2wpkh_input, signature_push};
use crate::btx::state::UnspentOutput;
use crate::errors::{BtxError, ChannelError, Result};
use crate::types::TX_VERSION;

/// Parameters for [`build_commitment_transaction`]
#[derive(Debug, Clone)]
pub struct CommitmentTxParams {
    /// Consumer-owned output being spent
    pub prev_utxo: UnspentOutput,
    /// Key controlling `prev_utxo`
    pub funding_key: SecretKey,
    /// Value to lock in the channel
    pub amount: u64,
    /// Channel redeem script
    pub redeem_script: RedeemScript,
    /// Where leftover funds return to
    pub change_address: Address,
    /// Transaction fee in satoshis
    pub fee: u64,
    /// Network the channel address is derived for
    pub network: Network,
}

/// Builds and signs a commitment transaction
///
/// Output 0 pays `amount` to the channel's P2SH address. Output 1 returns
/// `prev_utxo.amount - amount - fee` to `change_address` and is omitted when
/// that change is zero.
///
/// # Arguments
/// * `params` - Funding output, keys, amounts and addresses
///
/// # Returns
/// A fully signed transaction spending `prev_utxo`
///
/// # Errors
/// * `ChannelError::MissingParameter` - If `amount` is zero
/// * `BtxError::InsufficientFunds` - If `amount + fee` exceeds the funding value
/// * `BtxError::UnsupportedFundingScript` - If the funding output is not P2PKH or P2WPKH
/// * `BtxError::FundingKeyMismatch` - If `funding_key` does not control the funding output
pub fn build_commitment_transaction(params: &CommitmentTxParams) -> Result<Transaction> {
    if params.amount == 0 {
        return Err(ChannelError::MissingParameter("amount").into());
    }

    let available = params.prev_utxo.amount;
    let required = params.amount.saturating_add(params.fee);
    if required > available {
        return Err(BtxError::InsufficientFunds { available, required }.into());
    }
    let change = available - required;

    let script_type = detect_script_type(&params.prev_utxo.locking_script);
    if !matches!(script_type, ScriptType::P2PKH | ScriptType::P2WPKH) {
        return Err(BtxError::UnsupportedFundingScript(format!("{:?}", script_type)).into());
    }

    let secp = Secp256k1::signing_only();
    let funding_pubkey = CompressedPublicKey(secp256k1::PublicKey::from_secret_key(
        &secp,
        &params.funding_key,
    ));
    if !is_locked_to_key(&params.prev_utxo.locking_script, &funding_pubkey) {
        return Err(BtxError::FundingKeyMismatch(params.prev_utxo.outpoint()).into());
    }

    let input = TxIn {
        previous_output: params.prev_utxo.outpoint(),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    };

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(params.amount),
        script_pubkey: params.redeem_script.script_pubkey(),
    }];
    if change > 0 {
        outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: params.change_address.script_pubkey(),
        });
    }

    let mut transaction = Transaction {
        version: TX_VERSION,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: vec![input],
        output: outputs,
    };

    match script_type {
        ScriptType::P2WPKH => {
            let signature = sign_p2wpkh_input(
                &transaction,
                0,
                &params.prev_utxo.locking_script,
                Amount::from_sat(available),
                &params.funding_key,
            )?;
            transaction.input[0].witness = Witness::p2wpkh(&signature, &funding_pubkey.0);
        }
        _ => {
            let signature = sign_legacy_input(
                &transaction,
                0,
                &params.prev_utxo.locking_script,
                EcdsaSighashType::All,
                &params.funding_key,
            )?;
            transaction.input[0].script_sig = Builder::new()
                .push_slice(signature_push(&signature)?)
                .push_key(&PublicKey::from(funding_pubkey))
                .into_script();
        }
    }

    tracing::debug!(
        txid = %transaction.compute_txid(),
        address = %params.redeem_script.address(params.network),
        amount = params.amount,
        change,
        "built commitment transaction"
    );

    Ok(transaction)
}

/// Locates the output of `commitment_tx` paying the redeem script's P2SH
///
/// # Returns
/// Index of the first matching output, or `None`
pub fn find_commitment_output(
    redeem_script: &RedeemScript,
    commitment_tx: &Transaction,
) -> Option<u32> {
    let script_pubkey = redeem_script.script_pubkey();
    commitment_tx
        .output
        .iter()
        .position(|output| output.script_pubkey == script_pubkey)
        .and_then(|idx| u32::try_from(idx).ok())
}

/// Returns the channel output of `commitment_tx` as a spendable UTXO
///
/// # Errors
/// * `BtxError::CommitmentOutputNotFound` - If no output pays the redeem script
pub fn commitment_utxo(
    redeem_script: &RedeemScript,
    commitment_tx: &Transaction,
) -> Result<UnspentOutput> {
    find_commitment_output(redeem_script, commitment_tx)
        .and_then(|idx| UnspentOutput::from_transaction(commitment_tx, idx))
        .ok_or_else(|| BtxError::CommitmentOutputNotFound(commitment_tx.compute_txid()).into())
}
