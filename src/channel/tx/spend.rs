//! Channel input spending
//!
//! Both the channel (payment) and the refund transaction spend the same
//! commitment output through the redeem script. Their scriptSigs differ only
//! in which signatures are present, so both are produced from a single
//! [`SpendDescriptor`].

use bitcoin::ecdsa::Signature;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{self, Secp256k1, SecretKey};
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{CompressedPublicKey, Script, ScriptBuf, Sequence, Transaction, TxIn, Witness};

use crate::btx::redeem_script::RedeemScript;
use crate::btx::script::script_sig_pushes;
use crate::btx::sighash::{sign_legacy_input, signature_push};
use crate::btx::state::UnspentOutput;
use crate::errors::{BtxError, ChannelError, Result, ScriptError};

/// Signatures spending a commitment output through the redeem script
///
/// The resulting scriptSig is `[provider_signature] consumer_signature redeem_script`.
#[derive(Debug, Clone)]
pub struct SpendDescriptor<'a> {
    /// Channel redeem script, pushed last
    pub redeem_script: &'a RedeemScript,
    /// Signature checked first by the redeem script
    pub consumer_signature: Signature,
    /// Provider co-signature; absent for refunds and unsigned payments
    pub provider_signature: Option<Signature>,
}

impl SpendDescriptor<'_> {
    /// Serializes the descriptor into scriptSig bytes
    ///
    /// # Errors
    /// * `BtxError::InvalidEncoding` - If a push cannot be encoded
    pub fn script_sig(&self) -> Result<ScriptBuf> {
        let mut builder = Builder::new();
        if let Some(provider_signature) = &self.provider_signature {
            builder = builder.push_slice(signature_push(provider_signature)?);
        }
        Ok(builder
            .push_slice(signature_push(&self.consumer_signature)?)
            .push_slice(redeem_script_push(self.redeem_script)?)
            .into_script())
    }
}

/// The redeem script as a single data push
pub(crate) fn redeem_script_push(redeem_script: &RedeemScript) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(redeem_script.as_bytes().to_vec())
        .map_err(|e| BtxError::InvalidEncoding(e.to_string()).into())
}

/// Unsigned input spending the commitment output
pub(crate) fn channel_input(commitment_utxo: &UnspentOutput, sequence: Sequence) -> TxIn {
    TxIn {
        previous_output: commitment_utxo.outpoint(),
        script_sig: ScriptBuf::new(),
        sequence,
        witness: Witness::new(),
    }
}

/// Public key of a secret key
pub(crate) fn public_key_of(secret: &SecretKey) -> CompressedPublicKey {
    let secp = Secp256k1::signing_only();
    CompressedPublicKey(secp256k1::PublicKey::from_secret_key(&secp, secret))
}

/// Signs the channel input of `tx` after checking `key` belongs to `expected`
///
/// # Errors
/// * `ScriptError::InvalidKey` - If `key` is not the private key of `expected`
/// * `BtxError::Sighash` - If `input_index` is out of range
pub(crate) fn sign_channel_input(
    tx: &Transaction,
    input_index: usize,
    redeem_script: &RedeemScript,
    key: &SecretKey,
    expected: CompressedPublicKey,
    sighash_type: EcdsaSighashType,
) -> Result<Signature> {
    if public_key_of(key) != expected {
        return Err(ScriptError::InvalidKey(format!(
            "signing key does not match redeem script key {}",
            expected
        ))
        .into());
    }
    sign_legacy_input(tx, input_index, redeem_script.as_script(), sighash_type, key)
}

/// Splits a channel scriptSig into its signature pushes and redeem script
///
/// # Returns
/// `(signatures, redeem_script)` where `signatures` holds every push before
/// the trailing redeem script, or `None` if the scriptSig is not push-only or
/// its last push is not a channel redeem script
pub fn split_channel_script_sig(script_sig: &Script) -> Option<(Vec<Vec<u8>>, RedeemScript)> {
    let mut pushes = script_sig_pushes(script_sig)?;
    let last = pushes.pop()?;
    let redeem_script = RedeemScript::parse(Script::from_bytes(&last)).ok()?;
    Some((pushes, redeem_script))
}

/// Sets or clears the Provider signature of a channel scriptSig
///
/// The Consumer signature and redeem script are kept; any signature already
/// in the Provider slot is replaced.
///
/// # Errors
/// * `ChannelError::CommitmentInputNotFound` - If the scriptSig is not a channel spend
/// * `BtxError::InvalidEncoding` - If the Consumer signature cannot be decoded
pub(crate) fn with_provider_signature(
    script_sig: &Script,
    provider_signature: Option<Signature>,
) -> Result<ScriptBuf> {
    let (signatures, redeem_script) =
        split_channel_script_sig(script_sig).ok_or(ChannelError::CommitmentInputNotFound)?;
    let consumer_bytes = signatures.last().ok_or(ChannelError::CommitmentInputNotFound)?;
    let consumer_signature = Signature::from_slice(consumer_bytes)
        .map_err(|e| BtxError::InvalidEncoding(format!("consumer signature: {}", e)))?;

    SpendDescriptor { redeem_script: &redeem_script, consumer_signature, provider_signature }
        .script_sig()
}
