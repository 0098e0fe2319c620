//! ECDSA signing and signature checks for channel inputs
//!
//! Channel inputs are legacy P2SH spends, so their signatures commit to the
//! legacy sighash with the redeem script as script code. Commitment funding
//! inputs may also be P2WPKH, signed with the BIP143 sighash.

use bitcoin::ecdsa::Signature;
use bitcoin::hashes::Hash;
use bitcoin::script::PushBytesBuf;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, CompressedPublicKey, Script, Transaction};

use crate::errors::{BtxError, Result};

/// Signs a legacy (non-segwit) input
///
/// # Arguments
/// * `tx` - Transaction being signed
/// * `input_index` - Input the signature is for
/// * `script_code` - Script committed to by the signature (the redeem script for P2SH)
/// * `sighash_type` - Sighash flag appended to the signature
/// * `key` - Signing key
///
/// # Errors
/// * `BtxError::Sighash` - If `input_index` is out of range
pub fn sign_legacy_input(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    sighash_type: EcdsaSighashType,
    key: &SecretKey,
) -> Result<Signature> {
    let sighash = SighashCache::new(tx)
        .legacy_signature_hash(input_index, script_code, sighash_type.to_u32())
        .map_err(|e| BtxError::Sighash(e.to_string()))?;
    let message = Message::from_digest(sighash.to_byte_array());
    let secp = Secp256k1::signing_only();
    Ok(Signature { signature: secp.sign_ecdsa(&message, key), sighash_type })
}

/// Signs a P2WPKH input
///
/// # Errors
/// * `BtxError::Sighash` - If `input_index` is out of range
pub fn sign_p2wpkh_input(
    tx: &Transaction,
    input_index: usize,
    script_pubkey: &Script,
    value: Amount,
    key: &SecretKey,
) -> Result<Signature> {
    let sighash_type = EcdsaSighashType::All;
    let sighash = SighashCache::new(tx)
        .p2wpkh_signature_hash(input_index, script_pubkey, value, sighash_type)
        .map_err(|e| BtxError::Sighash(e.to_string()))?;
    let message = Message::from_digest(sighash.to_byte_array());
    let secp = Secp256k1::signing_only();
    Ok(Signature { signature: secp.sign_ecdsa(&message, key), sighash_type })
}

/// Serializes a signature as a scriptSig push
///
/// # Errors
/// * `BtxError::InvalidEncoding` - Never for well-formed DER signatures
pub fn signature_push(signature: &Signature) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(signature.to_vec())
        .map_err(|e| BtxError::InvalidEncoding(e.to_string()).into())
}

/// Parses a signature under the strict encoding rules relay policy applies
///
/// Requires strict DER, a defined sighash flag and a low S value.
///
/// # Returns
/// The parsed signature, or `None` if any rule is violated
pub fn parse_canonical_signature(bytes: &[u8]) -> Option<Signature> {
    let signature = Signature::from_slice(bytes).ok()?;
    let mut normalized = signature.signature;
    normalized.normalize_s();
    if normalized != signature.signature {
        return None;
    }
    Some(signature)
}

/// Checks a legacy input signature against `pubkey`
///
/// The signature must be canonical (see [`parse_canonical_signature`]) and
/// valid over the legacy sighash of `input_index` with `script_code`, using
/// the sighash flag carried by the signature itself.
///
/// # Errors
/// * `BtxError::Sighash` - If `input_index` is out of range
pub fn verify_legacy_signature(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    signature_bytes: &[u8],
    pubkey: &CompressedPublicKey,
) -> Result<bool> {
    let Some(signature) = parse_canonical_signature(signature_bytes) else {
        return Ok(false);
    };
    let sighash = SighashCache::new(tx)
        .legacy_signature_hash(input_index, script_code, signature.sighash_type.to_u32())
        .map_err(|e| BtxError::Sighash(e.to_string()))?;
    let message = Message::from_digest(sighash.to_byte_array());
    let secp = Secp256k1::verification_only();
    Ok(secp.verify_ecdsa(&message, &signature.signature, &pubkey.0).is_ok())
}
