//! Bitcoin script utilities
//!
//! This module provides script type detection for funding outputs and
//! helpers for inspecting push-only scriptSigs.

use bitcoin::script::Instruction;
use bitcoin::{CompressedPublicKey, Script, ScriptBuf};

/// Script type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    /// Pay-to-Public-Key-Hash (P2PKH)
    P2PKH,
    /// Pay-to-Script-Hash (P2SH)
    P2SH,
    /// Pay-to-Witness-Public-Key-Hash (P2WPKH)
    P2WPKH,
    /// Pay-to-Witness-Script-Hash (P2WSH)
    P2WSH,
    /// Pay-to-Taproot (P2TR)
    P2TR,
    /// Unknown or unsupported script type
    Unknown,
}

/// Detects the script type from a scriptPubkey
///
/// # Arguments
/// * `script` - The script to analyze
///
/// # Returns
/// The detected script type
pub fn detect_script_type(script: &Script) -> ScriptType {
    let bytes = script.as_bytes();
    if bytes.is_empty() {
        return ScriptType::Unknown;
    }

    // P2PKH: OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
    if bytes.len() == 25
        && bytes[0] == 0x76 // OP_DUP
        && bytes[1] == 0xa9 // OP_HASH160
        && bytes[2] == 0x14 // Push 20 bytes
        && bytes[23] == 0x88 // OP_EQUALVERIFY
        && bytes[24] == 0xac
    // OP_CHECKSIG
    {
        return ScriptType::P2PKH;
    }

    // P2SH: OP_HASH160 <20 bytes> OP_EQUAL
    if bytes.len() == 23
        && bytes[0] == 0xa9 // OP_HASH160
        && bytes[1] == 0x14 // Push 20 bytes
        && bytes[22] == 0x87
    // OP_EQUAL
    {
        return ScriptType::P2SH;
    }

    // P2WPKH: OP_0 <20 bytes>
    if bytes.len() == 22 && bytes[0] == 0x00 && bytes[1] == 0x14 {
        return ScriptType::P2WPKH;
    }

    // P2WSH: OP_0 <32 bytes>
    if bytes.len() == 34 && bytes[0] == 0x00 && bytes[1] == 0x20 {
        return ScriptType::P2WSH;
    }

    // P2TR: OP_1 <32 bytes>
    if bytes.len() == 34 && bytes[0] == 0x51 && bytes[1] == 0x20 {
        return ScriptType::P2TR;
    }

    ScriptType::Unknown
}

/// Returns true when `script_pubkey` is controlled by `pubkey` alone
///
/// Only the key-hash forms the commitment builder can sign for are matched:
/// P2PKH and P2WPKH.
pub fn is_locked_to_key(script_pubkey: &Script, pubkey: &CompressedPublicKey) -> bool {
    match detect_script_type(script_pubkey) {
        ScriptType::P2PKH => *script_pubkey == *ScriptBuf::new_p2pkh(&pubkey.pubkey_hash()),
        ScriptType::P2WPKH => *script_pubkey == *ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash()),
        _ => false,
    }
}

/// Splits a push-only scriptSig into its data pushes
///
/// # Returns
/// The pushed byte strings in script order, or `None` if the script contains
/// a non-push opcode or cannot be decoded
pub fn script_sig_pushes(script_sig: &Script) -> Option<Vec<Vec<u8>>> {
    let mut pushes = Vec::new();
    for instruction in script_sig.instructions() {
        match instruction.ok()? {
            Instruction::PushBytes(bytes) => pushes.push(bytes.as_bytes().to_vec()),
            Instruction::Op(_) => return None,
        }
    }
    Some(pushes)
}
