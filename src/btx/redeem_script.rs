//! Channel redeem script codec
//!
//! The channel output is locked by a single P2SH redeem script:
//!
//! ```text
//! <consumer_pubkey> OP_CHECKSIG
//! OP_IF
//!     OP_DEPTH
//!     OP_IF
//!         <provider_pubkey> OP_CHECKSIG
//!     OP_ELSE
//!         <lock_time> OP_CHECKLOCKTIMEVERIFY
//!     OP_ENDIF
//! OP_ENDIF
//! ```
//!
//! The Consumer signature is always required. A Provider signature below it
//! spends immediately; without one the spending transaction's nLockTime must
//! reach the embedded lock time.
//!
//! Encoding is canonical (minimal pushes, minimal script number for the lock
//! time), so a script is byte-equal to another exactly when their parameters
//! are equal.

use bitcoin::absolute::LockTime;
use bitcoin::hex::FromHex;
use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CLTV, OP_DEPTH, OP_ELSE, OP_ENDIF, OP_IF, OP_PUSHNUM_1, OP_PUSHNUM_16,
};
use bitcoin::script::{Builder, Instruction};
use bitcoin::{Address, CompressedPublicKey, Network, PublicKey, Script, ScriptBuf, ScriptHash};

use crate::btx::timelock::validate_channel_lock_time;
use crate::config::ChannelConfig;
use crate::errors::{Result, ScriptError};
use crate::types::MAX_LOCKTIME_SCRIPTNUM_LEN;

/// Number of instructions in the channel template
const TEMPLATE_LEN: usize = 12;

/// Parameters embedded in a channel redeem script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RedeemScriptParams {
    /// Key that may co-sign to spend before the lock time
    pub provider_pubkey: CompressedPublicKey,
    /// Key whose signature every spend requires
    pub consumer_pubkey: CompressedPublicKey,
    /// Absolute lock time after which the Consumer may spend alone
    pub lock_time: LockTime,
}

/// A validated channel redeem script
///
/// Holds both the canonical script bytes and the parameters they encode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedeemScript {
    script: ScriptBuf,
    params: RedeemScriptParams,
}

impl RedeemScript {
    /// Builds a redeem script for a new channel
    ///
    /// Applies the expiry policy: a time-based lock time must lie at least
    /// `config.min_expiry_secs` after `now`.
    ///
    /// # Arguments
    /// * `params` - Keys and lock time to embed
    /// * `config` - Channel policy
    /// * `now` - Current time as UNIX seconds
    ///
    /// # Errors
    /// * `ScriptError::InvalidLockTime` - If the lock time is zero or too close to `now`
    pub fn build(params: &RedeemScriptParams, config: &ChannelConfig, now: u32) -> Result<Self> {
        validate_channel_lock_time(params.lock_time, now, config.min_expiry_secs)?;
        Self::from_params(params)
    }

    /// Encodes a redeem script without consulting the wall clock
    ///
    /// Used to reconstruct a script the counterparty already committed to.
    ///
    /// # Errors
    /// * `ScriptError::InvalidLockTime` - If the lock time is zero
    pub fn from_params(params: &RedeemScriptParams) -> Result<Self> {
        if params.lock_time.to_consensus_u32() == 0 {
            return Err(ScriptError::InvalidLockTime {
                lock_time: 0,
                reason: "lock time must be non-zero".to_string(),
            }
            .into());
        }
        Ok(Self { script: encode(params), params: *params })
    }

    /// Parses script bytes that must match the channel template exactly
    ///
    /// # Errors
    /// * `ScriptError::MalformedRedeemScript` - On any deviation from the template
    pub fn parse(script: &Script) -> Result<Self> {
        let params = parse_redeem_script(script)?;
        Ok(Self { script: script.to_owned(), params })
    }

    /// Parses a hex-encoded redeem script
    ///
    /// # Errors
    /// * `ScriptError::MalformedRedeemScript` - If the hex is invalid or the script malformed
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = Vec::<u8>::from_hex(hex)
            .map_err(|e| ScriptError::MalformedRedeemScript(format!("invalid hex: {}", e)))?;
        Self::parse(Script::from_bytes(&bytes))
    }

    /// Embedded parameters
    pub fn params(&self) -> &RedeemScriptParams { &self.params }

    /// Provider public key
    pub fn provider_pubkey(&self) -> CompressedPublicKey { self.params.provider_pubkey }

    /// Consumer public key
    pub fn consumer_pubkey(&self) -> CompressedPublicKey { self.params.consumer_pubkey }

    /// Lock time after which the refund path opens
    pub fn lock_time(&self) -> LockTime { self.params.lock_time }

    /// Raw script
    pub fn as_script(&self) -> &Script { &self.script }

    /// Raw script bytes
    pub fn as_bytes(&self) -> &[u8] { self.script.as_bytes() }

    /// HASH160 of the script, which also identifies the channel
    pub fn script_hash(&self) -> ScriptHash { self.script.script_hash() }

    /// P2SH locking script paying to this redeem script
    pub fn script_pubkey(&self) -> ScriptBuf { ScriptBuf::new_p2sh(&self.script_hash()) }

    /// P2SH address of this redeem script on `network`
    pub fn address(&self, network: Network) -> Address {
        Address::p2sh_from_hash(self.script_hash(), network)
    }
}

/// Encodes parameters into the canonical template bytes
fn encode(params: &RedeemScriptParams) -> ScriptBuf {
    Builder::new()
        .push_key(&PublicKey::from(params.consumer_pubkey))
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_IF)
        .push_opcode(OP_DEPTH)
        .push_opcode(OP_IF)
        .push_key(&PublicKey::from(params.provider_pubkey))
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_lock_time(params.lock_time)
        .push_opcode(OP_CLTV)
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_ENDIF)
        .into_script()
}

/// Parses a channel redeem script into its parameters
///
/// The inverse of encoding: after extracting keys and lock time the script is
/// re-encoded and compared byte for byte, so anything accepted here is the
/// unique canonical encoding of the returned parameters.
///
/// # Errors
/// * `ScriptError::MalformedRedeemScript` - On any deviation from the template
pub fn parse_redeem_script(script: &Script) -> Result<RedeemScriptParams> {
    let instructions = script
        .instructions_minimal()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| malformed(format!("undecodable script: {}", e)))?;

    if instructions.len() != TEMPLATE_LEN {
        return Err(malformed(format!(
            "expected {} instructions, found {}",
            TEMPLATE_LEN,
            instructions.len()
        )));
    }

    let consumer_pubkey = expect_key(&instructions[0], "consumer")?;
    expect_op(&instructions[1], OP_CHECKSIG)?;
    expect_op(&instructions[2], OP_IF)?;
    expect_op(&instructions[3], OP_DEPTH)?;
    expect_op(&instructions[4], OP_IF)?;
    let provider_pubkey = expect_key(&instructions[5], "provider")?;
    expect_op(&instructions[6], OP_CHECKSIG)?;
    expect_op(&instructions[7], OP_ELSE)?;
    let lock_time = expect_lock_time(&instructions[8])?;
    expect_op(&instructions[9], OP_CLTV)?;
    expect_op(&instructions[10], OP_ENDIF)?;
    expect_op(&instructions[11], OP_ENDIF)?;

    let params = RedeemScriptParams { provider_pubkey, consumer_pubkey, lock_time };
    if encode(&params).as_bytes() != script.as_bytes() {
        return Err(malformed("script is not canonically encoded".to_string()));
    }

    Ok(params)
}

/// Parses a compressed public key from raw bytes
///
/// # Errors
/// * `ScriptError::InvalidKey` - If the bytes are not a valid compressed key
pub fn public_key_from_slice(bytes: &[u8]) -> Result<CompressedPublicKey> {
    CompressedPublicKey::from_slice(bytes).map_err(|e| ScriptError::InvalidKey(e.to_string()).into())
}

/// Parses a compressed public key from hex
///
/// # Errors
/// * `ScriptError::InvalidKey` - If the hex or the key is invalid
pub fn public_key_from_hex(hex: &str) -> Result<CompressedPublicKey> {
    let bytes = Vec::<u8>::from_hex(hex).map_err(|e| ScriptError::InvalidKey(e.to_string()))?;
    public_key_from_slice(&bytes)
}

fn malformed(reason: String) -> crate::Error { ScriptError::MalformedRedeemScript(reason).into() }

fn expect_op(instruction: &Instruction<'_>, expected: bitcoin::Opcode) -> Result<()> {
    match instruction {
        Instruction::Op(op) if *op == expected => Ok(()),
        other => Err(malformed(format!("expected {:?}, found {:?}", expected, other))),
    }
}

fn expect_key(instruction: &Instruction<'_>, role: &str) -> Result<CompressedPublicKey> {
    match instruction {
        Instruction::PushBytes(bytes) if bytes.len() == 33 => CompressedPublicKey::from_slice(
            bytes.as_bytes(),
        )
        .map_err(|e| malformed(format!("invalid {} key: {}", role, e))),
        other => Err(malformed(format!("expected 33-byte {} key push, found {:?}", role, other))),
    }
}

fn expect_lock_time(instruction: &Instruction<'_>) -> Result<LockTime> {
    let value = match instruction {
        Instruction::Op(op)
            if op.to_u8() >= OP_PUSHNUM_1.to_u8() && op.to_u8() <= OP_PUSHNUM_16.to_u8() =>
            u32::from(op.to_u8() - OP_PUSHNUM_1.to_u8() + 1),
        Instruction::PushBytes(bytes) => decode_lock_time_number(bytes.as_bytes())?,
        other => return Err(malformed(format!("expected lock time push, found {:?}", other))),
    };

    if value == 0 {
        return Err(malformed("lock time must be non-zero".to_string()));
    }
    Ok(LockTime::from_consensus(value))
}

/// Decodes a minimally encoded, non-negative script number of up to 5 bytes
///
/// CLTV reads its operand with a 5-byte limit, one more than ordinary
/// arithmetic opcodes, so lock times up to `u32::MAX` fit.
fn decode_lock_time_number(bytes: &[u8]) -> Result<u32> {
    if bytes.is_empty() || bytes.len() > MAX_LOCKTIME_SCRIPTNUM_LEN {
        return Err(malformed(format!("lock time push of {} bytes", bytes.len())));
    }

    let last = bytes[bytes.len() - 1];
    if last & 0x7f == 0 && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
        return Err(malformed("lock time is not minimally encoded".to_string()));
    }
    if last & 0x80 != 0 {
        return Err(malformed("lock time is negative".to_string()));
    }

    let value = bytes.iter().rev().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    u32::try_from(value).map_err(|_| malformed(format!("lock time {} out of range", value)))
}

#[cfg(test)]
mod tests {
    use bitcoin::hex::DisplayHex;
    use bitcoin::opcodes::all::OP_NOP;
    use rand::Rng;

    use super::*;
    use crate::channel::test_utils::*;
    use crate::Error;

    const G_HEX: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const TWO_G_HEX: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";

    fn expect_malformed(result: Result<RedeemScriptParams>) {
        match result {
            Err(Error::Script(ScriptError::MalformedRedeemScript(_))) => {}
            other => panic!("Expected MalformedRedeemScript, got {:?}", other),
        }
    }

    #[test]
    fn test_known_vector() {
        // Consumer secret 1, provider secret 2, lock time 2040-01-01T00:00:00Z
        let params = RedeemScriptParams {
            provider_pubkey: public_key_from_hex(TWO_G_HEX).expect("valid key"),
            consumer_pubkey: public_key_from_hex(G_HEX).expect("valid key"),
            lock_time: LockTime::from_consensus(2_208_988_800),
        };
        let script = RedeemScript::from_params(&params).expect("valid params");

        let expected = format!("21{}ac6374", G_HEX)
            + &format!("6321{}ac67", TWO_G_HEX)
            + "05807eaa8300b16868";
        assert_eq!(script.as_bytes().to_lower_hex_string(), expected);
        assert_eq!(script.as_bytes().len(), 35 + 3 + 35 + 1 + 6 + 3);
    }

    #[test]
    fn test_round_trip() {
        let keys = test_keys();
        for lock_time in [1u32, 16, 17, 127, 128, 255, 32_768, 800_000, 600_000_000, u32::MAX] {
            let params = RedeemScriptParams {
                provider_pubkey: keys.provider_pubkey,
                consumer_pubkey: keys.consumer_pubkey,
                lock_time: LockTime::from_consensus(lock_time),
            };
            let script = RedeemScript::from_params(&params).expect("valid params");
            let parsed = parse_redeem_script(script.as_script()).expect("canonical script parses");
            assert_eq!(parsed, params, "round trip failed for lock time {}", lock_time);
        }
    }

    #[test]
    fn test_random_round_trip() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let provider = deterministic_secret(rng.gen_range(1..=u8::MAX));
            let consumer = deterministic_secret(rng.gen_range(1..=u8::MAX));
            let params = RedeemScriptParams {
                provider_pubkey: pubkey_of(&provider),
                consumer_pubkey: pubkey_of(&consumer),
                lock_time: LockTime::from_consensus(rng.gen_range(1..=u32::MAX)),
            };
            let script = RedeemScript::from_params(&params).expect("valid params");
            assert_eq!(RedeemScript::parse(script.as_script()).expect("parses"), script);
        }
    }

    #[test]
    fn test_build_applies_expiry_policy() {
        let keys = test_keys();
        let config = ChannelConfig::default();
        let params = RedeemScriptParams {
            provider_pubkey: keys.provider_pubkey,
            consumer_pubkey: keys.consumer_pubkey,
            lock_time: LockTime::from_consensus(TEST_NOW + 3600),
        };
        match RedeemScript::build(&params, &config, TEST_NOW) {
            Err(Error::Script(ScriptError::InvalidLockTime { .. })) => {}
            other => panic!("Expected InvalidLockTime, got {:?}", other),
        }

        let params = RedeemScriptParams { lock_time: test_lock_time(), ..params };
        RedeemScript::build(&params, &config, TEST_NOW).expect("lock time a day ahead is valid");
    }

    #[test]
    fn test_zero_lock_time_rejected() {
        let keys = test_keys();
        let params = RedeemScriptParams {
            provider_pubkey: keys.provider_pubkey,
            consumer_pubkey: keys.consumer_pubkey,
            lock_time: LockTime::ZERO,
        };
        assert!(RedeemScript::from_params(&params).is_err());
    }

    #[test]
    fn test_invalid_key_hex() {
        match public_key_from_hex("04deadbeef") {
            Err(Error::Script(ScriptError::InvalidKey(_))) => {}
            other => panic!("Expected InvalidKey, got {:?}", other),
        }
        assert!(public_key_from_hex("not hex").is_err());
    }

    #[test]
    fn test_parse_rejects_truncated_script() {
        let script = test_redeem_script();
        let bytes = script.as_bytes();
        expect_malformed(parse_redeem_script(Script::from_bytes(&bytes[..bytes.len() - 1])));
    }

    #[test]
    fn test_parse_rejects_trailing_opcode() {
        let script = test_redeem_script();
        let mut bytes = script.as_bytes().to_vec();
        bytes.push(OP_NOP.to_u8());
        expect_malformed(parse_redeem_script(Script::from_bytes(&bytes)));
    }

    #[test]
    fn test_parse_rejects_swapped_opcode() {
        let script = test_redeem_script();
        let mut bytes = script.as_bytes().to_vec();
        // OP_DEPTH sits right after the consumer key, OP_CHECKSIG and OP_IF
        assert_eq!(bytes[36], OP_DEPTH.to_u8());
        bytes[36] = OP_NOP.to_u8();
        expect_malformed(parse_redeem_script(Script::from_bytes(&bytes)));
    }

    #[test]
    fn test_parse_rejects_non_minimal_lock_time() {
        let keys = test_keys();
        // 0x00000080 padded to five bytes is a valid number but not minimal
        let script = Builder::new()
            .push_key(&PublicKey::from(keys.consumer_pubkey))
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_IF)
            .push_opcode(OP_DEPTH)
            .push_opcode(OP_IF)
            .push_key(&PublicKey::from(keys.provider_pubkey))
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ELSE)
            .push_slice([0x80u8, 0x00, 0x00, 0x00, 0x00])
            .push_opcode(OP_CLTV)
            .push_opcode(OP_ENDIF)
            .push_opcode(OP_ENDIF)
            .into_script();
        expect_malformed(parse_redeem_script(&script));
    }

    #[test]
    fn test_parse_rejects_negative_lock_time() {
        assert!(decode_lock_time_number(&[0x81]).is_err());
        assert!(decode_lock_time_number(&[0x00]).is_err());
        assert!(decode_lock_time_number(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x01]).is_err());
        assert_eq!(decode_lock_time_number(&[0x80, 0x00]).expect("minimal"), 128);
        assert_eq!(
            decode_lock_time_number(&[0xff, 0xff, 0xff, 0xff, 0x00]).expect("minimal"),
            u32::MAX
        );
    }

    #[test]
    fn test_parse_rejects_invalid_key() {
        let script = test_redeem_script();
        let mut bytes = script.as_bytes().to_vec();
        // Prefix byte 0x05 is not a valid compressed key prefix
        bytes[1] = 0x05;
        expect_malformed(parse_redeem_script(Script::from_bytes(&bytes)));
    }

    #[test]
    fn test_parse_rejects_other_scripts() {
        expect_malformed(parse_redeem_script(Script::new()));
        let p2sh = test_redeem_script().script_pubkey();
        expect_malformed(parse_redeem_script(&p2sh));
    }

    #[test]
    fn test_from_hex() {
        let script = test_redeem_script();
        let hex = script.as_bytes().to_lower_hex_string();
        let parsed = RedeemScript::from_hex(&hex).expect("hex round trip");
        assert_eq!(parsed, script);
        assert!(RedeemScript::from_hex("zz").is_err());
    }

    #[test]
    fn test_distinct_params_distinct_scripts() {
        let keys = test_keys();
        let a = test_redeem_script();
        let swapped = RedeemScript::from_params(&RedeemScriptParams {
            provider_pubkey: keys.consumer_pubkey,
            consumer_pubkey: keys.provider_pubkey,
            lock_time: a.lock_time(),
        })
        .expect("valid params");
        assert_ne!(a, swapped);
        assert_ne!(a.script_hash(), swapped.script_hash());
    }
}
