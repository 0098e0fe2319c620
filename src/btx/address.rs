//! P2SH address derivation for channel redeem scripts
//!
//! Both parties derive the channel address independently from the redeem
//! script; it never travels over the wire as the source of truth.

use std::str::FromStr;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, ScriptBuf, ScriptHash};

use crate::btx::redeem_script::RedeemScript;
use crate::errors::{Result, ScriptError};

/// Derives the P2SH address of a channel redeem script
///
/// `base58check(p2sh_version(network) || HASH160(redeem_script))`.
///
/// # Arguments
/// * `redeem_script` - The channel redeem script
/// * `network` - Network whose P2SH version byte is used
///
/// # Example
///
/// ```rust
/// use bitcoin::absolute::LockTime;
/// use bitcoin::Network;
/// use cltv_channel::btx::address::derive_address;
/// use cltv_channel::btx::redeem_script::{public_key_from_hex, RedeemScript, RedeemScriptParams};
///
/// let params = RedeemScriptParams {
///     provider_pubkey: public_key_from_hex(
///         "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5",
///     )?,
///     consumer_pubkey: public_key_from_hex(
///         "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
///     )?,
///     lock_time: LockTime::from_consensus(2_208_988_800),
/// };
/// let script = RedeemScript::from_params(&params)?;
/// let address = derive_address(&script, Network::Bitcoin);
/// assert!(address.to_string().starts_with('3'));
/// # Ok::<(), cltv_channel::Error>(())
/// ```
pub fn derive_address(redeem_script: &RedeemScript, network: Network) -> Address {
    Address::p2sh_from_hash(script_hash(redeem_script), network)
}

/// HASH160 of the redeem script
pub fn script_hash(redeem_script: &RedeemScript) -> ScriptHash { redeem_script.script_hash() }

/// P2SH locking script for the redeem script
pub fn p2sh_script_pubkey(redeem_script: &RedeemScript) -> ScriptBuf {
    ScriptBuf::new_p2sh(&script_hash(redeem_script))
}

/// Parses an address string and checks it belongs to `network`
///
/// # Errors
/// * `ScriptError::AddressDerivationFailed` - If the string is not an address for `network`
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    let unchecked = Address::<NetworkUnchecked>::from_str(address)
        .map_err(|e| ScriptError::AddressDerivationFailed(format!("{}: {}", address, e)))?;
    unchecked
        .require_network(network)
        .map_err(|e| ScriptError::AddressDerivationFailed(e.to_string()).into())
}

/// Derives the address a locking script pays to, if it has one
///
/// # Errors
/// * `ScriptError::AddressDerivationFailed` - For scripts without an address form
pub fn address_from_script(script_pubkey: &ScriptBuf, network: Network) -> Result<Address> {
    Address::from_script(script_pubkey, network)
        .map_err(|e| ScriptError::AddressDerivationFailed(e.to_string()).into())
}
