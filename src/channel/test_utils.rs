//! Shared test utilities for channel module tests
//!
//! This module provides common helper functions used across all channel module tests.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};

use crate::btx::redeem_script::{RedeemScript, RedeemScriptParams};
use crate::btx::state::UnspentOutput;
use crate::channel::tx::commitment::{build_commitment_transaction, CommitmentTxParams};

/// Fixed "now" used by tests (2023-11-14T22:13:20Z)
pub const TEST_NOW: u32 = 1_700_000_000;

/// Network used by tests
pub const TEST_NETWORK: Network = Network::Regtest;

/// Fee used by test builders
pub const TEST_FEE: u64 = 100_000;

/// Value of the funding output in tests
pub const TEST_FUNDING: u64 = 150_000_000;

/// Value locked in the channel by the test commitment (funding minus fee)
pub const TEST_COMMITTED: u64 = TEST_FUNDING - TEST_FEE;

/// Keys for both channel roles
pub struct TestKeys {
    /// Consumer signing key
    pub consumer_secret: SecretKey,
    /// Consumer public key
    pub consumer_pubkey: CompressedPublicKey,
    /// Provider signing key
    pub provider_secret: SecretKey,
    /// Provider public key
    pub provider_pubkey: CompressedPublicKey,
}

/// Deterministically derive a secret key from a single byte (tests only)
pub fn deterministic_secret(byte: u8) -> SecretKey {
    SecretKey::from_slice(&[byte; 32]).expect("32-byte array should always be a valid SecretKey")
}

/// Compressed public key for a secret key
pub fn pubkey_of(secret: &SecretKey) -> CompressedPublicKey {
    let secp = Secp256k1::new();
    CompressedPublicKey(PublicKey::from_secret_key(&secp, secret))
}

/// Helper function to generate test keys for both roles
pub fn test_keys() -> TestKeys {
    let consumer_secret = deterministic_secret(1);
    let provider_secret = deterministic_secret(2);
    TestKeys {
        consumer_pubkey: pubkey_of(&consumer_secret),
        consumer_secret,
        provider_pubkey: pubkey_of(&provider_secret),
        provider_secret,
    }
}

/// Lock time one day after [`TEST_NOW`]
pub fn test_lock_time() -> LockTime { LockTime::from_consensus(TEST_NOW + 86_400) }

/// Redeem script for [`test_keys`] and [`test_lock_time`]
pub fn test_redeem_script() -> RedeemScript {
    let keys = test_keys();
    RedeemScript::from_params(&RedeemScriptParams {
        provider_pubkey: keys.provider_pubkey,
        consumer_pubkey: keys.consumer_pubkey,
        lock_time: test_lock_time(),
    })
    .expect("test params should encode")
}

/// P2PKH address of the consumer, used for change and refunds
pub fn consumer_address() -> Address { Address::p2pkh(test_keys().consumer_pubkey, TEST_NETWORK) }

/// P2PKH address of the provider, used for payments
pub fn provider_address() -> Address { Address::p2pkh(test_keys().provider_pubkey, TEST_NETWORK) }

/// A transaction creating a single output of `amount` locked by `script_pubkey`
pub fn funding_transaction(amount: u64, script_pubkey: ScriptBuf) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint { txid: Txid::from_byte_array([0xab; 32]), vout: 0 },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut { value: Amount::from_sat(amount), script_pubkey }],
    }
}

/// Funding transaction paying [`TEST_FUNDING`] to the consumer's P2PKH
pub fn consumer_funding_transaction() -> Transaction {
    funding_transaction(TEST_FUNDING, consumer_address().script_pubkey())
}

/// Commitment locking [`TEST_COMMITTED`] in [`test_redeem_script`], with its funding transaction
pub fn test_commitment() -> (Transaction, Transaction) {
    let keys = test_keys();
    let funding_tx = consumer_funding_transaction();
    let prev_utxo =
        UnspentOutput::from_transaction(&funding_tx, 0).expect("funding output should exist");
    let commitment = build_commitment_transaction(&CommitmentTxParams {
        prev_utxo,
        funding_key: keys.consumer_secret,
        amount: TEST_COMMITTED,
        redeem_script: test_redeem_script(),
        change_address: consumer_address(),
        fee: TEST_FEE,
        network: TEST_NETWORK,
    })
    .expect("test commitment should build");
    (commitment, funding_tx)
}
