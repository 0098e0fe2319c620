//! Commitment refund transaction builder
//!
//! The refund lets the Consumer reclaim the channel output without the
//! Provider once the redeem script's lock time has passed. It carries only
//! the Consumer's signature, so the script takes its CLTV branch.

use bitcoin::absolute::LockTime;
use bitcoin::secp256k1::SecretKey;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{Address, Amount, Sequence, Transaction, TxOut};

use crate::btx::redeem_script::RedeemScript;
use crate::btx::timelock::is_finalized;
use crate::channel::tx::commitment::commitment_utxo;
use crate::channel::tx::spend::{channel_input, sign_channel_input, SpendDescriptor};
use crate::errors::{BtxError, Result};
use crate::types::{REFUND_SEQUENCE, TX_VERSION};

/// Parameters for [`build_refund_transaction`]
#[derive(Debug, Clone)]
pub struct RefundTxParams {
    /// Transaction holding the channel output
    pub commitment_tx: Transaction,
    /// Channel redeem script
    pub redeem_script: RedeemScript,
    /// Consumer signing key
    pub consumer_key: SecretKey,
    /// Where the refunded value goes
    pub to_address: Address,
    /// Transaction fee in satoshis
    pub fee: u64,
    /// Input sequence; defaults to `0xFFFFFFFE`
    pub sequence: Option<Sequence>,
    /// nLockTime; defaults to the redeem script's lock time
    pub lock_time: Option<LockTime>,
}

/// Lock time a refund must carry to satisfy the redeem script
pub fn refund_lock_time(redeem_script: &RedeemScript) -> LockTime { redeem_script.lock_time() }

/// Builds and signs a commitment refund transaction
///
/// The single output pays `committed - fee` to `to_address`. The Consumer
/// signs with SIGHASH_ALL. The transaction is only valid on chain once the
/// lock time has passed.
///
/// # Errors
/// * `BtxError::CommitmentOutputNotFound` - If no commitment output pays the redeem script
/// * `BtxError::NonFinalRefundRequired` - If the sequence is final, which would disable nLockTime
/// * `BtxError::InsufficientFunds` - If the fee exceeds the committed value
/// * `ScriptError::InvalidKey` - If `consumer_key` does not match the redeem script
pub fn build_refund_transaction(params: &RefundTxParams) -> Result<Transaction> {
    let sequence = params.sequence.unwrap_or(Sequence::from_consensus(REFUND_SEQUENCE));
    if is_finalized(sequence) {
        return Err(BtxError::NonFinalRefundRequired(sequence.to_consensus_u32()).into());
    }

    let utxo = commitment_utxo(&params.redeem_script, &params.commitment_tx)?;
    if params.fee > utxo.amount {
        return Err(
            BtxError::InsufficientFunds { available: utxo.amount, required: params.fee }.into()
        );
    }

    let mut transaction = Transaction {
        version: TX_VERSION,
        lock_time: params.lock_time.unwrap_or_else(|| refund_lock_time(&params.redeem_script)),
        input: vec![channel_input(&utxo, sequence)],
        output: vec![TxOut {
            value: Amount::from_sat(utxo.amount - params.fee),
            script_pubkey: params.to_address.script_pubkey(),
        }],
    };

    let consumer_signature = sign_channel_input(
        &transaction,
        0,
        &params.redeem_script,
        &params.consumer_key,
        params.redeem_script.consumer_pubkey(),
        EcdsaSighashType::All,
    )?;

    transaction.input[0].script_sig = SpendDescriptor {
        redeem_script: &params.redeem_script,
        consumer_signature,
        provider_signature: None,
    }
    .script_sig()?;

    tracing::debug!(
        txid = %transaction.compute_txid(),
        lock_time = transaction.lock_time.to_consensus_u32(),
        "built refund transaction"
    );

    Ok(transaction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btx::validation::verify_input_script;
    use crate::channel::test_utils::*;
    use crate::Error;

    fn params(commitment_tx: Transaction) -> RefundTxParams {
        RefundTxParams {
            commitment_tx,
            redeem_script: test_redeem_script(),
            consumer_key: test_keys().consumer_secret,
            to_address: consumer_address(),
            fee: TEST_FEE,
            sequence: None,
            lock_time: None,
        }
    }

    #[test]
    fn test_build_refund_defaults() {
        let (commitment, _) = test_commitment();
        let refund = build_refund_transaction(&params(commitment)).expect("refund should build");
        assert_eq!(refund.input[0].sequence, Sequence::from_consensus(0xFFFF_FFFE));
        assert_eq!(refund.lock_time, test_lock_time());
        assert_eq!(refund.output.len(), 1);
        assert_eq!(refund.output[0].value, Amount::from_sat(TEST_COMMITTED - TEST_FEE));
        assert_eq!(refund.output[0].script_pubkey, consumer_address().script_pubkey());
    }

    #[test]
    fn test_refund_spends_at_lock_time() {
        let (commitment, _) = test_commitment();
        let refund = build_refund_transaction(&params(commitment.clone())).expect("refund");
        verify_input_script(&refund, 0, &commitment.output[0])
            .expect("refund at the embedded lock time satisfies CLTV");
    }

    #[test]
    fn test_refund_before_lock_time_fails() {
        let (commitment, _) = test_commitment();
        let mut p = params(commitment.clone());
        p.lock_time = Some(LockTime::from_consensus(test_lock_time().to_consensus_u32() - 1));
        let early = build_refund_transaction(&p).expect("builder does not check the clock");
        assert!(verify_input_script(&early, 0, &commitment.output[0]).is_err());
    }

    #[test]
    fn test_refund_with_final_sequence_rejected() {
        let (commitment, _) = test_commitment();
        let mut p = params(commitment);
        p.sequence = Some(Sequence::MAX);
        match build_refund_transaction(&p) {
            Err(Error::Btx(BtxError::NonFinalRefundRequired(sequence))) => {
                assert_eq!(sequence, 0xFFFF_FFFF);
            }
            other => panic!("Expected NonFinalRefundRequired, got {:?}", other),
        }
    }

    #[test]
    fn test_refund_fee_too_large() {
        let (commitment, _) = test_commitment();
        let mut p = params(commitment);
        p.fee = TEST_COMMITTED + 1;
        assert!(matches!(
            build_refund_transaction(&p),
            Err(Error::Btx(BtxError::InsufficientFunds { .. }))
        ));
    }

    #[test]
    fn test_refund_lock_time_matches_script() {
        assert_eq!(refund_lock_time(&test_redeem_script()), test_lock_time());
    }
}
