//! Unspent output representation
//!
//! This module defines the UTXO type the transaction builders spend from.

use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use serde::{Deserialize, Serialize};

/// Represents a Bitcoin UTXO (Unspent Transaction Output)
///
/// A UTXO is an output from a previous transaction that can be spent as an input
/// in a new transaction. It is uniquely identified by the transaction ID and output index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Transaction ID of the transaction that created this UTXO
    pub txid: Txid,
    /// Output index within the transaction
    pub output_index: u32,
    /// Value in satoshis
    pub amount: u64,
    /// Locking script of the output
    pub locking_script: ScriptBuf,
}

impl UnspentOutput {
    /// Creates a new UTXO with the given parameters
    ///
    /// # Arguments
    /// * `txid` - Transaction ID
    /// * `output_index` - Output index
    /// * `amount` - Value in satoshis
    /// * `locking_script` - Script public key of the output
    pub fn new(txid: Txid, output_index: u32, amount: u64, locking_script: ScriptBuf) -> Self {
        Self { txid, output_index, amount, locking_script }
    }

    /// Extracts output `output_index` of `tx`, if present
    pub fn from_transaction(tx: &Transaction, output_index: u32) -> Option<Self> {
        let txout = tx.output.get(output_index as usize)?;
        Some(Self {
            txid: tx.compute_txid(),
            output_index,
            amount: txout.value.to_sat(),
            locking_script: txout.script_pubkey.clone(),
        })
    }

    /// Gets the outpoint that identifies this UTXO
    pub fn outpoint(&self) -> OutPoint { OutPoint { txid: self.txid, vout: self.output_index } }

    /// Gets the value in satoshis
    pub fn amount(&self) -> u64 { self.amount }

    /// Converts the UTXO back into the output it was created from
    pub fn to_txout(&self) -> TxOut {
        TxOut { value: Amount::from_sat(self.amount), script_pubkey: self.locking_script.clone() }
    }
}

/// Looks up the output an outpoint refers to among `txs`
///
/// # Returns
/// The referenced output, or `None` when no transaction in `txs` has the
/// outpoint's txid or the index is out of range
pub fn find_spent_output<'a>(txs: &'a [Transaction], outpoint: &OutPoint) -> Option<&'a TxOut> {
    txs.iter()
        .find(|tx| tx.compute_txid() == outpoint.txid)
        .and_then(|tx| tx.output.get(outpoint.vout as usize))
}

#[cfg(test)]
mod tests {
    use bitcoin::absolute::LockTime;
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, TxIn};

    use super::*;

    fn sample_tx(values: &[u64]) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn::default()],
            output: values
                .iter()
                .map(|v| TxOut { value: Amount::from_sat(*v), script_pubkey: ScriptBuf::new() })
                .collect(),
        }
    }

    #[test]
    fn test_outpoint() {
        let txid = Txid::from_byte_array([7u8; 32]);
        let utxo = UnspentOutput::new(txid, 3, 1_000, ScriptBuf::new());
        assert_eq!(utxo.outpoint(), OutPoint { txid, vout: 3 });
        assert_eq!(utxo.amount(), 1_000);
        assert_eq!(utxo.to_txout().value, Amount::from_sat(1_000));
    }

    #[test]
    fn test_from_transaction() {
        let tx = sample_tx(&[10, 20]);
        let utxo = UnspentOutput::from_transaction(&tx, 1).expect("output 1 exists");
        assert_eq!(utxo.txid, tx.compute_txid());
        assert_eq!(utxo.amount, 20);
        assert!(UnspentOutput::from_transaction(&tx, 2).is_none());
    }

    #[test]
    fn test_find_spent_output() {
        let a = sample_tx(&[10]);
        let b = sample_tx(&[20, 30]);
        let txs = vec![a.clone(), b.clone()];
        let found = find_spent_output(&txs, &OutPoint { txid: b.compute_txid(), vout: 1 })
            .expect("output should be found");
        assert_eq!(found.value, Amount::from_sat(30));
        assert!(find_spent_output(&txs, &OutPoint { txid: a.compute_txid(), vout: 1 }).is_none());
        assert!(find_spent_output(&[], &OutPoint::null()).is_none());
    }
}
