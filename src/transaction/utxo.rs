use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::model::Transaction;

/// Identifies a specific transaction output by its txid and index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

/// An unspent output as recorded by a ledger view.
/// `chain_num` is the chain length of the block that created it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoEntry {
    pub address: String,
    pub amount: u64,
    #[serde(rename = "chainNum")]
    pub chain_num: u64,
}

/// Digest an owner signs to spend `entry` at `outpoint`.
pub fn spend_digest(outpoint: &OutPoint, entry: &UtxoEntry) -> [u8; 32] {
    let payload = serde_json::json!({
        "txid": outpoint.txid,
        "vout": outpoint.vout,
        "address": entry.address,
        "amount": entry.amount,
        "chainNum": entry.chain_num,
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hasher.finalize().into()
}

/// UTXO index keyed by txid; each txid maps to its outputs in index order.
/// Spent slots become `None` so later indices keep their position.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct UtxoSet {
    map: BTreeMap<String, Vec<Option<UtxoEntry>>>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Add all outputs of `tx`, stamped with the creating block's chain length.
    pub fn add_tx_outputs(&mut self, tx: &Transaction, chain_num: u64) {
        let entries = tx
            .outputs
            .iter()
            .map(|out| {
                Some(UtxoEntry {
                    address: out.address.clone(),
                    amount: out.amount,
                    chain_num,
                })
            })
            .collect();
        self.map.insert(tx.txid.clone(), entries);
    }

    /// Spend (remove) a single outpoint. Returns the removed entry if it existed.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        let slots = self.map.get_mut(&outpoint.txid)?;
        let spent = slots.get_mut(outpoint.vout as usize)?.take();
        if slots.iter().all(Option::is_none) {
            self.map.remove(&outpoint.txid);
        }
        spent
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.map
            .get(&outpoint.txid)?
            .get(outpoint.vout as usize)?
            .as_ref()
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.get(outpoint).is_some()
    }

    pub fn len(&self) -> usize {
        self.map
            .values()
            .map(|slots| slots.iter().filter(|s| s.is_some()).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Unspent entries in txid order, then output index order.
    pub fn iter(&self) -> impl Iterator<Item = (OutPoint, &UtxoEntry)> {
        self.map.iter().flat_map(|(txid, slots)| {
            slots.iter().enumerate().filter_map(move |(vout, slot)| {
                slot.as_ref().map(|entry| {
                    (
                        OutPoint {
                            txid: txid.clone(),
                            vout: vout as u32,
                        },
                        entry,
                    )
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TxKind, TxOutput};

    fn two_output_tx() -> Transaction {
        Transaction::new(
            TxKind::Genesis,
            vec![],
            vec![
                TxOutput {
                    address: "a".into(),
                    amount: 10,
                },
                TxOutput {
                    address: "b".into(),
                    amount: 20,
                },
            ],
        )
    }

    #[test]
    fn spending_keeps_sibling_indices() {
        let tx = two_output_tx();
        let mut set = UtxoSet::new();
        set.add_tx_outputs(&tx, 3);

        let first = OutPoint {
            txid: tx.txid.clone(),
            vout: 0,
        };
        let second = OutPoint {
            txid: tx.txid.clone(),
            vout: 1,
        };
        assert_eq!(set.spend(&first).map(|e| e.amount), Some(10));
        assert!(set.spend(&first).is_none());
        assert_eq!(set.get(&second).map(|e| e.chain_num), Some(3));
        assert_eq!(set.len(), 1);

        set.spend(&second);
        assert!(set.is_empty());
    }

    #[test]
    fn digest_depends_on_chain_num() {
        let op = OutPoint {
            txid: "t".into(),
            vout: 0,
        };
        let a = UtxoEntry {
            address: "x".into(),
            amount: 5,
            chain_num: 1,
        };
        let b = UtxoEntry { chain_num: 2, ..a.clone() };
        assert_ne!(spend_digest(&op, &a), spend_digest(&op, &b));
    }
}
