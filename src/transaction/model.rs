use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::utxo::OutPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxInput {
    /// References a previous unspent output (UTXO)
    pub outpoint: OutPoint,
    /// Hex of the compressed public key owning the output
    pub pubkey: String,
    /// Hex-encoded DER ECDSA signature over the output's spend digest
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub amount: u64,
}

/// What a transaction is for. Part of the txid preimage, so two coinbases
/// or coin-age burns paying the same address at different heights never
/// collide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TxKind {
    Genesis,
    Coinbase { chain_length: u64 },
    CoinAge { chain_length: u64 },
    Transfer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// A stable identifier computed from content.
    pub txid: String,
    pub kind: TxKind,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Build a transaction and compute its txid deterministically from its content.
    pub fn new(kind: TxKind, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let payload = serde_json::json!({
            "kind": kind,
            "inputs": inputs,
            "outputs": outputs,
        });
        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        let txid = hex::encode(hasher.finalize());

        Self {
            txid,
            kind,
            inputs,
            outputs,
        }
    }

    pub fn total_output_amount(&self) -> u128 {
        self.outputs.iter().map(|o| o.amount as u128).sum()
    }

    pub fn outpoint(&self, vout: u32) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            vout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward(chain_length: u64) -> Transaction {
        Transaction::new(
            TxKind::Coinbase { chain_length },
            vec![],
            vec![TxOutput {
                address: "miner".into(),
                amount: 25,
            }],
        )
    }

    #[test]
    fn txid_is_deterministic() {
        assert_eq!(reward(4).txid, reward(4).txid);
    }

    #[test]
    fn coinbases_at_different_heights_differ() {
        assert_ne!(reward(4).txid, reward(5).txid);
        assert_eq!(reward(5).total_output_amount(), 25);
    }
}
