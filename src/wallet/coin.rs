use crate::transaction::{OutPoint, UtxoEntry};

/// One UTXO the wallet believes it can spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub output: UtxoEntry,
    pub txid: String,
    pub output_index: u32,
    /// DER signature over the spend digest, filled on first spend.
    pub cached_signature: Option<String>,
}

impl Coin {
    pub fn new(txid: impl Into<String>, output_index: u32, output: UtxoEntry) -> Self {
        Self {
            output,
            txid: txid.into(),
            output_index,
            cached_signature: None,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            vout: self.output_index,
        }
    }

    pub fn amount(&self) -> u64 {
        self.output.amount
    }
}
