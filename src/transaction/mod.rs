pub mod model;
pub mod utxo;

pub use model::{Transaction, TxInput, TxKind, TxOutput};
pub use utxo::{OutPoint, UtxoEntry, UtxoSet, spend_digest};
