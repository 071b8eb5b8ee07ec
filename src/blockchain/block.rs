use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

use super::{BASE_POW_TARGET_BITS, COINBASE_AMOUNT};
use crate::error::{LedgerError, LedgerResult};
use crate::transaction::{
    OutPoint, Transaction, TxInput, TxKind, TxOutput, UtxoEntry, UtxoSet, spend_digest,
};
use crate::wallet::{Wallet, pubkey_to_address_hex, verify_signature_hex};

/// A block together with the UTXO index it produces: the ledger view a
/// miner reads balances from and builds its next candidate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub chain_length: u64,
    pub prev_block_hash: Option<String>,
    /// Logical tick at which the block was started.
    pub timestamp: u64,
    pub proof: u64,
    /// Required leading zero bits of the block hash.
    pub target: u32,
    pub reward_address: Option<String>,
    coinbase_tx: Option<Transaction>,
    coin_age_tx: Option<Transaction>,
    /// Ids of included transactions, in inclusion order. Hashed even when
    /// the bodies are left out of the serialized form.
    tx_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    transactions: BTreeMap<String, Transaction>,
    utxos: UtxoSet,
}

impl Block {
    /// Create the genesis block paying each `(address, amount)` allocation.
    pub fn genesis(allocations: &[(String, u64)]) -> Self {
        let mut block = Self::empty(0, None, 0, None);
        // Genesis is trusted, not mined.
        block.target = 0;
        let tx = Transaction::new(
            TxKind::Genesis,
            vec![],
            allocations
                .iter()
                .map(|(address, amount)| TxOutput {
                    address: address.clone(),
                    amount: *amount,
                })
                .collect(),
        );
        block.apply(tx);
        block
    }

    /// Start a new block on top of `parent`, paying the coinbase to `reward_address`.
    pub fn new(reward_address: String, parent: Option<&Block>, timestamp: u64) -> Self {
        let chain_length = parent.map_or(0, |p| p.chain_length + 1);
        let mut block = Self::empty(
            chain_length,
            parent.map(Block::hash),
            timestamp,
            Some(reward_address.clone()),
        );
        if let Some(parent) = parent {
            block.utxos = parent.utxos.clone();
        }

        let coinbase = Transaction::new(
            TxKind::Coinbase { chain_length },
            vec![],
            vec![TxOutput {
                address: reward_address,
                amount: COINBASE_AMOUNT,
            }],
        );
        block.utxos.add_tx_outputs(&coinbase, chain_length);
        block.coinbase_tx = Some(coinbase);
        block
    }

    fn empty(
        chain_length: u64,
        prev_block_hash: Option<String>,
        timestamp: u64,
        reward_address: Option<String>,
    ) -> Self {
        Self {
            chain_length,
            prev_block_hash,
            timestamp,
            proof: 0,
            target: BASE_POW_TARGET_BITS,
            reward_address,
            coinbase_tx: None,
            coin_age_tx: None,
            tx_ids: Vec::new(),
            transactions: BTreeMap::new(),
            utxos: UtxoSet::new(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_none()
    }

    /// SHA-256 of the header fields (including transaction ids).
    pub fn hash_bytes(&self) -> [u8; 32] {
        let preimage = format!(
            "{}:{}:{}:{}:{}:{}:{}:{}:{}",
            self.chain_length,
            self.prev_block_hash.as_deref().unwrap_or(""),
            self.timestamp,
            self.proof,
            self.target,
            self.reward_address.as_deref().unwrap_or(""),
            self.coinbase_tx.as_ref().map_or("", |tx| tx.txid.as_str()),
            self.coin_age_tx.as_ref().map_or("", |tx| tx.txid.as_str()),
            self.tx_ids.join(","),
        );
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        hasher.finalize().into()
    }

    pub fn hash(&self) -> String {
        hex::encode(self.hash_bytes())
    }

    /// Whether the hash has at least `target` leading zero bits.
    pub fn verify_proof(&self) -> bool {
        leading_zero_bits(&self.hash_bytes()) >= self.target
    }

    /// Proof target for a miner with `coin_age`; more coin-age, easier target.
    pub fn determine_target_based_on_coin_age(coin_age: u32) -> u32 {
        BASE_POW_TARGET_BITS.saturating_sub(coin_age)
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.coinbase_tx.as_ref()
    }

    pub fn coin_age_tx(&self) -> Option<&Transaction> {
        self.coin_age_tx.as_ref()
    }

    /// Included transactions carried in this copy of the block.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    pub fn tx_ids(&self) -> &[String] {
        &self.tx_ids
    }

    pub fn will_accept_transaction(&self, tx: &Transaction) -> bool {
        if tx.kind != TxKind::Transfer {
            return false;
        }
        match self.check_spend(tx) {
            Ok(_) => true,
            Err(reason) => {
                debug!("block {} refuses tx {}: {}", self.chain_length, tx.txid, reason);
                false
            }
        }
    }

    /// Validate and include a transfer, updating the UTXO index.
    pub fn add_transaction(&mut self, tx: Transaction) -> LedgerResult<()> {
        if tx.kind != TxKind::Transfer {
            return Err(LedgerError::Rejected(tx.txid, "only transfers can be added"));
        }
        if let Err(reason) = self.check_spend(&tx) {
            return Err(LedgerError::Rejected(tx.txid, reason));
        }
        self.apply(tx);
        Ok(())
    }

    /// Build, apply and embed the coin-age burn: all `inputs` are spent into
    /// a single output of `amount` to `dest`, with no change.
    pub fn spend_coin_age(
        &mut self,
        dest: String,
        amount: u64,
        inputs: Vec<TxInput>,
    ) -> LedgerResult<Transaction> {
        let tx = Transaction::new(
            TxKind::CoinAge {
                chain_length: self.chain_length,
            },
            inputs,
            vec![TxOutput {
                address: dest,
                amount,
            }],
        );
        let spent = self
            .check_spend(&tx)
            .map_err(|reason| LedgerError::Rejected(tx.txid.clone(), reason))?;
        if spent != amount as u128 {
            return Err(LedgerError::CoinAgeMismatch {
                expected: amount,
                actual: spent as u64,
            });
        }

        for input in &tx.inputs {
            self.utxos.spend(&input.outpoint);
        }
        self.utxos.add_tx_outputs(&tx, self.chain_length);
        self.coin_age_tx = Some(tx.clone());
        Ok(tx)
    }

    /// Every unspent output on this view owned by `wallet`, in txid order.
    pub fn all_utxos_belonging_to(&self, wallet: &Wallet) -> Vec<(OutPoint, UtxoEntry)> {
        self.utxos
            .iter()
            .filter(|(_, entry)| wallet.has_key(&entry.address))
            .map(|(outpoint, entry)| (outpoint, entry.clone()))
            .collect()
    }

    /// Owned outputs minted before this block, i.e. not by the block itself.
    pub fn all_aged_utxos_belonging_to(&self, wallet: &Wallet) -> Vec<(OutPoint, UtxoEntry)> {
        self.all_utxos_belonging_to(wallet)
            .into_iter()
            .filter(|(_, entry)| entry.chain_num < self.chain_length)
            .collect()
    }

    pub fn serialize(&self, include_pending: bool) -> LedgerResult<Vec<u8>> {
        if include_pending {
            return Ok(serde_json::to_vec(self)?);
        }
        let mut header = self.clone();
        header.transactions.clear();
        Ok(serde_json::to_vec(&header)?)
    }

    pub fn deserialize(bytes: &[u8]) -> LedgerResult<Block> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Structural, ownership and signature checks for a spending transaction.
    /// Returns the total input value.
    fn check_spend(&self, tx: &Transaction) -> Result<u128, &'static str> {
        if tx.inputs.is_empty() {
            return Err("no inputs");
        }
        if tx.outputs.is_empty() {
            return Err("no outputs");
        }
        if tx.outputs.iter().any(|o| o.amount == 0) {
            return Err("zero-amount output");
        }
        if self.transactions.contains_key(&tx.txid) || self.tx_ids.contains(&tx.txid) {
            return Err("already included");
        }

        let mut seen = HashSet::new();
        let mut input_sum: u128 = 0;
        for input in &tx.inputs {
            if !seen.insert(&input.outpoint) {
                return Err("duplicate input outpoint");
            }
            let prev_out = self
                .utxos
                .get(&input.outpoint)
                .ok_or("referenced UTXO not found")?;

            let derived_addr = pubkey_to_address_hex(&input.pubkey)?;
            if prev_out.address != derived_addr {
                return Err("pubkey does not own referenced UTXO");
            }
            let digest = spend_digest(&input.outpoint, prev_out);
            if !verify_signature_hex(&input.pubkey, &input.signature, digest)? {
                return Err("invalid signature");
            }
            input_sum += prev_out.amount as u128;
        }

        if input_sum < tx.total_output_amount() {
            return Err("inputs total is less than outputs total");
        }
        Ok(input_sum)
    }

    fn apply(&mut self, tx: Transaction) {
        for input in &tx.inputs {
            self.utxos.spend(&input.outpoint);
        }
        self.utxos.add_tx_outputs(&tx, self.chain_length);
        self.tx_ids.push(tx.txid.clone());
        self.transactions.insert(tx.txid.clone(), tx);
    }
}

fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in bytes {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}
