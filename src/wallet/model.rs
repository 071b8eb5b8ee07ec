use log::debug;
use std::collections::{HashMap, VecDeque};

use super::{COIN_AGE_UNIT, Coin, KeyPair, MAX_COIN_AGE, NO_STAKE_FINGERPRINT, generate_keypair};
use crate::blockchain::Block;
use crate::error::{WalletError, WalletResult};
use crate::transaction::{OutPoint, Transaction, TxInput, UtxoEntry, spend_digest};

/// Inputs selected by [`Wallet::spend_utxos`] plus the change owed back.
#[derive(Debug, Clone)]
pub struct SpendPlan {
    pub inputs: Vec<TxInput>,
    pub change_amount: u64,
}

/// Inputs selected by [`Wallet::spend_utxos_fully`]. No change is produced,
/// so `total_spent` is whatever the selected aged coins add up to.
#[derive(Debug, Clone)]
pub struct CoinAgeSpend {
    pub inputs: Vec<TxInput>,
    pub total_spent: u64,
}

/// A participant's keys and the outputs it believes it owns.
///
/// The coin queue is optimistic: coins are never removed locally, and a coin
/// spent elsewhere is only filtered out when a ledger view no longer lists it.
/// New coins go to the front and spends read from the front, so the newest
/// coin is spent first.
#[derive(Debug)]
pub struct Wallet {
    coins: VecDeque<Coin>,
    addresses: HashMap<String, KeyPair>,
    eligibility: String,
}

impl Wallet {
    pub fn new() -> Self {
        Self {
            coins: VecDeque::new(),
            addresses: HashMap::new(),
            eligibility: NO_STAKE_FINGERPRINT.to_string(),
        }
    }

    /// Generate and register a fresh address.
    pub fn make_address(&mut self) -> String {
        let keypair = generate_keypair();
        let address = keypair.address();
        self.addresses.insert(address.clone(), keypair);
        address
    }

    pub fn has_key(&self, address: &str) -> bool {
        self.addresses.contains_key(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.addresses.keys().map(String::as_str)
    }

    pub fn coins(&self) -> impl Iterator<Item = &Coin> {
        self.coins.iter()
    }

    pub fn knows(&self, outpoint: &OutPoint) -> bool {
        self.position(outpoint).is_some()
    }

    fn position(&self, outpoint: &OutPoint) -> Option<usize> {
        self.coins
            .iter()
            .position(|c| c.txid == outpoint.txid && c.output_index == outpoint.vout)
    }

    /// Track a new spendable output. The address must belong to this wallet.
    pub fn add_utxo(&mut self, coin: Coin) -> WalletResult<()> {
        if !self.has_key(&coin.output.address) {
            return Err(WalletError::MissingKey(coin.output.address.clone()));
        }
        self.coins.push_front(coin);
        Ok(())
    }

    /// Add every output of `tx` paying one of our addresses. Outputs already
    /// tracked are restamped with `chain_num` instead, since the same
    /// transaction can land at different heights on competing forks.
    /// Returns how many coins were added.
    pub fn credit_outputs(&mut self, tx: &Transaction, chain_num: u64) -> WalletResult<usize> {
        let mut added = 0;
        for (vout, out) in tx.outputs.iter().enumerate() {
            if !self.has_key(&out.address) {
                continue;
            }
            let entry = UtxoEntry {
                address: out.address.clone(),
                amount: out.amount,
                chain_num,
            };
            match self.position(&tx.outpoint(vout as u32)) {
                Some(idx) => self.refresh_coin(idx, &entry),
                None => {
                    self.add_utxo(Coin::new(tx.txid.clone(), vout as u32, entry))?;
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Sum of every locally cached coin. Stale: it counts coins that were
    /// already spent or never confirmed.
    pub fn balance_local(&self) -> u64 {
        self.coins.iter().map(Coin::amount).sum()
    }

    /// Confirmed balance on `view`: owned outputs minted before the view's block.
    pub fn balance_on_chain(&self, view: &Block) -> u64 {
        view.utxos()
            .iter()
            .filter(|(_, entry)| self.has_key(&entry.address) && entry.chain_num < view.chain_length)
            .map(|(_, entry)| entry.amount)
            .sum()
    }

    /// Greedily select coins from the front until `amount` is covered.
    pub fn spend_utxos(&mut self, amount: u64) -> WalletResult<SpendPlan> {
        let available = self.balance_local();
        if amount > available {
            return Err(WalletError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        let mut inputs = Vec::new();
        let mut total = 0u64;
        for idx in 0..self.coins.len() {
            if total >= amount {
                break;
            }
            total += self.coins[idx].amount();
            inputs.push(self.sign_coin(idx)?);
        }

        Ok(SpendPlan {
            inputs,
            change_amount: total - amount,
        })
    }

    /// Like [`Wallet::spend_utxos`] but only coins in `view`'s aged set for
    /// this wallet are eligible. Used for the coin-age burn.
    pub fn spend_utxos_fully(&mut self, amount: u64, view: &Block) -> WalletResult<CoinAgeSpend> {
        let available = self.balance_on_chain(view);
        if amount > available {
            return Err(WalletError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        let aged: HashMap<OutPoint, UtxoEntry> =
            view.all_aged_utxos_belonging_to(self).into_iter().collect();

        let mut inputs = Vec::new();
        let mut total_spent = 0u64;
        for idx in 0..self.coins.len() {
            if total_spent >= amount {
                break;
            }
            let Some(entry) = aged.get(&self.coins[idx].outpoint()) else {
                continue;
            };
            // Sign what the view holds, not what we cached.
            self.refresh_coin(idx, entry);
            total_spent += self.coins[idx].amount();
            inputs.push(self.sign_coin(idx)?);
        }

        debug!(
            "coin-age spend: requested={} spent={} inputs={}",
            amount,
            total_spent,
            inputs.len()
        );
        Ok(CoinAgeSpend {
            inputs,
            total_spent,
        })
    }

    /// Recompute the eligibility fingerprint from every owned output on `view`.
    // Addresses are concatenated without a separator, so distinct UTXO sets
    // can produce the same string.
    pub fn save_eligibility_proof(&mut self, view: &Block) {
        let owned = view.all_utxos_belonging_to(self);
        self.eligibility = if owned.is_empty() {
            NO_STAKE_FINGERPRINT.to_string()
        } else {
            owned.iter().map(|(_, entry)| entry.address.as_str()).collect()
        };
    }

    pub fn eligibility_address(&self) -> &str {
        &self.eligibility
    }

    /// Aggregate coin-age of aged owned outputs on `view`, floored and
    /// clamped to `[0, MAX_COIN_AGE]`.
    pub fn coin_age_on_chain(&self, view: &Block) -> u32 {
        let age: f64 = view
            .all_aged_utxos_belonging_to(self)
            .iter()
            .map(|(_, entry)| {
                let held = view.chain_length as f64 - entry.chain_num as f64 - 2.0;
                (entry.amount as f64 / COIN_AGE_UNIT * held).max(0.0)
            })
            .sum();
        (age.floor() as u32).min(MAX_COIN_AGE)
    }

    fn refresh_coin(&mut self, idx: usize, entry: &UtxoEntry) {
        let coin = &mut self.coins[idx];
        if coin.output != *entry {
            debug!(
                "coin {}:{} restamped at chain {} (was {})",
                coin.txid, coin.output_index, entry.chain_num, coin.output.chain_num
            );
            coin.output = entry.clone();
            coin.cached_signature = None;
        }
    }

    fn sign_coin(&mut self, idx: usize) -> WalletResult<TxInput> {
        let coin = &mut self.coins[idx];
        let keypair = self
            .addresses
            .get(&coin.output.address)
            .ok_or_else(|| WalletError::MissingKey(coin.output.address.clone()))?;

        let outpoint = coin.outpoint();
        let signature = match coin.cached_signature.clone() {
            Some(sig) => sig,
            None => {
                let sig = super::sign_digest_hex(&keypair.secret, spend_digest(&outpoint, &coin.output))
                    .map_err(|e| WalletError::Signing(e.to_string()))?;
                coin.cached_signature = Some(sig.clone());
                sig
            }
        };

        Ok(TxInput {
            outpoint,
            pubkey: keypair.pubkey_hex(),
            signature,
        })
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
