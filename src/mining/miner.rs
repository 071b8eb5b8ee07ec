use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;

use super::eligibility::{adjusted_threshold, eligibility_bits};
use super::{BASE_ELIGIBILITY_DIFFICULTY, DEFAULT_MINING_ROUNDS, RETRY_INTERVAL_TICKS};
use crate::blockchain::Block;
use crate::error::{BlockRejection, MiningError, MiningResult};
use crate::net::{BusHandle, Message, MinerRef, ParticipantId, ProofFound, TimerId};
use crate::transaction::Transaction;
use crate::wallet::Wallet;

/// Miner configuration.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub name: String,
    /// Threshold each proposal cycle starts from.
    pub base_eligibility_difficulty: u32,
    /// Ticks between eligibility retries.
    pub retry_interval: u64,
    /// Proof values tried per mining tick.
    pub mining_rounds: u64,
    /// Stop after one mining batch instead of re-queueing.
    pub single_shot: bool,
}

impl MinerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_eligibility_difficulty: BASE_ELIGIBILITY_DIFFICULTY,
            retry_interval: RETRY_INTERVAL_TICKS,
            mining_rounds: DEFAULT_MINING_ROUNDS,
            single_shot: false,
        }
    }
}

/// Mining statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MinerStats {
    pub blocks_mined: u64,
    pub blocks_adopted: u64,
    pub blocks_rejected: u64,
    pub eligibility_retries: u64,
    pub transactions_accepted: u64,
    /// Tick of the most recent successful eligibility check.
    pub last_eligible_at: Option<u64>,
}

/// Proof-of-stake miner actor. Handles one mailbox message at a time.
pub struct Miner {
    id: ParticipantId,
    config: MinerConfig,
    wallet: Wallet,
    bus: BusHandle,
    /// Active ledger view; the open candidate while a cycle is running.
    current_block: Block,
    /// Every view seen, by hash. Never pruned.
    previous_blocks: HashMap<String, Block>,
    dynamic_difficulty: u32,
    reward_address: Option<String>,
    should_mine: bool,
    should_start_new_block: bool,
    mining_queued: bool,
    pending_retry: Option<TimerId>,
    halted: bool,
    stats: MinerStats,
}

impl Miner {
    pub fn new(config: MinerConfig, bus: BusHandle) -> Self {
        Self {
            id: bus.owner(),
            dynamic_difficulty: config.base_eligibility_difficulty,
            config,
            wallet: Wallet::new(),
            bus,
            current_block: Block::genesis(&[]),
            previous_blocks: HashMap::new(),
            reward_address: None,
            should_mine: false,
            should_start_new_block: false,
            mining_queued: false,
            pending_retry: None,
            halted: false,
            stats: MinerStats::default(),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn wallet_mut(&mut self) -> &mut Wallet {
        &mut self.wallet
    }

    pub fn current_block(&self) -> &Block {
        &self.current_block
    }

    pub fn previous_blocks(&self) -> &HashMap<String, Block> {
        &self.previous_blocks
    }

    pub fn dynamic_difficulty(&self) -> u32 {
        self.dynamic_difficulty
    }

    pub fn reward_address(&self) -> Option<&str> {
        self.reward_address.as_deref()
    }

    pub fn is_mining(&self) -> bool {
        self.should_mine
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn stats(&self) -> &MinerStats {
        &self.stats
    }

    pub fn miner_ref(&self) -> MinerRef {
        MinerRef {
            id: self.id,
            name: self.config.name.clone(),
            eligibility: self.wallet.eligibility_address().to_string(),
        }
    }

    /// Adopt `view` (usually genesis), pick up the outputs it pays us and
    /// queue the first proposal cycle.
    pub fn initialize(&mut self, view: Block) {
        let chain_num = view.chain_length;
        for tx in view.transactions() {
            if let Err(err) = self.wallet.credit_outputs(tx, chain_num) {
                warn!("{}: cannot credit {}: {}", self.config.name, tx.txid, err);
            }
        }
        self.current_block = view;
        self.should_start_new_block = true;
        self.bus.send_self(
            Message::InitMinting {
                reuse_reward_address: false,
            },
            0,
        );
    }

    /// Dispatch one mailbox message. Runs to completion.
    pub fn handle(&mut self, message: Message) {
        match message {
            Message::InitMinting {
                reuse_reward_address,
            } => {
                // Only a live timer gets here; cancelled ones are never delivered.
                self.pending_retry = None;
                self.init_minting(reuse_reward_address);
            }
            Message::StartMining => self.find_proof(),
            Message::ProofFound(payload) => {
                // Rejections are logged and counted inside.
                let _ = self.receive_block(&payload);
            }
            Message::PostTransaction(tx) => self.add_transaction(tx),
        }
    }

    /// Publish a transaction to every participant.
    pub fn post_transaction(&self, tx: Transaction) {
        self.bus.broadcast(Message::PostTransaction(tx));
    }

    fn init_minting(&mut self, reuse_reward_address: bool) {
        if self.halted {
            return;
        }
        if self.should_start_new_block {
            if let Err(err) = self.start_new_block(reuse_reward_address) {
                error!("{}: cannot start a new block: {}", self.config.name, err);
                self.halt();
                return;
            }
        }
        self.check_eligibility();
    }

    /// Build a fresh candidate on the current view and burn our stake into it.
    fn start_new_block(&mut self, reuse_reward_address: bool) -> MiningResult<()> {
        self.dynamic_difficulty = self.config.base_eligibility_difficulty;
        self.should_mine = false;
        if let Some(timer) = self.pending_retry.take() {
            self.bus.cancel(timer);
        }

        let reward_address = match (&self.reward_address, reuse_reward_address) {
            (Some(address), true) => address.clone(),
            _ => self.wallet.make_address(),
        };
        self.reward_address = Some(reward_address.clone());

        let mut candidate = Block::new(
            reward_address.clone(),
            Some(&self.current_block),
            self.bus.now(),
        );
        self.previous_blocks
            .entry(self.current_block.hash())
            .or_insert_with(|| self.current_block.clone());

        candidate.proof = 0;
        let coin_age = self.wallet.coin_age_on_chain(&candidate);
        candidate.target = Block::determine_target_based_on_coin_age(coin_age);

        let stake = self.wallet.balance_on_chain(&candidate);
        let spend = self.wallet.spend_utxos_fully(stake, &candidate)?;
        if spend.total_spent == 0 {
            return Err(MiningError::NoSpendableCoinAge);
        }
        let burn = candidate.spend_coin_age(reward_address, spend.total_spent, spend.inputs)?;
        self.wallet.credit_outputs(&burn, candidate.chain_length)?;

        self.wallet.save_eligibility_proof(&candidate);
        debug!(
            "{}: candidate #{} stake={} coin_age={} target={}",
            self.config.name, candidate.chain_length, spend.total_spent, coin_age, candidate.target
        );
        self.current_block = candidate;
        self.should_start_new_block = false;
        Ok(())
    }

    fn check_eligibility(&mut self) {
        let prev_hash = self.current_block.prev_block_hash.clone().unwrap_or_default();
        let matched = eligibility_bits(&prev_hash, self.wallet.eligibility_address());

        if matched >= self.dynamic_difficulty {
            debug!(
                "{}: eligible at threshold {} (matched {})",
                self.config.name, self.dynamic_difficulty, matched
            );
            self.stats.last_eligible_at = Some(self.bus.now());
            self.should_mine = true;
            self.queue_mining(0);
            return;
        }

        // matched < threshold, so the threshold is at least 1 here.
        self.dynamic_difficulty -= 1;
        self.stats.eligibility_retries += 1;
        self.pending_retry = Some(self.bus.schedule(
            Message::InitMinting {
                reuse_reward_address: true,
            },
            self.config.retry_interval,
        ));
    }

    fn queue_mining(&mut self, delay: u64) {
        if !self.mining_queued {
            self.mining_queued = true;
            self.bus.send_self(Message::StartMining, delay);
        }
    }

    /// Try one batch of proof values on the current candidate.
    fn find_proof(&mut self) {
        self.mining_queued = false;
        if self.halted || !self.should_mine {
            return;
        }

        let paused_at = self.current_block.proof + self.config.mining_rounds;
        while self.current_block.proof < paused_at {
            if self.current_block.verify_proof() {
                self.on_proof_found();
                return;
            }
            self.current_block.proof += 1;
        }

        if !self.config.single_shot {
            self.queue_mining(1);
        }
    }

    fn on_proof_found(&mut self) {
        let block = &self.current_block;
        info!(
            "{}: found proof for block #{} ({})",
            self.config.name,
            block.chain_length,
            block.hash()
        );
        self.stats.blocks_mined += 1;
        self.should_mine = false;

        if let Some(coinbase) = block.coinbase_tx().cloned() {
            if let Err(err) = self.wallet.credit_outputs(&coinbase, block.chain_length) {
                warn!("{}: coinbase not credited: {}", self.config.name, err);
            }
        }
        let block = self.current_block.clone();
        self.credit_transfers(&block);

        self.announce_proof();
        self.should_start_new_block = true;
        self.init_minting(false);
    }

    /// Broadcast the current block with a reference to this miner.
    fn announce_proof(&self) {
        match self.current_block.serialize(true) {
            Ok(bytes) => self.bus.broadcast(Message::ProofFound(ProofFound {
                block: bytes,
                miner: Some(self.miner_ref()),
            })),
            Err(err) => error!("{}: cannot serialize block: {}", self.config.name, err),
        }
    }

    /// Validate a received block, cache it, and switch to it when it is at
    /// least as long as our view and came from someone else.
    ///
    /// Returns whether the block was adopted. Chain ancestry is not checked:
    /// a valid block is cached even if we never saw its parent.
    pub fn receive_block(&mut self, payload: &ProofFound) -> Result<bool, BlockRejection> {
        let block = match self.validate_block(payload) {
            Ok(block) => block,
            Err(rejection) => {
                self.stats.blocks_rejected += 1;
                warn!("{}: dropped block: {}", self.config.name, rejection);
                return Err(rejection);
            }
        };

        let hash = block.hash();
        let from_self = payload.miner.as_ref().is_some_and(|m| m.id == self.id);
        if from_self || block.chain_length < self.current_block.chain_length {
            self.previous_blocks.entry(hash).or_insert(block);
            return Ok(false);
        }

        info!(
            "{}: adopting block #{} ({}) from {}",
            self.config.name,
            block.chain_length,
            hash,
            payload.miner.as_ref().map_or("unknown", |m| m.name.as_str())
        );
        self.previous_blocks
            .entry(hash)
            .or_insert_with(|| block.clone());
        self.credit_transfers(&block);
        self.current_block = block;
        self.stats.blocks_adopted += 1;
        self.should_mine = false;
        self.should_start_new_block = true;
        self.init_minting(true);
        Ok(true)
    }

    /// Eligibility is tested against the fingerprint the sender announces in
    /// its [`MinerRef`]; it is not recomputed from the block, so a sender can
    /// claim any fingerprint it likes.
    fn validate_block(&self, payload: &ProofFound) -> Result<Block, BlockRejection> {
        let block = Block::deserialize(&payload.block)?;

        if let Some(miner) = &payload.miner {
            let required = adjusted_threshold(
                self.config.base_eligibility_difficulty,
                block.timestamp,
                self.bus.now(),
                self.config.retry_interval,
            );
            let prev_hash = block.prev_block_hash.as_deref().unwrap_or("");
            let matched = eligibility_bits(prev_hash, &miner.eligibility);
            if matched < required {
                return Err(BlockRejection::IneligibleMinter {
                    miner: miner.name.clone(),
                    matched,
                    required,
                });
            }
        }

        if !block.verify_proof() {
            return Err(BlockRejection::InvalidProof(block.hash()));
        }
        Ok(block)
    }

    /// Offer a transaction to the open candidate. Refused ones are dropped.
    fn add_transaction(&mut self, tx: Transaction) {
        if self.halted || !self.current_block.will_accept_transaction(&tx) {
            debug!("{}: dropping tx {}", self.config.name, tx.txid);
            return;
        }
        let txid = tx.txid.clone();
        match self.current_block.add_transaction(tx) {
            Ok(()) => {
                self.stats.transactions_accepted += 1;
                debug!("{}: tx {} added to candidate", self.config.name, txid);
            }
            Err(err) => debug!("{}: {}", self.config.name, err),
        }
    }

    /// Credit transfer outputs in `block` paying one of our addresses.
    fn credit_transfers(&mut self, block: &Block) {
        for tx in block.transactions() {
            match self.wallet.credit_outputs(tx, block.chain_length) {
                Ok(0) => {}
                Ok(n) => debug!("{}: received {} output(s) in {}", self.config.name, n, tx.txid),
                Err(err) => warn!("{}: cannot credit {}: {}", self.config.name, tx.txid, err),
            }
        }
    }

    fn halt(&mut self) {
        self.halted = true;
        self.should_mine = false;
        if let Some(timer) = self.pending_retry.take() {
            self.bus.cancel(timer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimConfig, Simulation};
    use crate::transaction::{TxKind, TxOutput};

    /// Miners that check eligibility but never search for a proof.
    fn idle_config(miners: usize, base: u32) -> SimConfig {
        SimConfig {
            miner_count: miners,
            base_eligibility_difficulty: base,
            mining_rounds: 0,
            single_shot: true,
            ..SimConfig::default()
        }
    }

    fn mined(block: &Block) -> Block {
        let mut block = block.clone();
        while !block.verify_proof() {
            block.proof += 1;
        }
        block
    }

    fn announce(block: &Block, miner: MinerRef) -> ProofFound {
        ProofFound {
            block: block.serialize(true).unwrap(),
            miner: Some(miner),
        }
    }

    fn initial_bits(miner: &Miner) -> u32 {
        let prev = miner.current_block().prev_block_hash.clone().unwrap();
        eligibility_bits(&prev, miner.wallet().eligibility_address())
    }

    #[test]
    fn threshold_drops_once_per_retry() {
        let mut sim = Simulation::new(&idle_config(3, 3));
        sim.run_until(0);
        let matched: Vec<u32> = sim.miners().iter().map(initial_bits).collect();

        sim.run_until(100);
        for (miner, matched) in sim.miners().iter().zip(matched) {
            let retries = 3 - matched.min(3);
            assert!(miner.is_mining());
            assert_eq!(miner.stats().eligibility_retries, retries as u64);
            assert_eq!(miner.dynamic_difficulty(), 3 - retries);
            assert_eq!(
                miner.stats().last_eligible_at,
                Some(retries as u64 * RETRY_INTERVAL_TICKS)
            );
        }
    }

    #[test]
    fn unmatched_miners_become_eligible_after_three_backoffs() {
        for _ in 0..500 {
            let mut sim = Simulation::new(&idle_config(2, 3));
            sim.run_until(0);
            if sim.miners().iter().any(|m| initial_bits(m) != 0) {
                continue;
            }

            for tick in [0, 5, 10] {
                sim.run_until(tick);
                assert!(sim.miners().iter().all(|m| !m.is_mining()));
            }
            sim.run_until(15);
            for miner in sim.miners() {
                assert!(miner.is_mining());
                assert_eq!(miner.dynamic_difficulty(), 0);
                assert_eq!(miner.stats().eligibility_retries, 3);
                assert_eq!(miner.stats().last_eligible_at, Some(15));
            }
            return;
        }
        panic!("no fully mismatched pair found");
    }

    #[test]
    fn peer_on_longer_chain_is_adopted() {
        let mut sim = Simulation::new(&idle_config(2, 0));
        sim.run_until(0);

        let block = mined(sim.miners()[0].current_block());
        let a_ref = sim.miners()[0].miner_ref();
        let b = &mut sim.miners_mut()[1];
        let b_reward = b.reward_address().unwrap().to_string();
        assert_eq!(block.chain_length, b.current_block().chain_length);

        assert_eq!(b.receive_block(&announce(&block, a_ref)).ok(), Some(true));
        assert_eq!(b.stats().blocks_adopted, 1);
        assert_eq!(b.reward_address(), Some(b_reward.as_str()));
        assert_eq!(b.current_block().chain_length, block.chain_length + 1);
        assert_eq!(
            b.current_block().prev_block_hash.as_deref(),
            Some(block.hash().as_str())
        );
        assert!(b.previous_blocks().contains_key(&block.hash()));
        assert!(b.is_mining());
    }

    #[test]
    fn mining_after_adoption_keeps_burning() {
        let mut sim = Simulation::new(&idle_config(2, 0));
        sim.run_until(0);

        let block = mined(sim.miners()[0].current_block());
        let a_ref = sim.miners()[0].miner_ref();
        let b = &mut sim.miners_mut()[1];
        let discarded_burn = b.current_block().coin_age_tx().unwrap().txid.clone();
        assert_eq!(b.receive_block(&announce(&block, a_ref)).ok(), Some(true));

        // Same reward address and stake, but a different height.
        let rebuilt_burn = b.current_block().coin_age_tx().unwrap().txid.clone();
        assert_ne!(rebuilt_burn, discarded_burn);

        let own = mined(b.current_block());
        let own_length = own.chain_length;
        b.current_block = own;
        b.config.mining_rounds = 1;
        b.handle(Message::StartMining);

        assert_eq!(b.stats().blocks_mined, 1);
        assert!(!b.is_halted());
        let next = b.current_block();
        assert_eq!(next.chain_length, own_length + 1);
        let burn = next.coin_age_tx().expect("next candidate burns stake");
        assert!(burn.total_output_amount() > 0);
        assert!(b.is_mining());
    }

    #[test]
    fn own_and_shorter_blocks_are_only_cached() {
        let mut sim = Simulation::new(&idle_config(2, 0));
        sim.run_until(0);

        let own = mined(sim.miners()[0].current_block());
        let a = &mut sim.miners_mut()[0];
        let a_ref = a.miner_ref();
        let before = a.current_block().hash();
        assert_eq!(a.receive_block(&announce(&own, a_ref)).ok(), Some(false));
        assert_eq!(a.current_block().hash(), before);
        assert!(a.previous_blocks().contains_key(&own.hash()));

        let genesis = a
            .previous_blocks()
            .values()
            .find(|b| b.is_genesis())
            .cloned()
            .unwrap();
        let shorter = ProofFound {
            block: genesis.serialize(true).unwrap(),
            miner: None,
        };
        assert_eq!(a.receive_block(&shorter).ok(), Some(false));
        assert_eq!(a.stats().blocks_adopted, 0);
        assert_eq!(a.current_block().hash(), before);
    }

    #[test]
    fn ineligible_or_unproven_blocks_are_rejected() {
        let mut sim = Simulation::new(&idle_config(2, 16));
        sim.run_until(0);

        let block = mined(sim.miners()[0].current_block());
        let prev = block.prev_block_hash.clone().unwrap();
        let mut liar = sim.miners()[0].miner_ref();
        liar.eligibility = (0..)
            .map(|i| format!("fp-{i}"))
            .find(|fp| eligibility_bits(&prev, fp) < 16)
            .unwrap();

        let b = &mut sim.miners_mut()[1];
        assert!(matches!(
            b.receive_block(&announce(&block, liar)),
            Err(BlockRejection::IneligibleMinter { required: 16, .. })
        ));

        // A fingerprint that projects like the previous hash matches fully.
        let mut honest = sim.miners()[0].miner_ref();
        honest.eligibility = prev;
        let mut unproven = block.clone();
        unproven.target = 200;
        let b = &mut sim.miners_mut()[1];
        assert!(matches!(
            b.receive_block(&announce(&unproven, honest.clone())),
            Err(BlockRejection::InvalidProof(_))
        ));
        assert!(matches!(
            b.receive_block(&ProofFound {
                block: b"not a block".to_vec(),
                miner: None
            }),
            Err(BlockRejection::Malformed(_))
        ));
        assert_eq!(b.stats().blocks_rejected, 3);
        assert_eq!(b.receive_block(&announce(&block, honest)).ok(), Some(true));
    }

    #[test]
    fn adoption_cancels_pending_retry() {
        let mut sim = Simulation::new(&idle_config(2, 16));
        sim.run_until(2);
        assert!(sim.miners()[1].stats().eligibility_retries >= 1);

        let block = mined(sim.miners()[0].current_block());
        let mut sender = sim.miners()[0].miner_ref();
        sender.eligibility = block.prev_block_hash.clone().unwrap();
        let b = &mut sim.miners_mut()[1];
        assert_eq!(b.receive_block(&announce(&block, sender)).ok(), Some(true));
        let after_adoption = b.dynamic_difficulty();
        let retries = b.stats().eligibility_retries;

        // The retry scheduled at tick 5 belonged to the discarded candidate.
        sim.run_until(6);
        let b = &sim.miners()[1];
        assert_eq!(b.dynamic_difficulty(), after_adoption);
        assert_eq!(b.stats().eligibility_retries, retries);

        sim.run_until(7);
        assert_eq!(sim.miners()[1].dynamic_difficulty(), after_adoption - 1);
    }

    #[test]
    fn adopted_block_credits_received_payment() {
        let mut sim = Simulation::new(&idle_config(2, 0));
        sim.run_until(0);

        let to = sim.miners_mut()[1].wallet_mut().make_address();
        let a = &mut sim.miners_mut()[0];
        let plan = a.wallet_mut().spend_utxos(10).unwrap();
        let change = a.wallet_mut().make_address();
        let tx = Transaction::new(
            TxKind::Transfer,
            plan.inputs,
            vec![
                TxOutput {
                    address: to,
                    amount: 10,
                },
                TxOutput {
                    address: change,
                    amount: plan.change_amount,
                },
            ],
        );
        a.handle(Message::PostTransaction(tx.clone()));
        assert_eq!(a.stats().transactions_accepted, 1);

        let block = mined(sim.miners()[0].current_block());
        let a_ref = sim.miners()[0].miner_ref();
        let b = &mut sim.miners_mut()[1];
        assert!(!b.wallet().knows(&tx.outpoint(0)));
        assert_eq!(b.receive_block(&announce(&block, a_ref)).ok(), Some(true));
        assert!(b.wallet().knows(&tx.outpoint(0)));
    }

    #[test]
    fn miner_without_stake_halts() {
        let mut sim = Simulation::new(&SimConfig {
            genesis_stake: 0,
            ..idle_config(2, 3)
        });
        sim.run_until(50);
        assert!(sim.miners().iter().all(|m| m.is_halted() && !m.is_mining()));
    }

    #[test]
    fn network_makes_progress() {
        let mut sim = Simulation::new(&SimConfig {
            miner_count: 3,
            ..SimConfig::default()
        });
        sim.run_until(400);

        let mined: u64 = sim.miners().iter().map(|m| m.stats().blocks_mined).sum();
        assert!(mined >= 3, "only {mined} blocks mined");
        assert!(sim.miners().iter().all(|m| !m.is_halted()));
        let longest = sim
            .miners()
            .iter()
            .map(|m| m.current_block().chain_length)
            .max()
            .unwrap();
        assert!(longest >= 3);
    }
}
