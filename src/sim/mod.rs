pub mod report;

pub use report::{BalanceEntry, MinerReport, SimulationReport};

use log::{debug, info, warn};
use std::collections::HashMap;
use uuid::Uuid;

use crate::blockchain::Block;
use crate::error::WalletResult;
use crate::mining::{
    BASE_ELIGIBILITY_DIFFICULTY, DEFAULT_MINING_ROUNDS, Miner, MinerConfig, RETRY_INTERVAL_TICKS,
};
use crate::net::{Bus, ParticipantId};
use crate::transaction::{Transaction, TxKind, TxOutput};

const MINER_NAMES: [&str; 6] = ["Minnie", "Mickey", "Donald", "Daisy", "Goofy", "Pluto"];

/// Parameters of one simulated network.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub miner_count: usize,
    /// Genesis allocation per miner.
    pub genesis_stake: u64,
    pub mining_rounds: u64,
    pub base_eligibility_difficulty: u32,
    pub retry_interval: u64,
    pub single_shot: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            miner_count: 3,
            genesis_stake: 1000,
            mining_rounds: DEFAULT_MINING_ROUNDS,
            base_eligibility_difficulty: BASE_ELIGIBILITY_DIFFICULTY,
            retry_interval: RETRY_INTERVAL_TICKS,
            single_shot: false,
        }
    }
}

impl SimConfig {
    fn miner_config(&self, idx: usize) -> MinerConfig {
        let name = MINER_NAMES
            .get(idx)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("miner-{idx}"));
        MinerConfig {
            base_eligibility_difficulty: self.base_eligibility_difficulty,
            retry_interval: self.retry_interval,
            mining_rounds: self.mining_rounds,
            single_shot: self.single_shot,
            ..MinerConfig::named(name)
        }
    }
}

pub struct Simulation {
    bus: Bus,
    miners: Vec<Miner>,
    index: HashMap<ParticipantId, usize>,
}

impl Simulation {
    /// Create the miners, fund each one in genesis and queue their first cycle.
    pub fn new(config: &SimConfig) -> Self {
        let mut bus = Bus::new();
        let mut miners = Vec::with_capacity(config.miner_count);
        let mut allocations = Vec::with_capacity(config.miner_count);

        for idx in 0..config.miner_count {
            let mut miner = Miner::new(config.miner_config(idx), bus.handle(Uuid::new_v4()));
            let address = miner.wallet_mut().make_address();
            allocations.push((address, config.genesis_stake));
            miners.push(miner);
        }

        let genesis = Block::genesis(&allocations);
        info!(
            "genesis {} funds {} miners with {} each",
            genesis.hash(),
            miners.len(),
            config.genesis_stake
        );

        bus.register(miners.iter().map(Miner::id));
        let index = miners
            .iter()
            .enumerate()
            .map(|(idx, miner)| (miner.id(), idx))
            .collect();
        for miner in &mut miners {
            miner.initialize(genesis.clone());
        }

        Self { bus, miners, index }
    }

    pub fn now(&self) -> u64 {
        self.bus.now()
    }

    pub fn miners(&self) -> &[Miner] {
        &self.miners
    }

    pub fn miners_mut(&mut self) -> &mut [Miner] {
        &mut self.miners
    }

    pub fn miner_by_name(&self, name: &str) -> Option<&Miner> {
        self.miners.iter().find(|m| m.name() == name)
    }

    /// Dispatch the next delivery due by `until`. Returns its recipient and message name.
    pub fn step(&mut self, until: u64) -> Option<(ParticipantId, &'static str)> {
        let delivery = self.bus.next_delivery(until)?;
        let name = delivery.message.name();
        match self.index.get(&delivery.to) {
            Some(&idx) => self.miners[idx].handle(delivery.message),
            None => warn!("no participant {} for {}", delivery.to, name),
        }
        Some((delivery.to, name))
    }

    /// Run every delivery due at or before `until`. Returns how many ran.
    pub fn run_until(&mut self, until: u64) -> usize {
        let mut delivered = 0;
        while self.step(until).is_some() {
            delivered += 1;
        }
        debug!("tick {}: {} deliveries", self.now(), delivered);
        delivered
    }

    /// Pay `amount` from miner `from` to a fresh address of miner `to`,
    /// returning change to `from`, and broadcast the transaction.
    pub fn transfer(&mut self, from: usize, to: usize, amount: u64) -> WalletResult<Transaction> {
        let to_address = self.miners[to].wallet_mut().make_address();
        let to_name = self.miners[to].name().to_string();
        let sender = &mut self.miners[from];
        let plan = sender.wallet_mut().spend_utxos(amount)?;

        let mut outputs = vec![TxOutput {
            address: to_address,
            amount,
        }];
        if plan.change_amount > 0 {
            outputs.push(TxOutput {
                address: sender.wallet_mut().make_address(),
                amount: plan.change_amount,
            });
        }
        let tx = Transaction::new(TxKind::Transfer, plan.inputs, outputs);
        info!(
            "{} pays {} to {} in tx {}",
            sender.name(),
            amount,
            to_name,
            tx.txid
        );
        sender.post_transaction(tx.clone());
        Ok(tx)
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport::capture(self.now(), &self.miners)
    }
}

/// Run a whole simulation, publishing a report every `report_every` ticks.
/// Halfway through, the first miner pays `transfer_amount` to the second.
pub fn run(
    config: &SimConfig,
    run_ticks: u64,
    report_every: u64,
    transfer_amount: u64,
    mut publish: impl FnMut(SimulationReport),
) -> SimulationReport {
    let mut sim = Simulation::new(config);
    let transfer_at = run_ticks / 2;
    let mut transferred = transfer_amount == 0 || config.miner_count < 2;

    let mut tick = 0;
    while tick < run_ticks {
        tick = (tick + report_every.max(1)).min(run_ticks);
        if !transferred && tick >= transfer_at {
            sim.run_until(transfer_at);
            if let Err(err) = sim.transfer(0, 1, transfer_amount) {
                warn!("transfer failed: {}", err);
            }
            transferred = true;
        }
        sim.run_until(tick);
        publish(sim.report());
    }

    let report = sim.report();
    info!("simulation stopped at tick {}", report.tick);
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_funds_every_miner() {
        let sim = Simulation::new(&SimConfig {
            miner_count: 4,
            genesis_stake: 300,
            ..SimConfig::default()
        });
        assert_eq!(sim.miners().len(), 4);
        for miner in sim.miners() {
            assert_eq!(miner.wallet().balance_local(), 300);
            assert_eq!(miner.current_block().chain_length, 0);
        }
        assert!(sim.miner_by_name("Daisy").is_some());
    }

    #[test]
    fn first_cycle_burns_the_whole_stake() {
        let mut sim = Simulation::new(&SimConfig {
            miner_count: 2,
            mining_rounds: 0,
            single_shot: true,
            ..SimConfig::default()
        });
        sim.run_until(0);

        for miner in sim.miners() {
            let candidate = miner.current_block();
            assert_eq!(candidate.chain_length, 1);
            let burn = candidate.coin_age_tx().expect("burn embedded");
            assert_eq!(burn.outputs.len(), 1);
            assert_eq!(burn.outputs[0].amount, 1000);
            assert_eq!(Some(burn.outputs[0].address.as_str()), miner.reward_address());
            // Spent and reclaimed in the same step.
            assert_eq!(miner.wallet().balance_on_chain(candidate), 0);
            assert_eq!(miner.wallet().balance_local(), 2000);
        }
    }

    #[test]
    fn run_publishes_reports() {
        let config = SimConfig {
            miner_count: 2,
            ..SimConfig::default()
        };
        let mut published = Vec::new();
        let report = run(&config, 100, 25, 10, |r| published.push(r.tick));
        assert_eq!(published, vec![25, 50, 75, 100]);
        assert_eq!(report.tick, 100);
        assert_eq!(report.miners.len(), 2);
    }
}
