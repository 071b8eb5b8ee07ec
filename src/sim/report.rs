use chrono::Utc;
use serde::Serialize;

use crate::mining::{Miner, MinerStats};

#[derive(Debug, Clone, Serialize)]
pub struct BalanceEntry {
    pub name: String,
    pub balance: u64,
}

/// One miner's state, with everyone's confirmed balance as that miner sees it.
#[derive(Debug, Clone, Serialize)]
pub struct MinerReport {
    pub id: String,
    pub name: String,
    pub chain_length: u64,
    pub tip_hash: String,
    pub prev_block_hash: Option<String>,
    pub balance_local: u64,
    pub balances: Vec<BalanceEntry>,
    pub cached_blocks: usize,
    pub dynamic_difficulty: u32,
    pub halted: bool,
    pub stats: MinerStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub tick: u64,
    pub generated_at: String,
    pub miners: Vec<MinerReport>,
}

impl SimulationReport {
    pub fn capture(tick: u64, miners: &[Miner]) -> Self {
        let reports = miners
            .iter()
            .map(|miner| {
                let view = miner.current_block();
                MinerReport {
                    id: miner.id().to_string(),
                    name: miner.name().to_string(),
                    chain_length: view.chain_length,
                    tip_hash: view.hash(),
                    prev_block_hash: view.prev_block_hash.clone(),
                    balance_local: miner.wallet().balance_local(),
                    balances: miners
                        .iter()
                        .map(|other| BalanceEntry {
                            name: other.name().to_string(),
                            balance: other.wallet().balance_on_chain(view),
                        })
                        .collect(),
                    cached_blocks: miner.previous_blocks().len(),
                    dynamic_difficulty: miner.dynamic_difficulty(),
                    halted: miner.is_halted(),
                    stats: miner.stats().clone(),
                }
            })
            .collect();

        Self {
            tick,
            generated_at: Utc::now().to_rfc3339(),
            miners: reports,
        }
    }

    pub fn miner(&self, name: &str) -> Option<&MinerReport> {
        self.miners.iter().find(|m| m.name == name)
    }

    /// Console summary, one line per miner and one per balance it sees.
    pub fn render(&self) -> String {
        let mut out = format!("tick {} ({})\n", self.tick, self.generated_at);
        for miner in &self.miners {
            out.push_str(&format!(
                "{} chain={} mined={} adopted={} rejected={}{}\n",
                miner.name,
                miner.chain_length,
                miner.stats.blocks_mined,
                miner.stats.blocks_adopted,
                miner.stats.blocks_rejected,
                if miner.halted { " HALTED" } else { "" }
            ));
            for entry in &miner.balances {
                out.push_str(&format!("    {:>8}: {}\n", entry.name, entry.balance));
            }
        }
        out
    }
}
