use serde::Serialize;
use std::sync::Mutex;

use crate::sim::{BalanceEntry, SimulationReport};

/// Shared application state: the latest report published by the simulation thread.
#[derive(Default)]
pub struct AppState {
    pub report: Mutex<SimulationReport>,
}

#[derive(Serialize)]
pub struct MinerSummary {
    pub name: String,
    pub chain_length: u64,
    pub tip_hash: String,
    pub halted: bool,
}

#[derive(Serialize)]
pub struct MinersResponse {
    pub tick: u64,
    pub generated_at: String,
    pub miners: Vec<MinerSummary>,
}

#[derive(Serialize)]
pub struct BalanceResponse<'a> {
    pub miner: &'a str,
    pub tick: u64,
    pub chain_length: u64,
    pub balance_local: u64,
    pub balances: &'a [BalanceEntry],
}
