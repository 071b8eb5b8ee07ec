pub mod eligibility;
pub mod miner;

pub use miner::{Miner, MinerConfig, MinerStats};

/// Eligibility threshold every proposal cycle starts from.
pub const BASE_ELIGIBILITY_DIFFICULTY: u32 = 3;

/// Ticks between eligibility retries.
pub const RETRY_INTERVAL_TICKS: u64 = 5;

/// Proof values tried per mining tick before yielding.
pub const DEFAULT_MINING_ROUNDS: u64 = 2000;
