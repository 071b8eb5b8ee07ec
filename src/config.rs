use std::env;
use std::str::FromStr;

use crate::sim::SimConfig;

/// Process configuration, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Serve the report API instead of exiting when the run ends.
    pub serve_api: bool,
    pub run_ticks: u64,
    pub report_every: u64,
    /// Paid from the first miner to the second halfway through; 0 disables.
    pub transfer_amount: u64,
    pub sim: SimConfig,
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SimConfig::default();
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: var_or("PORT", 8080),
            serve_api: var_or("SERVE_API", false),
            run_ticks: var_or("RUN_TICKS", 2000),
            report_every: var_or("REPORT_EVERY", 100),
            transfer_amount: var_or("TRANSFER_AMOUNT", 40),
            sim: SimConfig {
                miner_count: var_or("MINER_COUNT", defaults.miner_count),
                genesis_stake: var_or("GENESIS_STAKE", defaults.genesis_stake),
                mining_rounds: var_or("MINING_ROUNDS", defaults.mining_rounds),
                base_eligibility_difficulty: var_or(
                    "BASE_ELIGIBILITY_DIFFICULTY",
                    defaults.base_eligibility_difficulty,
                ),
                retry_interval: var_or("RETRY_INTERVAL_TICKS", defaults.retry_interval),
                single_shot: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_values_fall_back() {
        // SAFETY: test-only env mutation on a key nothing else reads.
        unsafe { env::set_var("COINAGE_TEST_NOT_A_NUMBER", "abc") };
        assert_eq!(var_or("COINAGE_TEST_NOT_A_NUMBER", 7u64), 7);
        unsafe { env::set_var("COINAGE_TEST_NUMBER", " 12 ") };
        assert_eq!(var_or("COINAGE_TEST_NUMBER", 7u64), 12);
        assert!(!var_or("COINAGE_TEST_MISSING", false));
    }
}
