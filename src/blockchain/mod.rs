pub mod block;

pub use block::Block;

/// Coinbase paid to the miner of each block.
pub const COINBASE_AMOUNT: u64 = 25;

/// Proof target (leading zero bits) for a miner with no coin-age.
pub const BASE_POW_TARGET_BITS: u32 = 12;
