use sha2::{Digest, Sha256};

/// Width of the projected bit strings.
pub const PROJECTION_BITS: usize = 16;

/// Project `value` onto a fixed-width binary string: the first
/// [`PROJECTION_BITS`] bits of its SHA-256 digest.
pub fn project_bits(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let prefix = u16::from_be_bytes([digest[0], digest[1]]);
    format!("{:0width$b}", prefix, width = PROJECTION_BITS)
}

/// Number of leading positions where `a` and `b` agree.
pub fn matching_prefix_bits(a: &str, b: &str) -> u32 {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count() as u32
}

/// Leading bits shared by the projections of the previous block hash and
/// a wallet's eligibility fingerprint.
pub fn eligibility_bits(prev_block_hash: &str, fingerprint: &str) -> u32 {
    matching_prefix_bits(&project_bits(prev_block_hash), &project_bits(fingerprint))
}

/// Threshold a validator applies to a block started at `claimed_timestamp`:
/// one bit easier for every full retry interval that has passed since.
pub fn adjusted_threshold(base: u32, claimed_timestamp: u64, now: u64, retry_interval: u64) -> u32 {
    let elapsed = now.saturating_sub(claimed_timestamp);
    let retries = elapsed / retry_interval.max(1);
    base.saturating_sub(u32::try_from(retries).unwrap_or(u32::MAX))
}
