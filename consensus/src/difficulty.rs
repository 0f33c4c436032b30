//! Proof-of-work difficulty rules.
//!
//! Difficulty is a plain integer count of required leading zero bits, not a
//! Bitcoin-style compact target. Retargeting runs every `RETARGET_INTERVAL`
//! blocks against a `BLOCK_TIME_TARGET_SECS`-second interval.

use log::debug;

/// Blocks between difficulty retargets.
pub const RETARGET_INTERVAL: u64 = 10;

/// Target seconds per block.
pub const BLOCK_TIME_TARGET_SECS: u64 = 10;

/// Expected seconds for one full retarget window.
pub const EXPECTED_WINDOW_SECS: u64 = RETARGET_INTERVAL * BLOCK_TIME_TARGET_SECS;

/// Render a hex string as its binary expansion, 4 bits per nibble.
pub fn hex_to_bin(hex_str: &str) -> String {
    let mut out = String::with_capacity(hex_str.len() * 4);
    for c in hex_str.chars() {
        let nibble = c.to_digit(16).unwrap_or(0);
        out.push_str(&format!("{:04b}", nibble));
    }
    out
}

/// A hash (given as lowercase hex) satisfies `difficulty` iff its binary
/// expansion begins with `difficulty` zero bits.
pub fn matches_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let bin = hex_to_bin(hash_hex);
    let prefix: String = std::iter::repeat('0').take(difficulty as usize).collect();
    bin.starts_with(&prefix)
}

/// Compute the next block's difficulty given the latest block's index,
/// difficulty, and timestamp, plus the difficulty/timestamp of the block
/// `RETARGET_INTERVAL` positions back (the retarget reference block).
pub fn next_difficulty(
    latest_index: u64,
    latest_difficulty: u32,
    latest_timestamp: u64,
    retarget_ref_difficulty: u32,
    retarget_ref_timestamp: u64,
) -> u32 {
    if latest_index % RETARGET_INTERVAL == 0 && latest_index != 0 {
        let taken = latest_timestamp.saturating_sub(retarget_ref_timestamp);
        let next = if taken < EXPECTED_WINDOW_SECS / 2 {
            retarget_ref_difficulty + 1
        } else if taken > EXPECTED_WINDOW_SECS * 2 {
            retarget_ref_difficulty.saturating_sub(1)
        } else {
            retarget_ref_difficulty
        };
        debug!(
            "retarget at height {}: taken={}s expected={}s -> difficulty {}",
            latest_index, taken, EXPECTED_WINDOW_SECS, next
        );
        next
    } else {
        latest_difficulty
    }
}
