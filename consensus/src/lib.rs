//! Proof-of-work consensus rules for SmellyCoin.
//!
//! Difficulty is a leading-zero-bit count rather than a Bitcoin-style
//! compact target; this crate owns the retarget and bit-matching math so
//! `core`'s block engine can stay free of the arithmetic.

pub mod difficulty;

pub use difficulty::{
    matches_difficulty, next_difficulty, BLOCK_TIME_TARGET_SECS, EXPECTED_WINDOW_SECS,
    RETARGET_INTERVAL,
};
