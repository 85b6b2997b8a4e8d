//! # Ledger Environment
//!
//! Contracts in this workspace never read a wall clock themselves. The
//! enclosing ledger sequences transactions one at a time and hands each
//! operation a [`BlockEnv`] snapshot of the current block height and
//! timestamp. Registration windows, redemption dates, and the price
//! freshness gate are all evaluated against this snapshot at call time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The enclosing ledger's view of "now": block height plus timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEnv {
    /// Current block height. Strictly increases as the ledger advances.
    pub number: u64,
    /// Timestamp of the current block.
    pub timestamp: DateTime<Utc>,
}

impl BlockEnv {
    /// Creates an environment snapshot.
    pub fn new(number: u64, timestamp: DateTime<Utc>) -> Self {
        Self { number, timestamp }
    }

    /// An environment at block 0, timestamped now. Test fixtures start here.
    pub fn genesis() -> Self {
        Self {
            number: 0,
            timestamp: Utc::now(),
        }
    }

    /// Returns a copy advanced by `blocks` and `elapsed` time.
    pub fn advanced(&self, blocks: u64, elapsed: Duration) -> Self {
        Self {
            number: self.number + blocks,
            timestamp: self.timestamp + elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advanced_moves_both_axes() {
        let env = BlockEnv::genesis();
        let later = env.advanced(100, Duration::seconds(1200));
        assert_eq!(later.number, 100);
        assert_eq!(later.timestamp - env.timestamp, Duration::seconds(1200));
    }

    #[test]
    fn advanced_by_zero_is_identity() {
        let env = BlockEnv::genesis();
        assert_eq!(env.advanced(0, Duration::zero()), env);
    }

    #[test]
    fn serialization_roundtrip() {
        let env = BlockEnv::genesis().advanced(42, Duration::hours(1));
        let json = serde_json::to_string(&env).unwrap();
        let back: BlockEnv = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }
}
