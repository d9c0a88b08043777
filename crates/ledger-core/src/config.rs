use serde::{Deserialize, Serialize};

use crate::constants::{
    DIFFICULTY_ADJUSTMENT_INTERVAL, INITIAL_DIFFICULTY, MIN_TRANSACTIONS_PER_BLOCK,
};

/// Per-ledger tunables. Each `Ledger` owns its own copy, so several ledgers
/// in one process never observe each other's threshold changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub min_transactions_per_block: usize,
    pub initial_difficulty: usize,
    /// Blocks per difficulty step. Zero disables the schedule.
    pub difficulty_adjustment_interval: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_transactions_per_block: MIN_TRANSACTIONS_PER_BLOCK,
            initial_difficulty: INITIAL_DIFFICULTY,
            difficulty_adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
        }
    }
}

impl LedgerConfig {
    /// Difficulty required of the block mined on top of a chain holding
    /// `height` blocks.
    pub fn difficulty_at(&self, height: usize) -> usize {
        let steps = height
            .checked_div(self.difficulty_adjustment_interval)
            .unwrap_or(0);
        self.initial_difficulty + steps
    }
}
