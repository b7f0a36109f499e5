//! Range partition plan for the block tables.
//!
//! Every block table is range-partitioned on `number` into fixed-width windows
//! `[k * width, (k + 1) * width)`. Windows are declared ahead of time; a write
//! that lands outside every declared window must fail, so the plan also tells
//! the scheduler when the cursor is getting close to the last declared window.

use std::ops::Range;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PARTITION_WIDTH: u64 = 1_000_000;

/// Fixed-width partition layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPlan {
    /// Width of every window in block numbers.
    pub width: u64,
    /// Number of windows declared at schema bootstrap.
    pub initial_windows: u64,
}

impl Default for PartitionPlan {
    fn default() -> Self {
        Self {
            width: DEFAULT_PARTITION_WIDTH,
            initial_windows: 2,
        }
    }
}

impl PartitionPlan {
    pub fn new(width: u64, initial_windows: u64) -> Self {
        Self {
            width: width.max(1),
            initial_windows,
        }
    }

    /// Index of the window containing `number`.
    pub fn window_of(&self, number: u64) -> u64 {
        number / self.width
    }

    /// Number range covered by window `index`.
    pub fn range(&self, index: u64) -> Range<u64> {
        let start = index.saturating_mul(self.width);
        start..start.saturating_add(self.width)
    }

    /// Windows declared at bootstrap.
    pub fn initial_ranges(&self) -> Vec<Range<u64>> {
        (0..self.initial_windows).map(|i| self.range(i)).collect()
    }

    /// Physical table name for window `index` of `table` (e.g. `blocks_p3`).
    pub fn partition_name(table: &str, index: u64) -> String {
        format!("{table}_p{index}")
    }

    /// Windows that must exist so that every number up to and including
    /// `through` is covered, given `declared` windows `0..declared`.
    pub fn missing_through(&self, declared: u64, through: u64) -> Range<u64> {
        let needed = self.window_of(through) + 1;
        declared..needed.max(declared)
    }

    /// Returns `true` if `next` is within `headroom` numbers of the end of the
    /// last of `declared` windows.
    pub fn needs_extension(&self, declared: u64, next: u64, headroom: u64) -> bool {
        let covered_until = declared.saturating_mul(self.width);
        next.saturating_add(headroom) >= covered_until
    }
}
