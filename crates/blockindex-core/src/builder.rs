//! Fluent builder API for scheduler configuration.
//!
//! # Example
//!
//! ```rust
//! use blockindex_core::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .evm_start_block(19_000_000)
//!     .dag_start_order(250_000)
//!     .poll_interval_ms(1_000)
//!     .partition_width(500_000)
//!     .build_config();
//! assert_eq!(config.partitions.width, 500_000);
//! ```

use crate::indexer::IndexerConfig;
use crate::partition::PartitionPlan;

/// Fluent builder for `IndexerConfig`.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Set the EVM start block (used only when the table is empty).
    pub fn evm_start_block(mut self, block: u64) -> Self {
        self.config.evm_start_block = block;
        self
    }

    /// Set the DAG start order (used only when the table is empty).
    pub fn dag_start_order(mut self, order: u64) -> Self {
        self.config.dag_start_order = order;
        self
    }

    /// Set the polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(1);
        self
    }

    /// Set the width of each range partition.
    pub fn partition_width(mut self, width: u64) -> Self {
        self.config.partitions = PartitionPlan::new(width, self.config.partitions.initial_windows);
        self
    }

    /// Set how many windows the schema declares up front.
    pub fn initial_windows(mut self, windows: u64) -> Self {
        self.config.partitions = PartitionPlan::new(self.config.partitions.width, windows);
        self
    }

    pub fn partition_headroom(mut self, headroom: u64) -> Self {
        self.config.partition_headroom = headroom;
        self
    }

    /// Create partitions ahead of the cursor (`true`) or only warn (`false`).
    pub fn auto_extend_partitions(mut self, enabled: bool) -> Self {
        self.config.auto_extend_partitions = enabled;
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }
}
