//! Scheduler configuration and state types.

use serde::{Deserialize, Serialize};

use crate::partition::PartitionPlan;

/// Configuration for an [`IngestionScheduler`](crate::scheduler::IngestionScheduler).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// First EVM block to fetch when the `blocks` table is empty.
    pub evm_start_block: u64,
    /// First DAG order to fetch when the `dag_blocks` table is empty.
    pub dag_start_order: u64,
    /// Tick interval of the polling loop (milliseconds).
    pub poll_interval_ms: u64,
    /// Partition layout of the block tables.
    pub partitions: PartitionPlan,
    /// How close (in block numbers) a cursor may get to the end of the last
    /// declared window before the scheduler reacts.
    pub partition_headroom: u64,
    /// Create the next windows automatically instead of only warning.
    pub auto_extend_partitions: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            evm_start_block: 0,
            dag_start_order: 0,
            poll_interval_ms: 2000,
            partitions: PartitionPlan::default(),
            partition_headroom: 10_000,
            auto_extend_partitions: true,
        }
    }
}

/// Runtime state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// Not yet started.
    Idle,
    /// Re-deriving cursors from storage.
    Bootstrapping,
    /// Waiting for the next tick.
    Polling,
    /// Running one fetch + persist cycle.
    FetchAndPersist,
    /// Loop exited after cancellation.
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::Polling => write!(f, "polling"),
            Self::FetchAndPersist => write!(f, "fetch-and-persist"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
