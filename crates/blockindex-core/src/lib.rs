//! blockindex-core: the dual-source ingestion pipeline and its read-back contract.
//!
//! # Architecture
//!
//! ```text
//! IngestionScheduler
//!     ├── BlockFetcher (EVM)    ┐
//!     ├── BlockFetcher (DAG)    ┘ one block per source per cycle
//!     ├── Cursor                (next index per source, re-derived on boot)
//!     ├── BlockStore            (partitioned append-only tables)
//!     └── MetricsRecorder       (injected, no globals)
//!
//! PagedReader ── BlockStore     (keyset pagination, counts, lookups)
//! ```

pub mod builder;
pub mod cursor;
pub mod error;
pub mod fetcher;
pub mod indexer;
pub mod metrics;
pub mod partition;
pub mod reader;
pub mod scheduler;
pub mod store;
pub mod types;

pub use builder::IndexerBuilder;
pub use cursor::Cursor;
pub use error::{FetchError, FetchErrorKind, IndexerError, StorageError};
pub use fetcher::BlockFetcher;
pub use indexer::{IndexerConfig, SchedulerState};
pub use metrics::{BlockIndexMetrics, CountingMetrics, MetricsRecorder, MetricsSnapshot, NoopMetrics};
pub use partition::PartitionPlan;
pub use reader::{Page, PagedReader};
pub use scheduler::{CycleFailure, CycleReport, IngestionScheduler};
pub use store::{BlockStore, MemoryBlockStore};
pub use types::{AddressSummary, BlockCounts, BlockRecord, EvmExtension, Source, TxSummary};
