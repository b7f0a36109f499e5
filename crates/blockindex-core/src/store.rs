//! Storage contract for the partitioned block tables, plus an in-memory backend.
//!
//! The write half is append-only: there is no update or delete path, and a
//! duplicate `(number, hash)` is reported as [`StorageError::Constraint`]
//! instead of being ignored. The read half serves keyset pages, counts and
//! point lookups.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::partition::PartitionPlan;
use crate::types::{AddressSummary, BlockRecord, Source, TxSummary};

/// Trait implemented by every storage backend (memory, PostgreSQL).
#[async_trait]
pub trait BlockStore: Send + Sync {
    // ── ingestion ────────────────────────────────────────────────────────────

    /// Highest stored number for `source`; `None` when the table is empty.
    async fn latest_number(&self, source: Source) -> Result<Option<u64>, StorageError>;

    /// Append `blocks` to the source's table in one bulk operation.
    async fn append_blocks(&self, source: Source, blocks: &[BlockRecord])
        -> Result<(), StorageError>;

    /// Append one record per source atomically: both rows land or neither does.
    async fn append_cycle(&self, evm: &BlockRecord, dag: &BlockRecord)
        -> Result<(), StorageError>;

    /// Number of contiguous windows currently declared for `source`.
    async fn declared_windows(&self, source: Source) -> Result<u64, StorageError>;

    /// Declare every missing window up to the one containing `through`.
    /// Returns how many windows were created.
    async fn ensure_partitions(&self, source: Source, through: u64) -> Result<u64, StorageError>;

    // ── reads ────────────────────────────────────────────────────────────────

    /// Up to `limit` rows ordered by `number` descending, restricted to
    /// `number < before` when given.
    async fn list_blocks(
        &self,
        source: Source,
        limit: u32,
        before: Option<u64>,
    ) -> Result<Vec<BlockRecord>, StorageError>;

    async fn count_blocks(&self, source: Source) -> Result<u64, StorageError>;

    async fn block_by_number(
        &self,
        source: Source,
        number: u64,
    ) -> Result<Option<BlockRecord>, StorageError>;

    async fn block_by_hash(
        &self,
        source: Source,
        hash: &str,
    ) -> Result<Option<BlockRecord>, StorageError>;

    async fn tx_by_hash(&self, hash: &str) -> Result<Option<TxSummary>, StorageError>;

    async fn address(&self, address: &str) -> Result<Option<AddressSummary>, StorageError>;

    /// Transactions sent from or to `address`, newest first.
    async fn address_txs(&self, address: &str, limit: u32)
        -> Result<Vec<TxSummary>, StorageError>;
}

// ─── In-memory store ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Table {
    rows: BTreeMap<u64, Vec<BlockRecord>>,
    declared: u64,
}

impl Table {
    fn check(&self, plan: &PartitionPlan, block: &BlockRecord) -> Result<(), StorageError> {
        if plan.window_of(block.number) >= self.declared {
            return Err(StorageError::NoPartition { number: block.number });
        }
        let duplicate = self
            .rows
            .get(&block.number)
            .map(|v| v.iter().any(|b| b.hash == block.hash))
            .unwrap_or(false);
        if duplicate {
            return Err(StorageError::Constraint(format!(
                "duplicate key (number, hash)=({}, {})",
                block.number, block.hash
            )));
        }
        Ok(())
    }

    fn insert(&mut self, block: BlockRecord) {
        self.rows.entry(block.number).or_default().push(block);
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<Source, Table>,
    txs: Vec<TxSummary>,
    addresses: HashMap<String, AddressSummary>,
    forced: Option<StorageError>,
    failing_writes: Option<Source>,
}

/// In-memory block store with the same partition and uniqueness rules as the
/// PostgreSQL backend.
///
/// All data is lost when the store is dropped. Useful for tests and dry runs.
pub struct MemoryBlockStore {
    plan: PartitionPlan,
    state: Mutex<State>,
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new(PartitionPlan::default())
    }
}

impl MemoryBlockStore {
    pub fn new(plan: PartitionPlan) -> Self {
        let mut state = State::default();
        for source in Source::ALL {
            state.tables.insert(
                source,
                Table {
                    rows: BTreeMap::new(),
                    declared: plan.initial_windows,
                },
            );
        }
        Self {
            plan,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulate the database going away (every call fails with `Unavailable`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_with(unavailable.then(|| StorageError::Unavailable("memory store offline".into())));
    }

    /// Make every call fail with `error`, or clear with `None`.
    pub fn fail_with(&self, error: Option<StorageError>) {
        self.lock().forced = error;
    }

    /// Make every write touching `source` fail, or clear with `None`.
    pub fn fail_writes_for(&self, source: Option<Source>) {
        self.lock().failing_writes = source;
    }

    pub fn insert_tx(&self, tx: TxSummary) {
        self.lock().txs.push(tx);
    }

    pub fn insert_address(&self, summary: AddressSummary) {
        self.lock().addresses.insert(summary.address.clone(), summary);
    }

    /// All stored numbers for `source`, ascending, one entry per row.
    pub fn numbers(&self, source: Source) -> Vec<u64> {
        let state = self.lock();
        state
            .tables
            .get(&source)
            .map(|t| {
                t.rows
                    .iter()
                    .flat_map(|(n, v)| std::iter::repeat(*n).take(v.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn guard(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        let state = self.lock();
        if let Some(e) = &state.forced {
            return Err(e.clone());
        }
        Ok(state)
    }

    fn write_guard(&self, sources: &[Source]) -> Result<MutexGuard<'_, State>, StorageError> {
        let state = self.guard()?;
        if let Some(failing) = state.failing_writes {
            if sources.contains(&failing) {
                return Err(StorageError::Query(format!("injected write failure for {failing}")));
            }
        }
        Ok(state)
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn latest_number(&self, source: Source) -> Result<Option<u64>, StorageError> {
        let state = self.guard()?;
        Ok(state
            .tables
            .get(&source)
            .and_then(|t| t.rows.keys().next_back().copied()))
    }

    async fn append_blocks(
        &self,
        source: Source,
        blocks: &[BlockRecord],
    ) -> Result<(), StorageError> {
        let mut state = self.write_guard(&[source])?;
        let table = state.tables.entry(source).or_default();
        for (i, block) in blocks.iter().enumerate() {
            table.check(&self.plan, block)?;
            if blocks[..i]
                .iter()
                .any(|b| b.number == block.number && b.hash == block.hash)
            {
                return Err(StorageError::Constraint(format!(
                    "duplicate key (number, hash)=({}, {}) within batch",
                    block.number, block.hash
                )));
            }
        }
        for block in blocks {
            table.insert(block.clone());
        }
        Ok(())
    }

    async fn append_cycle(
        &self,
        evm: &BlockRecord,
        dag: &BlockRecord,
    ) -> Result<(), StorageError> {
        let mut state = self.write_guard(&[Source::Evm, Source::Dag])?;
        state.tables.entry(Source::Evm).or_default().check(&self.plan, evm)?;
        state.tables.entry(Source::Dag).or_default().check(&self.plan, dag)?;
        state.tables.entry(Source::Evm).or_default().insert(evm.clone());
        state.tables.entry(Source::Dag).or_default().insert(dag.clone());
        Ok(())
    }

    async fn declared_windows(&self, source: Source) -> Result<u64, StorageError> {
        let state = self.guard()?;
        Ok(state.tables.get(&source).map(|t| t.declared).unwrap_or(0))
    }

    async fn ensure_partitions(&self, source: Source, through: u64) -> Result<u64, StorageError> {
        let mut state = self.guard()?;
        let table = state.tables.entry(source).or_default();
        let missing = self.plan.missing_through(table.declared, through);
        let created = missing.end - missing.start;
        table.declared = missing.end;
        Ok(created)
    }

    async fn list_blocks(
        &self,
        source: Source,
        limit: u32,
        before: Option<u64>,
    ) -> Result<Vec<BlockRecord>, StorageError> {
        let state = self.guard()?;
        let Some(table) = state.tables.get(&source) else {
            return Ok(vec![]);
        };
        let upper = before.unwrap_or(u64::MAX);
        Ok(table
            .rows
            .range(..upper)
            .rev()
            .flat_map(|(_, v)| v.iter().cloned())
            .take(limit as usize)
            .collect())
    }

    async fn count_blocks(&self, source: Source) -> Result<u64, StorageError> {
        let state = self.guard()?;
        Ok(state
            .tables
            .get(&source)
            .map(|t| t.rows.values().map(|v| v.len() as u64).sum())
            .unwrap_or(0))
    }

    async fn block_by_number(
        &self,
        source: Source,
        number: u64,
    ) -> Result<Option<BlockRecord>, StorageError> {
        let state = self.guard()?;
        Ok(state
            .tables
            .get(&source)
            .and_then(|t| t.rows.get(&number))
            .and_then(|v| v.first().cloned()))
    }

    async fn block_by_hash(
        &self,
        source: Source,
        hash: &str,
    ) -> Result<Option<BlockRecord>, StorageError> {
        let state = self.guard()?;
        Ok(state.tables.get(&source).and_then(|t| {
            t.rows
                .values()
                .flat_map(|v| v.iter())
                .find(|b| b.hash == hash)
                .cloned()
        }))
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Option<TxSummary>, StorageError> {
        let state = self.guard()?;
        Ok(state.txs.iter().find(|t| t.hash == hash).cloned())
    }

    async fn address(&self, address: &str) -> Result<Option<AddressSummary>, StorageError> {
        let state = self.guard()?;
        Ok(state.addresses.get(address).cloned())
    }

    async fn address_txs(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<TxSummary>, StorageError> {
        let state = self.guard()?;
        let mut txs: Vec<TxSummary> = state
            .txs
            .iter()
            .filter(|t| t.from == address || t.to == address)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        txs.truncate(limit as usize);
        Ok(txs)
    }
}
