//! The ingestion scheduler: a single-flight, fixed-interval polling loop.
//!
//! # Bootstrapping
//! Read `MAX(number)` per source from storage. A stored max resumes at
//! `max + 1`; an empty table resumes at the configured start. A storage error
//! is logged and the configured start is used.
//!
//! # Polling ⇄ FetchAndPersist
//! Every tick runs one cycle to completion before the next tick is looked at:
//!   - fetch one EVM block at `evm_next` and one DAG block at `dag_next`
//!   - write both in one atomic store call
//!   - advance both cursors past the written numbers
//!
//! Any failure abandons the cycle with both cursors untouched, so the next tick
//! refetches the same indices. There is no backoff and no retry budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cursor::Cursor;
use crate::error::{IndexerError, StorageError};
use crate::fetcher::BlockFetcher;
use crate::indexer::{IndexerConfig, SchedulerState};
use crate::metrics::MetricsRecorder;
use crate::store::BlockStore;
use crate::types::Source;

/// Why a cycle was abandoned.
#[derive(Debug, Error)]
#[error("cycle failed at {stage}: {error}")]
pub struct CycleFailure {
    /// `"fetch_evm"`, `"fetch_dag"` or `"write"`.
    pub stage: &'static str,
    #[source]
    pub error: IndexerError,
}

impl CycleFailure {
    /// Whether the failure is expected to clear without intervention.
    ///
    /// The same indices are refetched on the next tick regardless; this only
    /// decides how loudly the abandoned cycle is reported.
    pub fn is_retryable(&self) -> bool {
        match &self.error {
            IndexerError::Fetch(e) => e.is_retryable(),
            IndexerError::Storage(e) => matches!(e, StorageError::Unavailable(_)),
            _ => false,
        }
    }
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub evm_number: u64,
    pub dag_number: u64,
    pub took: Duration,
}

/// Drives both fetchers and the writer, one cycle per tick.
pub struct IngestionScheduler {
    config: IndexerConfig,
    evm: Arc<dyn BlockFetcher>,
    dag: Arc<dyn BlockFetcher>,
    store: Arc<dyn BlockStore>,
    metrics: Arc<dyn MetricsRecorder>,
    cursor: Cursor,
    state: SchedulerState,
}

impl IngestionScheduler {
    pub fn new(
        config: IndexerConfig,
        evm: Arc<dyn BlockFetcher>,
        dag: Arc<dyn BlockFetcher>,
        store: Arc<dyn BlockStore>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        debug_assert_eq!(evm.source(), Source::Evm);
        debug_assert_eq!(dag.source(), Source::Dag);
        Self {
            cursor: Cursor::new(config.evm_start_block, config.dag_start_order),
            config,
            evm,
            dag,
            store,
            metrics,
            state: SchedulerState::Idle,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn start_for(&self, source: Source) -> u64 {
        match source {
            Source::Evm => self.config.evm_start_block,
            Source::Dag => self.config.dag_start_order,
        }
    }

    /// Re-derive both cursors from storage.
    ///
    /// A source whose lookup fails keeps its configured start; the first such
    /// error is returned after both sources have been tried.
    pub async fn bootstrap(&mut self) -> Result<Cursor, StorageError> {
        self.state = SchedulerState::Bootstrapping;
        let mut first_err = None;

        for source in Source::ALL {
            let start = self.start_for(source);
            match self.store.latest_number(source).await {
                Ok(latest) => {
                    self.cursor.resume(source, latest, start);
                    debug!(%source, ?latest, next = self.cursor.next(source), "cursor derived from storage");
                }
                Err(e) => {
                    self.cursor.resume(source, None, start);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(self.cursor),
        }
    }

    /// Run one fetch + persist cycle at the current cursor.
    pub async fn run_cycle(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, CycleFailure> {
        self.state = SchedulerState::FetchAndPersist;
        let start = Instant::now();
        let evm_next = self.cursor.evm_next;
        let dag_next = self.cursor.dag_next;

        let (evm_res, dag_res) = tokio::join!(
            self.evm.fetch(evm_next, cancel),
            self.dag.fetch(dag_next, cancel),
        );

        let evm_block = match evm_res {
            Ok(b) => b,
            Err(e) => {
                if let Err(dag_err) = &dag_res {
                    warn!(order = dag_next, kind = dag_err.kind().as_str(), error = %dag_err, "fetch dag block failed");
                }
                return Err(self.fail("fetch_evm", e.into()));
            }
        };
        let dag_block = match dag_res {
            Ok(b) => b,
            Err(e) => return Err(self.fail("fetch_dag", e.into())),
        };

        if let Err(e) = self.store.append_cycle(&evm_block, &dag_block).await {
            return Err(self.fail("write", e.into()));
        }

        self.cursor.advance_past(Source::Evm, evm_block.number);
        self.cursor.advance_past(Source::Dag, dag_block.number);

        let took = start.elapsed();
        self.metrics
            .cycle_succeeded(evm_block.number, dag_block.number, took);
        info!(
            block = evm_block.number,
            hash = %evm_block.hash,
            miner = evm_block.evm.as_ref().map(|e| e.miner.as_str()).unwrap_or(""),
            dag_order = dag_block.number,
            dag_hash = %dag_block.hash,
            took_ms = took.as_millis() as u64,
            "processed cycle"
        );

        self.check_partitions().await;

        Ok(CycleReport {
            evm_number: evm_block.number,
            dag_number: dag_block.number,
            took,
        })
    }

    fn fail(&self, stage: &'static str, error: IndexerError) -> CycleFailure {
        self.metrics.cycle_failed(stage);
        CycleFailure { stage, error }
    }

    fn report_failure(&self, failure: &CycleFailure) {
        let kind = failure.error.fetch_kind().map_or("storage", |k| k.as_str());
        if failure.is_retryable() {
            warn!(
                stage = failure.stage,
                kind,
                error = %failure.error,
                evm_next = self.cursor.evm_next,
                dag_next = self.cursor.dag_next,
                "cycle abandoned; retrying next tick"
            );
        } else {
            error!(
                stage = failure.stage,
                kind,
                error = %failure.error,
                evm_next = self.cursor.evm_next,
                dag_next = self.cursor.dag_next,
                "cycle abandoned on a non-transient failure; source stalls until it clears"
            );
        }
    }

    /// Make sure both cursors stay inside declared partitions.
    ///
    /// With `auto_extend_partitions` the next windows are created ahead of the
    /// cursor; otherwise this only warns. Never fails the caller.
    pub async fn check_partitions(&self) {
        let plan = self.config.partitions;
        let headroom = self.config.partition_headroom;

        for source in Source::ALL {
            let next = self.cursor.next(source);
            let declared = match self.store.declared_windows(source).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(%source, error = %e, "could not read declared partitions");
                    continue;
                }
            };
            if !plan.needs_extension(declared, next, headroom) {
                continue;
            }
            if !self.config.auto_extend_partitions {
                warn!(
                    %source,
                    next,
                    covered_until = declared.saturating_mul(plan.width),
                    "cursor is approaching the last declared partition"
                );
                continue;
            }
            match self
                .store
                .ensure_partitions(source, next.saturating_add(headroom))
                .await
            {
                Ok(0) => {}
                Ok(created) => info!(%source, created, next, "declared new partitions ahead of cursor"),
                Err(e) => warn!(%source, next, error = %e, "failed to extend partitions"),
            }
        }
    }

    /// Run until `cancel` fires. Exits between cycles, never mid-cycle.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), IndexerError> {
        if let Err(e) = self.bootstrap().await {
            warn!(error = %e, "bootstrap from storage failed; using configured start");
        }
        self.check_partitions().await;

        let period = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval_ms = period.as_millis() as u64,
            evm_next = self.cursor.evm_next,
            dag_next = self.cursor.dag_next,
            "indexer started"
        );

        loop {
            self.state = SchedulerState::Polling;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(failure) = self.run_cycle(&cancel).await {
                self.report_failure(&failure);
            }
        }

        self.state = SchedulerState::Stopped;
        info!(
            evm_next = self.cursor.evm_next,
            dag_next = self.cursor.dag_next,
            "indexer stopped"
        );
        Ok(())
    }
}
