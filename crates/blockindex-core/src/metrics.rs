//! Metrics recorder interface.
//!
//! The scheduler and the API take a recorder at construction time instead of
//! touching process-wide state. [`BlockIndexMetrics`] records into OpenTelemetry
//! instruments; no exporter is installed here, so the binary decides where
//! they go.
//!
//! ## Instruments
//! - `blockindex.cycles`              counter
//! - `blockindex.cycle_failures`      counter, tagged with `stage`
//! - `blockindex.cycle_latency_ms`    histogram
//! - `blockindex.requests`            counter, tagged with `route` + `status`
//! - `blockindex.request_latency_ms`  histogram, tagged with `route`

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use serde::Serialize;

/// Sink for pipeline and API measurements.
pub trait MetricsRecorder: Send + Sync {
    /// A cycle persisted both sources and advanced both cursors.
    fn cycle_succeeded(&self, evm_number: u64, dag_number: u64, took: Duration);

    /// A cycle was abandoned at `stage` (`"fetch_evm"`, `"fetch_dag"`, `"write"`).
    fn cycle_failed(&self, stage: &'static str);

    /// An HTTP request finished.
    fn request_served(&self, route: &str, status: u16, took: Duration);
}

/// Recorder that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn cycle_succeeded(&self, _: u64, _: u64, _: Duration) {}
    fn cycle_failed(&self, _: &'static str) {}
    fn request_served(&self, _: &str, _: u16, _: Duration) {}
}

/// OpenTelemetry-backed recorder used by the binary.
#[derive(Clone)]
pub struct BlockIndexMetrics {
    cycles: Counter<u64>,
    cycle_failures: Counter<u64>,
    cycle_latency_ms: Histogram<f64>,
    requests: Counter<u64>,
    request_latency_ms: Histogram<f64>,
}

impl BlockIndexMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            cycles: meter
                .u64_counter("blockindex.cycles")
                .with_description("Cycles that persisted both sources")
                .build(),
            cycle_failures: meter
                .u64_counter("blockindex.cycle_failures")
                .with_description("Abandoned cycles by stage")
                .build(),
            cycle_latency_ms: meter
                .f64_histogram("blockindex.cycle_latency_ms")
                .with_description("Fetch + persist time of a successful cycle in milliseconds")
                .build(),
            requests: meter
                .u64_counter("blockindex.requests")
                .with_description("HTTP requests served")
                .build(),
            request_latency_ms: meter
                .f64_histogram("blockindex.request_latency_ms")
                .with_description("HTTP request latency in milliseconds")
                .build(),
        }
    }

    /// Instruments on the global meter provider.
    pub fn global() -> Self {
        Self::new(&opentelemetry::global::meter("blockindex"))
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

impl MetricsRecorder for BlockIndexMetrics {
    fn cycle_succeeded(&self, _evm_number: u64, _dag_number: u64, took: Duration) {
        self.cycles.add(1, &[]);
        self.cycle_latency_ms.record(millis(took), &[]);
    }

    fn cycle_failed(&self, stage: &'static str) {
        self.cycle_failures.add(1, &[KeyValue::new("stage", stage)]);
    }

    fn request_served(&self, route: &str, status: u16, took: Duration) {
        self.requests.add(
            1,
            &[
                KeyValue::new("route", route.to_string()),
                KeyValue::new("status", i64::from(status)),
            ],
        );
        self.request_latency_ms
            .record(millis(took), &[KeyValue::new("route", route.to_string())]);
    }
}

/// In-process counters readable through [`CountingMetrics::snapshot`]; used by
/// tests and dry runs to assert on what was recorded.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    cycles_ok: AtomicU64,
    fetch_failures: AtomicU64,
    write_failures: AtomicU64,
    last_evm: AtomicU64,
    last_dag: AtomicU64,
    requests: AtomicU64,
    server_errors: AtomicU64,
    request_micros: AtomicU64,
}

/// Point-in-time copy of [`CountingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles_ok: u64,
    pub fetch_failures: u64,
    pub write_failures: u64,
    pub last_evm: u64,
    pub last_dag: u64,
    pub requests: u64,
    pub server_errors: u64,
    pub request_micros: u64,
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_ok: self.cycles_ok.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            last_evm: self.last_evm.load(Ordering::Relaxed),
            last_dag: self.last_dag.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            request_micros: self.request_micros.load(Ordering::Relaxed),
        }
    }
}

impl MetricsRecorder for CountingMetrics {
    fn cycle_succeeded(&self, evm_number: u64, dag_number: u64, _took: Duration) {
        self.cycles_ok.fetch_add(1, Ordering::Relaxed);
        self.last_evm.store(evm_number, Ordering::Relaxed);
        self.last_dag.store(dag_number, Ordering::Relaxed);
    }

    fn cycle_failed(&self, stage: &'static str) {
        if stage == "write" {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn request_served(&self, _route: &str, status: u16, took: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if status >= 500 {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.request_micros
            .fetch_add(took.as_micros() as u64, Ordering::Relaxed);
    }
}
