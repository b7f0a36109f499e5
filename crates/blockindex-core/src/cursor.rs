//! Ingestion cursor: the next index to fetch for each source.

use serde::{Deserialize, Serialize};

use crate::types::Source;

/// The scheduler's position in both chains.
///
/// The cursor is never persisted on its own. It is re-derived from the highest
/// stored number on startup, so the only way it moves forward is through a
/// durable write of the record it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Next EVM block number to fetch.
    pub evm_next: u64,
    /// Next DAG order index to fetch.
    pub dag_next: u64,
}

impl Cursor {
    pub fn new(evm_next: u64, dag_next: u64) -> Self {
        Self { evm_next, dag_next }
    }

    pub fn next(&self, source: Source) -> u64 {
        match source {
            Source::Evm => self.evm_next,
            Source::Dag => self.dag_next,
        }
    }

    /// Position the cursor for `source` given the highest stored number.
    ///
    /// `None` means the table is empty and `start` is used instead.
    pub fn resume(&mut self, source: Source, latest_stored: Option<u64>, start: u64) {
        let next = latest_stored.map(|n| n + 1).unwrap_or(start);
        self.set(source, next);
    }

    /// Move past a record that has just been written. Never moves backwards.
    pub fn advance_past(&mut self, source: Source, written: u64) {
        let next = self.next(source).max(written.saturating_add(1));
        self.set(source, next);
    }

    fn set(&mut self, source: Source, next: u64) {
        match source {
            Source::Evm => self.evm_next = next,
            Source::Dag => self.dag_next = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_from_stored_max() {
        let mut cursor = Cursor::new(0, 0);
        cursor.resume(Source::Evm, Some(41), 0);
        cursor.resume(Source::Dag, Some(9), 0);
        assert_eq!(cursor, Cursor::new(42, 10));
    }

    #[test]
    fn resume_empty_table_uses_start() {
        let mut cursor = Cursor::new(0, 0);
        cursor.resume(Source::Evm, None, 19_000_000);
        assert_eq!(cursor.next(Source::Evm), 19_000_000);
        assert_eq!(cursor.next(Source::Dag), 0);
    }

    #[test]
    fn advance_past_written() {
        let mut cursor = Cursor::new(5, 5);
        cursor.advance_past(Source::Dag, 5);
        assert_eq!(cursor.dag_next, 6);
        assert_eq!(cursor.evm_next, 5);
    }

    #[test]
    fn advance_past_older_record_keeps_position() {
        let mut cursor = Cursor::new(10, 10);
        cursor.advance_past(Source::Evm, 3);
        assert_eq!(cursor.evm_next, 10);
        cursor.advance_past(Source::Evm, u64::MAX);
        assert_eq!(cursor.evm_next, u64::MAX);
    }
}
