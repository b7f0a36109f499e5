//! Read path: keyset pagination, counts and point lookups over a [`BlockStore`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::store::BlockStore;
use crate::types::{AddressSummary, BlockCounts, BlockRecord, Source, TxSummary};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Parse a `limit` query parameter.
///
/// Missing, non-numeric, zero or negative values fall back to the default;
/// anything above the maximum is clamped.
pub fn clamp_limit(raw: Option<&str>) -> u32 {
    match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
        Some(n) if n > 0 => n.min(MAX_PAGE_LIMIT as i64) as u32,
        _ => DEFAULT_PAGE_LIMIT,
    }
}

/// Parse a `cursor` query parameter. Empty means "start from the newest row".
pub fn parse_cursor(raw: Option<&str>) -> Result<Option<u64>, IndexerError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|_| IndexerError::Validation(format!("invalid cursor {s:?}"))),
    }
}

/// One page of blocks, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Pass back as `cursor` to get the next page; empty when there is none.
    pub cursor: String,
    pub items: Vec<BlockRecord>,
}

impl Page {
    pub fn next_cursor(&self) -> Option<u64> {
        self.cursor.parse().ok()
    }
}

/// Stateless reader shared by every HTTP handler.
#[derive(Clone)]
pub struct PagedReader {
    store: Arc<dyn BlockStore>,
}

impl PagedReader {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }

    /// Up to `limit` blocks with `number < before`, newest first.
    pub async fn list(
        &self,
        source: Source,
        limit: u32,
        before: Option<u64>,
    ) -> Result<Page, IndexerError> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let mut items = self.store.list_blocks(source, limit + 1, before).await?;

        let cursor = if items.len() > limit as usize {
            items.truncate(limit as usize);
            items
                .last()
                .map(|b| b.number.to_string())
                .unwrap_or_default()
        } else {
            String::new()
        };

        Ok(Page { cursor, items })
    }

    pub async fn counts(&self) -> Result<BlockCounts, IndexerError> {
        Ok(BlockCounts {
            evm_blocks: self.store.count_blocks(Source::Evm).await?,
            dag_blocks: self.store.count_blocks(Source::Dag).await?,
        })
    }

    /// Look a block up by number or hash.
    ///
    /// A numeric `id` is an EVM block number. Anything else is a hash, tried
    /// against the EVM table first and then the DAG table.
    pub async fn block(&self, id: &str) -> Result<BlockRecord, IndexerError> {
        let found = match id.parse::<u64>() {
            Ok(number) => self.store.block_by_number(Source::Evm, number).await?,
            Err(_) => match self.store.block_by_hash(Source::Evm, id).await? {
                Some(b) => Some(b),
                None => self.store.block_by_hash(Source::Dag, id).await?,
            },
        };
        found.ok_or_else(|| IndexerError::NotFound(format!("block {id}")))
    }

    pub async fn tx(&self, hash: &str) -> Result<TxSummary, IndexerError> {
        self.store
            .tx_by_hash(hash)
            .await?
            .ok_or_else(|| IndexerError::NotFound(format!("transaction {hash}")))
    }

    /// Unknown addresses get a zero-balance summary rather than a 404.
    pub async fn address(&self, address: &str) -> Result<AddressSummary, IndexerError> {
        Ok(self
            .store
            .address(address)
            .await?
            .unwrap_or_else(|| AddressSummary::empty(address)))
    }

    pub async fn address_txs(
        &self,
        address: &str,
        limit: u32,
    ) -> Result<Vec<TxSummary>, IndexerError> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        Ok(self.store.address_txs(address, limit).await?)
    }
}
