//! The block-fetching capability shared by both sources.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::types::{BlockRecord, Source};

/// Fetches one normalized block per call from an upstream source.
///
/// Implementations keep all wire-shape parsing private and bound every call
/// with their own timeout. `cancel` shortens that deadline: once it fires the
/// call must return a [`FetchError::Transport`] promptly.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Which source this fetcher reads from.
    fn source(&self) -> Source;

    /// Fetch the block at `index` (block number or order index).
    async fn fetch(
        &self,
        index: u64,
        cancel: &CancellationToken,
    ) -> Result<BlockRecord, FetchError>;
}
