use std::sync::Arc;

use blockindex_core::{BlockStore, MetricsRecorder, PagedReader};

/// Shared, cheaply cloned handler state.
#[derive(Clone)]
pub struct AppState {
    pub reader: PagedReader,
    pub metrics: Arc<dyn MetricsRecorder>,
}

impl AppState {
    pub fn new(store: Arc<dyn BlockStore>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            reader: PagedReader::new(store),
            metrics,
        }
    }
}
