//! Error types for the blockindex pipeline.

use thiserror::Error;

/// JSON-RPC `limit exceeded` (rate limiting).
pub const RPC_LIMIT_EXCEEDED: i64 = -32005;

/// Failure while fetching a block from an upstream RPC source.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The source could not be reached (connect failure, timeout, cancellation, bad HTTP status).
    #[error("transport error: {0}")]
    Transport(String),

    /// The source answered with an explicit JSON-RPC error object, or with no result.
    #[error("rpc error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// The response did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Coarse classification of a [`FetchError`], used by retry policy and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Transport,
    Protocol,
    Decode,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Decode => "decode",
        }
    }
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Transport(_) => FetchErrorKind::Transport,
            Self::Protocol { .. } => FetchErrorKind::Protocol,
            Self::Decode(_) => FetchErrorKind::Decode,
        }
    }

    /// Returns `true` if the failure is expected to clear on its own: transport
    /// failures, a block the node has not produced yet, and rate limiting.
    ///
    /// The scheduler refetches the same index on the next tick either way; a
    /// non-retryable failure is reported louder because it stalls the source
    /// until the node or the decoder changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Protocol { code, .. } => *code == 0 || *code == RPC_LIMIT_EXCEEDED,
            Self::Decode(_) => false,
        }
    }

    pub fn no_result() -> Self {
        Self::Protocol {
            code: 0,
            message: "rpc returned no result".into(),
        }
    }
}

/// Failure reported by a storage backend.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The database could not be reached (pool exhausted, connection refused, I/O).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness or check constraint rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// No declared partition covers the row being written.
    #[error("no partition declared for number {number}")]
    NoPartition { number: u64 },

    #[error("query failed: {0}")]
    Query(String),
}

/// Errors surfaced by the scheduler, the reader and the API.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Bad caller input (e.g. a non-numeric pagination cursor).
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl IndexerError {
    /// Returns `true` if the storage layer is unreachable rather than misbehaving.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Unavailable(_)))
    }

    /// Kind of the upstream failure, when this is a fetch error.
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            Self::Fetch(e) => Some(e.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_kinds_are_distinct() {
        let kinds = [
            FetchError::Transport("timeout".into()).kind(),
            FetchError::Protocol { code: -32000, message: "x".into() }.kind(),
            FetchError::Decode("bad hex".into()).kind(),
        ];
        assert_eq!(kinds[0], FetchErrorKind::Transport);
        assert_eq!(kinds[1], FetchErrorKind::Protocol);
        assert_eq!(kinds[2], FetchErrorKind::Decode);
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(FetchError::Transport("timeout".into()).is_retryable());
        assert!(FetchError::no_result().is_retryable());
        assert!(FetchError::Protocol { code: RPC_LIMIT_EXCEEDED, message: "slow down".into() }
            .is_retryable());
        assert!(!FetchError::Protocol { code: -32601, message: "method not found".into() }
            .is_retryable());
        assert!(!FetchError::Decode("bad hex".into()).is_retryable());

        let err: IndexerError = FetchError::Decode("bad hex".into()).into();
        assert_eq!(err.fetch_kind(), Some(FetchErrorKind::Decode));
        let err: IndexerError = StorageError::Query("x".into()).into();
        assert_eq!(err.fetch_kind(), None);
    }

    #[test]
    fn unavailable_is_detected_through_indexer_error() {
        let err: IndexerError = StorageError::Unavailable("pool timed out".into()).into();
        assert!(err.is_unavailable());
        let err: IndexerError = StorageError::Query("syntax".into()).into();
        assert!(!err.is_unavailable());
    }
}
