//! HTTP mapping of [`IndexerError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use blockindex_core::IndexerError;
use serde_json::json;
use tracing::error;

/// Handler error; renders as `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError(pub IndexerError);

impl From<IndexerError> for ApiError {
    fn from(e: IndexerError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            IndexerError::Validation(_) => StatusCode::BAD_REQUEST,
            IndexerError::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The generic 500 body; nothing about the cause reaches the client.
pub fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the log.
        let message = match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => self.0.to_string(),
            StatusCode::SERVICE_UNAVAILABLE => {
                error!(error = %self.0, "storage unavailable");
                "storage unavailable".to_owned()
            }
            _ => {
                error!(error = %self.0, "request failed");
                return internal_error();
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use blockindex_core::StorageError;

    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (IndexerError::Validation("bad cursor".into()), StatusCode::BAD_REQUEST),
            (IndexerError::NotFound("block 9".into()), StatusCode::NOT_FOUND),
            (StorageError::Unavailable("down".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (StorageError::Query("syntax".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (StorageError::Constraint("dup".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
