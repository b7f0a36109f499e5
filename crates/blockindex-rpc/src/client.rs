//! Single-shot HTTP JSON-RPC client backed by `reqwest`.
//!
//! There is no retry here: a failed call is reported once and the scheduler
//! decides what to do on the next tick.

use std::time::Duration;

use blockindex_core::FetchError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Configuration for [`RpcHttpClient`].
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Deadline for one call, connect through body.
    pub request_timeout: Duration,
    /// HTTP basic credentials sent with every call.
    pub basic_auth: Option<(String, String)>,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            basic_auth: None,
        }
    }
}

impl RpcClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), pass.into()));
        self
    }
}

/// HTTP JSON-RPC client for one endpoint.
pub struct RpcHttpClient {
    url: String,
    http: reqwest::Client,
    config: RpcClientConfig,
}

impl RpcHttpClient {
    pub fn new(url: impl Into<String>, config: RpcClientConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            config,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `req` and return its `result`.
    ///
    /// Returns [`FetchError::Transport`] as soon as `cancel` fires.
    pub async fn call(
        &self,
        req: &JsonRpcRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Transport("request cancelled".into())),
            res = self.send_once(req) => res,
        }
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<Value, FetchError> {
        let mut builder = self.http.post(&self.url).json(req);
        if let Some((user, pass)) = &self.config.basic_auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        let resp = builder.send().await.map_err(|e| self.transport(e))?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| self.transport(e))?;

        // A JSON-RPC error envelope wins over the HTTP status (nodes answer
        // rate limits with 429 + `{"error": ...}`).
        let parsed = serde_json::from_slice::<JsonRpcResponse>(&body);
        let rpc_error = matches!(&parsed, Ok(r) if r.error.is_some());
        if !status.is_success() && !rpc_error {
            return Err(FetchError::Transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )));
        }
        parsed
            .map_err(|e| FetchError::Decode(format!("invalid JSON-RPC response: {e}")))?
            .into_result()
    }

    fn transport(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Transport(format!(
                "request to {} timed out after {}ms",
                self.url,
                self.config.request_timeout.as_millis()
            ))
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Throwaway JSON-RPC server for transport tests.
#[cfg(test)]
pub(crate) mod mock {
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde_json::Value;

    /// Serve `respond` on `127.0.0.1:0` and return the base URL.
    pub(crate) async fn spawn_rpc<F>(respond: F) -> String
    where
        F: Fn(&HeaderMap, Value) -> (StatusCode, String) + Clone + Send + Sync + 'static,
    {
        let app = Router::new().route(
            "/",
            post(move |headers: HeaderMap, body: String| {
                let respond = respond.clone();
                async move {
                    let req: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
                    respond(&headers, req)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub(crate) fn ok(result: Value) -> (StatusCode, String) {
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result});
        (StatusCode::OK, body.to_string())
    }
}
