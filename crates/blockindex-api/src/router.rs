use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderName;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};

use crate::error::internal_error;
use crate::handlers::{
    block_counts, get_address, get_block, get_tx, healthz, list_address_txs, list_dag_blocks,
    list_evm_blocks,
};
use crate::state::AppState;

/// Hard ceiling on a single request, storage round-trips included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests per minute per client IP, across every route.
pub const GLOBAL_LIMIT_PER_MINUTE: u32 = 200;

/// Requests per minute per client IP on the block routes.
pub const BLOCK_LIMIT_PER_MINUTE: u32 = 60;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub fn app_router(state: AppState) -> Router {
    let blocks = Router::new()
        .route("/v1/evm/blocks", get(list_evm_blocks))
        .route("/v1/dag/blocks", get(list_dag_blocks))
        .route("/v1/blocks", get(list_dag_blocks))
        .route("/v1/blocks/:id", get(get_block));
    let blocks = limit_per_ip(blocks, BLOCK_LIMIT_PER_MINUTE);

    let routes = Router::new()
        .merge(blocks)
        .route("/v1/txs/:hash", get(get_tx))
        .route("/v1/addresses/:address", get(get_address))
        .route("/v1/addresses/:address/txs", get(list_address_txs))
        .route("/v1/stats/blocks", get(block_counts))
        .route("/healthz", get(healthz))
        .route_layer(middleware::from_fn_with_state(state.clone(), record_latency));

    with_middleware(limit_per_ip(routes, GLOBAL_LIMIT_PER_MINUTE)).with_state(state)
}

/// Request id, tracing, panic recovery, timeout and compression, outermost first.
pub fn with_middleware<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID, MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
                let request_id = req
                    .headers()
                    .get(REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                info_span!("request", method = %req.method(), uri = %req.uri(), request_id)
            }))
            .layer(PropagateRequestIdLayer::new(REQUEST_ID))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(CompressionLayer::new()),
    )
}

/// Per-client-IP token bucket. The client is taken from `X-Forwarded-For`,
/// `X-Real-Ip` or `Forwarded` when present, else the peer address.
fn limit_per_ip<S>(router: Router<S>, per_minute: u32) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let period_ms = 60_000 / u64::from(per_minute.max(1));
    match GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_millisecond(period_ms)
        .burst_size(per_minute)
        .finish()
    {
        Some(config) => router.layer(GovernorLayer {
            config: Arc::new(config),
        }),
        None => {
            warn!(per_minute, "rate limit rejected; serving without one");
            router
        }
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    error!(panic = %detail, "handler panicked");
    internal_error()
}

async fn record_latency(
    State(state): State<AppState>,
    matched: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let route = matched
        .as_ref()
        .map(MatchedPath::as_str)
        .unwrap_or("unmatched")
        .to_owned();
    let started = Instant::now();
    let resp = next.run(req).await;
    state
        .metrics
        .request_served(&route, resp.status().as_u16(), started.elapsed());
    resp
}

/// Serve the API on `listener` until `cancel` fires, then drain in-flight
/// requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "api listening");
    }
    axum::serve(
        listener,
        app_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await?;
    info!("api stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use blockindex_core::{
        AddressSummary, BlockRecord, BlockStore, CountingMetrics, MemoryBlockStore, Source,
        StorageError, TxSummary,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    struct Fixture {
        store: Arc<MemoryBlockStore>,
        metrics: Arc<CountingMetrics>,
        app: Router,
    }

    async fn fixture(evm: u64, dag: u64) -> Fixture {
        let store = Arc::new(MemoryBlockStore::default());
        let evm_blocks: Vec<_> = (0..evm)
            .map(|n| BlockRecord::base(n, format!("0xe{n}"), "", n as i64))
            .collect();
        let dag_blocks: Vec<_> = (0..dag)
            .map(|n| BlockRecord::base(n, format!("d{n}"), "", n as i64))
            .collect();
        store.append_blocks(Source::Evm, &evm_blocks).await.unwrap();
        store.append_blocks(Source::Dag, &dag_blocks).await.unwrap();

        let metrics = Arc::new(CountingMetrics::new());
        let app = app_router(AppState::new(store.clone(), metrics.clone()));
        Fixture { store, metrics, app }
    }

    /// GET from a fixed peer address, as `serve` would attach it.
    fn request(uri: &str) -> Request<Body> {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        req
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(request(uri)).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn numbers(body: &Value) -> Vec<u64> {
        body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["number"].as_u64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn pages_follow_the_cursor() {
        let f = fixture(5, 0).await;

        let (status, first) = get_json(&f.app, "/v1/evm/blocks?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(numbers(&first), vec![4, 3]);
        assert_eq!(first["cursor"], "3");

        let (_, second) = get_json(&f.app, "/v1/evm/blocks?limit=2&cursor=3").await;
        assert_eq!(numbers(&second), vec![2, 1]);
        assert_eq!(second["cursor"], "1");

        let (_, last) = get_json(&f.app, "/v1/evm/blocks?limit=2&cursor=1").await;
        assert_eq!(numbers(&last), vec![0]);
        assert_eq!(last["cursor"], "");
    }

    #[tokio::test]
    async fn blocks_alias_lists_dag() {
        let f = fixture(3, 2).await;
        let (_, alias) = get_json(&f.app, "/v1/blocks").await;
        let (_, dag) = get_json(&f.app, "/v1/dag/blocks").await;
        assert_eq!(alias, dag);
        assert_eq!(numbers(&alias), vec![1, 0]);
        assert_eq!(alias["items"][0]["hash"], "d1");
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let f = fixture(3, 0).await;
        let (status, body) = get_json(&f.app, "/v1/evm/blocks?cursor=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("cursor"));
    }

    #[tokio::test]
    async fn malformed_limit_falls_back_to_default() {
        let f = fixture(60, 0).await;
        let (status, body) = get_json(&f.app, "/v1/evm/blocks?limit=abc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(numbers(&body).len(), 50);
        assert_eq!(body["cursor"], "10");

        let (_, body) = get_json(&f.app, "/v1/evm/blocks?limit=1000").await;
        assert_eq!(numbers(&body).len(), 60);
        assert_eq!(body["cursor"], "");
    }

    #[tokio::test]
    async fn storage_outage_is_503() {
        let f = fixture(3, 3).await;
        f.store.set_unavailable(true);
        let (status, body) = get_json(&f.app, "/v1/dag/blocks").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "storage unavailable");
        assert_eq!(f.metrics.snapshot().server_errors, 1);
    }

    #[tokio::test]
    async fn storage_fault_is_a_generic_500() {
        let f = fixture(3, 3).await;
        f.store.fail_with(Some(StorageError::Query(
            "relation \"blocks\" does not exist".into(),
        )));
        let resp = f.app.clone().oneshot(request("/v1/evm/blocks")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"error":"internal error"}"#);
        assert!(!String::from_utf8_lossy(&bytes).contains("relation"));
    }

    #[tokio::test]
    async fn panicking_handler_is_a_generic_500() {
        async fn boom() -> StatusCode {
            panic!("handler bug: index out of range");
        }
        let app = with_middleware(Router::new().route("/boom", get(boom)));

        let resp = app.oneshot(request("/boom")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "internal error" }));
    }

    #[tokio::test]
    async fn request_id_is_set_or_echoed() {
        let f = fixture(1, 0).await;

        let resp = f.app.clone().oneshot(request("/healthz")).await.unwrap();
        let generated = resp.headers().get("x-request-id").unwrap();
        assert!(!generated.is_empty());

        let mut req = request("/healthz");
        req.headers_mut()
            .insert("x-request-id", "abc-123".parse().unwrap());
        let resp = f.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn listings_are_gzipped_on_request() {
        let f = fixture(60, 0).await;
        let mut req = request("/v1/evm/blocks?limit=50");
        req.headers_mut()
            .insert(header::ACCEPT_ENCODING, "gzip".parse().unwrap());
        let resp = f.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip");

        let resp = f.app.clone().oneshot(request("/v1/evm/blocks")).await.unwrap();
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn block_routes_are_rate_limited_per_ip() {
        let f = fixture(3, 0).await;
        let mut limited = 0;
        for _ in 0..BLOCK_LIMIT_PER_MINUTE + 10 {
            let resp = f.app.clone().oneshot(request("/v1/evm/blocks")).await.unwrap();
            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                limited += 1;
            }
        }
        assert!(limited >= 1);

        // Other clients and non-block routes are unaffected.
        let mut other = request("/v1/evm/blocks");
        other
            .headers_mut()
            .insert("x-forwarded-for", "10.0.0.9".parse().unwrap());
        assert_eq!(f.app.clone().oneshot(other).await.unwrap().status(), StatusCode::OK);
        let (status, _) = get_json(&f.app, "/v1/stats/blocks").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn block_lookup_by_number_and_hash() {
        let f = fixture(3, 3).await;

        let (status, body) = get_json(&f.app, "/v1/blocks/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hash"], "0xe2");

        let (_, body) = get_json(&f.app, "/v1/blocks/d1").await;
        assert_eq!(body["number"], 1);

        let (status, _) = get_json(&f.app, "/v1/blocks/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json(&f.app, "/v1/blocks/0xmissing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn transactions_and_addresses() {
        let f = fixture(1, 0).await;
        f.store.insert_tx(TxSummary {
            hash: "0xt1".into(),
            from: "0xa".into(),
            to: "0xb".into(),
            value: "1000000000000000000000".into(),
            block_number: 0,
            status: "success".into(),
        });
        f.store.insert_address(AddressSummary {
            address: "0xa".into(),
            balance: "42".into(),
            tx_count: 1,
            first_seen_block: Some(0),
            last_seen_block: Some(0),
        });

        let (status, tx) = get_json(&f.app, "/v1/txs/0xt1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tx["value"], "1000000000000000000000");

        let (status, _) = get_json(&f.app, "/v1/txs/0xnope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, addr) = get_json(&f.app, "/v1/addresses/0xa").await;
        assert_eq!(addr["balance"], "42");

        let (status, unknown) = get_json(&f.app, "/v1/addresses/0xunknown").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(unknown["balance"], "0");
        assert_eq!(unknown["tx_count"], 0);

        let (_, txs) = get_json(&f.app, "/v1/addresses/0xb/txs").await;
        assert_eq!(txs.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_health_and_request_metrics() {
        let f = fixture(4, 7).await;

        let (status, stats) = get_json(&f.app, "/v1/stats/blocks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["evm_blocks"], 4);
        assert_eq!(stats["dag_blocks"], 7);

        let resp = f.app.clone().oneshot(request("/healthz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");

        assert_eq!(f.metrics.snapshot().requests, 2);
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let f = fixture(0, 0).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let state = AppState::new(f.store.clone(), f.metrics.clone());
        let handle = tokio::spawn(serve(listener, state, cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
