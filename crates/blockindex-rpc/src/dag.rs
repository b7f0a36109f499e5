//! DAG source: `getBlockByOrder` behind HTTP basic auth.
//!
//! The node is loose about encodings: integers arrive as decimal strings, hex
//! strings or JSON floats, timestamps as RFC3339 strings or numbers, and the
//! parent link under one of several keys.

use async_trait::async_trait;
use blockindex_core::{BlockFetcher, BlockRecord, FetchError, Source};
use chrono::DateTime;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::client::RpcHttpClient;
use crate::request::JsonRpcRequest;

/// Keys tried, in order, for the parent hash.
const PARENT_KEYS: [&str; 3] = ["parentHash", "previousHash", "parentroot"];

/// Coerce a loosely-typed integer to `u64`.
pub fn parse_uint_any(value: Option<&Value>) -> Result<u64, String> {
    match value {
        None | Some(Value::Null) => Err("value is missing".into()),
        Some(Value::String(s)) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|e| format!("{s:?}: {e}")),
            None => s.parse::<u64>().map_err(|e| format!("{s:?}: {e}")),
        },
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| format!("{n} is not a non-negative integer")),
        Some(other) => Err(format!("unsupported type for integer: {other}")),
    }
}

/// Normalize a timestamp to epoch seconds.
///
/// Accepts an RFC3339 string, a numeric string (decimal or `0x` hex) or a
/// JSON number.
pub fn parse_timestamp(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.timestamp())
            .ok()
            .or_else(|| parse_uint_any(value).ok().map(|n| n as i64)),
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

fn parent_hash(obj: &Map<String, Value>) -> String {
    for key in PARENT_KEYS {
        if let Some(p) = obj.get(key).and_then(Value::as_str).filter(|p| !p.is_empty()) {
            return p.to_owned();
        }
    }
    obj.get("parents")
        .and_then(Value::as_array)
        .and_then(|parents| parents.first())
        .and_then(Value::as_str)
        .filter(|p| *p != "null")
        .map(str::to_owned)
        .unwrap_or_default()
}

/// Normalize a `getBlockByOrder` result. Only `order` is mandatory; an
/// unparseable timestamp becomes 0.
pub fn parse_dag_block(result: Value) -> Result<BlockRecord, FetchError> {
    let Value::Object(obj) = result else {
        return Err(FetchError::Decode("dag block is not an object".into()));
    };

    let order = parse_uint_any(obj.get("order"))
        .map_err(|e| FetchError::Decode(format!("parse dag order: {e}")))?;
    let timestamp = parse_timestamp(obj.get("timestamp")).unwrap_or(0);
    let hash = obj
        .get("hash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    Ok(BlockRecord::base(order, hash, parent_hash(&obj), timestamp))
}

/// Fetches DAG blocks by order index.
pub struct DagFetcher {
    client: RpcHttpClient,
}

impl DagFetcher {
    pub fn new(client: RpcHttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlockFetcher for DagFetcher {
    fn source(&self) -> Source {
        Source::Dag
    }

    async fn fetch(
        &self,
        index: u64,
        cancel: &CancellationToken,
    ) -> Result<BlockRecord, FetchError> {
        // verbose, include transactions, no full transaction bodies
        let req = JsonRpcRequest::new(
            "getBlockByOrder",
            vec![json!(index), json!(true), json!(true), json!(false)],
        );
        let result = self.client.call(&req, cancel).await?;
        let block = parse_dag_block(result)?;
        tracing::debug!(
            url = %self.client.url(),
            order = block.number,
            hash = %block.hash,
            "fetched dag block"
        );
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use blockindex_core::FetchErrorKind;

    use super::*;
    use crate::client::mock::{ok, spawn_rpc};
    use crate::client::RpcClientConfig;

    #[test]
    fn integers_in_every_encoding() {
        for v in [json!(100.0), json!("100"), json!("0x64"), json!(100)] {
            assert_eq!(parse_uint_any(Some(&v)).unwrap(), 100, "{v}");
        }
        assert!(parse_uint_any(None).is_err());
        assert!(parse_uint_any(Some(&Value::Null)).is_err());
        assert!(parse_uint_any(Some(&json!(true))).is_err());
        assert!(parse_uint_any(Some(&json!("ten"))).is_err());
        assert!(parse_uint_any(Some(&json!(-1))).is_err());
    }

    #[test]
    fn timestamps() {
        assert_eq!(
            parse_timestamp(Some(&json!("2023-11-14T22:13:20Z"))),
            Some(1_700_000_000)
        );
        assert_eq!(
            parse_timestamp(Some(&json!("2023-11-15T06:13:20+08:00"))),
            Some(1_700_000_000)
        );
        assert_eq!(parse_timestamp(Some(&json!("1700000000"))), Some(1_700_000_000));
        assert_eq!(parse_timestamp(Some(&json!(1_700_000_000.0))), Some(1_700_000_000));
        assert_eq!(parse_timestamp(Some(&json!("yesterday"))), None);
        assert_eq!(parse_timestamp(None), None);
    }

    #[test]
    fn parent_fallback_chain() {
        let pick = |v: Value| parse_dag_block(v).unwrap().parent_hash;

        assert_eq!(pick(json!({"order": 1, "parentHash": "a", "previousHash": "b"})), "a");
        assert_eq!(pick(json!({"order": 1, "parentHash": "", "previousHash": "b"})), "b");
        assert_eq!(pick(json!({"order": 1, "parentroot": "c", "parents": ["d"]})), "c");
        assert_eq!(pick(json!({"order": 1, "parents": ["d", "e"]})), "d");
        assert_eq!(pick(json!({"order": 1, "parents": ["null"]})), "");
        assert_eq!(pick(json!({"order": 1, "parents": []})), "");
    }

    #[test]
    fn order_is_required_but_timestamp_is_not() {
        let b = parse_dag_block(json!({"order": "0x64", "hash": "h", "timestamp": "garbage"})).unwrap();
        assert_eq!((b.number, b.timestamp), (100, 0));
        assert!(b.evm.is_none());

        let err = parse_dag_block(json!({"hash": "h"})).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Decode);
    }

    #[tokio::test]
    async fn fetch_sends_order_flags_and_credentials() {
        let url = spawn_rpc(|headers, req| {
            assert_eq!(req["method"], "getBlockByOrder");
            assert_eq!(req["params"], json!([42, true, true, false]));
            if headers.get("authorization").is_none() {
                return (StatusCode::UNAUTHORIZED, String::new());
            }
            ok(json!({"order": 42.0, "hash": "dag42", "timestamp": 1_700_000_000, "parents": ["dag41"]}))
        })
        .await;
        let client = RpcHttpClient::new(
            url,
            RpcClientConfig::default().with_basic_auth("test", "test"),
        )
        .unwrap();
        let b = DagFetcher::new(client)
            .fetch(42, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(b, BlockRecord::base(42, "dag42", "dag41", 1_700_000_000));
    }
}
