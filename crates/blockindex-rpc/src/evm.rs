//! EVM source: `eth_getBlockByNumber` with hex-encoded quantities.

use async_trait::async_trait;
use blockindex_core::{BlockFetcher, BlockRecord, EvmExtension, FetchError, Source};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::client::RpcHttpClient;
use crate::request::JsonRpcRequest;

/// Block header fields as returned by the node. Every field is optional so
/// that a missing or `null` value does not reject the whole block.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawEvmBlock {
    number: Option<String>,
    hash: Option<String>,
    miner: Option<String>,
    parent_hash: Option<String>,
    timestamp: Option<String>,
    difficulty: Option<String>,
    extra_data: Option<String>,
    gas_limit: Option<String>,
    gas_used: Option<String>,
    logs_bloom: Option<String>,
    mix_hash: Option<String>,
    nonce: Option<String>,
    receipts_root: Option<String>,
    sha3_uncles: Option<String>,
    size: Option<String>,
    state_root: Option<String>,
    transactions_root: Option<String>,
    uncles: Option<Vec<String>>,
    transactions: Option<Vec<Value>>,
}

/// Parse a hex quantity such as `0x5208`. The `0x` prefix is mandatory.
pub fn parse_hex_u64(raw: &str) -> Result<u64, String> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| format!("{raw:?} is missing the 0x prefix"))?;
    u64::from_str_radix(digits, 16).map_err(|e| format!("{raw:?}: {e}"))
}

/// Transaction list entries are either bare hashes or objects carrying `hash`.
fn tx_hashes(txs: &[Value]) -> Vec<String> {
    txs.iter()
        .filter_map(|tx| match tx {
            Value::String(h) => Some(h.clone()),
            Value::Object(obj) => obj.get("hash").and_then(Value::as_str).map(str::to_owned),
            _ => None,
        })
        .collect()
}

/// Normalize an `eth_getBlockByNumber` result.
///
/// `number` and `timestamp` are required; the size and gas quantities fall
/// back to 0 when they cannot be parsed.
pub fn parse_evm_block(result: Value) -> Result<BlockRecord, FetchError> {
    let raw: RawEvmBlock = serde_json::from_value(result)
        .map_err(|e| FetchError::Decode(format!("unexpected block shape: {e}")))?;

    let number = parse_hex_u64(raw.number.as_deref().unwrap_or_default())
        .map_err(|e| FetchError::Decode(format!("parse block number: {e}")))?;
    let timestamp = parse_hex_u64(raw.timestamp.as_deref().unwrap_or_default())
        .map_err(|e| FetchError::Decode(format!("parse block timestamp: {e}")))?;

    let quantity = |v: &Option<String>| v.as_deref().and_then(|s| parse_hex_u64(s).ok()).unwrap_or(0);
    let hashes = tx_hashes(raw.transactions.as_deref().unwrap_or_default());

    let ext = EvmExtension {
        gas_used: quantity(&raw.gas_used),
        gas_limit: quantity(&raw.gas_limit),
        size_bytes: quantity(&raw.size),
        miner: raw.miner.unwrap_or_default(),
        nonce: raw.nonce.unwrap_or_default(),
        difficulty: raw.difficulty.unwrap_or_default(),
        extra_data: raw.extra_data.unwrap_or_default(),
        logs_bloom: raw.logs_bloom.unwrap_or_default(),
        mix_hash: raw.mix_hash.unwrap_or_default(),
        receipts_root: raw.receipts_root.unwrap_or_default(),
        sha3_uncles: raw.sha3_uncles.unwrap_or_default(),
        state_root: raw.state_root.unwrap_or_default(),
        tx_root: raw.transactions_root.unwrap_or_default(),
        tx_count: hashes.len() as u32,
        uncles: raw.uncles.unwrap_or_default(),
        tx_hashes: hashes,
    };

    Ok(BlockRecord::base(
        number,
        raw.hash.unwrap_or_default(),
        raw.parent_hash.unwrap_or_default(),
        timestamp as i64,
    )
    .with_evm(ext))
}

/// Fetches EVM blocks by number.
pub struct EvmFetcher {
    client: RpcHttpClient,
}

impl EvmFetcher {
    pub fn new(client: RpcHttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlockFetcher for EvmFetcher {
    fn source(&self) -> Source {
        Source::Evm
    }

    async fn fetch(
        &self,
        index: u64,
        cancel: &CancellationToken,
    ) -> Result<BlockRecord, FetchError> {
        let req = JsonRpcRequest::new(
            "eth_getBlockByNumber",
            vec![json!(format!("{index:#x}")), json!(false)],
        );
        let result = self.client.call(&req, cancel).await?;
        let block = parse_evm_block(result)?;
        tracing::debug!(
            url = %self.client.url(),
            number = block.number,
            hash = %block.hash,
            txs = block.tx_count(),
            "fetched evm block"
        );
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use blockindex_core::FetchErrorKind;

    use super::*;
    use crate::client::mock::{ok, spawn_rpc};
    use crate::client::RpcClientConfig;

    fn sample() -> Value {
        json!({
            "number": "0x64",
            "hash": "0xaaa",
            "parentHash": "0xbbb",
            "timestamp": "0x6553f100",
            "miner": "0xminer",
            "gasUsed": "0x5208",
            "gasLimit": "0x1c9c380",
            "size": "0x220",
            "mixHash": null,
            "uncles": [],
            "transactions": ["0x01", {"hash": "0x02", "from": "0xf"}, 7]
        })
    }

    #[test]
    fn decodes_hex_quantities() {
        let b = parse_evm_block(sample()).unwrap();
        assert_eq!(b.number, 100);
        assert_eq!(b.timestamp, 1_700_000_000);
        assert_eq!(b.parent_hash, "0xbbb");

        let ext = b.evm.as_ref().unwrap();
        assert_eq!(ext.gas_used, 21_000);
        assert_eq!(ext.gas_limit, 30_000_000);
        assert_eq!(ext.size_bytes, 544);
        assert_eq!(ext.miner, "0xminer");
        assert_eq!(ext.mix_hash, "");
    }

    #[test]
    fn mixed_transaction_list_is_flattened() {
        let b = parse_evm_block(sample()).unwrap();
        let ext = b.evm.unwrap();
        assert_eq!(ext.tx_hashes, vec!["0x01", "0x02"]);
        assert_eq!(ext.tx_count, 2);
    }

    #[test]
    fn unprefixed_quantities_are_rejected() {
        assert_eq!(parse_hex_u64("0x64"), Ok(100));
        assert!(parse_hex_u64("64").is_err());
        assert!(parse_hex_u64("").is_err());

        let mut v = sample();
        v["number"] = json!("64");
        assert_eq!(parse_evm_block(v).unwrap_err().kind(), FetchErrorKind::Decode);

        let mut v = sample();
        v["timestamp"] = json!("6553f100");
        assert_eq!(parse_evm_block(v).unwrap_err().kind(), FetchErrorKind::Decode);

        let mut v = sample();
        v["gasUsed"] = json!("5208");
        assert_eq!(parse_evm_block(v).unwrap().evm.unwrap().gas_used, 0);
    }

    #[test]
    fn bad_gas_defaults_to_zero() {
        let mut v = sample();
        v["gasUsed"] = json!("0xZZ");
        v["size"] = Value::Null;
        let ext = parse_evm_block(v).unwrap().evm.unwrap();
        assert_eq!((ext.gas_used, ext.size_bytes), (0, 0));
    }

    #[test]
    fn bad_number_or_timestamp_is_decode_error() {
        let mut v = sample();
        v["number"] = json!("0xnothex");
        assert_eq!(parse_evm_block(v).unwrap_err().kind(), FetchErrorKind::Decode);

        let mut v = sample();
        v.as_object_mut().unwrap().remove("timestamp");
        assert_eq!(parse_evm_block(v).unwrap_err().kind(), FetchErrorKind::Decode);

        assert_eq!(
            parse_evm_block(json!("0x64")).unwrap_err().kind(),
            FetchErrorKind::Decode
        );
    }

    #[tokio::test]
    async fn fetch_sends_hex_number_and_hashes_only_flag() {
        let url = spawn_rpc(|_, req| {
            assert_eq!(req["params"], json!(["0x64", false]));
            ok(sample())
        })
        .await;
        let fetcher = EvmFetcher::new(RpcHttpClient::new(url, RpcClientConfig::default()).unwrap());
        let b = fetcher.fetch(100, &CancellationToken::new()).await.unwrap();
        assert_eq!(b.number, 100);
        assert_eq!(fetcher.source(), Source::Evm);
    }

    #[tokio::test]
    async fn block_not_yet_produced_is_protocol_error() {
        let url = spawn_rpc(|_, _| ok(Value::Null)).await;
        let fetcher = EvmFetcher::new(RpcHttpClient::new(url, RpcClientConfig::default()).unwrap());
        let err = fetcher.fetch(1_000, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::Protocol { code: 0, .. }));
    }
}
