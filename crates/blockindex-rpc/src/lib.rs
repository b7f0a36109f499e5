//! blockindex-rpc: upstream RPC access for the two block sources.
//!
//! - [`RpcHttpClient`]: single-shot JSON-RPC 2.0 over HTTP with a fixed
//!   per-call timeout, optional basic auth and cancellation.
//! - [`EvmFetcher`]: `eth_getBlockByNumber` → [`BlockRecord`](blockindex_core::BlockRecord).
//! - [`DagFetcher`]: `getBlockByOrder` → [`BlockRecord`](blockindex_core::BlockRecord).
//! - [`HeadsListener`]: best-effort `newHeads` websocket subscription that
//!   only logs.

pub mod client;
pub mod dag;
pub mod evm;
pub mod heads;
pub mod request;

pub use client::{RpcClientConfig, RpcHttpClient};
pub use dag::DagFetcher;
pub use evm::EvmFetcher;
pub use heads::HeadsListener;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
