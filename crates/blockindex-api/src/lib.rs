//! blockindex-api: read-only HTTP API over the block store.
//!
//! Routes (all `GET`):
//!
//! ```text
//! /v1/evm/blocks                ?limit&cursor   {cursor, items}
//! /v1/dag/blocks                ?limit&cursor   {cursor, items}
//! /v1/blocks                    ?limit&cursor   DAG listing
//! /v1/blocks/{id}                               block by number or hash
//! /v1/txs/{hash}                                transaction
//! /v1/addresses/{address}                       address summary
//! /v1/addresses/{address}/txs   ?limit          transactions, newest first
//! /v1/stats/blocks                              {evm_blocks, dag_blocks}
//! /healthz
//! ```

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::{app_router, serve};
pub use state::AppState;
