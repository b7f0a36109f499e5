use axum::extract::{Path, Query, State};
use axum::Json;
use blockindex_core::reader::{clamp_limit, parse_cursor};
use blockindex_core::{AddressSummary, BlockCounts, BlockRecord, Page, Source, TxSummary};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Raw query parameters. Kept as strings so a malformed `limit` falls back to
/// the default instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

async fn list(state: &AppState, source: Source, params: &PageParams) -> ApiResult<Page> {
    let limit = clamp_limit(params.limit.as_deref());
    let before = parse_cursor(params.cursor.as_deref())?;
    Ok(Json(state.reader.list(source, limit, before).await?))
}

pub async fn list_evm_blocks(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Page> {
    list(&state, Source::Evm, &params).await
}

pub async fn list_dag_blocks(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Page> {
    list(&state, Source::Dag, &params).await
}

pub async fn get_block(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BlockRecord> {
    Ok(Json(state.reader.block(&id).await?))
}

pub async fn get_tx(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<TxSummary> {
    Ok(Json(state.reader.tx(&hash).await?))
}

pub async fn get_address(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<AddressSummary> {
    Ok(Json(state.reader.address(&address).await?))
}

pub async fn list_address_txs(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Vec<TxSummary>> {
    let limit = clamp_limit(params.limit.as_deref());
    Ok(Json(state.reader.address_txs(&address, limit).await?))
}

pub async fn block_counts(State(state): State<AppState>) -> ApiResult<BlockCounts> {
    Ok(Json(state.reader.counts().await?))
}

pub async fn healthz() -> &'static str {
    "ok"
}
