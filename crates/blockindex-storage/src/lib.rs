//! blockindex-storage: PostgreSQL backend for the block tables.
//!
//! - [`schema`]: idempotent DDL for the range-partitioned tables
//! - [`postgres`]: [`PostgresStorage`], the `sqlx` implementation of
//!   [`BlockStore`](blockindex_core::BlockStore)

pub mod error;
pub mod postgres;
pub mod schema;

pub use postgres::{PostgresOptions, PostgresStorage};
