//! Storage layer for the adboard service.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and the embedded table definitions that are created on startup.
//!
//! There is no migration history: every table is declared with
//! `CREATE TABLE IF NOT EXISTS`, so running [`init_schema`] against an
//! already initialized database is a no-op.

mod pool;
mod schema;

pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use schema::{init_schema, SchemaError, TABLES};
