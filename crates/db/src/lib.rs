//! `db` crate: Postgres persistence for the workflow engine.
//!
//! Provides a connection pool, typed row structs, repository functions for
//! the `wf_*` tables, and [`PgStore`], the engine's durable store.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use pool::{create_pool, run_migrations, DbPool};
pub use store::PgStore;
