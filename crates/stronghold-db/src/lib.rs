//! `PostgreSQL` persistence for the Stronghold world core.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool, configuration, and migrations
//! - [`world_store`] -- [`PgWorldStore`], the [`WorldStore`](stronghold_core::WorldStore) implementation
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod world_store;

pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use world_store::PgWorldStore;
