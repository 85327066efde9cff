//! # amf-store
//!
//! Durable, TTL-scoped session records for the two session tiers.
//!
//! - [`SessionStore`]: the async contract the dispatch engine consumes
//! - [`SqliteSessionStore`]: the `SQLite` implementation (r2d2 pool, WAL)
//! - [`run_migrations`]: embedded schema migrations

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod session_store;

pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use session_store::{Items, SessionStore, SqliteSessionStore, StartedSession};
