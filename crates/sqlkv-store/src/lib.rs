//! sqlkv store: a key/value store over SQL tables.
//!
//! One logical `(key, value)` table, seven operations: [`exists`], [`load`],
//! [`store`], [`create`], [`increment`], [`delete`] and [`clear`]. The
//! connection is probed once at construction and the most capable engine for
//! its dialect is chosen:
//!
//! | Dialect | Engine | Atomic idiom |
//! |---------|--------|--------------|
//! | PostgreSQL >= 9.5 | [`PostgresEngine`] | `ON CONFLICT`, `RETURNING` |
//! | PostgreSQL + namespace | [`PackedEngine`] | one JSONB row, `\|\|` / `-` / `?` |
//! | MySQL | [`MySqlEngine`] | `ON DUPLICATE KEY UPDATE` |
//! | SQLite | [`SqliteEngine`] | `INSERT OR REPLACE` |
//! | anything else | [`GenericEngine`] | transactions, `SELECT ... FOR UPDATE` |
//!
//! No in-process locking is done; concurrency safety comes from the
//! database. Transient failures are retried immediately a bounded number of
//! times (see [`retry`]).
//!
//! [`exists`]: SqlKvStore::exists
//! [`load`]: SqlKvStore::load
//! [`store`]: SqlKvStore::store
//! [`create`]: SqlKvStore::create
//! [`increment`]: SqlKvStore::increment
//! [`delete`]: SqlKvStore::delete
//! [`clear`]: SqlKvStore::clear

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod retry;
pub mod schema;
pub mod selector;

mod codec;
mod store;

#[cfg(test)]
mod test_support;

pub use config::StoreConfig;
pub use dialect::{Dialect, TableLayout};
pub use engine::{
    Engine, EngineKind, GenericEngine, MySqlEngine, PackedEngine, PostgresEngine, SqliteEngine,
};
pub use error::{StoreError, StoreResult};
pub use schema::{CreateTable, TableCreator};
pub use store::{SqlKvStore, SqlKvStoreBuilder};
