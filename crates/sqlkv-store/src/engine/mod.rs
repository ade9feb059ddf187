//! Engine strategies.
//!
//! An [`Engine`] implements the store operations against one SQL dialect.
//! [`GenericEngine`] uses only portable statements and works everywhere; the
//! dialect engines wrap it and replace the operations their database can do
//! in a single atomic statement:
//!
//! | Engine | Overrides |
//! |--------|-----------|
//! | [`MySqlEngine`] | `store`, `increment` |
//! | [`PostgresEngine`] | `store`, `increment`, `delete` |
//! | [`SqliteEngine`] | `store` |
//! | [`PackedEngine`] | everything (one JSONB row per namespace) |
//!
//! Engines are chosen once by [`crate::selector`] and never change for the
//! lifetime of a store.

use std::fmt;

use async_trait::async_trait;

use crate::error::StoreResult;

mod generic;
mod mysql;
mod packed;
mod postgres;
mod sqlite;

pub use generic::GenericEngine;
pub use mysql::MySqlEngine;
pub use packed::PackedEngine;
pub use postgres::PostgresEngine;
pub use sqlite::SqliteEngine;

/// Which engine strategy a store is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Portable statements and explicit transactions.
    Generic,
    /// MySQL upsert idioms.
    MySql,
    /// PostgreSQL `ON CONFLICT` / `RETURNING` idioms.
    Postgres,
    /// PostgreSQL with one packed JSONB row per namespace.
    PostgresPacked,
    /// SQLite `INSERT OR REPLACE`.
    Sqlite,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generic => "generic",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::PostgresPacked => "postgres-packed",
            Self::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// A key/value strategy over one SQL dialect.
///
/// Keys arrive already validated. Values are opaque bytes except for
/// [`increment`](Engine::increment), which reads and writes base-10 integer
/// text.
#[async_trait]
pub trait Engine: Send + Sync + fmt::Debug {
    /// The strategy this engine implements.
    fn kind(&self) -> EngineKind;

    /// Whether `key` is present.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Load the value for `key`, or `None` if absent.
    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any existing value.
    async fn store(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Store `value` only if `key` is absent.
    ///
    /// Returns `false` if the key already existed; its value is untouched.
    async fn create(&self, key: &str, value: &[u8]) -> StoreResult<bool>;

    /// Atomically add `amount` to the integer stored under `key`, treating an
    /// absent key as zero. Returns the new value.
    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64>;

    /// Remove `key`, returning the value it held.
    async fn delete(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Remove every key.
    async fn clear(&self) -> StoreResult<()>;

    /// Close the underlying pool. Further operations fail.
    async fn close(&self);
}
