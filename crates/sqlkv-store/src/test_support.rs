//! Shared fixtures for unit tests.

use std::path::Path;
use std::sync::Arc;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

use crate::dialect::{Dialect, TableLayout};
use crate::schema::ensure_table;

/// A fresh in-memory SQLite database.
///
/// Each in-memory connection is its own database, so the pool is pinned to a
/// single connection that never expires.
pub(crate) async fn sqlite_pool() -> AnyPool {
    sqlx::any::install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// A fresh in-memory SQLite database with the default table created.
pub(crate) async fn sqlite_engine_pool() -> (AnyPool, Arc<TableLayout>) {
    let pool = sqlite_pool().await;
    let layout = Arc::new(TableLayout::new(Dialect::Sqlite, "kv_store", "key", "value"));
    ensure_table(&pool, &layout, false).await.unwrap();
    (pool, layout)
}

/// A SQLite database file in `dir`, pooled like a default store (ten
/// connections), with the default table created.
pub(crate) async fn sqlite_file_engine_pool(dir: &Path) -> (AnyPool, Arc<TableLayout>) {
    sqlx::any::install_default_drivers();
    let dsn = format!("sqlite://{}?mode=rwc", dir.join("kv.db").display());
    let pool = AnyPoolOptions::new()
        .max_connections(10)
        .connect(&dsn)
        .await
        .unwrap();
    let layout = Arc::new(TableLayout::new(Dialect::Sqlite, "kv_store", "key", "value"));
    ensure_table(&pool, &layout, false).await.unwrap();
    (pool, layout)
}
