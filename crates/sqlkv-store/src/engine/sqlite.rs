//! SQLite engine: `INSERT OR REPLACE`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::AnyPool;

use super::{Engine, EngineKind, GenericEngine};
use crate::dialect::TableLayout;
use crate::error::StoreResult;

/// Engine for SQLite.
///
/// Only `store` differs from [`GenericEngine`]. SQLite serializes writers at
/// the database level, so the generic transactional increment is already
/// free of lost updates.
#[derive(Debug)]
pub struct SqliteEngine {
    generic: GenericEngine,
    upsert: String,
}

impl SqliteEngine {
    /// Create a SQLite engine over `pool` for `layout`.
    #[must_use]
    pub fn new(pool: AnyPool, layout: Arc<TableLayout>) -> Self {
        let upsert = format!(
            "INSERT OR REPLACE INTO {} ({}, {}) VALUES (?, ?)",
            layout.table(),
            layout.key(),
            layout.value()
        );
        Self {
            generic: GenericEngine::new(pool, layout),
            upsert,
        }
    }
}

#[async_trait]
impl Engine for SqliteEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.generic.exists(key).await
    }

    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.generic.load(key).await
    }

    async fn store(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        sqlx::query(&self.upsert)
            .bind(key)
            .bind(value)
            .execute(self.generic.pool())
            .await?;
        Ok(())
    }

    async fn create(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        self.generic.create(key, value).await
    }

    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.generic.increment(key, amount).await
    }

    async fn delete(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.generic.delete(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.generic.clear().await
    }

    async fn close(&self) {
        self.generic.close().await;
    }
}
