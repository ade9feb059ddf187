//! Row-packing engine for PostgreSQL.
//!
//! The whole keyspace of a namespace lives in one physical row: the key
//! column holds the namespace and the value column a JSONB object mapping
//! each key to its value. Every per-key operation is a single statement on
//! that row using the JSONB operators:
//!
//! | Operation | Expression |
//! |-----------|------------|
//! | `exists` | `value ? key` |
//! | `load` | `value ->> key` |
//! | `store` | `value \|\| jsonb_build_object(key, v)` |
//! | `delete` | `value - key` |
//! | `clear` | `value = '{}'` |
//!
//! The row is created lazily, before the first mutation, and is never
//! deleted by this engine. Values are stored as JSON strings and must
//! therefore be UTF-8.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use tracing::debug;

use super::{Engine, EngineKind};
use crate::codec::{parse_counter, value_as_text};
use crate::dialect::TableLayout;
use crate::error::{StoreError, StoreResult};

#[derive(Debug)]
struct Statements {
    ensure_row: String,
    exists: String,
    load: String,
    store: String,
    create: String,
    increment: String,
    remove: String,
    clear: String,
}

impl Statements {
    fn new(layout: &TableLayout) -> Self {
        let (t, k, v) = (layout.table(), layout.key(), layout.value());
        Self {
            ensure_row: format!(
                "INSERT INTO {t} ({k}, {v}) VALUES ($1, '{{}}'::jsonb) \
                 ON CONFLICT ({k}) DO NOTHING"
            ),
            exists: format!("SELECT 1 FROM {t} WHERE {k} = $1 AND {v} ? $2"),
            load: format!("SELECT {v} ->> $2 FROM {t} WHERE {k} = $1"),
            store: format!(
                "UPDATE {t} SET {v} = {v} || jsonb_build_object($2::text, $3::text) \
                 WHERE {k} = $1"
            ),
            create: format!(
                "UPDATE {t} SET {v} = {v} || jsonb_build_object($2::text, $3::text) \
                 WHERE {k} = $1 AND NOT ({v} ? $2)"
            ),
            increment: format!(
                "UPDATE {t} SET {v} = {v} || jsonb_build_object($2::text, \
                 (COALESCE(({v} ->> $2)::bigint, 0) + $3)::text) \
                 WHERE {k} = $1 RETURNING {v} ->> $2"
            ),
            remove: format!("UPDATE {t} SET {v} = {v} - $2::text WHERE {k} = $1"),
            clear: format!("UPDATE {t} SET {v} = '{{}}'::jsonb WHERE {k} = $1"),
        }
    }
}

/// Engine that packs a namespace into one JSONB row.
#[derive(Debug)]
pub struct PackedEngine {
    pool: AnyPool,
    namespace: String,
    sql: Statements,
}

impl PackedEngine {
    /// Create a row-packing engine storing every key of `namespace` in one
    /// row of `layout`'s table.
    #[must_use]
    pub fn new(pool: AnyPool, layout: Arc<TableLayout>, namespace: impl Into<String>) -> Self {
        let sql = Statements::new(&layout);
        Self {
            pool,
            namespace: namespace.into(),
            sql,
        }
    }

    /// Create the namespace row with an empty mapping if it is missing.
    async fn ensure_row(&self) -> StoreResult<()> {
        let created = sqlx::query(&self.sql.ensure_row)
            .bind(self.namespace.as_str())
            .execute(&self.pool)
            .await?;
        if created.rows_affected() > 0 {
            debug!(namespace = %self.namespace, "created packed row");
        }
        Ok(())
    }
}

#[async_trait]
impl Engine for PackedEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::PostgresPacked
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let row = sqlx::query(&self.sql.exists)
            .bind(self.namespace.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let row = sqlx::query(&self.sql.load)
            .bind(self.namespace.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let value: Option<String> = row.try_get(0)?;
        Ok(value.map(String::into_bytes))
    }

    async fn store(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let text = value_as_text(key, value)?;
        self.ensure_row().await?;
        sqlx::query(&self.sql.store)
            .bind(self.namespace.as_str())
            .bind(key)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        let text = value_as_text(key, value)?;
        self.ensure_row().await?;
        let merged = sqlx::query(&self.sql.create)
            .bind(self.namespace.as_str())
            .bind(key)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(merged.rows_affected() == 1)
    }

    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.ensure_row().await?;
        let result = sqlx::query(&self.sql.increment)
            .bind(self.namespace.as_str())
            .bind(key)
            .bind(amount)
            .fetch_one(&self.pool)
            .await;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                let err = StoreError::from(e);
                // The cast of a non-integer sub-value is the only way this
                // statement fails on valid input.
                if err.is_data_exception() {
                    let stored = self.load(key).await?.unwrap_or_default();
                    return Err(StoreError::format(key, &stored));
                }
                return Err(err);
            },
        };
        let text: String = row.try_get(0)?;
        parse_counter(key, text.as_bytes())
    }

    async fn delete(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_row().await?;
        let value = self.load(key).await?;
        sqlx::query(&self.sql.remove)
            .bind(self.namespace.as_str())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(value)
    }

    async fn clear(&self) -> StoreResult<()> {
        self.ensure_row().await?;
        sqlx::query(&self.sql.clear)
            .bind(self.namespace.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
