//! PostgreSQL engine: `ON CONFLICT` upserts and `RETURNING`.
//!
//! Requires PostgreSQL 9.5 or later for `INSERT ... ON CONFLICT`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{AnyPool, Row};

use super::{Engine, EngineKind, GenericEngine};
use crate::codec::{decode_value, parse_counter};
use crate::dialect::TableLayout;
use crate::error::{StoreError, StoreResult};

#[derive(Debug)]
struct Statements {
    upsert: String,
    increment: String,
    delete_returning: String,
}

impl Statements {
    fn new(layout: &TableLayout) -> Self {
        let (t, k, v) = (layout.table(), layout.key(), layout.value());
        Self {
            upsert: format!(
                "INSERT INTO {t} ({k}, {v}) VALUES ($1, $2) \
                 ON CONFLICT ({k}) DO UPDATE SET {v} = EXCLUDED.{v}"
            ),
            // bytea -> text -> bigint, add, and back, in one statement.
            increment: format!(
                "INSERT INTO {t} ({k}, {v}) VALUES ($1, convert_to($2::text, 'UTF8')) \
                 ON CONFLICT ({k}) DO UPDATE SET {v} = \
                 convert_to((convert_from({t}.{v}, 'UTF8')::bigint + $2)::text, 'UTF8') \
                 RETURNING convert_from({v}, 'UTF8')"
            ),
            delete_returning: format!("DELETE FROM {t} WHERE {k} = $1 RETURNING {v}"),
        }
    }
}

/// Engine for PostgreSQL 9.5+.
///
/// `store`, `increment` and `delete` are each one atomic statement, so none
/// of them needs a transaction or a retry loop. Everything else is
/// [`GenericEngine`].
#[derive(Debug)]
pub struct PostgresEngine {
    generic: GenericEngine,
    sql: Statements,
}

impl PostgresEngine {
    /// Create a PostgreSQL engine over `pool` for `layout`.
    #[must_use]
    pub fn new(pool: AnyPool, layout: Arc<TableLayout>) -> Self {
        let sql = Statements::new(&layout);
        Self {
            generic: GenericEngine::new(pool, layout),
            sql,
        }
    }

    /// Turn a failed conversion inside the increment statement (non-UTF-8
    /// bytes, non-integer text, `bigint` overflow) into a format error.
    async fn increment_error(&self, key: &str, err: StoreError) -> StoreError {
        if !err.is_data_exception() {
            return err;
        }
        match self.generic.load(key).await {
            Ok(stored) => StoreError::format(key, &stored.unwrap_or_default()),
            Err(_) => err,
        }
    }
}

#[async_trait]
impl Engine for PostgresEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.generic.exists(key).await
    }

    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.generic.load(key).await
    }

    async fn store(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        sqlx::query(&self.sql.upsert)
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
        let row = match sqlx::query(&self.sql.increment)
            .bind(key)
            .bind(amount)
            .fetch_one(self.generic.pool())
            .await
        {
            Ok(row) => row,
            Err(e) => return Err(self.increment_error(key, e.into()).await),
        };
        let text: String = row.try_get(0)?;
        parse_counter(key, text.as_bytes())
    }

    async fn delete(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let row = sqlx::query(&self.sql.delete_returning)
            .bind(key)
            .fetch_optional(self.generic.pool())
            .await?;
        row.map(|r| decode_value(&r, 0)).transpose()
    }

    async fn clear(&self) -> StoreResult<()> {
        self.generic.clear().await
    }

    async fn close(&self) {
        self.generic.close().await;
    }
}
