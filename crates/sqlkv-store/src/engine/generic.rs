//! Portable engine: plain `SELECT`/`INSERT`/`UPDATE`/`DELETE` and explicit
//! transactions.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{AnyConnection, AnyPool};
use tracing::{debug, warn};

use super::{Engine, EngineKind};
use crate::codec::{add_counter, decode_value, encode_counter, parse_counter};
use crate::dialect::TableLayout;
use crate::error::{StoreError, StoreResult};
use crate::retry::{GENERIC_MAX_ATTEMPTS, retry};

/// Statements rendered once for the table layout.
#[derive(Debug)]
struct Statements {
    exists: String,
    load: String,
    load_for_update: String,
    update: String,
    insert: String,
    delete: String,
    clear: String,
}

impl Statements {
    fn new(layout: &TableLayout) -> Self {
        let (t, k, v) = (layout.table(), layout.key(), layout.value());
        let (p1, p2) = (layout.param(1), layout.param(2));
        let lock = layout.dialect().row_lock_clause();
        Self {
            exists: format!("SELECT 1 FROM {t} WHERE {k} = {p1}"),
            load: format!("SELECT {v} FROM {t} WHERE {k} = {p1}"),
            load_for_update: format!("SELECT {v} FROM {t} WHERE {k} = {p1}{lock}"),
            update: format!("UPDATE {t} SET {v} = {p1} WHERE {k} = {p2}"),
            insert: format!("INSERT INTO {t} ({k}, {v}) VALUES ({p1}, {p2})"),
            delete: format!("DELETE FROM {t} WHERE {k} = {p1}"),
            clear: format!("DELETE FROM {t}"),
        }
    }
}

/// Baseline engine that is correct on any SQL database.
///
/// `store` is an update-then-insert pair and is not atomic: a concurrent
/// writer can insert the key between the two statements. Every backend error
/// in that sequence, not only the resulting uniqueness violation, restarts it
/// (up to [`GENERIC_MAX_ATTEMPTS`]). `increment` holds a row lock for the
/// read-modify-write so concurrent increments never lose updates; on SQLite,
/// which has no row locks, it holds the database write lock instead.
#[derive(Debug)]
pub struct GenericEngine {
    pool: AnyPool,
    layout: Arc<TableLayout>,
    sql: Statements,
}

impl GenericEngine {
    /// Create a generic engine over `pool` for `layout`.
    #[must_use]
    pub fn new(pool: AnyPool, layout: Arc<TableLayout>) -> Self {
        let sql = Statements::new(&layout);
        Self { pool, layout, sql }
    }

    /// The pool statements run on.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn try_store(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let updated = sqlx::query(&self.sql.update)
            .bind(value)
            .bind(key)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            sqlx::query(&self.sql.insert)
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn try_increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        if let Some(begin) = self.layout.dialect().write_transaction_begin() {
            return self.try_increment_with(begin, key, amount).await;
        }
        let mut tx = self.pool.begin().await?;
        let next = self.read_modify_write(&mut *tx, key, amount).await?;
        tx.commit().await?;
        Ok(next)
    }

    /// Increment inside a transaction opened with `begin` on a pooled
    /// connection. On failure the transaction is rolled back, and the
    /// connection is discarded if even that fails.
    async fn try_increment_with(&self, begin: &str, key: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(begin).execute(&mut *conn).await?;

        let result = match self.read_modify_write(&mut *conn, key, amount).await {
            Ok(next) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| next)
                .map_err(StoreError::from),
            Err(e) => Err(e),
        };

        if result.is_err()
            && let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await
        {
            warn!(error = %e, "rollback failed; discarding connection");
            let _ = conn.close().await;
        }
        result
    }

    /// Read, parse, add and write back `key` on an open transaction.
    async fn read_modify_write(
        &self,
        conn: &mut AnyConnection,
        key: &str,
        amount: i64,
    ) -> StoreResult<i64> {
        let current = sqlx::query(&self.sql.load_for_update)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;

        match current {
            Some(row) => {
                let raw = decode_value(&row, 0)?;
                let next = add_counter(key, parse_counter(key, &raw)?, amount)?;
                sqlx::query(&self.sql.update)
                    .bind(encode_counter(next))
                    .bind(key)
                    .execute(&mut *conn)
                    .await?;
                Ok(next)
            },
            None => {
                sqlx::query(&self.sql.insert)
                    .bind(key)
                    .bind(encode_counter(amount))
                    .execute(&mut *conn)
                    .await?;
                Ok(amount)
            },
        }
    }
}

#[async_trait]
impl Engine for GenericEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Generic
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let row = sqlx::query(&self.sql.exists)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let row = sqlx::query(&self.sql.load)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_value(&r, 0)).transpose()
    }

    async fn store(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        retry("store", GENERIC_MAX_ATTEMPTS, StoreError::is_backend, move || {
            self.try_store(key, value)
        })
        .await
    }

    async fn create(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        let inserted = sqlx::query(&self.sql.insert)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from);
        match inserted {
            Ok(_) => Ok(true),
            Err(e) if e.is_unique_violation() => {
                debug!(key, "create found existing key");
                Ok(false)
            },
            Err(e) => Err(e),
        }
    }

    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        retry(
            "increment",
            GENERIC_MAX_ATTEMPTS,
            StoreError::is_backend,
            move || self.try_increment(key, amount),
        )
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value = self.load(key).await?;
        sqlx::query(&self.sql.delete)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(value)
    }

    async fn clear(&self) -> StoreResult<()> {
        sqlx::query(&self.sql.clear).execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
