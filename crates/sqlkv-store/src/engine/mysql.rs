//! MySQL engine: `INSERT ... ON DUPLICATE KEY UPDATE`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::AnyPool;

use super::{Engine, EngineKind, GenericEngine};
use crate::codec::{add_counter, encode_counter, parse_counter};
use crate::dialect::TableLayout;
use crate::error::{StoreError, StoreResult};
use crate::retry::{MYSQL_INCREMENT_MAX_ATTEMPTS, retry};

#[derive(Debug)]
struct Statements {
    upsert: String,
    increment: String,
}

impl Statements {
    fn new(layout: &TableLayout) -> Self {
        let (t, k, v) = (layout.table(), layout.key(), layout.value());
        // `VALUES(col)` is deprecated from MySQL 8.0.20 but is the only
        // spelling MariaDB accepts; the `AS new` row alias is MySQL-only.
        Self {
            upsert: format!(
                "INSERT INTO {t} ({k}, {v}) VALUES (?, ?) \
                 ON DUPLICATE KEY UPDATE {v} = VALUES({v})"
            ),
            increment: format!(
                "INSERT INTO {t} ({k}, {v}) VALUES (?, ?) \
                 ON DUPLICATE KEY UPDATE {v} = \
                 CAST(CAST({v} AS SIGNED) + CAST(VALUES({v}) AS SIGNED) AS CHAR)"
            ),
        }
    }
}

/// Engine for MySQL and MariaDB.
///
/// `store` is a single upsert. `increment` validates the current value with a
/// plain read, then adds server-side in one upsert and reads the result back;
/// only the add is atomic. Deadlock victims retry up to
/// [`MYSQL_INCREMENT_MAX_ATTEMPTS`] times.
#[derive(Debug)]
pub struct MySqlEngine {
    generic: GenericEngine,
    sql: Statements,
}

impl MySqlEngine {
    /// Create a MySQL engine over `pool` for `layout`.
    #[must_use]
    pub fn new(pool: AnyPool, layout: Arc<TableLayout>) -> Self {
        let sql = Statements::new(&layout);
        Self {
            generic: GenericEngine::new(pool, layout),
            sql,
        }
    }

    async fn try_increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        // Fail on corrupt data before the row is touched.
        if let Some(raw) = self.generic.load(key).await? {
            add_counter(key, parse_counter(key, &raw)?, amount)?;
        }

        sqlx::query(&self.sql.increment)
            .bind(key)
            .bind(encode_counter(amount))
            .execute(self.generic.pool())
            .await?;

        let raw = self.generic.load(key).await?.unwrap_or_default();
        parse_counter(key, &raw)
    }
}

#[async_trait]
impl Engine for MySqlEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::MySql
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
        retry(
            "increment",
            MYSQL_INCREMENT_MAX_ATTEMPTS,
            StoreError::is_serialization_failure,
            move || self.try_increment(key, amount),
        )
        .await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    fn statements() -> Statements {
        Statements::new(&TableLayout::new(Dialect::MySql, "kv_store", "key", "value"))
    }

    #[test]
    fn test_upsert_uses_incoming_value() {
        assert_eq!(
            statements().upsert,
            "INSERT INTO `kv_store` (`key`, `value`) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE `value` = VALUES(`value`)"
        );
    }

    #[test]
    fn test_upserts_avoid_mysql_only_row_alias() {
        let sql = statements();
        for statement in [&sql.upsert, &sql.increment] {
            assert!(!statement.contains(" AS new"), "{statement}");
            assert!(statement.contains("VALUES(`value`)"), "{statement}");
        }
    }

    #[test]
    fn test_increment_adds_server_side() {
        let sql = statements().increment;
        assert!(sql.contains("CAST(`value` AS SIGNED) + CAST(VALUES(`value`) AS SIGNED)"));
        assert!(sql.ends_with("AS CHAR)"));
    }
}
