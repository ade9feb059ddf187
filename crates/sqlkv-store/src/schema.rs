//! Idempotent creation of the backing table.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::AnyPool;
use tracing::info;

use crate::dialect::TableLayout;
use crate::error::StoreResult;

/// A caller-supplied procedure that creates the backing table.
///
/// Used in place of [`ensure_table`] when the table needs options this layer
/// does not know about (tablespaces, `UNLOGGED`, partitioning).
#[async_trait]
pub trait TableCreator: Send + Sync {
    /// Create the table described by `layout` if it does not exist.
    async fn create_table(&self, pool: &AnyPool, layout: &TableLayout) -> StoreResult<()>;
}

/// How the backing table is created at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateTable {
    /// Run [`ensure_table`] (default).
    #[default]
    Auto,
    /// Assume the table exists.
    Disabled,
}

/// The table-creation step a store runs once it has picked its engine.
#[derive(Clone, Default)]
pub enum TableSetup {
    /// Run [`ensure_table`].
    #[default]
    Auto,
    /// Skip table creation.
    Disabled,
    /// Run a caller-supplied procedure.
    Custom(Arc<dyn TableCreator>),
}

impl fmt::Debug for TableSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<CreateTable> for TableSetup {
    fn from(mode: CreateTable) -> Self {
        match mode {
            CreateTable::Auto => Self::Auto,
            CreateTable::Disabled => Self::Disabled,
        }
    }
}

/// Statements creating the two-column `(key, value)` table.
#[must_use]
pub fn table_statements(layout: &TableLayout) -> Vec<String> {
    let dialect = layout.dialect();
    vec![format!(
        "CREATE TABLE IF NOT EXISTS {} ({} {} NOT NULL PRIMARY KEY, {} {})",
        layout.table(),
        layout.key(),
        dialect.key_type(),
        layout.value(),
        dialect.value_type(),
    )]
}

/// Statements creating the row-packing table and its containment index.
///
/// PostgreSQL only: the value column is `JSONB` with a GIN index so that
/// `value ? key` lookups do not scan the mapping.
#[must_use]
pub fn packed_table_statements(layout: &TableLayout) -> Vec<String> {
    let index = layout
        .dialect()
        .quote(&format!("{}_packed_gin", layout.table_name()));
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT NOT NULL PRIMARY KEY, \
             {} JSONB NOT NULL DEFAULT '{{}}'::jsonb)",
            layout.table(),
            layout.key(),
            layout.value(),
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {index} ON {} USING GIN ({})",
            layout.table(),
            layout.value(),
        ),
    ]
}

/// Create the backing table if it does not exist.
///
/// `packed` selects the row-packing layout.
///
/// # Errors
///
/// Returns [`StoreError::Backend`](crate::StoreError::Backend) if a `CREATE`
/// statement fails.
pub async fn ensure_table(pool: &AnyPool, layout: &TableLayout, packed: bool) -> StoreResult<()> {
    let statements = if packed {
        packed_table_statements(layout)
    } else {
        table_statements(layout)
    };
    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(
        table = layout.table_name(),
        dialect = %layout.dialect(),
        packed,
        "ensured table"
    );
    Ok(())
}
