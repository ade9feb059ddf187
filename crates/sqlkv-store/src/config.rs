//! Store configuration.
//!
//! [`StoreConfig`] can be built in code or loaded from TOML. Every field has
//! a default, so an empty document plus a `dsn` (or the `SQLKV_DSN`
//! environment variable) is a working configuration:
//!
//! ```toml
//! dsn = "postgres://app@localhost/app"
//! table = "kv_store"
//! packed_namespace = "sessions"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::schema::CreateTable;

/// Environment variable consulted when no `dsn` is configured.
pub const DSN_ENV_VAR: &str = "SQLKV_DSN";

/// Default table name.
pub const DEFAULT_TABLE: &str = "kv_store";

/// Configuration for a [`SqlKvStore`](crate::SqlKvStore).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URL (`postgres://`, `mysql://`, `sqlite:`). Falls back to
    /// [`DSN_ENV_VAR`]. Not needed when a pool is supplied directly.
    #[serde(skip_serializing)]
    pub dsn: Option<String>,
    /// Backing table.
    pub table: String,
    /// Key column.
    pub key_column: String,
    /// Value column.
    pub value_column: String,
    /// Pack every key into one JSONB row under this namespace (PostgreSQL).
    pub packed_namespace: Option<String>,
    /// Table creation at construction.
    pub create_table: CreateTable,
    /// Use dialect-specific engines.
    pub optimize: bool,
    /// How long to wait for a validated connection, in milliseconds.
    pub validation_timeout_ms: u64,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("has_dsn", &self.dsn.is_some())
            .field("table", &self.table)
            .field("key_column", &self.key_column)
            .field("value_column", &self.value_column)
            .field("packed_namespace", &self.packed_namespace)
            .field("create_table", &self.create_table)
            .field("optimize", &self.optimize)
            .field("validation_timeout_ms", &self.validation_timeout_ms)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            table: DEFAULT_TABLE.to_owned(),
            key_column: "key".to_owned(),
            value_column: "value".to_owned(),
            packed_namespace: None,
            create_table: CreateTable::Auto,
            optimize: true,
            validation_timeout_ms: 5_000,
            max_connections: 10,
        }
    }
}

impl StoreConfig {
    /// A default configuration connecting to `dsn`.
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: Some(dsn.into()),
            ..Self::default()
        }
    }

    /// Set the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the key and value column names.
    #[must_use]
    pub fn with_columns(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.key_column = key.into();
        self.value_column = value.into();
        self
    }

    /// Enable row-packing under `namespace`.
    #[must_use]
    pub fn with_packed_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.packed_namespace = Some(namespace.into());
        self
    }

    /// Set how the table is created.
    #[must_use]
    pub fn with_create_table(mut self, mode: CreateTable) -> Self {
        self.create_table = mode;
        self
    }

    /// Always use the generic engine.
    #[must_use]
    pub fn without_optimization(mut self) -> Self {
        self.optimize = false;
        self
    }

    /// Set the maximum number of pooled connections.
    #[must_use]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if the document is malformed or
    /// fails [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> StoreResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| StoreError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if the file cannot be read or
    /// parsed.
    pub fn load_file(path: &Path) -> StoreResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded store config");
        Self::from_toml_str(&source)
    }

    /// Check names and limits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] naming the first invalid field.
    pub fn validate(&self) -> StoreResult<()> {
        for (field, value) in [
            ("table", &self.table),
            ("key_column", &self.key_column),
            ("value_column", &self.value_column),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::Configuration(format!(
                    "{field} must not be empty"
                )));
            }
            if value.contains('\0') {
                return Err(StoreError::Configuration(format!(
                    "{field} must not contain null bytes"
                )));
            }
        }
        if self.key_column == self.value_column {
            return Err(StoreError::Configuration(
                "key_column and value_column must differ".into(),
            ));
        }
        if let Some(ns) = &self.packed_namespace {
            crate::codec::validate_key(ns)
                .map_err(|e| StoreError::Configuration(format!("packed_namespace: {e}")))?;
        }
        if self.max_connections == 0 {
            return Err(StoreError::Configuration(
                "max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The connection URL: `dsn`, else [`DSN_ENV_VAR`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if neither is set.
    pub fn resolve_dsn(&self) -> StoreResult<String> {
        if let Some(dsn) = self.dsn.as_ref().filter(|d| !d.is_empty()) {
            return Ok(dsn.clone());
        }
        match std::env::var(DSN_ENV_VAR) {
            Ok(dsn) if !dsn.is_empty() => Ok(dsn),
            _ => Err(StoreError::Configuration(format!(
                "no connection descriptor: set `dsn` or {DSN_ENV_VAR}"
            ))),
        }
    }
}
