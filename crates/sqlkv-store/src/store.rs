//! The store handle.

use std::sync::Arc;
use std::time::Duration;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tracing::{debug, info};

use crate::codec::validate_key;
use crate::config::StoreConfig;
use crate::dialect::{Dialect, TableLayout};
use crate::engine::{Engine, EngineKind};
use crate::error::{StoreError, StoreResult};
use crate::schema::{TableCreator, TableSetup, ensure_table};
use crate::selector::{SelectOptions, detect_dialect, select_engine};

/// Key/value store over a SQL table.
///
/// Owns the connection pool and the engine picked for it at construction.
/// Dropping the store without [`close`](Self::close) leaves closing the pool
/// to its last clone.
///
/// # Example
///
/// ```rust,ignore
/// use sqlkv_store::{SqlKvStore, StoreConfig};
///
/// let store = SqlKvStore::connect(StoreConfig::new("postgres://localhost/app")).await?;
/// store.store("a", b"1").await?;
/// assert_eq!(store.increment("a", 5).await?, 6);
/// assert!(!store.create("a", b"x").await?);
/// assert_eq!(store.delete("a").await?, Some(b"6".to_vec()));
/// store.close().await;
/// ```
pub struct SqlKvStore {
    pool: AnyPool,
    engine: Box<dyn Engine>,
    layout: Arc<TableLayout>,
}

impl std::fmt::Debug for SqlKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlKvStore")
            .field("engine", &self.engine.kind())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl SqlKvStore {
    /// Connect using `config` and prepare the table.
    ///
    /// # Errors
    ///
    /// See [`SqlKvStoreBuilder::build`].
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        Self::builder(config).build().await
    }

    /// Start building a store from `config`.
    #[must_use]
    pub fn builder(config: StoreConfig) -> SqlKvStoreBuilder {
        SqlKvStoreBuilder::new(config)
    }

    /// The engine strategy in use.
    #[must_use]
    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// The detected dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.layout.dialect()
    }

    /// The resolved table layout.
    #[must_use]
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Whether `key` is present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] for an empty or NUL-containing key,
    /// or [`StoreError::Backend`] if the query fails.
    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        self.engine.exists(key).await
    }

    /// Load the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] or [`StoreError::Backend`].
    pub async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        self.engine.load(key).await
    }

    /// Store `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`], [`StoreError::Encoding`] (row
    /// packing with non-UTF-8 data), or the last [`StoreError::Backend`]
    /// once retries are exhausted.
    pub async fn store(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        debug!(key, len = value.len(), "store");
        self.engine.store(key, value).await
    }

    /// Store `value` only if `key` is absent. Returns `false` if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`], [`StoreError::Encoding`], or a
    /// [`StoreError::Backend`] other than a uniqueness violation.
    pub async fn create(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        validate_key(key)?;
        let created = self.engine.create(key, value).await?;
        debug!(key, created, "create");
        Ok(created)
    }

    /// Atomically add `amount` to the integer under `key` (absent reads as
    /// zero) and return the result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Format`] without retrying if the stored value is
    /// not base-10 integer text or the sum overflows; [`StoreError::Backend`]
    /// once retries are exhausted.
    pub async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        validate_key(key)?;
        let value = self.engine.increment(key, amount).await?;
        debug!(key, amount, value, "increment");
        Ok(value)
    }

    /// Remove `key`, returning the value it held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] or [`StoreError::Backend`].
    pub async fn delete(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        debug!(key, "delete");
        self.engine.delete(key).await
    }

    /// Remove every key. In row-packing mode the namespace row is kept with
    /// an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the statement fails.
    pub async fn clear(&self) -> StoreResult<()> {
        debug!(table = self.layout.table_name(), "clear");
        self.engine.clear().await
    }

    /// Close the pool. Consumes the store.
    pub async fn close(self) {
        self.engine.close().await;
        info!(table = self.layout.table_name(), "store closed");
    }
}

/// Builder for [`SqlKvStore`].
#[derive(Debug)]
pub struct SqlKvStoreBuilder {
    config: StoreConfig,
    pool: Option<AnyPool>,
    setup: TableSetup,
}

impl SqlKvStoreBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let setup = TableSetup::from(config.create_table);
        Self {
            config,
            pool: None,
            setup,
        }
    }

    /// Use an existing pool instead of connecting with the configured DSN.
    #[must_use]
    pub fn with_pool(mut self, pool: AnyPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Create the table with `creator` instead of the built-in statements.
    #[must_use]
    pub fn with_table_creator(mut self, creator: Arc<dyn TableCreator>) -> Self {
        self.setup = TableSetup::Custom(creator);
        self
    }

    /// Connect (unless a pool was supplied), pick an engine and prepare the
    /// table.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Configuration`] for invalid config or no DSN.
    /// - [`StoreError::Connection`] if connecting fails.
    /// - [`StoreError::Backend`] if probing or table creation fails.
    pub async fn build(self) -> StoreResult<SqlKvStore> {
        let Self {
            config,
            pool,
            setup,
        } = self;
        config.validate()?;

        let pool = match pool {
            Some(pool) => pool,
            None => connect_pool(&config).await?,
        };

        let dialect = detect_dialect(&pool).await?;
        let layout = Arc::new(TableLayout::new(
            dialect,
            &config.table,
            &config.key_column,
            &config.value_column,
        ));

        let options = SelectOptions {
            optimize: config.optimize,
            packed_namespace: config.packed_namespace.clone(),
        };
        let engine = select_engine(&pool, Arc::clone(&layout), &options).await?;

        match &setup {
            TableSetup::Auto => {
                let packed = engine.kind() == EngineKind::PostgresPacked;
                ensure_table(&pool, &layout, packed).await?;
            },
            TableSetup::Custom(creator) => creator.create_table(&pool, &layout).await?,
            TableSetup::Disabled => {
                debug!(table = layout.table_name(), "table creation disabled");
            },
        }

        Ok(SqlKvStore {
            pool,
            engine,
            layout,
        })
    }
}

/// Open a pool for the configured DSN.
async fn connect_pool(config: &StoreConfig) -> StoreResult<AnyPool> {
    let dsn = config.resolve_dsn()?;
    sqlx::any::install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_millis(config.validation_timeout_ms))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))
}
