//! Shared harness and behavior checks for integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use sqlkv_store::{SqlKvStore, StoreConfig, StoreError};
use sqlkv_telemetry::{LogConfig, setup_logging};
use tempfile::TempDir;

/// Env var holding a PostgreSQL URL for backend tests.
#[allow(dead_code)]
pub const POSTGRES_URL_ENV: &str = "SQLKV_TEST_POSTGRES_URL";
/// Env var holding a MySQL URL for backend tests.
#[allow(dead_code)]
pub const MYSQL_URL_ENV: &str = "SQLKV_TEST_MYSQL_URL";

static TABLE_SEQ: AtomicU32 = AtomicU32::new(0);

/// Install a test subscriber once per binary. Later calls are no-ops.
pub fn init_logging() {
    let _ = setup_logging(&LogConfig::new("warn").with_directive("sqlkv_store=debug"));
}

/// A table name no other test in this run uses.
#[allow(dead_code)]
pub fn unique_table(prefix: &str) -> String {
    let seq = TABLE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{}_{seq}", std::process::id())
}

/// A store over a temporary SQLite file, pooled with the default number of
/// connections so concurrent checks really run side by side.
///
/// Holds the `TempDir` so the database outlives the test body.
#[allow(dead_code)]
pub struct SqliteHarness {
    /// The store under test.
    pub store: Arc<SqlKvStore>,
    /// The DSN the store was opened with.
    pub dsn: String,
    _dir: TempDir,
}

#[allow(dead_code)]
impl SqliteHarness {
    /// Open a harness with the default configuration.
    pub async fn new() -> Self {
        Self::with_config(|config| config).await
    }

    /// Open a harness, letting `adjust` tweak the configuration.
    pub async fn with_config(adjust: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        init_logging();
        let dir = TempDir::new().expect("failed to create tempdir");
        let dsn = format!("sqlite://{}?mode=rwc", dir.path().join("kv.db").display());
        let config = adjust(StoreConfig::new(&dsn));
        let store = SqlKvStore::connect(config)
            .await
            .expect("failed to open sqlite store");
        Self {
            store: Arc::new(store),
            dsn,
            _dir: dir,
        }
    }
}

/// Connect to the URL in `env`, or `None` when it is unset.
#[allow(dead_code)]
pub async fn connect_from_env(
    env: &str,
    adjust: impl FnOnce(StoreConfig) -> StoreConfig,
) -> Option<SqlKvStore> {
    let Ok(url) = std::env::var(env) else {
        eprintln!("{env} not set; skipping");
        return None;
    };
    init_logging();
    let store = SqlKvStore::connect(adjust(StoreConfig::new(url)))
        .await
        .expect("failed to connect to backend");
    store.clear().await.expect("failed to clear table");
    Some(store)
}

/// Run every behavior check against `store`.
#[allow(dead_code)]
pub async fn check_all(store: &Arc<SqlKvStore>) {
    check_create_then_load(store).await;
    check_store_overwrites(store).await;
    check_delete_and_exists(store).await;
    check_increment_sums(store).await;
    check_increment_rejects_non_integer(store).await;
    check_empty_value(store).await;
    check_clear(store).await;
    check_concurrent_increments(store, 50).await;
    check_concurrent_create_single_winner(store, 10).await;
    check_concurrent_store_of_new_key(store, 20).await;
    check_scenario(store).await;
}

/// `create` on an absent key stores it; a second `create` is refused.
pub async fn check_create_then_load(store: &SqlKvStore) {
    store.clear().await.unwrap();
    assert!(store.create("fresh", b"v1").await.unwrap());
    assert_eq!(store.load("fresh").await.unwrap(), Some(b"v1".to_vec()));
    assert!(!store.create("fresh", b"v2").await.unwrap());
    assert_eq!(store.load("fresh").await.unwrap(), Some(b"v1".to_vec()));
}

/// `store` inserts or replaces.
pub async fn check_store_overwrites(store: &SqlKvStore) {
    store.clear().await.unwrap();
    store.store("k", b"one").await.unwrap();
    store.store("k", b"two").await.unwrap();
    assert_eq!(store.load("k").await.unwrap(), Some(b"two".to_vec()));
    assert_eq!(store.load("missing").await.unwrap(), None);
}

/// `delete` returns the old value and removes the key.
pub async fn check_delete_and_exists(store: &SqlKvStore) {
    store.clear().await.unwrap();
    store.store("gone", b"bye").await.unwrap();
    assert!(store.exists("gone").await.unwrap());
    assert_eq!(store.delete("gone").await.unwrap(), Some(b"bye".to_vec()));
    assert!(!store.exists("gone").await.unwrap());
    assert_eq!(store.delete("gone").await.unwrap(), None);
}

/// Increments start from zero and accumulate, negatives included.
pub async fn check_increment_sums(store: &SqlKvStore) {
    store.clear().await.unwrap();
    assert_eq!(store.increment("n", 3).await.unwrap(), 3);
    assert_eq!(store.increment("n", 4).await.unwrap(), 7);
    assert_eq!(store.increment("n", -10).await.unwrap(), -3);
    assert_eq!(store.load("n").await.unwrap(), Some(b"-3".to_vec()));

    store.store("m", b"40").await.unwrap();
    assert_eq!(store.increment("m", 2).await.unwrap(), 42);
}

/// A non-integer value fails with a format error and is left untouched.
pub async fn check_increment_rejects_non_integer(store: &SqlKvStore) {
    store.clear().await.unwrap();
    store.store("word", b"abc").await.unwrap();
    assert!(matches!(
        store.increment("word", 1).await,
        Err(StoreError::Format { .. })
    ));
    assert_eq!(store.load("word").await.unwrap(), Some(b"abc".to_vec()));
}

/// An empty value is stored and read back as empty, not absent.
pub async fn check_empty_value(store: &SqlKvStore) {
    store.clear().await.unwrap();
    store.store("empty", b"").await.unwrap();
    assert!(store.exists("empty").await.unwrap());
    assert_eq!(store.load("empty").await.unwrap(), Some(Vec::new()));
    assert!(!store.create("empty", b"x").await.unwrap());
}

/// `clear` removes everything and the store stays usable.
pub async fn check_clear(store: &SqlKvStore) {
    store.store("a", b"1").await.unwrap();
    store.store("b", b"2").await.unwrap();
    store.clear().await.unwrap();
    assert!(!store.exists("a").await.unwrap());
    assert!(!store.exists("b").await.unwrap());
    store.store("a", b"3").await.unwrap();
    assert_eq!(store.load("a").await.unwrap(), Some(b"3".to_vec()));
}

/// `tasks` concurrent increments of 1 lose no updates.
///
/// Returned values are only range-checked: the MySQL engine re-reads the
/// counter after its upsert, so two callers may observe the same total.
pub async fn check_concurrent_increments(store: &Arc<SqlKvStore>, tasks: i64) {
    let results = spawn_increments(store, tasks).await;
    assert!(results.iter().all(|n| (1..=tasks).contains(n)));
    assert_eq!(
        store.load("hits").await.unwrap(),
        Some(tasks.to_string().into_bytes())
    );
}

/// Concurrent increments each observe a distinct running total.
#[allow(dead_code)]
pub async fn check_increment_returns_are_unique(store: &Arc<SqlKvStore>, tasks: i64) {
    let mut results = spawn_increments(store, tasks).await;
    results.sort_unstable();
    assert_eq!(results, (1..=tasks).collect::<Vec<_>>());
}

async fn spawn_increments(store: &Arc<SqlKvStore>, tasks: i64) -> Vec<i64> {
    store.clear().await.unwrap();
    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let store = Arc::clone(store);
            tokio::spawn(async move { store.increment("hits", 1).await.unwrap() })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

/// Exactly one of `tasks` racing `create` calls wins.
pub async fn check_concurrent_create_single_winner(store: &Arc<SqlKvStore>, tasks: usize) {
    store.clear().await.unwrap();
    let handles: Vec<_> = (0..tasks)
        .map(|i| {
            let store = Arc::clone(store);
            tokio::spawn(async move {
                store
                    .create("lock", i.to_string().as_bytes())
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut winners = 0_usize;
    for handle in handles {
        if handle.await.unwrap() {
            winners = winners.saturating_add(1);
        }
    }
    assert_eq!(winners, 1);
}

/// `tasks` concurrent `store` calls on one new key all succeed, and one of
/// the written values remains.
pub async fn check_concurrent_store_of_new_key(store: &Arc<SqlKvStore>, tasks: u8) {
    store.clear().await.unwrap();
    let handles: Vec<_> = (0..tasks)
        .map(|i| {
            let store = Arc::clone(store);
            tokio::spawn(async move {
                store
                    .store("shared", i.to_string().as_bytes())
                    .await
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    let stored = store.load("shared").await.unwrap().unwrap();
    let winner: u8 = String::from_utf8(stored).unwrap().parse().unwrap();
    assert!(winner < tasks);
}

/// store, increment, refused create, delete, exists.
pub async fn check_scenario(store: &SqlKvStore) {
    store.clear().await.unwrap();
    store.store("a", b"1").await.unwrap();
    assert_eq!(store.increment("a", 5).await.unwrap(), 6);
    assert!(!store.create("a", b"x").await.unwrap());
    assert_eq!(store.delete("a").await.unwrap(), Some(b"6".to_vec()));
    assert!(!store.exists("a").await.unwrap());
}
