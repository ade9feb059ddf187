//! Backend selection.
//!
//! Probes a live pool once, at construction, and picks the most capable
//! [`Engine`] for it. The decision itself ([`choose_kind`]) is a pure
//! function of what was probed.

use std::sync::Arc;

use sqlx::{AnyPool, Row};
use tracing::{info, warn};

use crate::dialect::{Dialect, TableLayout};
use crate::engine::{
    Engine, EngineKind, GenericEngine, MySqlEngine, PackedEngine, PostgresEngine, SqliteEngine,
};
use crate::error::StoreResult;

/// Oldest PostgreSQL release with `INSERT ... ON CONFLICT`.
pub const MIN_POSTGRES_VERSION: (u32, u32) = (9, 5);

/// Selection inputs taken from the store configuration.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Use dialect-specific engines. When `false`, always [`GenericEngine`].
    pub optimize: bool,
    /// Namespace for the PostgreSQL row-packing engine.
    pub packed_namespace: Option<String>,
}

/// Detect the dialect of the database behind `pool`.
///
/// # Errors
///
/// Returns [`StoreError::Backend`](crate::StoreError::Backend) if no
/// connection can be acquired.
pub async fn detect_dialect(pool: &AnyPool) -> StoreResult<Dialect> {
    let conn = pool.acquire().await?;
    Ok(Dialect::from_backend_name(conn.backend_name()))
}

/// Query the PostgreSQL server version string, e.g. `"16.2 (Debian ...)"`.
///
/// # Errors
///
/// Returns [`StoreError::Backend`](crate::StoreError::Backend) if the query
/// fails.
pub async fn postgres_version(pool: &AnyPool) -> StoreResult<String> {
    let row = sqlx::query("SELECT current_setting('server_version')")
        .fetch_one(pool)
        .await?;
    Ok(row.try_get(0)?)
}

/// Parse the leading `major.minor` of a server version string.
///
/// A missing minor component (as in `"10beta1"`) reads as `0`.
#[must_use]
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let version = version.trim();
    let major_len = version.find(|c: char| !c.is_ascii_digit()).unwrap_or(version.len());
    let major = version.get(..major_len)?.parse().ok()?;
    let minor = version
        .get(major_len..)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(|rest| {
            let len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            rest.get(..len).and_then(|m| m.parse().ok()).unwrap_or(0)
        })
        .unwrap_or(0);
    Some((major, minor))
}

/// Decide which engine to run.
///
/// `postgres_version` is only consulted for PostgreSQL without row-packing;
/// `None` there (unknown or unparseable) falls back to [`EngineKind::Generic`].
#[must_use]
pub fn choose_kind(
    dialect: Dialect,
    options: &SelectOptions,
    postgres_version: Option<(u32, u32)>,
) -> EngineKind {
    if !options.optimize {
        return EngineKind::Generic;
    }
    match dialect {
        Dialect::MySql => EngineKind::MySql,
        Dialect::Postgres if options.packed_namespace.is_some() => EngineKind::PostgresPacked,
        Dialect::Postgres => match postgres_version {
            Some(v) if v >= MIN_POSTGRES_VERSION => EngineKind::Postgres,
            _ => EngineKind::Generic,
        },
        Dialect::Sqlite => EngineKind::Sqlite,
        Dialect::Generic => EngineKind::Generic,
    }
}

/// Construct the engine for `kind`.
#[must_use]
pub fn build_engine(
    kind: EngineKind,
    pool: AnyPool,
    layout: Arc<TableLayout>,
    packed_namespace: Option<&str>,
) -> Box<dyn Engine> {
    match (kind, packed_namespace) {
        (EngineKind::MySql, _) => Box::new(MySqlEngine::new(pool, layout)),
        (EngineKind::Postgres, _) => Box::new(PostgresEngine::new(pool, layout)),
        (EngineKind::PostgresPacked, Some(ns)) => Box::new(PackedEngine::new(pool, layout, ns)),
        (EngineKind::Sqlite, _) => Box::new(SqliteEngine::new(pool, layout)),
        (EngineKind::Generic | EngineKind::PostgresPacked, _) => {
            Box::new(GenericEngine::new(pool, layout))
        },
    }
}

/// Probe `pool` and build the best engine for it.
///
/// # Errors
///
/// Returns [`StoreError::Backend`](crate::StoreError::Backend) if the version
/// probe fails.
pub async fn select_engine(
    pool: &AnyPool,
    layout: Arc<TableLayout>,
    options: &SelectOptions,
) -> StoreResult<Box<dyn Engine>> {
    let dialect = layout.dialect();
    let needs_version =
        options.optimize && dialect == Dialect::Postgres && options.packed_namespace.is_none();

    let version = if needs_version {
        let raw = postgres_version(pool).await?;
        let parsed = parse_version(&raw);
        if parsed.is_none() {
            warn!(version = %raw, "unparseable server version; using generic engine");
        }
        parsed
    } else {
        None
    };

    if options.packed_namespace.is_some() && dialect != Dialect::Postgres {
        warn!(%dialect, "row-packing needs PostgreSQL; namespace ignored");
    }

    let kind = choose_kind(dialect, options, version);
    info!(%dialect, ?version, engine = %kind, "selected engine");
    Ok(build_engine(
        kind,
        pool.clone(),
        layout,
        options.packed_namespace.as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sqlite_pool;

    fn optimized() -> SelectOptions {
        SelectOptions {
            optimize: true,
            packed_namespace: None,
        }
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("9.4.26"), Some((9, 4)));
        assert_eq!(parse_version("16.2 (Debian 16.2-1.pgdg120+2)"), Some((16, 2)));
        assert_eq!(parse_version("10beta1"), Some((10, 0)));
        assert_eq!(parse_version(" 12"), Some((12, 0)));
        assert_eq!(parse_version("devel"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_optimize_disabled_is_always_generic() {
        let options = SelectOptions {
            optimize: false,
            packed_namespace: Some("ns".into()),
        };
        for dialect in [Dialect::Postgres, Dialect::MySql, Dialect::Sqlite] {
            assert_eq!(
                choose_kind(dialect, &options, Some((16, 0))),
                EngineKind::Generic
            );
        }
    }

    #[test]
    fn test_dialect_mapping() {
        let options = optimized();
        assert_eq!(choose_kind(Dialect::MySql, &options, None), EngineKind::MySql);
        assert_eq!(choose_kind(Dialect::Sqlite, &options, None), EngineKind::Sqlite);
        assert_eq!(choose_kind(Dialect::Generic, &options, None), EngineKind::Generic);
    }

    #[test]
    fn test_postgres_version_gate() {
        let options = optimized();
        assert_eq!(
            choose_kind(Dialect::Postgres, &options, Some((9, 5))),
            EngineKind::Postgres
        );
        assert_eq!(
            choose_kind(Dialect::Postgres, &options, Some((12, 0))),
            EngineKind::Postgres
        );
        assert_eq!(
            choose_kind(Dialect::Postgres, &options, Some((9, 4))),
            EngineKind::Generic
        );
        assert_eq!(
            choose_kind(Dialect::Postgres, &options, None),
            EngineKind::Generic
        );
    }

    #[test]
    fn test_packed_namespace_wins_on_postgres_only() {
        let options = SelectOptions {
            optimize: true,
            packed_namespace: Some("sessions".into()),
        };
        assert_eq!(
            choose_kind(Dialect::Postgres, &options, None),
            EngineKind::PostgresPacked
        );
        assert_eq!(choose_kind(Dialect::MySql, &options, None), EngineKind::MySql);
    }

    #[tokio::test]
    async fn test_select_engine_on_sqlite() {
        let pool = sqlite_pool().await;
        let dialect = detect_dialect(&pool).await.unwrap();
        assert_eq!(dialect, Dialect::Sqlite);

        let layout = Arc::new(TableLayout::new(dialect, "kv_store", "key", "value"));
        let engine = select_engine(&pool, Arc::clone(&layout), &optimized())
            .await
            .unwrap();
        assert_eq!(engine.kind(), EngineKind::Sqlite);

        let generic = select_engine(&pool, layout, &SelectOptions::default())
            .await
            .unwrap();
        assert_eq!(generic.kind(), EngineKind::Generic);
    }
}
