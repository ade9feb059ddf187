//! SQL dialect detection and statement rendering.
//!
//! Connections go through `sqlx`'s `Any` driver, which passes statement text
//! to the database untouched. Identifier quoting and bind placeholders must
//! therefore be rendered per dialect; [`TableLayout`] does that once, at
//! construction, for the table and its two columns.

use std::fmt;

/// The SQL engine family a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// PostgreSQL.
    Postgres,
    /// MySQL or MariaDB.
    MySql,
    /// SQLite.
    Sqlite,
    /// Anything else; only portable statements are used.
    Generic,
}

impl Dialect {
    /// Map the backend name reported by an `Any` connection to a dialect.
    ///
    /// Unknown names map to [`Dialect::Generic`].
    #[must_use]
    pub fn from_backend_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Self::Postgres,
            "mysql" | "mariadb" => Self::MySql,
            "sqlite" => Self::Sqlite,
            _ => Self::Generic,
        }
    }

    /// Quote an identifier for this dialect.
    #[must_use]
    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Postgres | Self::Sqlite | Self::Generic => {
                format!("\"{}\"", ident.replace('"', "\"\""))
            },
        }
    }

    /// Bind placeholder for the `n`th (1-based) parameter.
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::MySql | Self::Sqlite | Self::Generic => "?".to_owned(),
        }
    }

    /// Column type used for the key column.
    #[must_use]
    pub fn key_type(self) -> &'static str {
        match self {
            Self::Postgres | Self::Sqlite => "TEXT",
            // MySQL cannot index an unbounded TEXT primary key.
            Self::MySql | Self::Generic => "VARCHAR(255)",
        }
    }

    /// Column type used for the binary value column.
    #[must_use]
    pub fn value_type(self) -> &'static str {
        match self {
            Self::Postgres => "BYTEA",
            Self::MySql => "LONGBLOB",
            Self::Sqlite | Self::Generic => "BLOB",
        }
    }

    /// Suffix that takes a row lock on `SELECT`, if the dialect has one.
    ///
    /// SQLite has no row locks; writers are serialized by the database lock.
    #[must_use]
    pub fn row_lock_clause(self) -> &'static str {
        match self {
            Self::Sqlite => "",
            Self::Postgres | Self::MySql | Self::Generic => " FOR UPDATE",
        }
    }

    /// Statement opening a read-modify-write transaction that must hold the
    /// write lock from its first read, or `None` to use a plain `BEGIN`.
    ///
    /// A deferred SQLite transaction that reads and then writes cannot wait
    /// for a concurrent writer; the upgrade fails with `SQLITE_BUSY` at once.
    /// `BEGIN IMMEDIATE` takes the write lock up front, where the busy
    /// timeout applies.
    #[must_use]
    pub fn write_transaction_begin(self) -> Option<&'static str> {
        match self {
            Self::Sqlite => Some("BEGIN IMMEDIATE"),
            Self::Postgres | Self::MySql | Self::Generic => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// The resolved, quoted names of the backing table and its columns.
///
/// Shared immutably by every engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    dialect: Dialect,
    table_name: String,
    table: String,
    key: String,
    value: String,
}

impl TableLayout {
    /// Build a layout, quoting each identifier for `dialect`.
    #[must_use]
    pub fn new(dialect: Dialect, table: &str, key_column: &str, value_column: &str) -> Self {
        Self {
            dialect,
            table_name: table.to_owned(),
            table: dialect.quote(table),
            key: dialect.quote(key_column),
            value: dialect.quote(value_column),
        }
    }

    /// The dialect statements are rendered for.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The unquoted table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The quoted table identifier.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The quoted key column.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The quoted value column.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Bind placeholder for the `n`th (1-based) parameter.
    #[must_use]
    pub fn param(&self, n: usize) -> String {
        self.dialect.placeholder(n)
    }
}
