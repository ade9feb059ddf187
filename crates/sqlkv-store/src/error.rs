//! Store error types.

/// SQLSTATE for a serialization failure (PostgreSQL, MySQL deadlock victim).
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for a detected deadlock (PostgreSQL).
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE class for data exceptions: bad casts, overflow, invalid encoding.
const SQLSTATE_CLASS_DATA_EXCEPTION: &str = "22";

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be configured (e.g. no connection descriptor).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connecting to the database failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The key cannot be stored by this layer.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The value cannot be represented in the backing column.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An increment targeted a value that is not base-10 integer text.
    #[error("value for key {key:?} is not an integer: {value:?}")]
    Format {
        /// The key whose value failed to parse.
        key: String,
        /// The stored value, lossily decoded for display.
        value: String,
    },

    /// The database rejected a statement.
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    /// Build a [`StoreError::Format`] from a raw stored value.
    pub(crate) fn format(key: &str, value: &[u8]) -> Self {
        Self::Format {
            key: key.to_owned(),
            value: String::from_utf8_lossy(value).into_owned(),
        }
    }

    /// The SQLSTATE (or driver-specific code) reported by the database, if any.
    #[must_use]
    pub fn database_code(&self) -> Option<String> {
        match self {
            Self::Backend(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }

    /// Whether this is a primary-key uniqueness violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Backend(sqlx::Error::Database(db)) if db.is_unique_violation())
    }

    /// Whether the database aborted the statement to resolve a conflict with
    /// a concurrent transaction. Such failures are safe to retry.
    #[must_use]
    pub fn is_serialization_failure(&self) -> bool {
        self.database_code().is_some_and(|code| {
            code == SQLSTATE_SERIALIZATION_FAILURE || code == SQLSTATE_DEADLOCK_DETECTED
        })
    }

    /// Whether the database rejected the data itself (SQLSTATE class `22`),
    /// e.g. `22P02` for non-integer text, `22003` for overflow, or `22021`
    /// for bytes that are not valid UTF-8.
    #[must_use]
    pub fn is_data_exception(&self) -> bool {
        self.database_code()
            .is_some_and(|code| is_data_exception_code(&code))
    }

    /// Whether this error came from the database rather than from this layer.
    #[must_use]
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

fn is_data_exception_code(code: &str) -> bool {
    code.starts_with(SQLSTATE_CLASS_DATA_EXCEPTION)
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
