//! Key validation and value encoding shared by every engine.
//!
//! Values are opaque bytes. The only interpretation this layer ever applies
//! is the counter encoding used by increment: base-10 ASCII integer text.

use sqlx::Row;
use sqlx::any::AnyRow;

use crate::error::{StoreError, StoreResult};

/// Validate that a key can be stored verbatim as a primary-key value.
///
/// Keys must be non-empty and must not contain the null byte, which
/// PostgreSQL text columns cannot hold.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StoreError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Parse a stored counter value.
///
/// Surrounding whitespace is ignored, as PostgreSQL's `bigint` input does,
/// so a value increments the same way on every engine.
pub(crate) fn parse_counter(key: &str, raw: &[u8]) -> StoreResult<i64> {
    std::str::from_utf8(raw)
        .ok()
        .map(|s| s.trim_matches(is_sql_space))
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StoreError::format(key, raw))
}

/// The characters C `isspace` accepts.
fn is_sql_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Add `amount` to `current`, treating overflow as a format error.
pub(crate) fn add_counter(key: &str, current: i64, amount: i64) -> StoreResult<i64> {
    current
        .checked_add(amount)
        .ok_or_else(|| StoreError::format(key, current.to_string().as_bytes()))
}

/// Encode a counter as stored bytes.
pub(crate) fn encode_counter(value: i64) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Decode the value column at `idx`.
///
/// Rows written by other clients may hold text rather than binary data, so a
/// text column is accepted and returned as its UTF-8 bytes. SQL `NULL` reads
/// as the empty value.
pub(crate) fn decode_value(row: &AnyRow, idx: usize) -> StoreResult<Vec<u8>> {
    match row.try_get::<Option<Vec<u8>>, _>(idx) {
        Ok(bytes) => Ok(bytes.unwrap_or_default()),
        Err(sqlx::Error::ColumnDecode { .. }) => {
            let text: Option<String> = row.try_get(idx)?;
            Ok(text.map(String::into_bytes).unwrap_or_default())
        },
        Err(e) => Err(e.into()),
    }
}

/// Interpret a value as UTF-8 text, for columns that cannot hold raw bytes.
pub(crate) fn value_as_text<'a>(key: &str, value: &'a [u8]) -> StoreResult<&'a str> {
    std::str::from_utf8(value).map_err(|e| {
        StoreError::Encoding(format!("value for key {key:?} is not valid UTF-8: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_rejects_empty() {
        assert!(validate_key("").is_err());
    }

    #[test]
    fn test_validate_key_rejects_null_byte() {
        assert!(validate_key("k\0bad").is_err());
    }

    #[test]
    fn test_validate_key_accepts_arbitrary_text() {
        assert!(validate_key("lock:job/42 ünïcode").is_ok());
    }

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter("k", b"42").unwrap(), 42);
        assert_eq!(parse_counter("k", b"-7").unwrap(), -7);
        assert!(matches!(
            parse_counter("k", b"4x2"),
            Err(StoreError::Format { .. })
        ));
        assert!(parse_counter("k", b"").is_err());
        assert!(parse_counter("k", b"   ").is_err());
        assert!(parse_counter("k", b"1 2").is_err());
        assert!(parse_counter("k", &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_parse_counter_ignores_surrounding_whitespace() {
        assert_eq!(parse_counter("k", b" 7 ").unwrap(), 7);
        assert_eq!(parse_counter("k", b"\t-3\n").unwrap(), -3);
        assert_eq!(parse_counter("k", b"+5").unwrap(), 5);
    }

    #[test]
    fn test_add_counter_overflow_is_format_error() {
        assert_eq!(add_counter("k", 1, 5).unwrap(), 6);
        assert!(matches!(
            add_counter("k", i64::MAX, 1),
            Err(StoreError::Format { .. })
        ));
    }

    #[test]
    fn test_encode_counter_is_decimal_text() {
        assert_eq!(encode_counter(-15), b"-15".to_vec());
        assert_eq!(encode_counter(0), b"0".to_vec());
    }

    #[test]
    fn test_value_as_text() {
        assert_eq!(value_as_text("k", b"hello").unwrap(), "hello");
        assert!(matches!(
            value_as_text("k", &[0xc3, 0x28]),
            Err(StoreError::Encoding(_))
        ));
    }
}
