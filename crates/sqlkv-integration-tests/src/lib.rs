//! Integration test crate for sqlkv.
//!
//! This crate exists solely for integration testing. It is `publish = false`
//! and has no library code; all tests live in `tests/`.
//!
//! SQLite tests always run against a temporary database file. PostgreSQL and
//! MySQL tests run only when `SQLKV_TEST_POSTGRES_URL` or
//! `SQLKV_TEST_MYSQL_URL` is set, and pass trivially otherwise.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
