//! SQLite-backed storage engine for `docsearch-core`.
//!
//! Provides [`SqliteStorage`], a `Storage` implementation over a pooled
//! `sqlmodel_sqlite` connection, plus the brute-force cosine scan it runs
//! searches through.
//!
//! # Timestamp Convention
//!
//! Matches `docsearch-core`: timestamps are `i64` microseconds since the
//! Unix epoch, stored as `INTEGER` columns.

#![forbid(unsafe_code)]

pub mod schema;
pub mod storage_impl;
pub mod vector_index;

pub use storage_impl::SqliteStorage;
