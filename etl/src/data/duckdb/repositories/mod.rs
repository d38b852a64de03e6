//! DuckDB repositories
//!
//! Synchronous functions over a borrowed connection; callers run them on
//! the blocking pool via `DuckdbService::with_conn`.

pub mod catalog;
pub mod export;
pub mod staging;
pub mod star;
