//! Database engine for tidkv
//!
//! This crate ties the lower layers together:
//! - Database: wraps a store, hands out transactions
//! - Closure-based transactions (`view`, `update`, `update_with_retry`)
//! - Configuration loaded from TOML
//!
//! The engine is the only component that reads the global counter to pick a
//! snapshot; everything after `begin` happens in the transaction actor.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;

pub use database::{Database, DatabaseConfig, RetryConfig, CONFIG_FILE_NAME};
