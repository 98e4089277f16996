//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::Once;

pub use tidkv::{Database, DatabaseConfig, Error, MemoryStore, RetryConfig, Transaction};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a fmt subscriber filtered by `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Fresh database over an empty in-process store
pub fn test_db() -> Database<MemoryStore> {
    init_tracing();
    Database::new(MemoryStore::new())
}

// ============================================================================
// Value Helpers
// ============================================================================

/// Decode a big-endian u32 counter; absent means 0
pub fn decode_u32(raw: Option<Vec<u8>>) -> u32 {
    match raw {
        Some(bytes) => u32::from_be_bytes(bytes.as_slice().try_into().expect("4-byte counter")),
        None => 0,
    }
}

/// Encode a u32 counter big-endian
pub fn encode_u32(n: u32) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

/// Read a big-endian u32 counter inside a transaction
pub async fn read_u32(txn: &mut Transaction, key: &str) -> Result<u32, Error> {
    Ok(decode_u32(txn.get(key).await?))
}
