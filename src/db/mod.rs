//! Key-value persistence for extract-archive
//!
//! The extraction queues are stored as JSON values under fixed keys (`"Queue"`,
//! `"Failed"`) through the [`KeyValueStore`] contract. Two implementations ship
//! with the crate:
//! - [`Database`]: SQLite via sqlx, durable across restarts
//! - [`MemoryStore`]: in-process map for tests and hosts without a database
//!
//! ## Submodules
//!
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`kv`]: `KeyValueStore` implementation for [`Database`]
//! - [`memory`]: [`MemoryStore`]

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;

use crate::Result;

mod kv;
mod memory;
mod migrations;

pub use memory::MemoryStore;

/// Durable key-value store used by the extraction queues
///
/// Mirrors the host persistence collaborator: get with default, store, delete.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value
    async fn store(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read the value stored under `key`, falling back to `default`
    async fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key).await?.unwrap_or(default))
    }
}

/// Database handle for extract-archive
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
