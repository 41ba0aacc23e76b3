//! Session Store
//!
//! Key/value boundary for upload session state. Sessions are JSON text,
//! chunks are raw bytes; both live under one key namespace with per-key
//! expiry. The Redis backend is the production substrate; the in-memory
//! backend mirrors its semantics for tests and local development.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Prefix for session records
pub const SESSION_KEY_PREFIX: &str = "upload:session:";

/// Key for a session record
pub fn session_key(upload_id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, upload_id)
}

/// Key for a single chunk payload
pub fn chunk_key(upload_id: &str, chunk_index: u32) -> String {
    format!("upload:chunk:{}:{}", upload_id, chunk_index)
}

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Expiry state of a key (Redis TTL semantics: -2 missing, -1 no expiry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlState {
    /// Key does not exist
    Missing,
    /// Key exists but has no expiry set
    NoExpiry,
    /// Key expires after the given duration
    Expires(Duration),
}

/// Key/value store with per-key expiry
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a text value
    async fn get_text(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a text value with an expiry
    async fn put_text(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Read a binary value
    async fn get_bytes(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a binary value with an expiry
    async fn put_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Bulk-delete keys; no-op on an empty list
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    /// Check key existence
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Inspect the expiry state of a key
    async fn ttl(&self, key: &str) -> StoreResult<TtlState>;

    /// Reset a key's expiry without rewriting its value.
    /// Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Collect every key matching a `prefix*` pattern
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(session_key("u1"), "upload:session:u1");
        assert_eq!(chunk_key("u1", 3), "upload:chunk:u1:3");
    }
}
