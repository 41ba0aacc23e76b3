//! In-memory session store
//!
//! Expiry is tracked with `tokio::time::Instant` and applied lazily on
//! access, so tests driving a paused tokio clock observe the exact same
//! TTL behavior as the Redis backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{SessionStore, StoreResult, TtlState};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// In-memory implementation of [`SessionStore`]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value with no expiry set.
    ///
    /// The trait surface always writes with a TTL; this exists so tests can
    /// fabricate the misconfigured keys the janitor has to repair.
    pub async fn put_text_unexpiring(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.as_bytes().to_vec(),
                expires_at: None,
            },
        );
    }

    async fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    async fn put_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_text(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .get_raw(key)
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn put_text(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.put_raw(key, value.as_bytes().to_vec(), ttl).await;
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.get_raw(key).await)
    }

    async fn put_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.put_raw(key, value.to_vec(), ttl).await;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get_raw(key).await.is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<TtlState> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(TtlState::Missing)
            }
            Some(entry) => Ok(match entry.expires_at {
                Some(deadline) => TtlState::Expires(deadline - now),
                None => TtlState::NoExpiry,
            }),
            None => Ok(TtlState::Missing),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(false)
            }
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        entries.retain(|_, entry| !entry.is_expired(now));

        Ok(entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_values_expire() {
        let store = MemoryStore::new();
        store
            .put_text("k", "v", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(store.get_text("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.get_text("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), TtlState::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_resets_deadline() {
        let store = MemoryStore::new();
        store
            .put_text("k", "v", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(store.exists("k").await.unwrap());

        assert!(!store.expire("missing", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_matches_prefix() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.put_text("upload:session:a", "1", ttl).await.unwrap();
        store.put_text("upload:session:b", "2", ttl).await.unwrap();
        store.put_bytes("upload:chunk:a:0", b"x", ttl).await.unwrap();

        let mut keys = store.scan("upload:session:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["upload:session:a", "upload:session:b"]);
    }

    #[tokio::test]
    async fn test_unexpiring_entries_report_no_expiry() {
        let store = MemoryStore::new();
        store.put_text_unexpiring("k", "v").await;
        assert_eq!(store.ttl("k").await.unwrap(), TtlState::NoExpiry);
    }
}
