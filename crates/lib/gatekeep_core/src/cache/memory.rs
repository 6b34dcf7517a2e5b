//! In-process [`KvCache`] with TTL-based expiration.
//!
//! Used when no Redis URL is configured and by tests. The clock can be moved
//! forward and the cache can be switched into an outage state so TTL lapses
//! and cache failures are reproducible without a real server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CacheError, KvCache};

/// A cached entry with expiry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct State {
    entries: HashMap<String, CacheEntry>,
    /// Added to the wall clock when judging expiry.
    offset: chrono::Duration,
}

impl Default for State {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            offset: chrono::Duration::zero(),
        }
    }
}

impl State {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.offset
    }

    fn live(&self, key: &str) -> Option<&CacheEntry> {
        let now = self.now();
        self.entries.get(key).filter(|e| now < e.expires_at)
    }
}

/// In-memory key-value cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move this cache's clock forward.
    pub async fn advance(&self, by: Duration) {
        let mut state = self.state.write().await;
        state.offset += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }

    /// Make every subsequent call fail with [`CacheError::Unavailable`] (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        let now = state.now();
        state.entries.values().filter(|e| now < e.expires_at).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining lifetime of a live key.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let state = self.state.read().await;
        let now = state.now();
        state.live(key).and_then(|e| (e.expires_at - now).to_std().ok())
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.live(key).map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let mut state = self.state.write().await;
        let now = state.now();
        // Reads only filter lapsed entries; writes are where they get dropped.
        state.entries.retain(|_, e| now < e.expires_at);
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        self.state.write().await.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check()?;
        Ok(self.state.read().await.live(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let cache = MemoryCache::new();
        assert!(cache.get("unknown").await.unwrap().is_none());
        assert!(!cache.exists("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn set_and_get() {
        let cache = MemoryCache::new();
        cache.set_ex("k1", "val1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k1").await.unwrap(), Some("val1".to_string()));
        assert!(cache.exists("k1").await.unwrap());
    }

    #[tokio::test]
    async fn set_overwrites_value_and_ttl() {
        let cache = MemoryCache::new();
        cache.set_ex("k1", "a", Duration::from_secs(10)).await.unwrap();
        cache.set_ex("k1", "b", Duration::from_secs(100)).await.unwrap();
        assert_eq!(cache.get("k1").await.unwrap(), Some("b".to_string()));
        assert!(cache.ttl("k1").await.unwrap() > Duration::from_secs(90));
    }

    #[tokio::test]
    async fn del_removes_entry() {
        let cache = MemoryCache::new();
        cache.set_ex("k1", "v1", Duration::from_secs(60)).await.unwrap();
        cache.set_ex("k2", "v2", Duration::from_secs(60)).await.unwrap();
        cache.del("k1").await.unwrap();
        assert!(cache.get("k1").await.unwrap().is_none());
        assert_eq!(cache.get("k2").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn entry_lapses_after_ttl() {
        let cache = MemoryCache::new();
        cache.set_ex("k1", "v1", Duration::from_secs(120)).await.unwrap();
        cache.advance(Duration::from_secs(119)).await;
        assert!(cache.exists("k1").await.unwrap());
        cache.advance(Duration::from_secs(1)).await;
        assert!(!cache.exists("k1").await.unwrap());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn lapsed_entries_are_dropped_on_write() {
        let cache = MemoryCache::new();
        for i in 0..1000 {
            cache
                .set_ex(&format!("link:{i}"), "v", Duration::from_secs(120))
                .await
                .unwrap();
        }
        cache.advance(Duration::from_secs(3600)).await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.state.read().await.entries.len(), 1000);

        cache.set_ex("fresh", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.state.read().await.entries.len(), 1);
        assert_eq!(cache.get("fresh").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn unavailable_cache_errors() {
        let cache = MemoryCache::new();
        cache.set_unavailable(true);
        assert!(matches!(cache.get("k").await, Err(CacheError::Unavailable(_))));
        cache.set_unavailable(false);
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
