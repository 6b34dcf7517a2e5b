//! One-time email verification links.

use std::sync::Arc;
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};

use super::{CacheError, KvCache};

fn link_key(token: &str) -> String {
    format!("link:{token}")
}

/// Generate a random link token (64 alphanumeric chars).
pub fn generate_link_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Maps a verification token to the email address it verifies.
#[derive(Clone)]
pub struct VerificationLinkCache {
    kv: Arc<dyn KvCache>,
    ttl: Duration,
}

impl VerificationLinkCache {
    pub fn new(kv: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub async fn save_link(&self, email: &str, token: &str) -> Result<(), CacheError> {
        self.kv.set_ex(&link_key(token), email, self.ttl).await
    }

    /// Look up the email for `token`. `None` covers both unknown and expired
    /// tokens. Resolving does not consume the link.
    pub async fn resolve(&self, token: &str) -> Result<Option<String>, CacheError> {
        self.kv.get(&link_key(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn resolve_within_ttl_twice() {
        let kv = Arc::new(MemoryCache::new());
        let links = VerificationLinkCache::new(kv, Duration::from_secs(120));
        links.save_link("alice@example.com", "tok").await.unwrap();
        assert_eq!(links.resolve("tok").await.unwrap().as_deref(), Some("alice@example.com"));
        assert_eq!(links.resolve("tok").await.unwrap().as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn expired_link_resolves_to_none() {
        let kv = Arc::new(MemoryCache::new());
        let links = VerificationLinkCache::new(kv.clone(), Duration::from_secs(120));
        links.save_link("alice@example.com", "tok").await.unwrap();
        kv.advance(Duration::from_secs(180)).await;
        assert!(links.resolve("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_link_resolves_to_none() {
        let links = VerificationLinkCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(120));
        assert!(links.resolve("missing").await.unwrap().is_none());
    }

    #[test]
    fn link_tokens_are_random_alphanumeric() {
        let a = generate_link_token();
        let b = generate_link_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
