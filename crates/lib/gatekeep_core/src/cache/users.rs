//! User record mirror keyed by both user ID and email.

use std::sync::Arc;
use std::time::Duration;

use super::{CacheError, KvCache};
use crate::models::auth::UserRecord;

fn id_key(id: &str) -> String {
    format!("user_id:{id}")
}

fn email_key(email: &str) -> String {
    format!("email:{email}")
}

/// JSON mirror of [`UserRecord`]s. Never a source of truth.
#[derive(Clone)]
pub struct UserRecordCache {
    kv: Arc<dyn KvCache>,
    ttl: Duration,
}

impl UserRecordCache {
    pub fn new(kv: Arc<dyn KvCache>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserRecord>, CacheError> {
        self.get(&id_key(id)).await
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, CacheError> {
        self.get(&email_key(email)).await
    }

    /// Write `user` under both index keys.
    pub async fn put(&self, user: &UserRecord) -> Result<(), CacheError> {
        let data = serde_json::to_string(user)?;
        self.kv.set_ex(&id_key(&user.id), &data, self.ttl).await?;
        self.kv.set_ex(&email_key(&user.email), &data, self.ttl).await?;
        Ok(())
    }

    /// Drop both index keys for a user.
    pub async fn invalidate(&self, id: &str, email: &str) -> Result<(), CacheError> {
        self.kv.del(&id_key(id)).await?;
        self.kv.del(&email_key(email)).await?;
        Ok(())
    }

    /// Drop only the email index key (used when a user's email changes).
    pub async fn invalidate_email(&self, email: &str) -> Result<(), CacheError> {
        self.kv.del(&email_key(email)).await
    }

    async fn get(&self, key: &str) -> Result<Option<UserRecord>, CacheError> {
        match self.kv.get(key).await? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::cache::MemoryCache;

    fn user() -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: "3f1c1d1e-0000-4000-8000-000000000001".into(),
            email: "alice@example.com".into(),
            password_digest: "$2b$04$digest".into(),
            display_name: "Alice".into(),
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn put_populates_both_indexes() {
        let kv = Arc::new(MemoryCache::new());
        let cache = UserRecordCache::new(kv.clone(), Duration::from_secs(60));
        let u = user();
        cache.put(&u).await.unwrap();
        assert_eq!(cache.get_by_id(&u.id).await.unwrap(), Some(u.clone()));
        assert_eq!(cache.get_by_email(&u.email).await.unwrap(), Some(u));
        assert_eq!(kv.len().await, 2);
    }

    #[tokio::test]
    async fn invalidate_clears_both_indexes() {
        let kv = Arc::new(MemoryCache::new());
        let cache = UserRecordCache::new(kv.clone(), Duration::from_secs(60));
        let u = user();
        cache.put(&u).await.unwrap();
        cache.invalidate(&u.id, &u.email).await.unwrap();
        assert!(cache.get_by_id(&u.id).await.unwrap().is_none());
        assert!(cache.get_by_email(&u.email).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entries_expire_with_ttl() {
        let kv = Arc::new(MemoryCache::new());
        let cache = UserRecordCache::new(kv.clone(), Duration::from_secs(24 * 60 * 60));
        cache.put(&user()).await.unwrap();
        kv.advance(Duration::from_secs(24 * 60 * 60)).await;
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_entry_is_codec_error() {
        let kv = Arc::new(MemoryCache::new());
        kv.set_ex("email:bob@example.com", "{not json", Duration::from_secs(60))
            .await
            .unwrap();
        let cache = UserRecordCache::new(kv, Duration::from_secs(60));
        assert!(matches!(
            cache.get_by_email("bob@example.com").await,
            Err(CacheError::Codec(_))
        ));
    }
}
