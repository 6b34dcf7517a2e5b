//! Key-value cache seam and the caches built on it.
//!
//! Everything the subsystem keeps outside the durable store goes through
//! [`KvCache`]: the user record mirror, the revocation denylist and the
//! verification link table.

pub mod memory;
pub mod redis;
pub mod users;
pub mod verification;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;
pub use redis::RedisCache;
pub use users::UserRecordCache;
pub use verification::VerificationLinkCache;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Cache call timed out after {0:?}")]
    Timeout(Duration),
}

/// Minimal key-value client: `GET`, `SET` with TTL, `DEL`, `EXISTS`.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}
