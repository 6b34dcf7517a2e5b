//! Redis-backed [`KvCache`] over a deadpool connection pool.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{AsyncCommands, RedisError};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use tracing::{error, info};

use super::{CacheError, KvCache};

/// Redis cache client. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    op_timeout: Duration,
}

impl RedisCache {
    /// Build a pool for `redis_url` and check that a connection can be taken from it.
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> Result<Self, CacheError> {
        info!("initializing Redis cache");
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable(format!("redis pool: {e}")))?;
        let cache = Self { pool, op_timeout };
        cache.bounded(cache.conn()).await.map_err(|e| {
            error!(error = %e, "failed to get Redis connection");
            e
        })?;
        info!("Redis cache initialized");
        Ok(cache)
    }

    async fn conn(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Unavailable(format!("redis pool: {e}")))
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))?
    }
}

fn redis_err(e: RedisError) -> CacheError {
    CacheError::Unavailable(format!("redis: {e}"))
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.get::<_, Option<String>>(key).await.map_err(redis_err)
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.pset_ex::<_, _, ()>(key, value, millis)
                .await
                .map_err(redis_err)
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.del::<_, ()>(key).await.map_err(redis_err)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.bounded(async {
            let mut conn = self.conn().await?;
            conn.exists::<_, bool>(key).await.map_err(redis_err)
        })
        .await
    }
}
