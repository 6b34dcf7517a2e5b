//! Durable user storage and its cache-aside front.

pub mod memory;
pub mod postgres;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::PasswordError;
use crate::cache::CacheError;
use crate::models::auth::UserRecord;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;
pub use users::UserRecordStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint violation (duplicate email).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
}

/// The durable, authoritative user store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a row and return it as stored (with store-generated timestamps).
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn insert(&self, user: &UserRecord) -> Result<UserRecord, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Overwrite the mutable columns of an existing row and return the stored row.
    async fn update(&self, user: &UserRecord) -> Result<UserRecord, StoreError>;

    /// Delete a row. Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}
