//! Cache-aside / write-through user record store.
//!
//! Reads consult the cache first and populate both index entries from the
//! durable store on a miss. Writes go to the durable store first; the cache
//! is only touched once the durable write has succeeded. Cache failures after
//! a successful durable write are logged and tolerated: the entry stays stale
//! for at most its TTL and the durable store remains authoritative.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::{StoreError, UserStore};
use crate::auth::password::PasswordHasher;
use crate::cache::UserRecordCache;
use crate::models::auth::{NewUser, UserRecord};

#[derive(Clone)]
pub struct UserRecordStore {
    db: Arc<dyn UserStore>,
    cache: UserRecordCache,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserRecordStore {
    pub fn new(
        db: Arc<dyn UserStore>,
        cache: UserRecordCache,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self { db, cache, hasher }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        match self.cache.get_by_email(email).await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "user cache read by email failed, reading store"),
        }
        let user = self.db.find_by_email(email).await?;
        if let Some(user) = &user {
            self.populate(user).await;
        }
        Ok(user)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        match self.cache.get_by_id(id).await {
            Ok(Some(user)) => return Ok(Some(user)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, user_id = id, "user cache read by id failed, reading store"),
        }
        let user = self.db.find_by_id(id).await?;
        if let Some(user) = &user {
            self.populate(user).await;
        }
        Ok(user)
    }

    /// Hash the password, insert the row and cache the stored record.
    pub async fn create(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        let digest = self.hasher.hash(&new.password)?;
        let now = Utc::now();
        let record = UserRecord {
            id: new.id,
            email: new.email,
            password_digest: digest,
            display_name: new.display_name,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        let stored = self.db.insert(&record).await?;
        debug!(user_id = %stored.id, "user created");
        self.populate(&stored).await;
        Ok(stored)
    }

    /// Write-through update. A failed durable write leaves the cache untouched.
    pub async fn update(&self, record: &UserRecord) -> Result<UserRecord, StoreError> {
        let previous = self.get_by_id(&record.id).await?;
        let stored = self.db.update(record).await?;
        if let Some(previous) = previous
            && previous.email != stored.email
            && let Err(e) = self.cache.invalidate_email(&previous.email).await
        {
            warn!(error = %e, user_id = %stored.id, "failed to drop old email cache entry");
        }
        self.populate(&stored).await;
        Ok(stored)
    }

    /// Delete from the durable store, then from both cache indexes.
    /// Returns `false` when no such user exists.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Some(user) = self.get_by_id(id).await? else {
            return Ok(false);
        };
        let deleted = self.db.delete(id).await?;
        if let Err(e) = self.cache.invalidate(id, &user.email).await {
            warn!(error = %e, user_id = id, "failed to drop user cache entries, stale until TTL");
        }
        Ok(deleted)
    }

    /// Check a plaintext password against a user's digest.
    pub fn verify_password(&self, user: &UserRecord, password: &str) -> Result<bool, StoreError> {
        Ok(self.hasher.verify(&user.password_digest, password)?)
    }

    async fn populate(&self, user: &UserRecord) {
        if let Err(e) = self.cache.put(user).await {
            warn!(error = %e, user_id = %user.id, "failed to populate user cache");
        }
    }
}
