//! In-process [`UserStore`] enforcing the same uniqueness rules as the
//! `users` table. Used by tests and local runs without PostgreSQL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{StoreError, UserStore};
use crate::models::auth::UserRecord;

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    rows: Mutex<HashMap<String, UserRecord>>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were down (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of lookups served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Db(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

fn email_taken(rows: &HashMap<String, UserRecord>, email: &str, except_id: &str) -> bool {
    rows.values().any(|u| u.email == email && u.id != except_id)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &UserRecord) -> Result<UserRecord, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().await;
        if email_taken(&rows, &user.email, "") || rows.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("email {} already registered", user.email)));
        }
        let now = Utc::now();
        let stored = UserRecord {
            created_at: now,
            updated_at: now,
            ..user.clone()
        };
        rows.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock().await;
        Ok(rows.values().find(|u| u.email == email).cloned())
    }

    async fn update(&self, user: &UserRecord) -> Result<UserRecord, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().await;
        if email_taken(&rows, &user.email, &user.id) {
            return Err(StoreError::Conflict(format!("email {} already registered", user.email)));
        }
        let existing = rows
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))?;
        existing.email = user.email.clone();
        existing.password_digest = user.password_digest.clone();
        existing.display_name = user.display_name.clone();
        existing.verified = user.verified;
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.rows.lock().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, email: &str) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            id: id.into(),
            email: email.into(),
            password_digest: "digest".into(),
            display_name: "user".into(),
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryUserStore::new();
        store.insert(&record("1", "a@example.com")).await.unwrap();
        assert!(matches!(
            store.insert(&record("2", "a@example.com")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_missing_row_is_not_found() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.update(&record("1", "a@example.com")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_to_taken_email_conflicts() {
        let store = MemoryUserStore::new();
        store.insert(&record("1", "a@example.com")).await.unwrap();
        store.insert(&record("2", "b@example.com")).await.unwrap();
        assert!(matches!(
            store.update(&record("2", "a@example.com")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn delete_reports_removal() {
        let store = MemoryUserStore::new();
        store.insert(&record("1", "a@example.com")).await.unwrap();
        assert!(store.delete("1").await.unwrap());
        assert!(!store.delete("1").await.unwrap());
        assert!(store.find_by_email("a@example.com").await.unwrap().is_none());
    }
}
