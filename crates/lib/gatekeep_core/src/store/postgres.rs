//! PostgreSQL-backed [`UserStore`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

use super::{StoreError, UserStore};
use crate::models::auth::UserRecord;

type UserRow = (String, String, String, String, bool, DateTime<Utc>, DateTime<Utc>);

const USER_COLUMNS: &str =
    "id::text, email, password_digest, display_name, verified, created_at, updated_at";

fn from_row(row: UserRow) -> UserRecord {
    let (id, email, password_digest, display_name, verified, created_at, updated_at) = row;
    UserRecord {
        id,
        email,
        password_digest,
        display_name,
        verified,
        created_at,
        updated_at,
    }
}

/// Map a unique violation on `users.email` to [`StoreError::Conflict`].
fn map_write_err(e: sqlx::Error, email: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return StoreError::Conflict(format!("email {email} already registered"));
    }
    error!(error = %e, "user write failed");
    StoreError::Db(e)
}

/// Users table access over a connection pool.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
    }
}

/// IDs are UUIDs; anything else cannot match a row and would fail the `::uuid` cast.
fn is_uuid(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &UserRecord) -> Result<UserRecord, StoreError> {
        let sql = format!(
            "INSERT INTO users (id, email, password_digest, display_name, verified) \
             VALUES ($1::uuid, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        self.bounded(async {
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(&user.id)
                .bind(&user.email)
                .bind(&user.password_digest)
                .bind(&user.display_name)
                .bind(user.verified)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_write_err(e, &user.email))?;
            Ok(from_row(row))
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        if !is_uuid(id) {
            return Ok(None);
        }
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1::uuid");
        self.bounded(async {
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(from_row))
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        self.bounded(async {
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(from_row))
        })
        .await
    }

    async fn update(&self, user: &UserRecord) -> Result<UserRecord, StoreError> {
        if !is_uuid(&user.id) {
            return Err(StoreError::NotFound(format!("user {}", user.id)));
        }
        let sql = format!(
            "UPDATE users \
             SET email = $2, password_digest = $3, display_name = $4, verified = $5, \
                 updated_at = now() \
             WHERE id = $1::uuid RETURNING {USER_COLUMNS}"
        );
        self.bounded(async {
            let row = sqlx::query_as::<_, UserRow>(&sql)
                .bind(&user.id)
                .bind(&user.email)
                .bind(&user.password_digest)
                .bind(&user.display_name)
                .bind(user.verified)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_write_err(e, &user.email))?;
            row.map(from_row)
                .ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        if !is_uuid(id) {
            return Ok(false);
        }
        self.bounded(async {
            let result = sqlx::query("DELETE FROM users WHERE id = $1::uuid")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
