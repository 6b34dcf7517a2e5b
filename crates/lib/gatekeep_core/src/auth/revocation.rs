//! Session revocation denylist.
//!
//! Both tokens of a pair carry the same session ID, so a revocation is keyed
//! on a fingerprint of that ID and blocks the whole session whichever token
//! was presented. Entries expire at the session end; after that every token
//! of the session is unusable on its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use super::TokenError;
use super::jwt::CredentialSigner;
use crate::cache::{CacheError, KvCache};
use crate::models::auth::TokenClaims;
use crate::settings::RevocationPolicy;

const REVOKED_MARKER: &str = "revoked";

/// Revocation errors.
#[derive(Debug, Error)]
pub enum RevocationError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// SHA-256 fingerprint of a session ID.
pub fn fingerprint(sid: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sid.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn revoked_key(sid: &str) -> String {
    format!("revoked_session:{}", fingerprint(sid))
}

/// Records revoked sessions with a TTL equal to their remaining lifetime.
#[derive(Clone)]
pub struct RevocationCache {
    kv: Arc<dyn KvCache>,
    signer: CredentialSigner,
    policy: RevocationPolicy,
}

impl RevocationCache {
    pub fn new(kv: Arc<dyn KvCache>, signer: CredentialSigner, policy: RevocationPolicy) -> Self {
        Self { kv, signer, policy }
    }

    /// Revoke the session owning the given tokens. The refresh token is
    /// preferred when both are supplied.
    ///
    /// Returns `true` when a denylist entry was written, `false` when the
    /// session had already ended (nothing to block). The token's own `exp`
    /// does not matter: an expired access token still revokes its session.
    pub async fn revoke(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<bool, RevocationError> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .or(access_token.filter(|t| !t.is_empty()))
            .ok_or_else(|| TokenError::Malformed("no token supplied".into()))?;

        // An expired access token still names a live session until `sexp`.
        let claims = self.signer.parse_ignoring_exp(token)?;
        self.revoke_claims(&claims, Utc::now()).await
    }

    /// Revoke the session described by already-verified claims.
    pub async fn revoke_claims(
        &self,
        claims: &TokenClaims,
        now: DateTime<Utc>,
    ) -> Result<bool, RevocationError> {
        let remaining = claims.sexp - now.timestamp();
        if remaining <= 0 {
            debug!(session = %fingerprint(&claims.sid), "session already ended, nothing to revoke");
            return Ok(false);
        }
        let ttl = std::time::Duration::from_secs(remaining.unsigned_abs());
        self.kv
            .set_ex(&revoked_key(&claims.sid), REVOKED_MARKER, ttl)
            .await?;
        debug!(session = %fingerprint(&claims.sid), ttl_secs = remaining, "session revoked");
        Ok(true)
    }

    /// Raw denylist lookup for a session ID.
    pub async fn check(&self, sid: &str) -> Result<bool, CacheError> {
        self.kv.exists(&revoked_key(sid)).await
    }

    /// Whether the session owning `claims` is revoked. A cache failure is
    /// answered according to the configured [`RevocationPolicy`].
    pub async fn is_revoked(&self, claims: &TokenClaims) -> bool {
        match self.check(&claims.sid).await {
            Ok(revoked) => revoked,
            Err(e) => {
                let revoked = self.policy == RevocationPolicy::FailClosed;
                warn!(
                    error = %e,
                    session = %fingerprint(&claims.sid),
                    treated_as_revoked = revoked,
                    "revocation check failed"
                );
                revoked
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::settings::SessionSettings;

    fn setup(policy: RevocationPolicy) -> (Arc<MemoryCache>, CredentialSigner, RevocationCache) {
        let kv = Arc::new(MemoryCache::new());
        let signer = CredentialSigner::new(b"test-secret", &SessionSettings::default());
        let cache = RevocationCache::new(kv.clone(), signer.clone(), policy);
        (kv, signer, cache)
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let a = fingerprint("sid-1");
        assert_eq!(a, fingerprint("sid-1"));
        assert_ne!(a, fingerprint("sid-2"));
        assert_eq!(a.len(), 64);
        assert!(!a.contains("sid-1"));
    }

    #[tokio::test]
    async fn revoke_by_refresh_blocks_session() {
        let (kv, signer, cache) = setup(RevocationPolicy::FailClosed);
        let pair = signer.issue_pair("user-1").unwrap();
        let claims = signer.parse(&pair.refresh_token).unwrap();
        assert!(!cache.is_revoked(&claims).await);

        assert!(cache.revoke(None, Some(&pair.refresh_token)).await.unwrap());
        assert!(cache.is_revoked(&claims).await);

        let ttl = kv.ttl(&revoked_key(&claims.sid)).await.unwrap();
        assert!(ttl <= Duration::from_secs(24 * 60 * 60));
        assert!(ttl > Duration::from_secs(24 * 60 * 60 - 10));
    }

    #[tokio::test]
    async fn revoke_by_access_blocks_same_session() {
        let (_kv, signer, cache) = setup(RevocationPolicy::FailClosed);
        let pair = signer.issue_pair("user-1").unwrap();
        cache.revoke(Some(&pair.access_token), None).await.unwrap();
        let refresh = signer.parse(&pair.refresh_token).unwrap();
        assert!(cache.is_revoked(&refresh).await);
    }

    #[tokio::test]
    async fn revoke_twice_is_idempotent() {
        let (kv, signer, cache) = setup(RevocationPolicy::FailClosed);
        let pair = signer.issue_pair("user-1").unwrap();
        cache.revoke(None, Some(&pair.refresh_token)).await.unwrap();
        cache.revoke(None, Some(&pair.refresh_token)).await.unwrap();
        let claims = signer.parse(&pair.refresh_token).unwrap();
        assert!(cache.is_revoked(&claims).await);
        assert_eq!(kv.len().await, 1);
    }

    #[tokio::test]
    async fn other_sessions_unaffected() {
        let (_kv, signer, cache) = setup(RevocationPolicy::FailClosed);
        let a = signer.issue_pair("user-1").unwrap();
        let b = signer.issue_pair("user-1").unwrap();
        cache.revoke(None, Some(&a.refresh_token)).await.unwrap();
        let b_claims = signer.parse(&b.refresh_token).unwrap();
        assert!(!cache.is_revoked(&b_claims).await);
    }

    #[tokio::test]
    async fn revoke_expired_token_is_noop() {
        let (kv, signer, cache) = setup(RevocationPolicy::FailClosed);
        let stale = signer
            .issue_pair_at("user-1", Utc::now() - chrono::Duration::hours(25))
            .unwrap();
        assert!(!cache.revoke(None, Some(&stale.refresh_token)).await.unwrap());
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn expired_access_token_revokes_live_session() {
        let (kv, signer, cache) = setup(RevocationPolicy::FailClosed);
        let pair = signer
            .issue_pair_at("user-1", Utc::now() - chrono::Duration::hours(6))
            .unwrap();
        assert!(matches!(signer.parse(&pair.access_token), Err(TokenError::Expired)));

        assert!(cache.revoke(Some(&pair.access_token), None).await.unwrap());
        let refresh = signer.parse(&pair.refresh_token).unwrap();
        assert!(cache.is_revoked(&refresh).await);
        let ttl = kv.ttl(&revoked_key(&refresh.sid)).await.unwrap();
        assert!(ttl <= Duration::from_secs(18 * 60 * 60));
        assert!(ttl > Duration::from_secs(18 * 60 * 60 - 10));
    }

    #[tokio::test]
    async fn entry_lapses_at_session_end() {
        let (kv, signer, cache) = setup(RevocationPolicy::FailClosed);
        let pair = signer.issue_pair("user-1").unwrap();
        let claims = signer.parse(&pair.refresh_token).unwrap();
        cache.revoke(None, Some(&pair.refresh_token)).await.unwrap();
        kv.advance(Duration::from_secs(24 * 60 * 60 + 1)).await;
        assert!(!cache.is_revoked(&claims).await);
    }

    #[tokio::test]
    async fn revoke_claims_past_session_end_is_noop() {
        let (kv, signer, cache) = setup(RevocationPolicy::FailClosed);
        let pair = signer.issue_pair("user-1").unwrap();
        let claims = signer.parse(&pair.refresh_token).unwrap();
        let later = Utc::now() + chrono::Duration::hours(25);
        assert!(!cache.revoke_claims(&claims, later).await.unwrap());
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let (_kv, _signer, cache) = setup(RevocationPolicy::FailClosed);
        assert!(matches!(
            cache.revoke(None, Some("garbage")).await,
            Err(RevocationError::Token(TokenError::Malformed(_)))
        ));
        assert!(matches!(
            cache.revoke(Some(""), None).await,
            Err(RevocationError::Token(TokenError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn outage_follows_policy() {
        let (kv, signer, closed) = setup(RevocationPolicy::FailClosed);
        let open = RevocationCache::new(kv.clone(), signer.clone(), RevocationPolicy::FailOpen);
        let pair = signer.issue_pair("user-1").unwrap();
        let claims = signer.parse(&pair.refresh_token).unwrap();

        kv.set_unavailable(true);
        assert!(closed.check(&claims.sid).await.is_err());
        assert!(closed.is_revoked(&claims).await);
        assert!(!open.is_revoked(&claims).await);
        assert!(matches!(
            closed.revoke(None, Some(&pair.refresh_token)).await,
            Err(RevocationError::Cache(_))
        ));
    }
}
