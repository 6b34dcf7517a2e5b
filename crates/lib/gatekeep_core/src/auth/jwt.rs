//! JWT token generation and verification.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use super::TokenError;
use crate::models::auth::{TokenClaims, TokenKind, TokenPair};
use crate::settings::SessionSettings;

/// Signs and parses HS256 bearer tokens.
///
/// The secret is injected once at construction; nothing here reads
/// process configuration.
#[derive(Clone)]
pub struct CredentialSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl CredentialSigner {
    pub fn new(secret: &[u8], settings: &SessionSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: chrono_duration(settings.access_ttl),
            refresh_ttl: chrono_duration(settings.refresh_ttl),
        }
    }

    /// Lifetime configured for `kind`.
    pub fn lifetime(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a single token opening a new session for `subject`.
    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<String, TokenError> {
        let now = Utc::now();
        let sid = crate::ids::session_id();
        let sexp = (now + self.refresh_ttl).timestamp();
        self.sign(subject, &sid, kind, sexp, now)
    }

    /// Mint an access/refresh pair sharing a new session ID.
    pub fn issue_pair(&self, subject: &str) -> Result<TokenPair, TokenError> {
        self.issue_pair_at(subject, Utc::now())
    }

    /// [`issue_pair`](Self::issue_pair) against an explicit clock.
    pub fn issue_pair_at(&self, subject: &str, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        let sid = crate::ids::session_id();
        let sexp = (now + self.refresh_ttl).timestamp();
        Ok(TokenPair {
            access_token: self.sign(subject, &sid, TokenKind::Access, sexp, now)?,
            refresh_token: self.sign(subject, &sid, TokenKind::Refresh, sexp, now)?,
        })
    }

    /// Mint a new access token for the session a refresh token belongs to.
    ///
    /// The expiry never reaches past the session end, so a revocation entry
    /// that lapses at session end cannot unblock a live access token.
    pub fn reissue_access(&self, refresh: &TokenClaims) -> Result<String, TokenError> {
        if refresh.kind != TokenKind::Refresh {
            return Err(TokenError::WrongKind);
        }
        self.sign(&refresh.sub, &refresh.sid, TokenKind::Access, refresh.sexp, Utc::now())
    }

    /// Verify a token, returning its claims on success.
    pub fn parse(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.parse_at(token, Utc::now())
    }

    /// [`parse`](Self::parse) and require a particular kind.
    pub fn parse_kind(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, TokenError> {
        let claims = self.parse(token)?;
        if claims.kind != kind {
            return Err(TokenError::WrongKind);
        }
        Ok(claims)
    }

    /// [`parse`](Self::parse) against an explicit clock.
    ///
    /// Expiry is checked here rather than by `jsonwebtoken` so that an
    /// expired token is reported as [`TokenError::Expired`] with zero leeway.
    pub fn parse_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let claims = self.parse_ignoring_exp(token)?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Verify the signature and decode the claims without judging `exp`.
    ///
    /// Only for callers that act on the session rather than the token, such
    /// as revocation, where the session can outlive an expired access token.
    pub fn parse_ignoring_exp(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }

    fn sign(
        &self,
        subject: &str,
        sid: &str,
        kind: TokenKind,
        sexp: i64,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let exp = (now + self.lifetime(kind)).timestamp().min(sexp);
        let claims = TokenClaims {
            sub: subject.to_string(),
            sid: sid.to_string(),
            kind,
            iat: now.timestamp(),
            exp,
            sexp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(format!("jwt encode: {e}")))
    }
}

fn chrono_duration(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or(Duration::MAX)
}

/// Resolve the JWT secret: env var `JWT_SECRET_KEY` → `JWT_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    for var in ["JWT_SECRET_KEY", "JWT_SECRET"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    load_or_generate_secret(&jwt_secret_path())
}

/// Read the secret persisted at `path`, generating and writing a new
/// 64-character one if the file is missing or empty.
fn load_or_generate_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(error = %e, path = %parent.display(), "failed to create JWT secret directory");
    }
    if let Err(e) = std::fs::write(path, &secret) {
        warn!(error = %e, path = %path.display(), "failed to persist JWT secret");
    } else {
        info!(path = %path.display(), "generated new JWT secret");
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gatekeep")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CredentialSigner {
        CredentialSigner::new(b"test-secret", &SessionSettings::default())
    }

    #[test]
    fn parse_returns_issued_subject_kind_and_lifetime() {
        let s = signer();
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let before = Utc::now().timestamp();
            let token = s.issue("user-1", kind).unwrap();
            let claims = s.parse(&token).unwrap();
            assert_eq!(claims.sub, "user-1");
            assert_eq!(claims.kind, kind);
            let lifetime = s.lifetime(kind).num_seconds();
            assert!(claims.exp - before >= lifetime - 1);
            assert!(claims.exp - before <= lifetime + 1);
            assert_eq!(claims.exp - claims.iat, lifetime);
        }
    }

    #[test]
    fn pair_shares_session() {
        let s = signer();
        let pair = s.issue_pair("user-1").unwrap();
        let access = s.parse_kind(&pair.access_token, TokenKind::Access).unwrap();
        let refresh = s.parse_kind(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(access.sid, refresh.sid);
        assert_eq!(access.sexp, refresh.exp);
        assert_eq!(refresh.exp - access.exp, 19 * 60 * 60);
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let token = signer().issue("user-1", TokenKind::Access).unwrap();
        let other = CredentialSigner::new(b"other-secret", &SessionSettings::default());
        assert!(matches!(other.parse(&token), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(signer().parse("not.a.jwt"), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn expired_is_distinct_from_invalid() {
        let s = signer();
        let issued_at = Utc::now() - Duration::hours(25);
        let pair = s.issue_pair_at("user-1", issued_at).unwrap();
        assert!(matches!(s.parse(&pair.refresh_token), Err(TokenError::Expired)));
        assert!(matches!(s.parse(&pair.access_token), Err(TokenError::Expired)));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let s = signer();
        let now = Utc::now();
        let pair = s.issue_pair_at("user-1", now).unwrap();
        let at_expiry = now + s.lifetime(TokenKind::Access);
        assert!(matches!(s.parse_at(&pair.access_token, at_expiry), Err(TokenError::Expired)));
        let just_before = at_expiry - Duration::seconds(1);
        assert!(s.parse_at(&pair.access_token, just_before).is_ok());
    }

    #[test]
    fn parse_ignoring_exp_still_checks_signature() {
        let s = signer();
        let pair = s
            .issue_pair_at("user-1", Utc::now() - Duration::hours(6))
            .unwrap();
        assert!(matches!(s.parse(&pair.access_token), Err(TokenError::Expired)));
        let claims = s.parse_ignoring_exp(&pair.access_token).unwrap();
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(claims.sexp > Utc::now().timestamp());

        let other = CredentialSigner::new(b"other-secret", &SessionSettings::default());
        assert!(matches!(
            other.parse_ignoring_exp(&pair.access_token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn parse_kind_rejects_other_kind() {
        let s = signer();
        let pair = s.issue_pair("user-1").unwrap();
        assert!(matches!(
            s.parse_kind(&pair.access_token, TokenKind::Refresh),
            Err(TokenError::WrongKind)
        ));
    }

    #[test]
    fn reissued_access_keeps_session_and_is_capped_at_session_end() {
        let s = signer();
        let issued_at = Utc::now() - Duration::hours(22);
        let pair = s.issue_pair_at("user-1", issued_at).unwrap();
        let refresh = s.parse(&pair.refresh_token).unwrap();
        let access = s.parse(&s.reissue_access(&refresh).unwrap()).unwrap();
        assert_eq!(access.sid, refresh.sid);
        assert_eq!(access.sub, "user-1");
        assert_eq!(access.exp, refresh.sexp);
    }

    #[test]
    fn reissue_requires_refresh_claims() {
        let s = signer();
        let pair = s.issue_pair("user-1").unwrap();
        let access = s.parse(&pair.access_token).unwrap();
        assert!(matches!(s.reissue_access(&access), Err(TokenError::WrongKind)));
    }

    #[test]
    fn persisted_secret_is_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatekeep").join("jwt-secret");
        let first = load_or_generate_secret(&path);
        assert_eq!(first.len(), 64);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        assert_eq!(load_or_generate_secret(&path), first);
    }

    #[test]
    fn existing_secret_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt-secret");
        std::fs::write(&path, "  from-disk\n").unwrap();
        assert_eq!(load_or_generate_secret(&path), "from-disk");
    }

    #[test]
    fn unwritable_location_still_yields_a_secret() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let path = blocker.join("gatekeep").join("jwt-secret");
        assert_eq!(load_or_generate_secret(&path).len(), 64);
        assert!(!path.exists());
    }
}
