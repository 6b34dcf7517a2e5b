//! Session lifecycle over the user store, the caches and the token signer.
//!
//! There is no session record. A session's state is derived on every call
//! from whether its token parses and whether its ID is on the revocation
//! denylist:
//!
//! | parses | revoked | state   | outcome        |
//! |--------|---------|---------|----------------|
//! | yes    | no      | active  | allowed        |
//! | yes    | yes     | revoked | `Unauthorized` |
//! | expired| –       | expired | `Unauthorized` |
//! | no     | –       | invalid | `Unauthorized` |

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::auth::TokenError;
use crate::auth::jwt::CredentialSigner;
use crate::auth::password::BcryptHasher;
use crate::auth::revocation::{RevocationCache, RevocationError};
use crate::cache::verification::generate_link_token;
use crate::cache::{CacheError, KvCache, UserRecordCache, VerificationLinkCache};
use crate::mail::{self, MailError, Mailer};
use crate::models::auth::{NewUser, TokenClaims, TokenKind, TokenPair, UserRecord};
use crate::settings::SessionSettings;
use crate::store::{StoreError, UserRecordStore, UserStore};

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 8;

/// Maximum accepted display name length (characters).
const MAX_DISPLAY_NAME_LEN: usize = 100;

/// Display name given to accounts registered without one.
const DEFAULT_DISPLAY_NAME: &str = "user";

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => SessionError::Conflict(msg),
            StoreError::NotFound(msg) => SessionError::NotFound(msg),
            other => {
                error!(error = %other, "user store failure");
                SessionError::Internal(other.to_string())
            }
        }
    }
}

impl From<CacheError> for SessionError {
    fn from(e: CacheError) -> Self {
        error!(error = %e, "cache failure");
        SessionError::Internal(e.to_string())
    }
}

impl From<TokenError> for SessionError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Encode(msg) => {
                error!(error = %msg, "token signing failed");
                SessionError::Internal(msg)
            }
            TokenError::Expired => SessionError::Unauthorized("Token expired".into()),
            TokenError::WrongKind => SessionError::Unauthorized("Wrong token kind".into()),
            TokenError::InvalidSignature | TokenError::Malformed(_) => {
                SessionError::Unauthorized("Invalid token".into())
            }
        }
    }
}

impl From<RevocationError> for SessionError {
    fn from(e: RevocationError) -> Self {
        match e {
            RevocationError::Token(e) => e.into(),
            RevocationError::Cache(e) => e.into(),
        }
    }
}

impl From<MailError> for SessionError {
    fn from(e: MailError) -> Self {
        error!(error = %e, "mail delivery failed");
        SessionError::Internal(e.to_string())
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub user_id: String,
    pub email: String,
}

/// Terminal outcome of an email verification attempt. An expired link is a
/// normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    LinkExpired,
}

impl VerificationOutcome {
    pub fn message(self) -> &'static str {
        match self {
            VerificationOutcome::Verified => "Verification successful",
            VerificationOutcome::LinkExpired => "The link expired",
        }
    }
}

/// Trim and lower-case an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> SessionResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SessionError::Validation(format!("Invalid email address: {email}")))
    }
}

fn validate_display_name(name: &str) -> SessionResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(SessionError::Validation(format!(
            "Display name must be 1-{MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Append `token=<token>` to the caller-supplied verification link.
pub fn verification_url(link: &str, token: &str) -> SessionResult<String> {
    let mut url = Url::parse(link)
        .map_err(|e| SessionError::Validation(format!("Invalid verification link: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SessionError::Validation(
            "Verification link must be http(s)".into(),
        ));
    }
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

/// Orchestrates the session lifecycle. Holds no per-request state; cheap to
/// share behind an `Arc` across concurrent requests.
#[derive(Clone)]
pub struct SessionService {
    users: UserRecordStore,
    signer: CredentialSigner,
    revocations: RevocationCache,
    links: VerificationLinkCache,
    mailer: Arc<dyn Mailer>,
}

impl SessionService {
    pub fn new(
        users: UserRecordStore,
        signer: CredentialSigner,
        revocations: RevocationCache,
        links: VerificationLinkCache,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            users,
            signer,
            revocations,
            links,
            mailer,
        }
    }

    /// Wire every component from a durable store, a key-value cache and a
    /// mailer. `secret` is the token signing secret.
    pub fn build(
        secret: &[u8],
        settings: &SessionSettings,
        db: Arc<dyn UserStore>,
        kv: Arc<dyn KvCache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let signer = CredentialSigner::new(secret, settings);
        let users = UserRecordStore::new(
            db,
            UserRecordCache::new(kv.clone(), settings.user_cache_ttl),
            Arc::new(BcryptHasher::new(settings.bcrypt_cost)),
        );
        let revocations =
            RevocationCache::new(kv.clone(), signer.clone(), settings.revocation_policy);
        let links = VerificationLinkCache::new(kv, settings.link_ttl);
        Self::new(users, signer, revocations, links, mailer)
    }

    pub fn signer(&self) -> &CredentialSigner {
        &self.signer
    }

    /// `NotFound` unless an account exists for `email`.
    pub async fn check_by_email(&self, email: &str) -> SessionResult<()> {
        let email = normalize_email(email);
        match self.users.get_by_email(&email).await? {
            Some(_) => Ok(()),
            None => Err(SessionError::NotFound("No user with this email".into())),
        }
    }

    /// Authenticate with email + password and mint a new token pair.
    pub async fn login(&self, email: &str, password: &str) -> SessionResult<TokenPair> {
        let email = normalize_email(email);
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or_else(|| SessionError::NotFound("No user with this email".into()))?;

        if !self.users.verify_password(&user, password)? {
            return Err(SessionError::Unauthorized("Invalid credentials".into()));
        }

        let pair = self.create_token(&user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(pair)
    }

    /// Mint an access/refresh pair for a user ID.
    pub fn create_token(&self, user_id: &str) -> SessionResult<TokenPair> {
        Ok(self.signer.issue_pair(user_id)?)
    }

    /// Exchange a refresh token for a new access token. The refresh token is
    /// not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> SessionResult<String> {
        let claims = self.signer.parse_kind(refresh_token, TokenKind::Refresh)?;
        if self.revocations.is_revoked(&claims).await {
            return Err(SessionError::Unauthorized("Refresh token revoked".into()));
        }
        if self.users.get_by_id(&claims.sub).await?.is_none() {
            return Err(SessionError::Unauthorized("Account no longer exists".into()));
        }
        Ok(self.signer.reissue_access(&claims)?)
    }

    /// Revoke the session a refresh token belongs to. Idempotent.
    pub async fn logout(&self, refresh_token: &str) -> SessionResult<()> {
        self.revocations.revoke(None, Some(refresh_token)).await?;
        Ok(())
    }

    /// Revoke the session an access token belongs to. The access token may
    /// itself have expired; the session stays revocable until it ends.
    pub async fn revoke_token(&self, access_token: &str) -> SessionResult<&'static str> {
        if self.revocations.revoke(Some(access_token), None).await? {
            Ok("Access token revoked")
        } else {
            Ok("Session already ended")
        }
    }

    /// Verify an access token and require its session to be live.
    pub async fn authenticate(&self, access_token: &str) -> SessionResult<TokenClaims> {
        let claims = self.signer.parse_kind(access_token, TokenKind::Access)?;
        if self.revocations.is_revoked(&claims).await {
            return Err(SessionError::Unauthorized("Session revoked".into()));
        }
        Ok(claims)
    }

    /// Create an unverified account and send its verification link.
    ///
    /// Once the account is stored, a failure to send the link is logged and
    /// does not fail the registration; the user can ask for a new link.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        verification_link: &str,
        display_name: Option<&str>,
    ) -> SessionResult<Registration> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SessionError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let display_name = validate_display_name(display_name.unwrap_or(DEFAULT_DISPLAY_NAME))?;
        // Reject a bad link before anything is persisted.
        verification_url(verification_link, "")?;

        let user = self
            .users
            .create(NewUser {
                id: crate::ids::user_id(),
                email,
                password: password.to_string(),
                display_name,
            })
            .await?;
        info!(user_id = %user.id, "user registered");

        if let Err(e) = self.send_verification(&user.email, verification_link).await {
            warn!(error = %e, user_id = %user.id, "verification email not sent");
        }

        Ok(Registration {
            user_id: user.id,
            email: user.email,
        })
    }

    /// Issue a fresh verification link for an unverified account.
    pub async fn resend_verification(
        &self,
        email: &str,
        verification_link: &str,
    ) -> SessionResult<()> {
        let email = normalize_email(email);
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or_else(|| SessionError::NotFound("No user with this email".into()))?;
        if user.verified {
            return Err(SessionError::Validation("Email already verified".into()));
        }
        self.send_verification(&user.email, verification_link).await
    }

    /// Resolve a verification token and mark its account verified.
    pub async fn verify_email(&self, token: &str) -> SessionResult<VerificationOutcome> {
        let Some(email) = self.links.resolve(token).await? else {
            return Ok(VerificationOutcome::LinkExpired);
        };
        let mut user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or_else(|| SessionError::NotFound("No user with this email".into()))?;
        if !user.verified {
            user.verified = true;
            user.updated_at = Utc::now();
            self.users.update(&user).await?;
            info!(user_id = %user.id, "email verified");
        }
        Ok(VerificationOutcome::Verified)
    }

    pub async fn profile(&self, user_id: &str) -> SessionResult<UserRecord> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| SessionError::NotFound("User not found".into()))
    }

    pub async fn update_display_name(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> SessionResult<UserRecord> {
        let display_name = validate_display_name(display_name)?;
        let mut user = self.profile(user_id).await?;
        user.display_name = display_name;
        user.updated_at = Utc::now();
        Ok(self.users.update(&user).await?)
    }

    /// Delete the account owning `claims` and revoke the calling session.
    pub async fn delete_account(&self, claims: &TokenClaims) -> SessionResult<()> {
        if !self.users.delete(&claims.sub).await? {
            return Err(SessionError::NotFound("User not found".into()));
        }
        if let Err(e) = self.revocations.revoke_claims(claims, Utc::now()).await {
            warn!(error = %e, user_id = %claims.sub, "account deleted but session not revoked");
        }
        info!(user_id = %claims.sub, "account deleted");
        Ok(())
    }

    async fn send_verification(&self, email: &str, verification_link: &str) -> SessionResult<()> {
        let token = generate_link_token();
        let url = verification_url(verification_link, &token)?;
        self.links.save_link(email, &token).await?;
        self.mailer
            .send(email, mail::VERIFICATION_SUBJECT, &mail::verification_body(&url))
            .await?;
        Ok(())
    }
}
