//! Lifetimes, TTLs and policies for the session subsystem.

use std::time::Duration;

/// Access token lifetime: 5 hours.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(5 * 60 * 60);

/// Refresh token lifetime: 24 hours.
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// User record cache entry lifetime: 24 hours.
pub const USER_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Verification link lifetime: 2 minutes.
pub const VERIFICATION_LINK_TTL: Duration = Duration::from_secs(2 * 60);

/// Upper bound on any single store or cache call.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// What a revocation check answers when the cache cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationPolicy {
    /// Treat the session as revoked. Logout stays effective during a cache
    /// outage at the cost of rejecting every refresh until the cache returns.
    #[default]
    FailClosed,
    /// Treat the session as live. Refresh keeps working during an outage but
    /// sessions revoked before it may be resurrected.
    FailOpen,
}

/// Settings for the session subsystem. Loaded once at startup.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub user_cache_ttl: Duration,
    pub link_ttl: Duration,
    pub op_timeout: Duration,
    pub revocation_policy: RevocationPolicy,
    pub bcrypt_cost: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            access_ttl: ACCESS_TOKEN_TTL,
            refresh_ttl: REFRESH_TOKEN_TTL,
            user_cache_ttl: USER_CACHE_TTL,
            link_ttl: VERIFICATION_LINK_TTL,
            op_timeout: DEFAULT_OP_TIMEOUT,
            revocation_policy: RevocationPolicy::default(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_token_lifetimes() {
        let s = SessionSettings::default();
        assert_eq!(s.access_ttl.as_secs(), 18_000);
        assert_eq!(s.refresh_ttl.as_secs(), 86_400);
        assert_eq!(s.link_ttl.as_secs(), 120);
        assert_eq!(s.revocation_policy, RevocationPolicy::FailClosed);
    }
}
