//! Credential handling.
//!
//! Provides token signing/parsing, the password hashing capability and the
//! session revocation denylist.

pub mod jwt;
pub mod password;
pub mod revocation;

use thiserror::Error;

/// Token signing and parsing errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signature verified but `exp` is at or before now.
    #[error("Token expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Malformed token: {0}")]
    Malformed(String),

    /// An access token was presented where a refresh token is required, or vice versa.
    #[error("Wrong token kind")]
    WrongKind,

    #[error("Token encode: {0}")]
    Encode(String),
}

/// Password hashing capability errors.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hash: {0}")]
    Hash(String),

    #[error("Password verify: {0}")]
    Verify(String),
}
