//! Password hashing via bcrypt.

use super::PasswordError;
use crate::settings::DEFAULT_BCRYPT_COST;

/// Pluggable password hashing capability.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext secret into a storable digest.
    fn hash(&self, secret: &str) -> Result<String, PasswordError>;

    /// Check a plaintext secret against a digest produced by [`hash`](Self::hash).
    fn verify(&self, digest: &str, secret: &str) -> Result<bool, PasswordError>;
}

/// bcrypt-backed [`PasswordHasher`].
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        bcrypt::hash(secret, self.cost).map_err(|e| PasswordError::Hash(format!("bcrypt hash: {e}")))
    }

    fn verify(&self, digest: &str, secret: &str) -> Result<bool, PasswordError> {
        bcrypt::verify(secret, digest)
            .map_err(|e| PasswordError::Verify(format!("bcrypt verify: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = BcryptHasher::new(4);
        let digest = hasher.hash("correct horse").unwrap();
        assert_ne!(digest, "correct horse");
        assert!(hasher.verify(&digest, "correct horse").unwrap());
        assert!(!hasher.verify(&digest, "battery staple").unwrap());
    }

    #[test]
    fn verify_rejects_garbage_digest() {
        let hasher = BcryptHasher::new(4);
        assert!(hasher.verify("not-a-bcrypt-digest", "pw").is_err());
    }
}
