use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::Rng;

use crate::config::HashCost;
use crate::error::{AppError, CorruptCredential};

/// Salted argon2id hashing with a configurable cost.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
    /// Hash of a throwaway password at the configured cost, checked against
    /// when a login names an unknown email.
    decoy: String,
}

impl CredentialHasher {
    pub fn new(cost: &HashCost) -> Result<Self, AppError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| AppError::Internal(format!("invalid argon2 cost: {e}")))?;
        let mut hasher = Self {
            params,
            decoy: String::new(),
        };
        hasher.decoy = hasher.hash("decoy-password")?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AppError::Internal(format!("salt encoding failed: {e}")))?;
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// `Ok(false)` for a wrong password. Errors only when `hash` itself is
    /// unusable.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, CorruptCredential> {
        let parsed = PasswordHash::new(hash).map_err(|e| CorruptCredential(e.to_string()))?;
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CorruptCredential(e.to_string())),
        }
    }

    /// Spends the same work as [`verify`](Self::verify) against a real
    /// account, so a missing account answers no faster than a wrong password.
    pub fn verify_decoy(&self, password: &str) {
        let _ = self.verify(password, &self.decoy);
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> CredentialHasher {
    CredentialHasher::new(&HashCost {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}
