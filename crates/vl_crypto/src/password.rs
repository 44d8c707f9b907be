//! Master password (and PIN verifier) hashing.
//!
//! Argon2id with the crate's default cost parameters and a random salt.
//! Deliberately independent of [`crate::kdf`]: the stored hash
//! authenticates, the derived key decrypts, and each draws on its own
//! salt.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

use crate::error::CryptoError;

/// Hash a password for storage. Output is a self-describing PHC string
/// (algorithm, parameters, salt, digest).
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CryptoError::PasswordHash(e.to_string()))
}

/// Verify a password against a stored PHC hash. Comparison is constant
/// time inside argon2. A malformed stored hash verifies as `false` —
/// errors never propagate past this boundary.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("tr0ub4dor&3").unwrap();
        assert!(verify_password("tr0ub4dor&3", &hash));
        assert!(!verify_password("tr0ub4dor&4", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same password").unwrap();
        let b = hash_password("same password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_is_false_not_error() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", "$argon2id$v=19$truncated"));
    }
}
