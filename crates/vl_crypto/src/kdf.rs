//! Vault key derivation.
//!
//! PBKDF2-HMAC-SHA256 at the OWASP-recommended 600,000 iterations,
//! 32-byte output. Deterministic: the same (password, salt) pair always
//! yields the same key, which is what lets a stored token be decrypted
//! across process restarts. The salt is the only derivation input that
//! is ever persisted.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const SALT_LEN: usize = 16;

/// 32-byte vault cipher key. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct CipherKey(pub [u8; 32]);

/// Derive the vault cipher key from a master password + 16-byte salt.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> CipherKey {
    let mut output = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ITERATIONS, &mut output);
    CipherKey(output)
}

/// Generate a fresh random 16-byte salt (store alongside the user row;
/// not secret).
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
