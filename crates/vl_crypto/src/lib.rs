//! vl_crypto — Cryptographic primitives for the VaultLock credential store
//!
//! Two independent secret paths:
//! - [`kdf`] derives the 32-byte vault cipher key from
//!   (master password, per-user salt) via PBKDF2-HMAC-SHA256.
//! - [`password`] hashes and verifies the master password with Argon2id,
//!   using its own random salt.
//!
//! Leaking one of the two stored artefacts (password hash, vault salt)
//! must not trivially expose the other path.
//!
//! [`token`] is the authenticated-encryption layer: a self-describing
//! token format over XChaCha20-Poly1305. Nothing in this crate persists
//! or logs a password or a derived key.

pub mod error;
pub mod kdf;
pub mod password;
pub mod token;

pub use error::{CryptoError, TokenError};
pub use kdf::CipherKey;
