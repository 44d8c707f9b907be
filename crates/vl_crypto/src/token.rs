//! Self-describing authenticated-encryption token.
//!
//! Uses XChaCha20-Poly1305 (192-bit nonce).
//! Key size: 32 bytes.  Nonce: 24 bytes (random).  Tag: 16 bytes.
//!
//! Token wire format:
//!   [ version (1) | unix timestamp, BE (8) | nonce (24) | ciphertext + tag ]
//!
//! The version + timestamp header rides as AAD, so a tampered header
//! fails authentication rather than silently lying about the token's age.
//! An empty plaintext short-circuits to an empty token (and back) — a
//! blank notes field does not deserve 49 bytes of framing.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305,
};
use chrono::Utc;
use zeroize::Zeroizing;

use crate::error::{CryptoError, TokenError};
use crate::kdf::CipherKey;

pub const TOKEN_VERSION: u8 = 1;

const HEADER_LEN: usize = 9;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const MIN_TOKEN_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// Encrypt `plaintext` under the vault key, producing a self-contained
/// token (no externally stored IV or tag).
pub fn encrypt(key: &CipherKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if plaintext.is_empty() {
        return Ok(Vec::new());
    }

    let cipher =
        XChaCha20Poly1305::new_from_slice(&key.0).map_err(|_| CryptoError::Encrypt)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);

    let mut header = [0u8; HEADER_LEN];
    header[0] = TOKEN_VERSION;
    header[1..].copy_from_slice(&Utc::now().timestamp().to_be_bytes());

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad: &header })
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a token. The Poly1305 tag is verified (in constant time,
/// inside the AEAD) before a single plaintext byte is returned — there
/// is no partial or unauthenticated output path.
pub fn decrypt(key: &CipherKey, token: &[u8]) -> Result<Zeroizing<Vec<u8>>, TokenError> {
    if token.is_empty() {
        return Ok(Zeroizing::new(Vec::new()));
    }
    if token.len() < MIN_TOKEN_LEN || token[0] != TOKEN_VERSION {
        return Err(TokenError::Malformed);
    }

    let (header, rest) = token.split_at(HEADER_LEN);
    let (nonce_bytes, ct) = rest.split_at(NONCE_LEN);
    let nonce = chacha20poly1305::XNonce::from_slice(nonce_bytes);

    let cipher =
        XChaCha20Poly1305::new_from_slice(&key.0).map_err(|_| TokenError::AuthFailed)?;

    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad: header })
        .map_err(|_| TokenError::AuthFailed)?;

    Ok(Zeroizing::new(plaintext))
}
