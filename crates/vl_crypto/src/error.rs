use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Token encryption failed")]
    Encrypt,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// Decryption outcome for a vault token. Returned as data, never a panic:
/// callers must be able to render a single unreadable field without
/// aborting the record it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Authentication tag mismatch — wrong key, tampering, or a token
    /// produced under a different (password, salt) pair.
    #[error("Token authentication failed")]
    AuthFailed,

    /// Not a vault token at all: truncated, or an unknown format version.
    #[error("Malformed token")]
    Malformed,
}
