//! Database abstraction over SQLite via sqlx.

use std::path::Path;

use base64::Engine;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use vl_crypto::kdf::CipherKey;
use vl_crypto::token;
use vl_crypto::TokenError;

use crate::{error::StoreError, migrations, models::SecretField, session::VaultSession};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Central store handle.  Cheap to clone (pool and session are Arcs).
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
    pub session: VaultSession,
}

impl Store {
    /// Open (or create) the SQLite database at `db_path`.
    /// Runs all pending migrations automatically.
    ///
    /// WAL journal mode and foreign-key enforcement are configured at
    /// connection time — NOT inside a migration, because SQLite forbids
    /// changing `journal_mode` inside a transaction and every migration
    /// step runs in one.
    pub async fn open(db_path: &Path, session: VaultSession) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;
        migrations::run(&pool).await?;

        Ok(Self { pool, session })
    }

    // ── Cipher helpers ───────────────────────────────────────────────────────

    /// Encrypt a plaintext value with the session's active key.
    /// Fails closed with `VaultLocked` when no session is active.
    pub async fn encrypt_value(&self, plaintext: &str) -> Result<String, StoreError> {
        let plaintext = plaintext.to_owned();
        self.session
            .with_key(move |key| encrypt_field(key, &plaintext))
            .await
    }

    /// Decrypt a stored value with the session's active key. Per-field
    /// failure comes back as `SecretField` data, not as an error.
    pub async fn decrypt_value(&self, stored: &str) -> Result<SecretField, StoreError> {
        let stored = stored.to_owned();
        self.session
            .with_key(move |key| Ok(decrypt_field(key, &stored)))
            .await
    }
}

/// Token-encrypt and base64-encode one field. Empty plaintext stays an
/// empty string (the token layer short-circuits it).
pub(crate) fn encrypt_field(key: &CipherKey, plaintext: &str) -> Result<String, StoreError> {
    let token = token::encrypt(key, plaintext.as_bytes())?;
    Ok(B64.encode(token))
}

/// Decode and decrypt one field, tolerant of anything the row may hold.
pub(crate) fn decrypt_field(key: &CipherKey, stored: &str) -> SecretField {
    if stored.is_empty() {
        return SecretField::Empty;
    }
    let Ok(bytes) = B64.decode(stored) else {
        return SecretField::Malformed;
    };
    match token::decrypt(key, &bytes) {
        Ok(pt) if pt.is_empty() => SecretField::Empty,
        Ok(pt) => match String::from_utf8(pt.to_vec()) {
            Ok(s) => SecretField::Plain(s),
            Err(_) => SecretField::Malformed,
        },
        Err(TokenError::AuthFailed) => SecretField::AuthFailed,
        Err(TokenError::Malformed) => SecretField::Malformed,
    }
}
