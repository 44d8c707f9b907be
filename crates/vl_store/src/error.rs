use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vault is locked — unlock with the master password first")]
    VaultLocked,

    #[error("Authentication failed")]
    AuthenticationFailure,

    #[error("Too many failed attempts — locked out for {remaining_secs}s")]
    LockedOut { remaining_secs: u64 },

    #[error("Vault data cannot be decrypted under the current key")]
    DecryptionFailure,

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] vl_crypto::CryptoError),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

/// Fold SQLite uniqueness/foreign-key conflicts into `IntegrityViolation`
/// so write paths decline them with no partial mutation; everything else
/// stays a `Database` error (storage unavailable — always surfaced).
pub(crate) fn integrity(context: &str) -> impl Fn(sqlx::Error) -> StoreError + '_ {
    move |e| match &e {
        sqlx::Error::Database(db)
            if matches!(
                db.kind(),
                sqlx::error::ErrorKind::UniqueViolation
                    | sqlx::error::ErrorKind::ForeignKeyViolation
            ) =>
        {
            StoreError::IntegrityViolation(context.to_string())
        }
        _ => StoreError::Database(e),
    }
}
