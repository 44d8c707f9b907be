//! Database row models and the decrypted projections handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    /// Argon2id PHC string — authentication only, never key material.
    pub master_password_hash: String,
    /// Hex-encoded 16-byte PBKDF2 salt for cipher key derivation.
    pub vault_salt: String,
    pub created_at: DateTime<Utc>,
}

/// Minimal user listing for the account picker (no hash, no salt).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FolderRow {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub parent_id: Option<i64>,
    pub user_id: i64,
    /// Live count of non-deleted credentials directly in this folder.
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The value of a sensitive credential field after decryption. A tagged
/// result rather than a string sentinel: no caller can mistake a failure
/// marker for real plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum SecretField {
    Plain(String),
    Empty,
    /// Token failed authentication (wrong key or tampering).
    AuthFailed,
    /// Stored bytes are not a vault token at all.
    Malformed,
}

impl SecretField {
    pub fn as_plain(&self) -> Option<&str> {
        match self {
            SecretField::Plain(s) => Some(s),
            _ => None,
        }
    }

    /// True for values that decrypted cleanly (including the empty one).
    pub fn is_readable(&self) -> bool {
        matches!(self, SecretField::Plain(_) | SecretField::Empty)
    }
}

/// A credential as handed to the presentation layer: metadata plus
/// per-field decryption outcomes, folder name pre-joined for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: i64,
    pub service_name: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub folder_id: Option<i64>,
    /// Folder display name, `"No Folder"` when unset.
    pub folder: String,
    pub favourite: bool,
    pub deleted: bool,
    pub password: SecretField,
    pub notes: SecretField,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const NO_FOLDER: &str = "No Folder";
