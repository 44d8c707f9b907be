//! vl_store — Encrypted multi-user credential storage for VaultLock
//!
//! # Encryption strategy
//! SQLite does NOT natively encrypt.  We use application-level encryption:
//! - Sensitive columns (credential passwords and notes) are stored as
//!   self-describing XChaCha20-Poly1305 tokens, base64-encoded.
//! - The cipher key is derived from the user's master password via
//!   PBKDF2-HMAC-SHA256 and held in memory only while the session is
//!   unlocked.
//! - Non-sensitive metadata (service names, folders, timestamps, flags)
//!   is stored in plaintext to allow efficient queries.
//!
//! # Session model
//! One [`VaultSession`] per process, exactly one unlocked user at a time.
//! Every sensitive read/write goes through the session's active key; a
//! locked session fails closed with [`StoreError::VaultLocked`].
//!
//! # Migration
//! Numbered migrations gated by the `schema_info` version row run on
//! every open, each in its own transaction. Legacy single-user layouts
//! are transformed in place, never deleted.

pub mod credentials;
pub mod db;
pub mod error;
pub mod folders;
pub mod listing;
pub mod migrations;
pub mod models;
pub mod pin;
pub mod session;
pub mod settings;
pub mod users;

pub use db::Store;
pub use error::StoreError;
pub use models::SecretField;
pub use session::VaultSession;
