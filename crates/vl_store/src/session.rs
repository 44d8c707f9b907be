//! Vault session: in-memory key material unlocked by the master password.
//!
//! The session is the only holder of an active cipher key. When the user
//! locks the vault the key (and the cached master password that backs
//! PIN wrapping) is zeroized from memory.
//!
//! Lockout: a configurable number of consecutive failed unlock attempts
//! (default 5) starts a monotonic lockout window (default 30 s) during
//! which every unlock attempt — correct or not — is rejected before any
//! verification happens. Expiry resets the failure counter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use zeroize::Zeroizing;

use vl_crypto::kdf::{self, CipherKey, SALT_LEN};
use vl_crypto::password;

use crate::db::{decrypt_field, Store};
use crate::error::StoreError;
use crate::models::SecretField;

pub const DEFAULT_ATTEMPT_LIMIT: u32 = 5;
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(30);

struct ActiveState {
    user_id: i64,
    key: CipherKey,
    /// Plaintext master password, retained only while unlocked so a PIN
    /// wrap can be created without re-prompting. Zeroized on lock.
    master_password: Zeroizing<String>,
}

struct SessionInner {
    active: Option<ActiveState>,
    failed_attempts: u32,
    lockout_until: Option<Instant>,
    attempt_limit: u32,
    lockout_duration: Duration,
}

/// Thread-safe session handle.  Clone to share across tasks; exactly one
/// user is unlocked per handle at a time.
#[derive(Clone)]
pub struct VaultSession {
    inner: Arc<RwLock<SessionInner>>,
}

impl VaultSession {
    pub fn new() -> Self {
        Self::with_policy(DEFAULT_ATTEMPT_LIMIT, DEFAULT_LOCKOUT)
    }

    /// Construct with an explicit lockout policy (tests shorten both).
    pub fn with_policy(attempt_limit: u32, lockout_duration: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionInner {
                active: None,
                failed_attempts: 0,
                lockout_until: None,
                attempt_limit: attempt_limit.max(1),
                lockout_duration,
            })),
        }
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.read().await.active.is_none()
    }

    pub async fn active_user(&self) -> Option<i64> {
        self.inner.read().await.active.as_ref().map(|a| a.user_id)
    }

    pub async fn failed_attempts(&self) -> u32 {
        self.inner.write().await.clear_expired_lockout().failed_attempts
    }

    /// Time left in the current lockout window, if one is active.
    pub async fn lockout_remaining(&self) -> Option<Duration> {
        let mut inner = self.inner.write().await;
        inner.clear_expired_lockout();
        inner
            .lockout_until
            .map(|until| until.saturating_duration_since(Instant::now()))
    }

    /// Lock the vault — zeroizes the key and cached master password.
    pub async fn lock(&self) {
        let mut inner = self.inner.write().await;
        if inner.active.take().is_some() {
            tracing::info!("vault session locked");
        }
    }

    /// Fail any unlock attempt that arrives while a lockout is active.
    /// An expired window resets the failure counter on the way out.
    pub(crate) async fn check_lockout(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.clear_expired_lockout();
        match inner.lockout_until {
            Some(until) => Err(StoreError::LockedOut {
                remaining_secs: until
                    .saturating_duration_since(Instant::now())
                    .as_secs()
                    .max(1),
            }),
            None => Ok(()),
        }
    }

    pub(crate) async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.failed_attempts += 1;
        tracing::warn!(failed_attempts = inner.failed_attempts, "failed unlock attempt");
        if inner.failed_attempts >= inner.attempt_limit {
            inner.lockout_until = Some(Instant::now() + inner.lockout_duration);
            tracing::warn!(
                lockout_secs = inner.lockout_duration.as_secs(),
                "attempt limit reached — lockout started"
            );
        }
    }

    pub(crate) async fn set_attempt_limit(&self, limit: u32) {
        self.inner.write().await.attempt_limit = limit.max(1);
    }

    /// Adopt a freshly derived key. Replaces any previous session (one
    /// active user per process) and resets the failure counter.
    pub(crate) async fn activate(&self, user_id: i64, key: CipherKey, master_password: &str) {
        let mut inner = self.inner.write().await;
        inner.active = Some(ActiveState {
            user_id,
            key,
            master_password: Zeroizing::new(master_password.to_owned()),
        });
        inner.failed_attempts = 0;
        inner.lockout_until = None;
        tracing::info!(user_id, "vault session unlocked");
    }

    /// Access the active key for one encrypt/decrypt operation.
    pub(crate) async fn with_key<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&CipherKey) -> Result<R, StoreError>,
    {
        let inner = self.inner.read().await;
        match inner.active.as_ref() {
            Some(active) => f(&active.key),
            None => Err(StoreError::VaultLocked),
        }
    }

    pub(crate) async fn master_password(&self) -> Result<Zeroizing<String>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .active
            .as_ref()
            .map(|a| a.master_password.clone())
            .ok_or(StoreError::VaultLocked)
    }
}

impl SessionInner {
    fn clear_expired_lockout(&mut self) -> &mut Self {
        if let Some(until) = self.lockout_until {
            if Instant::now() >= until {
                self.lockout_until = None;
                self.failed_attempts = 0;
                tracing::info!("lockout expired — attempts re-enabled");
            }
        }
        self
    }
}

impl Default for VaultSession {
    fn default() -> Self {
        Self::new()
    }
}

// ── Session flows on the store ───────────────────────────────────────────────

/// Everything re-encrypted during a password rotation, staged before the
/// single commit. Dropping a plan (an interrupted rotation) leaves the
/// store fully intact under the old password.
struct RotationPlan {
    user_id: i64,
    new_hash: String,
    new_salt_hex: String,
    new_key: CipherKey,
    /// (credential id, new password_enc, new notes_enc)
    reencrypted: Vec<(i64, String, String)>,
}

impl Store {
    /// Unlock the vault for `user_id`. Lockout is checked before any
    /// verification; a verified password derives the cipher key from the
    /// user's stored salt and activates the session.
    pub async fn unlock(&self, user_id: i64, master_password: &str) -> Result<(), StoreError> {
        self.session.check_lockout().await?;

        // The per-user attempt limit is a setting; pick it up before
        // verification so this attempt already counts against it.
        if let Some(limit) = self
            .get_setting(user_id, "failed_attempts_limit")
            .await?
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.session.set_attempt_limit(limit).await;
        }

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT master_password_hash, vault_salt FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some((stored_hash, salt_hex)) = row else {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        };

        if !password::verify_password(master_password, &stored_hash) {
            self.session.record_failure().await;
            return Err(StoreError::AuthenticationFailure);
        }

        let salt = decode_salt(&salt_hex)?;
        let key = kdf::derive_key(master_password.as_bytes(), &salt);
        self.session.activate(user_id, key, master_password).await;
        Ok(())
    }

    /// Lock the vault, discarding the key and any cached plaintext.
    pub async fn lock(&self) {
        self.session.lock().await;
    }

    /// Rotate the master password: re-verify the old one, re-encrypt
    /// every credential's sensitive fields under a fresh (salt, key), and
    /// persist {new hash, new salt, all new ciphertexts, PIN-wrap
    /// removal} as one transaction. The session adopts the new key only
    /// after that commit; any earlier failure leaves the previous hash,
    /// salt and ciphertexts fully usable.
    pub async fn rotate_master_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), StoreError> {
        let plan = self.prepare_rotation(old_password, new_password).await?;
        let user_id = plan.user_id;
        let new_key = self.commit_rotation(plan).await?;
        self.session.activate(user_id, new_key, new_password).await;
        tracing::info!(user_id, "master password rotated");
        Ok(())
    }

    /// Decrypt-and-re-encrypt stage. No store mutation happens here.
    async fn prepare_rotation(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<RotationPlan, StoreError> {
        let user_id = self.session.active_user().await.ok_or(StoreError::VaultLocked)?;

        let stored_hash: String =
            sqlx::query_scalar("SELECT master_password_hash FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        if !password::verify_password(old_password, &stored_hash) {
            return Err(StoreError::AuthenticationFailure);
        }

        // Soft-deleted rows are still ciphertext under the old key and
        // must rotate with everything else.
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, password_enc, notes_enc FROM credentials WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        // Any field that fails to decrypt aborts the whole rotation —
        // re-encrypting a failure marker would destroy the only copy.
        let plaintexts: Vec<(i64, Zeroizing<String>, Zeroizing<String>)> = self
            .session
            .with_key(|key| {
                rows.iter()
                    .map(|(id, p, n)| {
                        Ok((*id, strict_decrypt(key, p)?, strict_decrypt(key, n)?))
                    })
                    .collect()
            })
            .await?;

        let new_salt = kdf::generate_salt();
        let new_key = kdf::derive_key(new_password.as_bytes(), &new_salt);
        let new_hash = password::hash_password(new_password)?;

        let reencrypted = plaintexts
            .iter()
            .map(|(id, p, n)| {
                Ok((
                    *id,
                    crate::db::encrypt_field(&new_key, p)?,
                    crate::db::encrypt_field(&new_key, n)?,
                ))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(RotationPlan {
            user_id,
            new_hash,
            new_salt_hex: hex::encode(new_salt),
            new_key,
            reencrypted,
        })
    }

    /// Single-transaction commit of a rotation plan.
    async fn commit_rotation(&self, plan: RotationPlan) -> Result<CipherKey, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE users SET master_password_hash = ?, vault_salt = ? WHERE id = ?")
            .bind(&plan.new_hash)
            .bind(&plan.new_salt_hex)
            .bind(plan.user_id)
            .execute(&mut *tx)
            .await?;

        for (id, password_enc, notes_enc) in &plan.reencrypted {
            sqlx::query(
                "UPDATE credentials SET password_enc = ?, notes_enc = ?, \
                 updated_at = datetime('now') WHERE id = ?",
            )
            .bind(password_enc)
            .bind(notes_enc)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        // The PIN wrap holds the old master password — rotation
        // invalidates it in the same atomic unit.
        sqlx::query(
            "DELETE FROM settings WHERE user_id = ? AND key IN \
             ('pin_code', 'pin_salt', 'pin_wrapped_master_password')",
        )
        .bind(plan.user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(plan.new_key)
    }
}

/// Decrypt a field for rotation: only clean plaintext (or empty) is
/// acceptable; failure markers abort.
fn strict_decrypt(key: &CipherKey, stored: &str) -> Result<Zeroizing<String>, StoreError> {
    match decrypt_field(key, stored) {
        SecretField::Plain(s) => Ok(Zeroizing::new(s)),
        SecretField::Empty => Ok(Zeroizing::new(String::new())),
        SecretField::AuthFailed | SecretField::Malformed => Err(StoreError::DecryptionFailure),
    }
}

pub(crate) fn decode_salt(salt_hex: &str) -> Result<[u8; SALT_LEN], StoreError> {
    let bytes = hex::decode(salt_hex)
        .map_err(|_| StoreError::IntegrityViolation("corrupt vault salt".into()))?;
    bytes
        .try_into()
        .map_err(|_| StoreError::IntegrityViolation("corrupt vault salt".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::NewCredential;
    use crate::models::SecretField;

    const MASTER: &str = "correct horse battery staple";

    async fn store_with_policy(
        dir: &tempfile::TempDir,
        attempt_limit: u32,
        lockout: Duration,
    ) -> Store {
        let session = VaultSession::with_policy(attempt_limit, lockout);
        Store::open(&dir.path().join("vault.db"), session)
            .await
            .unwrap()
    }

    async fn registered_store(dir: &tempfile::TempDir) -> (Store, i64) {
        let store = store_with_policy(dir, DEFAULT_ATTEMPT_LIMIT, DEFAULT_LOCKOUT).await;
        let user_id = store
            .register_user("Ada Lovelace", "ada@example.com", MASTER)
            .await
            .unwrap();
        (store, user_id)
    }

    fn credential(service: &str, password: &str) -> NewCredential {
        NewCredential {
            service_name: service.into(),
            username: Some("ada".into()),
            password: password.into(),
            notes: "first note".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unlock_then_lock_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = registered_store(&dir).await;

        assert!(store.session.is_locked().await);
        store.unlock(user_id, MASTER).await.unwrap();
        assert_eq!(store.session.active_user().await, Some(user_id));

        store.lock().await;
        assert!(store.session.is_locked().await);
        assert!(matches!(
            store.encrypt_value("anything").await,
            Err(StoreError::VaultLocked)
        ));
    }

    #[tokio::test]
    async fn unlock_unknown_user_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_policy(&dir, DEFAULT_ATTEMPT_LIMIT, DEFAULT_LOCKOUT).await;
        assert!(matches!(
            store.unlock(99, MASTER).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lockout_engages_blocks_correct_password_and_expires() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_policy(&dir, 5, Duration::from_millis(200)).await;
        let user_id = store
            .register_user("Ada Lovelace", "ada@example.com", MASTER)
            .await
            .unwrap();
        // The per-user setting overrides the session default on unlock.
        store
            .set_setting(user_id, "failed_attempts_limit", "3")
            .await
            .unwrap();

        for attempt in 1..=3 {
            let err = store.unlock(user_id, "wrong").await.unwrap_err();
            assert!(matches!(err, StoreError::AuthenticationFailure));
            assert_eq!(store.session.failed_attempts().await, attempt);
        }

        // Inside the window even the correct password is refused, and the
        // refusal happens before verification.
        assert!(matches!(
            store.unlock(user_id, MASTER).await,
            Err(StoreError::LockedOut { .. })
        ));
        assert!(store.session.lockout_remaining().await.is_some());

        tokio::time::sleep(Duration::from_millis(250)).await;
        store.unlock(user_id, MASTER).await.unwrap();
        assert_eq!(store.session.failed_attempts().await, 0);
    }

    #[tokio::test]
    async fn wrong_pin_shares_lockout_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_policy(&dir, 2, Duration::from_millis(200)).await;
        let user_id = store
            .register_user("Ada Lovelace", "ada@example.com", MASTER)
            .await
            .unwrap();
        store
            .set_setting(user_id, "failed_attempts_limit", "2")
            .await
            .unwrap();
        store.unlock(user_id, MASTER).await.unwrap();
        store.set_pin("2468").await.unwrap();
        store.lock().await;

        assert!(matches!(
            store.verify_pin(user_id, "0000").await,
            Err(StoreError::AuthenticationFailure)
        ));
        assert!(matches!(
            store.verify_pin(user_id, "1111").await,
            Err(StoreError::AuthenticationFailure)
        ));
        assert!(matches!(
            store.verify_pin(user_id, "2468").await,
            Err(StoreError::LockedOut { .. })
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        store.verify_pin(user_id, "2468").await.unwrap();
        assert_eq!(store.session.active_user().await, Some(user_id));
    }

    #[tokio::test]
    async fn rotation_reencrypts_everything_and_invalidates_old_password() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = registered_store(&dir).await;
        store.unlock(user_id, MASTER).await.unwrap();
        store
            .add_credential(user_id, credential("Gmail", "pw-one"))
            .await
            .unwrap();
        let deleted_id = store
            .add_credential(user_id, credential("Old Bank", "pw-two"))
            .await
            .unwrap();
        store.soft_delete_credential(deleted_id).await.unwrap();

        store
            .rotate_master_password(MASTER, "new passphrase")
            .await
            .unwrap();

        store.lock().await;
        assert!(matches!(
            store.unlock(user_id, MASTER).await,
            Err(StoreError::AuthenticationFailure)
        ));
        store.unlock(user_id, "new passphrase").await.unwrap();

        // Soft-deleted rows rotated too.
        let record = store.get_credential(deleted_id).await.unwrap();
        assert_eq!(record.password, SecretField::Plain("pw-two".into()));
    }

    #[tokio::test]
    async fn interrupted_rotation_leaves_store_usable_under_old_password() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = registered_store(&dir).await;
        store.unlock(user_id, MASTER).await.unwrap();
        let id = store
            .add_credential(user_id, credential("Gmail", "pw-one"))
            .await
            .unwrap();

        // Stage everything, then drop the plan without committing.
        let plan = store.prepare_rotation(MASTER, "new passphrase").await.unwrap();
        drop(plan);

        store.lock().await;
        store.unlock(user_id, MASTER).await.unwrap();
        let record = store.get_credential(id).await.unwrap();
        assert_eq!(record.password, SecretField::Plain("pw-one".into()));
    }

    #[tokio::test]
    async fn rotation_aborts_on_unreadable_ciphertext() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = registered_store(&dir).await;
        store.unlock(user_id, MASTER).await.unwrap();
        let good = store
            .add_credential(user_id, credential("Gmail", "pw-one"))
            .await
            .unwrap();
        let bad = store
            .add_credential(user_id, credential("Broken", "pw-two"))
            .await
            .unwrap();
        sqlx::query("UPDATE credentials SET password_enc = 'not a token' WHERE id = ?")
            .bind(bad)
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(matches!(
            store.rotate_master_password(MASTER, "new passphrase").await,
            Err(StoreError::DecryptionFailure)
        ));

        // Nothing was mutated: old password and intact ciphertext survive.
        store.lock().await;
        store.unlock(user_id, MASTER).await.unwrap();
        let record = store.get_credential(good).await.unwrap();
        assert_eq!(record.password, SecretField::Plain("pw-one".into()));
    }

    #[tokio::test]
    async fn rotation_rejects_wrong_current_password() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = registered_store(&dir).await;
        store.unlock(user_id, MASTER).await.unwrap();
        assert!(matches!(
            store.rotate_master_password("wrong", "new passphrase").await,
            Err(StoreError::AuthenticationFailure)
        ));
        store.lock().await;
        store.unlock(user_id, MASTER).await.unwrap();
    }

    #[tokio::test]
    async fn rotation_removes_pin_wrap() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = registered_store(&dir).await;
        store.unlock(user_id, MASTER).await.unwrap();
        store.set_pin("1234").await.unwrap();
        assert!(store.is_pin_set(user_id).await.unwrap());

        store
            .rotate_master_password(MASTER, "new passphrase")
            .await
            .unwrap();
        assert!(!store.is_pin_set(user_id).await.unwrap());
        assert!(matches!(
            store.verify_pin(user_id, "1234").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fresh_user_has_no_pin_and_attempts_cost_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = registered_store(&dir).await;

        // Registration seeds pin_code as "", which is not a PIN.
        assert!(!store.is_pin_set(user_id).await.unwrap());
        assert!(matches!(
            store.verify_pin(user_id, "1234").await,
            Err(StoreError::NotFound(_))
        ));
        // A rejected attempt against a PIN-less user never feeds the
        // lockout counter shared with master-password unlocks.
        assert_eq!(store.session.failed_attempts().await, 0);

        store.unlock(user_id, MASTER).await.unwrap();
        store.set_pin("1234").await.unwrap();
        assert!(store.is_pin_set(user_id).await.unwrap());
        store.remove_pin(user_id).await.unwrap();
        assert!(!store.is_pin_set(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn pin_round_trip_recovers_master_password() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = registered_store(&dir).await;
        store.unlock(user_id, MASTER).await.unwrap();
        let id = store
            .add_credential(user_id, credential("Gmail", "pw-one"))
            .await
            .unwrap();
        store.set_pin("1234").await.unwrap();
        store.lock().await;

        store.verify_pin(user_id, "1234").await.unwrap();
        let record = store.get_credential(id).await.unwrap();
        assert_eq!(record.password, SecretField::Plain("pw-one".into()));
    }
}
