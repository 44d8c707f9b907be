//! PIN quick-unlock.
//!
//! A PIN never replaces the master password; it envelopes it. Setting a
//! PIN derives a one-off cipher key from (PIN, fresh salt), encrypts the
//! cached master password under it, and stores a separate Argon2
//! verifier of the PIN for cheap early rejection. Verifying a PIN
//! recovers the master password and feeds it through the normal unlock
//! path, so PIN attempts share the same lockout accounting.

use zeroize::Zeroizing;

use vl_crypto::{kdf, password};

use crate::{
    db::{decrypt_field, encrypt_field, Store},
    error::StoreError,
    models::SecretField,
};

pub(crate) const PIN_CODE_KEY: &str = "pin_code";
pub(crate) const PIN_SALT_KEY: &str = "pin_salt";
pub(crate) const PIN_WRAP_KEY: &str = "pin_wrapped_master_password";

impl Store {
    /// Set (or replace) the quick-unlock PIN for the active user. The
    /// vault must be unlocked: the wrap is built from the session's
    /// cached master password.
    pub async fn set_pin(&self, pin: &str) -> Result<(), StoreError> {
        let user_id = self.session.active_user().await.ok_or(StoreError::VaultLocked)?;
        let master_password = self.session.master_password().await?;

        let verifier = password::hash_password(pin)?;
        let salt = kdf::generate_salt();
        let wrap_key = kdf::derive_key(pin.as_bytes(), &salt);
        let wrapped = encrypt_field(&wrap_key, &master_password)?;
        let salt_hex = hex::encode(salt);

        let mut tx = self.pool.begin().await?;
        for (key, value) in [
            (PIN_CODE_KEY, verifier.as_str()),
            (PIN_SALT_KEY, salt_hex.as_str()),
            (PIN_WRAP_KEY, wrapped.as_str()),
        ] {
            sqlx::query("INSERT OR REPLACE INTO settings (user_id, key, value) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::info!(user_id, "PIN configured");
        Ok(())
    }

    /// Unlock with a PIN. Any wrong PIN counts as a failed attempt, the
    /// same as a wrong master password.
    pub async fn verify_pin(&self, user_id: i64, pin: &str) -> Result<(), StoreError> {
        self.session.check_lockout().await?;

        // Registration seeds `pin_code` as the empty string; only a
        // non-empty verifier means a PIN exists. Attempts against a
        // PIN-less user are rejected without touching the lockout
        // counter.
        let verifier = self
            .get_setting(user_id, PIN_CODE_KEY)
            .await?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StoreError::NotFound("no PIN is configured".into()))?;
        if !password::verify_password(pin, &verifier) {
            self.session.record_failure().await;
            return Err(StoreError::AuthenticationFailure);
        }

        let recovered = match self.unwrap_master_password(user_id, pin).await? {
            Some(password) => password,
            // Verifier passed but the wrap did not survive: treat it the
            // same as a wrong PIN so the wrap is not an oracle.
            None => {
                self.session.record_failure().await;
                return Err(StoreError::AuthenticationFailure);
            }
        };

        self.unlock(user_id, &recovered).await
    }

    /// Remove the PIN and its wrap. The master password is unaffected.
    pub async fn remove_pin(&self, user_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM settings WHERE user_id = ? AND key IN (?, ?, ?)")
            .bind(user_id)
            .bind(PIN_CODE_KEY)
            .bind(PIN_SALT_KEY)
            .bind(PIN_WRAP_KEY)
            .execute(&self.pool)
            .await?;
        tracing::info!(user_id, "PIN removed");
        Ok(())
    }

    /// The seeded empty `pin_code` value counts as unset.
    pub async fn is_pin_set(&self, user_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .get_setting(user_id, PIN_CODE_KEY)
            .await?
            .is_some_and(|v| !v.is_empty()))
    }

    /// Decrypt the stored wrap with a key derived from the PIN. Returns
    /// `Ok(None)` when the salt or wrap is missing or the AEAD rejects —
    /// the caller decides how that surfaces.
    async fn unwrap_master_password(
        &self,
        user_id: i64,
        pin: &str,
    ) -> Result<Option<Zeroizing<String>>, StoreError> {
        let (Some(salt_hex), Some(wrapped)) = (
            self.get_setting(user_id, PIN_SALT_KEY).await?,
            self.get_setting(user_id, PIN_WRAP_KEY).await?,
        ) else {
            return Ok(None);
        };
        let Ok(salt) = crate::session::decode_salt(&salt_hex) else {
            return Ok(None);
        };
        let wrap_key = kdf::derive_key(pin.as_bytes(), &salt);
        match decrypt_field(&wrap_key, &wrapped) {
            SecretField::Plain(password) => Ok(Some(Zeroizing::new(password))),
            SecretField::Empty | SecretField::AuthFailed | SecretField::Malformed => Ok(None),
        }
    }
}
