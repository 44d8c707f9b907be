//! Per-user string key/value settings.

use crate::{db::Store, error::StoreError};

/// Defaults seeded for every newly registered user.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("auto_lock_timer", "Immediately"),
    ("lock_on_minimize", "1"),
    ("clipboard_clear_time", "30"),
    ("clear_clipboard_on_exit", "1"),
    ("minimize_to_tray", "1"),
    ("close_to_minimize", "1"),
    ("pin_code", ""),
    ("failed_attempts_limit", "5"),
    ("hide_passwords_default", "1"),
    ("disable_screenshots", "0"),
];

impl Store {
    pub async fn get_setting(
        &self,
        user_id: i64,
        key: &str,
    ) -> Result<Option<String>, StoreError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE user_id = ? AND key = ?")
                .bind(user_id)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    pub async fn set_setting(
        &self,
        user_id: i64,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO settings (user_id, key, value) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
