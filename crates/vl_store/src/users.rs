//! User registration, lookup and wipe. Users are the tenancy root:
//! folders, credentials and settings all cascade-delete with their user.

use vl_crypto::{kdf, password};

use crate::{
    db::Store,
    error::{integrity, StoreError},
    models::{UserRow, UserSummary},
    settings::DEFAULT_SETTINGS,
};

impl Store {
    /// Create a user: Argon2id hash for authentication, fresh PBKDF2 salt
    /// for key derivation, default settings — one transaction. The caller
    /// unlocks afterwards; registration itself never holds a key.
    pub async fn register_user(
        &self,
        full_name: &str,
        email: &str,
        master_password: &str,
    ) -> Result<i64, StoreError> {
        let hash = password::hash_password(master_password)?;
        let salt = kdf::generate_salt();

        let mut tx = self.pool.begin().await?;
        let user_id = sqlx::query(
            "INSERT INTO users (full_name, email, master_password_hash, vault_salt) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(full_name)
        .bind(email)
        .bind(&hash)
        .bind(hex::encode(salt))
        .execute(&mut *tx)
        .await
        .map_err(integrity("email already registered"))?
        .last_insert_rowid();

        for (key, value) in DEFAULT_SETTINGS {
            sqlx::query("INSERT OR REPLACE INTO settings (user_id, key, value) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(user_id, "registered new vault user");
        Ok(user_id)
    }

    /// True once any user exists (drives first-run registration flow).
    pub async fn is_registered(&self) -> Result<bool, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&self.pool).await?;
        Ok(count > 0)
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let users = sqlx::query_as("SELECT id, full_name, email FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<UserRow, StoreError> {
        sqlx::query_as(
            "SELECT id, full_name, email, master_password_hash, vault_salt, created_at \
             FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
    }

    /// Explicit wipe: removes the user row; folders, credentials and
    /// settings go with it via cascade. Locks the session if this user
    /// was the active one.
    pub async fn wipe_user(&self, user_id: i64) -> Result<(), StoreError> {
        let affected = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        if self.session.active_user().await == Some(user_id) {
            self.session.lock().await;
        }
        tracing::warn!(user_id, "wiped user and all owned data");
        Ok(())
    }
}
