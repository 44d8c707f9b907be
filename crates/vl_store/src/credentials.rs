//! Credential repository: CRUD, soft delete, restore, purge.
//!
//! Every sensitive field passes through the session's active cipher on
//! the way in and out; a locked session fails the write, while reads
//! degrade per field (see [`crate::models::SecretField`]) instead of
//! dropping records.

use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use crate::{
    db::{decrypt_field, Store},
    error::{integrity, StoreError},
    models::{CredentialRecord, NO_FOLDER},
};

#[derive(Debug, Clone, Default)]
pub struct NewCredential {
    pub service_name: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub folder_id: Option<i64>,
    pub favourite: bool,
    /// Plaintext — encrypted before it touches the database.
    pub password: String,
    pub notes: String,
}

/// Partial update; only the populated fields are written.
/// `folder_id: Some(None)` moves the credential to "No Folder".
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub service_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub folder_id: Option<Option<i64>>,
    pub favourite: Option<bool>,
    pub password: Option<String>,
    pub notes: Option<String>,
}

#[derive(sqlx::FromRow)]
struct CredentialJoinRow {
    id: i64,
    service_name: String,
    username: Option<String>,
    email: Option<String>,
    password_enc: String,
    website: Option<String>,
    notes_enc: String,
    folder_id: Option<i64>,
    is_favourite: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    folder_name: Option<String>,
}

impl Store {
    pub async fn add_credential(
        &self,
        user_id: i64,
        new: NewCredential,
    ) -> Result<i64, StoreError> {
        if let Some(folder_id) = new.folder_id {
            self.assert_folder_owner(folder_id, user_id).await?;
        }
        let password_enc = self.encrypt_value(&new.password).await?;
        let notes_enc = self.encrypt_value(&new.notes).await?;

        let id = sqlx::query(
            "INSERT INTO credentials \
             (service_name, username, email, website, folder_id, user_id, is_favourite, \
              password_enc, notes_enc) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.service_name)
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.website)
        .bind(new.folder_id)
        .bind(user_id)
        .bind(new.favourite)
        .bind(&password_enc)
        .bind(&notes_enc)
        .execute(&self.pool)
        .await
        .map_err(integrity("credential references a missing folder or user"))?
        .last_insert_rowid();

        tracing::debug!(credential_id = id, user_id, "credential added");
        Ok(id)
    }

    pub async fn update_credential(
        &self,
        credential_id: i64,
        patch: CredentialPatch,
    ) -> Result<(), StoreError> {
        let owner: Option<i64> =
            sqlx::query_scalar("SELECT user_id FROM credentials WHERE id = ?")
                .bind(credential_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(user_id) = owner else {
            return Err(StoreError::NotFound(format!("credential {credential_id}")));
        };
        if let Some(Some(folder_id)) = patch.folder_id {
            self.assert_folder_owner(folder_id, user_id).await?;
        }

        // Encrypt up front so a locked session fails before any SQL.
        let password_enc = match &patch.password {
            Some(p) => Some(self.encrypt_value(p).await?),
            None => None,
        };
        let notes_enc = match &patch.notes {
            Some(n) => Some(self.encrypt_value(n).await?),
            None => None,
        };

        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE credentials SET ");
        let mut changed = false;
        {
            let mut sep = qb.separated(", ");
            if let Some(v) = &patch.service_name {
                sep.push("service_name = ").push_bind_unseparated(v.clone());
                changed = true;
            }
            if let Some(v) = &patch.username {
                sep.push("username = ").push_bind_unseparated(v.clone());
                changed = true;
            }
            if let Some(v) = &patch.email {
                sep.push("email = ").push_bind_unseparated(v.clone());
                changed = true;
            }
            if let Some(v) = &patch.website {
                sep.push("website = ").push_bind_unseparated(v.clone());
                changed = true;
            }
            if let Some(v) = patch.folder_id {
                sep.push("folder_id = ").push_bind_unseparated(v);
                changed = true;
            }
            if let Some(v) = patch.favourite {
                sep.push("is_favourite = ").push_bind_unseparated(v);
                changed = true;
            }
            if let Some(v) = password_enc {
                sep.push("password_enc = ").push_bind_unseparated(v);
                changed = true;
            }
            if let Some(v) = notes_enc {
                sep.push("notes_enc = ").push_bind_unseparated(v);
                changed = true;
            }
            if changed {
                sep.push("updated_at = datetime('now')");
            }
        }
        if !changed {
            return Ok(());
        }
        qb.push(" WHERE id = ").push_bind(credential_id);
        qb.build()
            .execute(&self.pool)
            .await
            .map_err(integrity("credential update violates a constraint"))?;
        Ok(())
    }

    /// Soft delete: the row stays, hidden from default listings,
    /// recoverable via [`Store::restore_credential`].
    pub async fn soft_delete_credential(&self, credential_id: i64) -> Result<(), StoreError> {
        self.set_deleted_flag(credential_id, true).await
    }

    pub async fn restore_credential(&self, credential_id: i64) -> Result<(), StoreError> {
        self.set_deleted_flag(credential_id, false).await
    }

    /// Irreversible single-row delete.
    pub async fn permanently_delete_credential(
        &self,
        credential_id: i64,
    ) -> Result<(), StoreError> {
        let affected = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(credential_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(format!("credential {credential_id}")));
        }
        Ok(())
    }

    /// Irreversible bulk removal of all soft-deleted rows for a user.
    pub async fn purge_deleted_credentials(&self, user_id: i64) -> Result<u64, StoreError> {
        let purged = sqlx::query("DELETE FROM credentials WHERE is_deleted = 1 AND user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if purged > 0 {
            tracing::info!(user_id, purged, "purged soft-deleted credentials");
        }
        Ok(purged)
    }

    /// All of a user's credentials (deleted included — the listing layer
    /// filters), folder names joined for display, sensitive fields
    /// decrypted per field under the active key.
    pub async fn list_credentials(
        &self,
        user_id: i64,
    ) -> Result<Vec<CredentialRecord>, StoreError> {
        let rows: Vec<CredentialJoinRow> = sqlx::query_as(
            "SELECT c.id, c.service_name, c.username, c.email, c.password_enc, c.website, \
                    c.notes_enc, c.folder_id, c.is_favourite, c.is_deleted, c.created_at, \
                    c.updated_at, f.name AS folder_name \
             FROM credentials c \
             LEFT JOIN folders f ON c.folder_id = f.id \
             WHERE c.user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.session
            .with_key(|key| {
                Ok(rows
                    .into_iter()
                    .map(|row| CredentialRecord {
                        id: row.id,
                        service_name: row.service_name,
                        username: row.username,
                        email: row.email,
                        website: row.website,
                        folder_id: row.folder_id,
                        folder: row.folder_name.unwrap_or_else(|| NO_FOLDER.to_string()),
                        favourite: row.is_favourite,
                        deleted: row.is_deleted,
                        password: decrypt_field(key, &row.password_enc),
                        notes: decrypt_field(key, &row.notes_enc),
                        created_at: row.created_at,
                        updated_at: row.updated_at,
                    })
                    .collect())
            })
            .await
    }

    /// Single decrypted credential, for detail views.
    pub async fn get_credential(
        &self,
        credential_id: i64,
    ) -> Result<CredentialRecord, StoreError> {
        let row: Option<CredentialJoinRow> = sqlx::query_as(
            "SELECT c.id, c.service_name, c.username, c.email, c.password_enc, c.website, \
                    c.notes_enc, c.folder_id, c.is_favourite, c.is_deleted, c.created_at, \
                    c.updated_at, f.name AS folder_name \
             FROM credentials c \
             LEFT JOIN folders f ON c.folder_id = f.id \
             WHERE c.id = ?",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound(format!("credential {credential_id}")));
        };

        self.session
            .with_key(|key| {
                Ok(CredentialRecord {
                    id: row.id,
                    service_name: row.service_name,
                    username: row.username,
                    email: row.email,
                    website: row.website,
                    folder_id: row.folder_id,
                    folder: row.folder_name.unwrap_or_else(|| NO_FOLDER.to_string()),
                    favourite: row.is_favourite,
                    deleted: row.is_deleted,
                    password: decrypt_field(key, &row.password_enc),
                    notes: decrypt_field(key, &row.notes_enc),
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .await
    }

    async fn set_deleted_flag(&self, credential_id: i64, deleted: bool) -> Result<(), StoreError> {
        let affected = sqlx::query("UPDATE credentials SET is_deleted = ? WHERE id = ?")
            .bind(deleted)
            .bind(credential_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(format!("credential {credential_id}")));
        }
        Ok(())
    }
}
