//! Numbered schema migrations, gated by the `schema_info` version row.
//!
//! Each step runs in its own transaction: a failing step rolls back and
//! leaves the store at the last committed version. Every step tolerates
//! partially pre-existing layouts (`IF NOT EXISTS`, column inspection),
//! so the runner is idempotent both across restarts and against databases that
//! pre-date version gating — a legacy single-user database arrives
//! stamped at version 1 and is transformed by steps 2..=5. Recovery
//! steps adopt stray data; nothing here ever deletes it.

use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::error::StoreError;

pub const LATEST_VERSION: i64 = 5;

pub async fn run(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_info (version INTEGER PRIMARY KEY)")
        .execute(pool)
        .await?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_info")
        .fetch_one(pool)
        .await?;
    let mut current = current.unwrap_or(0);

    while current < LATEST_VERSION {
        let next = current + 1;
        let mut tx = pool.begin().await?;
        match next {
            1 => base_schema(&mut tx).await?,
            2 => fold_legacy_master_vault(&mut tx).await?,
            3 => backfill_columns(&mut tx).await?,
            4 => rekey_settings(&mut tx).await?,
            5 => adopt_orphan_rows(&mut tx).await?,
            _ => return Err(StoreError::Migration(format!("unknown schema version {next}"))),
        }
        sqlx::query("DELETE FROM schema_info").execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_info (version) VALUES (?)")
            .bind(next)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(version = next, "applied schema migration");
        current = next;
    }

    Ok(())
}

// ── Steps ─────────────────────────────────────────────────────────────────────

/// v1 — the full modern schema. `IF NOT EXISTS` throughout so a legacy
/// database that already carries some of these tables passes through.
async fn base_schema(tx: &mut Transaction<'_, Sqlite>) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            master_password_hash TEXT NOT NULL,
            vault_salt TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS folders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT '#4B5563',
            icon TEXT NOT NULL DEFAULT 'folder.svg',
            parent_id INTEGER REFERENCES folders (id) ON DELETE CASCADE,
            user_id INTEGER REFERENCES users (id) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT (datetime('now')),
            updated_at TIMESTAMP NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS settings (
            user_id INTEGER REFERENCES users (id) ON DELETE CASCADE,
            key TEXT,
            value TEXT,
            PRIMARY KEY (user_id, key)
        )",
    )
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_name TEXT NOT NULL,
            username TEXT,
            email TEXT,
            password_enc TEXT NOT NULL DEFAULT '',
            website TEXT,
            notes_enc TEXT NOT NULL DEFAULT '',
            folder_id INTEGER REFERENCES folders (id) ON DELETE SET NULL,
            user_id INTEGER REFERENCES users (id) ON DELETE CASCADE,
            is_favourite BOOLEAN NOT NULL DEFAULT 0,
            is_deleted BOOLEAN NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT (datetime('now')),
            updated_at TIMESTAMP NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// v2 — legacy single-table layout: a `master_vault` table holding the
/// one registered account becomes a row in `users`.
async fn fold_legacy_master_vault(tx: &mut Transaction<'_, Sqlite>) -> Result<(), StoreError> {
    if !table_exists(tx, "master_vault").await? {
        return Ok(());
    }
    // A master_vault-era database may predate `users` entirely; the base
    // schema step is idempotent, so re-apply it before copying.
    base_schema(tx).await?;
    // The legacy salt column was a BLOB; hex-encode it on the way over.
    sqlx::query(
        "INSERT OR IGNORE INTO users (full_name, email, master_password_hash, vault_salt)
         SELECT full_name, email, master_password_hash, lower(hex(vault_salt))
         FROM master_vault WHERE is_registered = 1",
    )
    .execute(&mut **tx)
    .await?;
    sqlx::query("DROP TABLE master_vault").execute(&mut **tx).await?;
    tracing::info!("folded legacy master_vault table into users");
    Ok(())
}

/// v3 — add columns that older layouts are missing, and normalise legacy
/// encodings (blob salts, `*_blob` ciphertext column names).
async fn backfill_columns(tx: &mut Transaction<'_, Sqlite>) -> Result<(), StoreError> {
    // Legacy version stamps guarantee nothing about which tables exist;
    // re-apply the (idempotent) base schema before inspecting columns.
    base_schema(tx).await?;

    let folder_cols = table_columns(tx, "folders").await?;
    for (col, ddl) in [
        ("user_id", "ALTER TABLE folders ADD COLUMN user_id INTEGER REFERENCES users (id) ON DELETE CASCADE"),
        ("parent_id", "ALTER TABLE folders ADD COLUMN parent_id INTEGER REFERENCES folders (id) ON DELETE CASCADE"),
        ("color", "ALTER TABLE folders ADD COLUMN color TEXT NOT NULL DEFAULT '#4B5563'"),
        ("icon", "ALTER TABLE folders ADD COLUMN icon TEXT NOT NULL DEFAULT 'folder.svg'"),
        ("updated_at", "ALTER TABLE folders ADD COLUMN updated_at TIMESTAMP"),
    ] {
        if !folder_cols.iter().any(|(name, _)| name == col) {
            sqlx::query(ddl).execute(&mut **tx).await?;
        }
    }

    let cred_cols = table_columns(tx, "credentials").await?;
    let has = |col: &str| cred_cols.iter().any(|(name, _)| name == col);
    if !has("is_favourite") {
        sqlx::query("ALTER TABLE credentials ADD COLUMN is_favourite BOOLEAN NOT NULL DEFAULT 0")
            .execute(&mut **tx)
            .await?;
    }
    if !has("is_deleted") {
        sqlx::query("ALTER TABLE credentials ADD COLUMN is_deleted BOOLEAN NOT NULL DEFAULT 0")
            .execute(&mut **tx)
            .await?;
    }
    if !has("user_id") {
        sqlx::query(
            "ALTER TABLE credentials ADD COLUMN user_id INTEGER REFERENCES users (id) ON DELETE CASCADE",
        )
        .execute(&mut **tx)
        .await?;
    }
    if has("password_blob") {
        sqlx::query("ALTER TABLE credentials RENAME COLUMN password_blob TO password_enc")
            .execute(&mut **tx)
            .await?;
    }
    if has("notes_blob") {
        sqlx::query("ALTER TABLE credentials RENAME COLUMN notes_blob TO notes_enc")
            .execute(&mut **tx)
            .await?;
    }

    // Legacy ciphertext was nullable BLOB (Fernet tokens are base64
    // ASCII, so a text cast is lossless). Tokens from the old format
    // surface as Malformed fields later — that is data, not loss.
    for col in ["password_enc", "notes_enc"] {
        sqlx::query(&format!("UPDATE credentials SET {col} = '' WHERE {col} IS NULL"))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&format!(
            "UPDATE credentials SET {col} = CAST({col} AS TEXT) WHERE typeof({col}) = 'blob'"
        ))
        .execute(&mut **tx)
        .await?;
    }

    // Legacy user rows stored the salt as raw bytes.
    sqlx::query(
        "UPDATE users SET vault_salt = lower(hex(vault_salt)) WHERE typeof(vault_salt) = 'blob'",
    )
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// v4 — legacy single-user settings were keyed on `key` alone. Rekey to
/// the composite (user_id, key) primary key: rename, recreate, copy, drop.
async fn rekey_settings(tx: &mut Transaction<'_, Sqlite>) -> Result<(), StoreError> {
    let cols = table_columns(tx, "settings").await?;
    let composite_pk = cols.iter().any(|(name, pk)| name == "user_id" && *pk > 0);
    if composite_pk {
        return Ok(());
    }

    let had_user_id = cols.iter().any(|(name, _)| name == "user_id");

    sqlx::query("ALTER TABLE settings RENAME TO settings_old").execute(&mut **tx).await?;
    sqlx::query(
        "CREATE TABLE settings (
            user_id INTEGER REFERENCES users (id) ON DELETE CASCADE,
            key TEXT,
            value TEXT,
            PRIMARY KEY (user_id, key)
        )",
    )
    .execute(&mut **tx)
    .await?;

    // Rows without a user land with user_id NULL and are adopted in v5.
    let copy = if had_user_id {
        "INSERT INTO settings (user_id, key, value) SELECT user_id, key, value FROM settings_old"
    } else {
        "INSERT INTO settings (key, value) SELECT key, value FROM settings_old"
    };
    sqlx::query(copy).execute(&mut **tx).await?;
    sqlx::query("DROP TABLE settings_old").execute(&mut **tx).await?;
    tracing::info!("rekeyed settings table to composite (user_id, key)");
    Ok(())
}

/// v5 — best-effort recovery: rows that lost their user (pre-multi-user
/// layouts) are assigned to the first existing user.
async fn adopt_orphan_rows(tx: &mut Transaction<'_, Sqlite>) -> Result<(), StoreError> {
    let first_user: Option<i64> = sqlx::query_scalar("SELECT id FROM users ORDER BY id LIMIT 1")
        .fetch_optional(&mut **tx)
        .await?;
    let Some(user_id) = first_user else {
        return Ok(());
    };

    for table in ["credentials", "folders", "settings"] {
        let adopted = sqlx::query(&format!("UPDATE {table} SET user_id = ? WHERE user_id IS NULL"))
            .bind(user_id)
            .execute(&mut **tx)
            .await?
            .rows_affected();
        if adopted > 0 {
            tracing::info!(table, adopted, user_id, "adopted orphaned rows");
        }
    }
    Ok(())
}

// ── Introspection helpers ─────────────────────────────────────────────────────

async fn table_exists(tx: &mut Transaction<'_, Sqlite>, name: &str) -> Result<bool, StoreError> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(found.is_some())
}

/// Column (name, pk-index) pairs for a table. pk-index is 0 for columns
/// not in the primary key.
async fn table_columns(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
) -> Result<Vec<(String, i64)>, StoreError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(&mut **tx)
        .await?;
    rows.iter()
        .map(|row| Ok((row.try_get::<String, _>("name")?, row.try_get::<i64, _>("pk")?)))
        .collect()
}
