//! Folder repository. Folders form a tree per user; the parent link is
//! self-referential and storage alone cannot prevent cycles, so every
//! parent assignment walks the ancestor chain before writing.

use sqlx::QueryBuilder;

use crate::{
    db::Store,
    error::{integrity, StoreError},
    models::FolderRow,
};

#[derive(Debug, Clone, Default)]
pub struct NewFolder {
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub parent_id: Option<i64>,
}

/// Partial update. `parent_id: Some(None)` moves the folder to the root.
#[derive(Debug, Clone, Default)]
pub struct FolderPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub parent_id: Option<Option<i64>>,
}

/// A folder with its children, for tree rendering. The virtual
/// "No Folder" root is not part of this — it is never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FolderNode {
    #[serde(flatten)]
    pub folder: FolderRow,
    pub children: Vec<FolderNode>,
}

const FOLDER_COLUMNS: &str = "f.id, f.name, f.color, f.icon, f.parent_id, f.user_id, \
     (SELECT COUNT(*) FROM credentials c WHERE c.folder_id = f.id AND c.is_deleted = 0) \
        AS item_count, \
     f.created_at, f.updated_at";

impl Store {
    pub async fn add_folder(&self, user_id: i64, new: NewFolder) -> Result<i64, StoreError> {
        if let Some(parent_id) = new.parent_id {
            self.assert_valid_parent(user_id, None, parent_id).await?;
        }
        let id = sqlx::query(
            "INSERT INTO folders (name, color, icon, parent_id, user_id) \
             VALUES (?, coalesce(?, '#4B5563'), coalesce(?, 'folder.svg'), ?, ?)",
        )
        .bind(&new.name)
        .bind(&new.color)
        .bind(&new.icon)
        .bind(new.parent_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(integrity("folder references a missing parent or user"))?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn update_folder(&self, folder_id: i64, patch: FolderPatch) -> Result<(), StoreError> {
        let owner: Option<i64> = sqlx::query_scalar("SELECT user_id FROM folders WHERE id = ?")
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(user_id) = owner else {
            return Err(StoreError::NotFound(format!("folder {folder_id}")));
        };
        if let Some(Some(parent_id)) = patch.parent_id {
            self.assert_valid_parent(user_id, Some(folder_id), parent_id).await?;
        }

        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE folders SET ");
        let mut changed = false;
        {
            let mut sep = qb.separated(", ");
            if let Some(v) = &patch.name {
                sep.push("name = ").push_bind_unseparated(v.clone());
                changed = true;
            }
            if let Some(v) = &patch.color {
                sep.push("color = ").push_bind_unseparated(v.clone());
                changed = true;
            }
            if let Some(v) = &patch.icon {
                sep.push("icon = ").push_bind_unseparated(v.clone());
                changed = true;
            }
            if let Some(v) = patch.parent_id {
                sep.push("parent_id = ").push_bind_unseparated(v);
                changed = true;
            }
            if changed {
                sep.push("updated_at = datetime('now')");
            }
        }
        if !changed {
            return Ok(());
        }
        qb.push(" WHERE id = ").push_bind(folder_id);
        qb.build()
            .execute(&self.pool)
            .await
            .map_err(integrity("folder update violates a constraint"))?;
        Ok(())
    }

    /// Delete a folder. Directly-owned credentials are detached (folder
    /// reference cleared), NOT deleted; child folders cascade, and their
    /// credentials detach through the `ON DELETE SET NULL` action. Both
    /// steps commit as one transaction.
    pub async fn delete_folder(&self, folder_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE credentials SET folder_id = NULL WHERE folder_id = ?")
            .bind(folder_id)
            .execute(&mut *tx)
            .await?;
        let affected = sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(folder_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(format!("folder {folder_id}")));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_folders(&self, user_id: i64) -> Result<Vec<FolderRow>, StoreError> {
        let folders = sqlx::query_as(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders f WHERE f.user_id = ? ORDER BY f.name"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(folders)
    }

    pub async fn get_folder(&self, folder_id: i64) -> Result<FolderRow, StoreError> {
        sqlx::query_as(&format!("SELECT {FOLDER_COLUMNS} FROM folders f WHERE f.id = ?"))
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("folder {folder_id}")))
    }

    /// Folder must exist and belong to `user_id`.
    pub(crate) async fn assert_folder_owner(
        &self,
        folder_id: i64,
        user_id: i64,
    ) -> Result<(), StoreError> {
        let owner: Option<i64> = sqlx::query_scalar("SELECT user_id FROM folders WHERE id = ?")
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await?;
        match owner {
            None => Err(StoreError::NotFound(format!("folder {folder_id}"))),
            Some(o) if o != user_id => Err(StoreError::IntegrityViolation(
                "folder belongs to a different user".into(),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Validate a prospective parent for `moving` (None when creating a
    /// new folder): same user, and not a descendant of `moving` — walks
    /// the ancestor chain up to the root before anything is written.
    async fn assert_valid_parent(
        &self,
        user_id: i64,
        moving: Option<i64>,
        parent_id: i64,
    ) -> Result<(), StoreError> {
        if moving == Some(parent_id) {
            return Err(StoreError::IntegrityViolation(
                "folder cannot be its own parent".into(),
            ));
        }

        let mut cursor = Some(parent_id);
        let mut hops = 0u32;
        while let Some(current) = cursor {
            if moving == Some(current) {
                return Err(StoreError::IntegrityViolation(
                    "folder move would create a cycle".into(),
                ));
            }
            let row: Option<(i64, Option<i64>)> =
                sqlx::query_as("SELECT user_id, parent_id FROM folders WHERE id = ?")
                    .bind(current)
                    .fetch_optional(&self.pool)
                    .await?;
            let Some((owner, next)) = row else {
                return Err(StoreError::NotFound(format!("folder {current}")));
            };
            if owner != user_id {
                return Err(StoreError::IntegrityViolation(
                    "folder belongs to a different user".into(),
                ));
            }
            cursor = next;
            hops += 1;
            if hops > 1_000 {
                // A pre-existing cycle in stored data; refuse to extend it.
                return Err(StoreError::IntegrityViolation(
                    "folder ancestry does not terminate".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Assemble a folder tree from a flat listing. A row whose parent is
/// missing from the slice (or is itself) lands at the root rather than
/// disappearing.
pub fn folder_tree(folders: &[FolderRow]) -> Vec<FolderNode> {
    use std::collections::HashMap;

    let ids: HashMap<i64, usize> =
        folders.iter().enumerate().map(|(i, f)| (f.id, i)).collect();
    let mut children: HashMap<i64, Vec<&FolderRow>> = HashMap::new();
    let mut roots: Vec<&FolderRow> = Vec::new();

    for folder in folders {
        match folder.parent_id {
            Some(parent) if parent != folder.id && ids.contains_key(&parent) => {
                children.entry(parent).or_default().push(folder);
            }
            _ => roots.push(folder),
        }
    }

    fn build(folder: &FolderRow, children: &std::collections::HashMap<i64, Vec<&FolderRow>>) -> FolderNode {
        FolderNode {
            folder: folder.clone(),
            children: children
                .get(&folder.id)
                .map(|kids| kids.iter().map(|k| build(k, children)).collect())
                .unwrap_or_default(),
        }
    }

    roots.into_iter().map(|f| build(f, &children)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(id: i64, parent_id: Option<i64>) -> FolderRow {
        FolderRow {
            id,
            name: format!("folder-{id}"),
            color: "#4B5563".into(),
            icon: "folder.svg".into(),
            parent_id,
            user_id: 1,
            item_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn tree_nests_children_under_parents() {
        let flat = vec![row(1, None), row(2, Some(1)), row(3, Some(2)), row(4, None)];
        let tree = folder_tree(&flat);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].folder.id, 1);
        assert_eq!(tree[0].children[0].folder.id, 2);
        assert_eq!(tree[0].children[0].children[0].folder.id, 3);
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn orphan_and_self_parents_fall_back_to_root() {
        let flat = vec![row(1, Some(99)), row(2, Some(2))];
        let tree = folder_tree(&flat);
        assert_eq!(tree.len(), 2);
    }

    use crate::credentials::NewCredential;
    use crate::session::VaultSession;

    const MASTER: &str = "correct horse battery staple";

    async fn unlocked_store(dir: &tempfile::TempDir) -> (Store, i64) {
        let store = Store::open(&dir.path().join("vault.db"), VaultSession::new())
            .await
            .unwrap();
        let user_id = store
            .register_user("Ada Lovelace", "ada@example.com", MASTER)
            .await
            .unwrap();
        store.unlock(user_id, MASTER).await.unwrap();
        (store, user_id)
    }

    async fn named_folder(store: &Store, user_id: i64, name: &str, parent: Option<i64>) -> i64 {
        store
            .add_folder(
                user_id,
                NewFolder { name: name.into(), parent_id: parent, ..Default::default() },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn delete_detaches_credentials_and_cascades_children() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = unlocked_store(&dir).await;
        let parent = named_folder(&store, user_id, "Work", None).await;
        let child = named_folder(&store, user_id, "Side", Some(parent)).await;

        let in_parent = store
            .add_credential(
                user_id,
                NewCredential {
                    service_name: "Gmail".into(),
                    folder_id: Some(parent),
                    password: "pw".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let in_child = store
            .add_credential(
                user_id,
                NewCredential {
                    service_name: "GitHub".into(),
                    folder_id: Some(child),
                    password: "pw".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store.delete_folder(parent).await.unwrap();

        // Both folders gone, both credentials survive unfiled.
        assert!(matches!(store.get_folder(parent).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_folder(child).await, Err(StoreError::NotFound(_))));
        for id in [in_parent, in_child] {
            let record = store.get_credential(id).await.unwrap();
            assert_eq!(record.folder_id, None);
            assert_eq!(record.folder, crate::models::NO_FOLDER);
        }
    }

    #[tokio::test]
    async fn moves_that_would_cycle_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = unlocked_store(&dir).await;
        let a = named_folder(&store, user_id, "a", None).await;
        let b = named_folder(&store, user_id, "b", Some(a)).await;
        let c = named_folder(&store, user_id, "c", Some(b)).await;

        let into_descendant = FolderPatch { parent_id: Some(Some(c)), ..Default::default() };
        assert!(matches!(
            store.update_folder(a, into_descendant).await,
            Err(StoreError::IntegrityViolation(_))
        ));
        let into_self = FolderPatch { parent_id: Some(Some(b)), ..Default::default() };
        assert!(matches!(
            store.update_folder(b, into_self).await,
            Err(StoreError::IntegrityViolation(_))
        ));

        // A legal reparent still works: c directly under a.
        store
            .update_folder(c, FolderPatch { parent_id: Some(Some(a)), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(store.get_folder(c).await.unwrap().parent_id, Some(a));
    }

    #[tokio::test]
    async fn item_counts_track_live_credentials_only() {
        let dir = tempfile::tempdir().unwrap();
        let (store, user_id) = unlocked_store(&dir).await;
        let folder = named_folder(&store, user_id, "Work", None).await;
        store
            .add_credential(
                user_id,
                NewCredential {
                    service_name: "Gmail".into(),
                    folder_id: Some(folder),
                    password: "pw".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let binned = store
            .add_credential(
                user_id,
                NewCredential {
                    service_name: "Old".into(),
                    folder_id: Some(folder),
                    password: "pw".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.soft_delete_credential(binned).await.unwrap();

        let listed = store.list_folders(user_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].item_count, 1);
    }
}
