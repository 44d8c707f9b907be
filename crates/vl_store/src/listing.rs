//! Listing projection: filter, search and sort an already-decrypted
//! credential set. Pure functions over in-memory slices; no database
//! access happens here, so a UI can re-project on every keystroke.

use std::collections::HashMap;

use crate::models::{CredentialRecord, FolderRow, NO_FOLDER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Favourites,
    Deleted,
    /// Folder display name, including the virtual [`NO_FOLDER`] bucket.
    Folder(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Apply a view filter, a search query and a sort order. Deleted rows
/// appear only under [`Filter::Deleted`]; every other view excludes
/// them. The query matches case-insensitively against service name and
/// username.
pub fn project(
    records: &[CredentialRecord],
    filter: &Filter,
    query: &str,
    sort: SortOrder,
) -> Vec<CredentialRecord> {
    let needle = query.trim().to_lowercase();

    let mut out: Vec<CredentialRecord> = records
        .iter()
        .filter(|r| match filter {
            Filter::Deleted => r.deleted,
            Filter::All => !r.deleted,
            Filter::Favourites => !r.deleted && r.favourite,
            Filter::Folder(name) => !r.deleted && r.folder == *name,
        })
        .filter(|r| {
            needle.is_empty()
                || r.service_name.to_lowercase().contains(&needle)
                || r.username
                    .as_deref()
                    .is_some_and(|u| u.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect();

    out.sort_by(|a, b| {
        let ord = a.service_name.to_lowercase().cmp(&b.service_name.to_lowercase());
        match sort {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });
    out
}

/// Per-view item counts for sidebar badges: "All", "Favourites",
/// "Deleted", plus one entry per folder (and the [`NO_FOLDER`] bucket).
/// Folders with zero items still get an entry.
pub fn view_counts(
    records: &[CredentialRecord],
    folders: &[FolderRow],
) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    counts.insert("All".into(), 0);
    counts.insert("Favourites".into(), 0);
    counts.insert("Deleted".into(), 0);
    counts.insert(NO_FOLDER.into(), 0);
    for folder in folders {
        counts.entry(folder.name.clone()).or_insert(0);
    }

    for record in records {
        if record.deleted {
            *counts.get_mut("Deleted").expect("seeded") += 1;
            continue;
        }
        *counts.get_mut("All").expect("seeded") += 1;
        if record.favourite {
            *counts.get_mut("Favourites").expect("seeded") += 1;
        }
        *counts.entry(record.folder.clone()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SecretField;
    use chrono::Utc;

    fn record(id: i64, service: &str, folder: &str) -> CredentialRecord {
        CredentialRecord {
            id,
            service_name: service.into(),
            username: Some(format!("user{id}@example.com")),
            email: None,
            website: None,
            folder_id: None,
            folder: folder.into(),
            favourite: false,
            deleted: false,
            password: SecretField::Plain("pw".into()),
            notes: SecretField::Empty,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fixture() -> Vec<CredentialRecord> {
        let mut gmail = record(1, "Gmail", "Work");
        gmail.favourite = true;
        let github = record(2, "GitHub", "Work");
        let mut old_bank = record(3, "Old Bank", NO_FOLDER);
        old_bank.deleted = true;
        let netflix = record(4, "netflix", NO_FOLDER);
        vec![gmail, github, old_bank, netflix]
    }

    #[test]
    fn all_view_excludes_deleted_and_sorts_case_insensitively() {
        let out = project(&fixture(), &Filter::All, "", SortOrder::Ascending);
        let names: Vec<&str> = out.iter().map(|r| r.service_name.as_str()).collect();
        assert_eq!(names, ["GitHub", "Gmail", "netflix"]);
    }

    #[test]
    fn deleted_view_shows_only_deleted() {
        let out = project(&fixture(), &Filter::Deleted, "", SortOrder::Ascending);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].service_name, "Old Bank");
    }

    #[test]
    fn favourites_view_requires_flag() {
        let out = project(&fixture(), &Filter::Favourites, "", SortOrder::Ascending);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].service_name, "Gmail");
    }

    #[test]
    fn folder_view_matches_display_name() {
        let out = project(
            &fixture(),
            &Filter::Folder("Work".into()),
            "",
            SortOrder::Descending,
        );
        let names: Vec<&str> = out.iter().map(|r| r.service_name.as_str()).collect();
        assert_eq!(names, ["Gmail", "GitHub"]);
    }

    #[test]
    fn query_matches_service_and_username() {
        let out = project(&fixture(), &Filter::All, "GIT", SortOrder::Ascending);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].service_name, "GitHub");

        let out = project(&fixture(), &Filter::All, "user4", SortOrder::Ascending);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].service_name, "netflix");
    }

    #[test]
    fn counts_cover_every_view_and_empty_folders() {
        let folders = vec![
            folder_row(10, "Work"),
            folder_row(11, "Empty"),
        ];
        let counts = view_counts(&fixture(), &folders);
        assert_eq!(counts["All"], 3);
        assert_eq!(counts["Favourites"], 1);
        assert_eq!(counts["Deleted"], 1);
        assert_eq!(counts["Work"], 2);
        assert_eq!(counts[NO_FOLDER], 1);
        assert_eq!(counts["Empty"], 0);
    }

    fn folder_row(id: i64, name: &str) -> FolderRow {
        FolderRow {
            id,
            name: name.into(),
            color: "#4B5563".into(),
            icon: "folder.svg".into(),
            parent_id: None,
            user_id: 1,
            item_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
