// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! NFS File Id Table
//!
//! Maps NFSv3 `fileid3` values to share paths of the exported share. Ids
//! are handed out on first sight of a path and stay stable for the life of
//! the server; the share root is always id 1.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Stable NFS file ids for share paths across lookups and renames

use crate::domain::constants::{SHARE_SEPARATOR, SHARE_SEPARATOR_STR};
use crate::domain::events::{ChangeNotifier, NotifyAction};
use crate::domain::store_path::normalize_share_path;
use nfsserve::nfs::fileid3;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub const ROOT_FILE_ID: fileid3 = 1;

pub struct FileHandleTable {
    next_fileid: AtomicU64,
    forward: RwLock<HashMap<fileid3, String>>,
    /// Upper-cased share path -> id
    reverse: RwLock<HashMap<String, fileid3>>,
}

impl FileHandleTable {
    pub fn new() -> Self {
        let table = Self {
            next_fileid: AtomicU64::new(ROOT_FILE_ID + 1),
            forward: RwLock::new(HashMap::new()),
            reverse: RwLock::new(HashMap::new()),
        };
        table
            .forward
            .write()
            .insert(ROOT_FILE_ID, SHARE_SEPARATOR_STR.to_string());
        table
            .reverse
            .write()
            .insert(SHARE_SEPARATOR_STR.to_string(), ROOT_FILE_ID);
        table
    }

    fn key(path: &str) -> String {
        normalize_share_path(path).to_uppercase()
    }

    /// Id for `path`, allocating one on first use
    pub fn register(&self, path: &str) -> fileid3 {
        let path = normalize_share_path(path);
        let key = path.to_uppercase();
        if let Some(&id) = self.reverse.read().get(&key) {
            return id;
        }

        let mut reverse = self.reverse.write();
        if let Some(&id) = reverse.get(&key) {
            return id;
        }
        let id = self.next_fileid.fetch_add(1, Ordering::SeqCst);
        reverse.insert(key, id);
        self.forward.write().insert(id, path.clone());

        debug!("Registered file id {} for {}", id, path);
        id
    }

    pub fn path(&self, id: fileid3) -> Option<String> {
        self.forward.read().get(&id).cloned()
    }

    pub fn file_id(&self, path: &str) -> Option<fileid3> {
        self.reverse.read().get(&Self::key(path)).copied()
    }

    /// Drop `path` and everything beneath it
    pub fn forget(&self, path: &str) {
        let key = Self::key(path);
        let prefix = format!("{}{}", key, SHARE_SEPARATOR);
        let mut reverse = self.reverse.write();
        let mut forward = self.forward.write();
        reverse.retain(|existing, id| {
            let keep = *id == ROOT_FILE_ID || (*existing != key && !existing.starts_with(&prefix));
            if !keep {
                forward.remove(id);
            }
            keep
        });
    }

    /// Re-point `old_path` and its descendants at `new_path`, keeping ids
    pub fn rename(&self, old_path: &str, new_path: &str) {
        let old_key = Self::key(old_path);
        let old_len = normalize_share_path(old_path).len();
        let new_path = normalize_share_path(new_path);
        let prefix = format!("{}{}", old_key, SHARE_SEPARATOR);

        // A stale entry at the destination would alias a different id
        self.forget(&new_path);

        let mut reverse = self.reverse.write();
        let mut forward = self.forward.write();
        let moved: Vec<(String, fileid3)> = reverse
            .iter()
            .filter(|(key, _)| **key == old_key || key.starts_with(&prefix))
            .map(|(key, id)| (key.clone(), *id))
            .collect();

        for (key, id) in moved {
            reverse.remove(&key);
            let Some(path) = forward.get(&id).cloned() else {
                continue;
            };
            let renamed = format!("{}{}", new_path, &path[old_len.min(path.len())..]);
            reverse.insert(renamed.to_uppercase(), id);
            forward.insert(id, renamed);
        }
    }

    pub fn len(&self) -> usize {
        self.forward.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Folders dropped from a virtual view lose their ids, so a stale handle
/// resolves to nothing rather than to a later folder of the same name.
impl ChangeNotifier for FileHandleTable {
    fn notify_directory_changed(&self, action: NotifyAction, path: &str) {
        match action {
            NotifyAction::Added => debug!("Folder added to export: {}", path),
            NotifyAction::Removed => {
                debug!("Folder removed from export: {}", path);
                self.forget(path);
            }
        }
    }
}

impl Default for FileHandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_stable_ids() {
        let table = FileHandleTable::new();
        assert_eq!(table.path(ROOT_FILE_ID).as_deref(), Some("\\"));
        assert_eq!(table.file_id("/"), Some(ROOT_FILE_ID));

        let docs = table.register("\\docs");
        assert_eq!(docs, 2);
        assert_eq!(table.register("/DOCS/"), docs);
        assert_eq!(table.path(docs).as_deref(), Some("\\docs"));
    }

    #[test]
    fn test_rename_moves_descendants() {
        let table = FileHandleTable::new();
        let docs = table.register("\\docs");
        let readme = table.register("\\docs\\readme.txt");
        let other = table.register("\\docs2");

        table.rename("\\docs", "\\archive");

        assert_eq!(table.path(docs).as_deref(), Some("\\archive"));
        assert_eq!(table.path(readme).as_deref(), Some("\\archive\\readme.txt"));
        assert_eq!(table.path(other).as_deref(), Some("\\docs2"));
        assert_eq!(table.file_id("\\docs\\readme.txt"), None);
    }

    #[test]
    fn test_forget_subtree() {
        let table = FileHandleTable::new();
        table.register("\\docs");
        table.register("\\docs\\a.txt");
        table.register("\\notes.txt");

        table.forget("\\docs");
        assert_eq!(table.len(), 2);
        assert!(table.file_id("\\notes.txt").is_some());

        table.forget("\\");
        assert_eq!(table.path(ROOT_FILE_ID).as_deref(), Some("\\"));
    }

    #[test]
    fn test_removed_folders_lose_their_ids() {
        let table = FileHandleTable::new();
        let web = table.register("\\web");
        table.register("\\web\\Head");
        let main = table.register("\\main");

        table.notify_directory_changed(NotifyAction::Added, "\\staging");
        assert_eq!(table.len(), 4);

        table.notify_directory_changed(NotifyAction::Removed, "\\WEB");
        assert_eq!(table.path(web), None);
        assert_eq!(table.file_id("\\web\\Head"), None);
        assert_eq!(table.path(main).as_deref(), Some("\\main"));
    }
}
