// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pseudo Files
//!
//! Synthetic folders that exist only in the virtual view of a share: one per
//! store at the share root, and one per version (plus `Head`) inside each
//! store folder. They are cached as children of a [`FileState`] and never
//! touch the content store.
//!
//! [`FileState`]: crate::domain::file_state::FileState
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Synthetic store and version folders of virtual views

use crate::domain::file_info::{allocation_size, is_hidden_name, FileAttributes, FileInfo};
use crate::domain::store_path::{path_hash, Version};
use chrono::{DateTime, Utc};

/// What a pseudo folder stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoFileKind {
    Store { store: String },
    Version { store: String, version: Version },
    Dummy,
}

/// Synthetic read-only folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoFile {
    name: String,
    kind: PseudoFileKind,
    attributes: FileAttributes,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl PseudoFile {
    fn new(name: String, kind: PseudoFileKind, created: Option<DateTime<Utc>>) -> Self {
        let created = created.unwrap_or_else(Utc::now);
        let mut attributes = FileAttributes::DIRECTORY | FileAttributes::READ_ONLY;
        if is_hidden_name(&name) {
            attributes |= FileAttributes::HIDDEN;
        }

        Self {
            name,
            kind,
            attributes,
            created,
            modified: created,
        }
    }

    /// Folder for a store, created at the store's creation time when known
    pub fn store(store: impl Into<String>, created: Option<DateTime<Utc>>) -> Self {
        let store = store.into();
        Self::new(
            store.clone(),
            PseudoFileKind::Store { store },
            created,
        )
    }

    /// Folder for a store version, named by its id or `Head`
    pub fn version(
        store: impl Into<String>,
        version: Version,
        created: Option<DateTime<Utc>>,
    ) -> Self {
        Self::new(
            version.folder_name(),
            PseudoFileKind::Version {
                store: store.into(),
                version,
            },
            created,
        )
    }

    /// Generic placeholder folder
    pub fn dummy(name: impl Into<String>) -> Self {
        Self::new(name.into(), PseudoFileKind::Dummy, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &PseudoFileKind {
        &self.kind
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn is_directory(&self) -> bool {
        true
    }

    /// Static information: empty read-only folder
    pub fn file_info(&self, path: &str) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: 0,
            allocation_size: allocation_size(0),
            attributes: self.attributes,
            file_id: path_hash(path),
            created: self.created,
            modified: self.modified,
            accessed: self.modified,
        }
    }

    /// Open the folder. Yields a placeholder handle with no content.
    pub fn open_placeholder(&self, path: &str) -> PseudoFolderHandle {
        PseudoFolderHandle {
            name: self.name.clone(),
            path: path.to_string(),
            info: self.file_info(path),
            closed: false,
        }
    }
}

/// Open handle on a pseudo folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoFolderHandle {
    name: String,
    path: String,
    info: FileInfo,
    closed: bool,
}

impl PseudoFolderHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn file_info(&self) -> &FileInfo {
        &self.info
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Ordered list of pseudo folders under one parent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PseudoFileList {
    files: Vec<PseudoFile>,
}

impl PseudoFileList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pseudo file, replacing any entry with the same name.
    /// Returns false when an entry of that name already existed.
    pub fn add(&mut self, file: PseudoFile) -> bool {
        match self
            .files
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(&file.name))
        {
            Some(idx) => {
                self.files[idx] = file;
                false
            }
            None => {
                self.files.push(file);
                true
            }
        }
    }

    pub fn find(&self, name: &str, case_sensitive: bool) -> Option<&PseudoFile> {
        self.files.iter().find(|f| {
            if case_sensitive {
                f.name == name
            } else {
                f.name.eq_ignore_ascii_case(name)
            }
        })
    }

    pub fn remove(&mut self, name: &str, case_sensitive: bool) -> Option<PseudoFile> {
        let idx = self.files.iter().position(|f| {
            if case_sensitive {
                f.name == name
            } else {
                f.name.eq_ignore_ascii_case(name)
            }
        })?;
        Some(self.files.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PseudoFile> {
        self.files.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }

    pub fn to_vec(&self) -> Vec<PseudoFile> {
        self.files.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pseudo_file_info() {
        let created = Utc::now() - chrono::Duration::days(3);
        let pseudo = PseudoFile::store("main", Some(created));
        let info = pseudo.file_info("\\main");

        assert_eq!(info.name, "main");
        assert_eq!(info.size, 0);
        assert_eq!(info.created, created);
        assert!(info.is_directory());
        assert!(info.is_read_only());
        assert!(!info.is_hidden());
    }

    #[test]
    fn test_version_folder_names() {
        assert_eq!(PseudoFile::version("main", Version::Head, None).name(), "Head");
        assert_eq!(PseudoFile::version("main", Version::Id(4), None).name(), "4");
        assert!(PseudoFile::dummy(".meta").attributes().contains(FileAttributes::HIDDEN));
    }

    #[test]
    fn test_open_placeholder() {
        let pseudo = PseudoFile::version("main", Version::Id(1), None);
        let mut handle = pseudo.open_placeholder("\\main\\1");
        assert_eq!(handle.path(), "\\main\\1");
        assert!(handle.file_info().is_directory());
        handle.close();
        assert!(handle.is_closed());
    }

    #[test]
    fn test_list_add_find_remove() {
        let mut list = PseudoFileList::new();
        assert!(list.add(PseudoFile::store("alpha", None)));
        assert!(list.add(PseudoFile::store("beta", None)));
        assert!(!list.add(PseudoFile::store("ALPHA", None)));
        assert_eq!(list.len(), 2);

        assert!(list.find("Beta", false).is_some());
        assert!(list.find("Beta", true).is_none());

        assert!(list.remove("alpha", false).is_some());
        assert!(list.remove("alpha", false).is_none());
        assert_eq!(list.names(), vec!["beta".to_string()]);
    }
}
