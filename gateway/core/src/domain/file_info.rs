// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! File Information Types
//!
//! Attribute flags, file information records and open parameters exchanged
//! between the protocol layer and the disk driver.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** File metadata, attributes and open parameters exchanged with clients

use crate::domain::constants::{ALLOCATION_UNIT, HIDDEN_MARKER_FILES};
use crate::domain::store::NodeDescriptor;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

bitflags! {
    /// File attribute flags, using the SMB attribute bit values
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
        const NORMAL = 0x0080;
    }
}

/// Result of a file existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    NotExist,
    FileExists,
    DirectoryExists,
}

/// Access requested on open, or granted to an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn allows_write(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

/// Information about a file or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub allocation_size: u64,
    #[serde(skip)]
    pub attributes: FileAttributes,
    pub file_id: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
}

impl FileInfo {
    /// Build the information for a real store node.
    ///
    /// `read_only` marks nodes seen through a historical version.
    pub fn for_node(
        node: &NodeDescriptor,
        name: &str,
        file_id: u64,
        read_only: bool,
    ) -> Self {
        let mut attributes = FileAttributes::empty();
        if node.is_directory() {
            attributes |= FileAttributes::DIRECTORY;
        }
        if read_only {
            attributes |= FileAttributes::READ_ONLY;
        }
        if is_hidden_name(name) {
            attributes |= FileAttributes::HIDDEN;
        }
        if attributes.is_empty() {
            attributes = FileAttributes::NORMAL;
        }

        let size = if node.is_directory() { 0 } else { node.length };

        Self {
            name: name.to_string(),
            size,
            allocation_size: allocation_size(size),
            attributes,
            file_id,
            created: node.created,
            modified: node.modified,
            accessed: node.accessed,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes.contains(FileAttributes::HIDDEN)
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(FileAttributes::READ_ONLY)
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
        self.allocation_size = allocation_size(size);
    }
}

/// Dot files and OS marker files are reported as hidden
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
        || HIDDEN_MARKER_FILES
            .iter()
            .any(|marker| marker.eq_ignore_ascii_case(name))
}

/// Allocation size reported for a file of `len` bytes
pub fn allocation_size(len: u64) -> u64 {
    (len + ALLOCATION_UNIT) & !(ALLOCATION_UNIT - 1)
}

/// Parameters of a create or open request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOpenParams {
    pub path: String,
    pub access: AccessMode,
    pub directory: bool,
    pub delete_on_close: bool,
}

impl FileOpenParams {
    pub fn new(path: impl Into<String>, access: AccessMode) -> Self {
        Self {
            path: path.into(),
            access,
            directory: false,
            delete_on_close: false,
        }
    }

    pub fn read_only(path: impl Into<String>) -> Self {
        Self::new(path, AccessMode::ReadOnly)
    }

    pub fn read_write(path: impl Into<String>) -> Self {
        Self::new(path, AccessMode::ReadWrite)
    }

    /// Open a folder for listing
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            directory: true,
            ..Self::new(path, AccessMode::ReadOnly)
        }
    }

    pub fn is_read_only_access(&self) -> bool {
        self.access == AccessMode::ReadOnly
    }
}

/// Changes requested through set-file-information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetFileInfo {
    pub delete_on_close: Option<bool>,
    pub modified: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::NodeKind;

    fn node(kind: NodeKind, length: u64) -> NodeDescriptor {
        let now = Utc::now();
        NodeDescriptor {
            path: "main:/x".to_string(),
            name: "x".to_string(),
            kind,
            length,
            created: now,
            modified: now,
            accessed: now,
        }
    }

    #[test]
    fn test_hidden_names() {
        assert!(is_hidden_name(".git"));
        assert!(is_hidden_name("desktop.ini"));
        assert!(is_hidden_name("THUMBS.DB"));
        assert!(!is_hidden_name("readme.txt"));
    }

    #[test]
    fn test_allocation_size_rounds_up() {
        assert_eq!(allocation_size(0), 512);
        assert_eq!(allocation_size(5), 512);
        assert_eq!(allocation_size(511), 512);
        assert_eq!(allocation_size(512), 1024);
        assert_eq!(allocation_size(1000), 1024);
    }

    #[test]
    fn test_file_info_attributes() {
        let file = FileInfo::for_node(&node(NodeKind::File, 10), "a.txt", 1, false);
        assert_eq!(file.attributes, FileAttributes::NORMAL);
        assert_eq!(file.size, 10);

        let dir = FileInfo::for_node(&node(NodeKind::Directory, 0), ".cfg", 2, true);
        assert!(dir.is_directory());
        assert!(dir.is_hidden());
        assert!(dir.is_read_only());
        assert!(!dir.attributes.contains(FileAttributes::NORMAL));
    }
}
