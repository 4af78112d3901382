// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Store Path Translation
//!
//! Converts share-relative paths into store-addressed paths of the form
//! `<store>:/<relative/path>` at a given version.
//!
//! Two parsing modes exist:
//!
//! - **Virtual view**: the first segment is the store name, the second the
//!   version folder (`Head` or a decimal id), the rest is the path inside the
//!   store. Paths with fewer than three segments address pseudo folders.
//! - **Single store**: the share is bound to one store (optionally to a base
//!   folder inside it) and a version; the whole share path is the relative
//!   path.
//!
//! Malformed paths never fail loudly. They produce a [`StorePath`] whose
//! [`StorePath::is_valid`] is false, which callers report as "not found".
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Translate share-relative paths into store paths and versions

use crate::domain::constants::{
    HEAD_FOLDER_NAME, HEAD_VERSION_ID, SHARE_SEPARATOR, SHARE_SEPARATOR_STR, STORE_NAME_SEPARATOR,
    STORE_SEPARATOR, STORE_SEPARATOR_STR,
};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::warn;

/// Store version addressed by a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Version {
    /// Current, mutable state of the store
    #[default]
    Head,
    /// Immutable snapshot
    Id(u32),
}

impl Version {
    /// Convert a numeric id, where -1 is HEAD. Other negative ids are rejected.
    pub fn from_id(id: i32) -> Option<Self> {
        if id == HEAD_VERSION_ID {
            return Some(Version::Head);
        }
        u32::try_from(id).ok().map(Version::Id)
    }

    /// Numeric id, with HEAD reported as -1
    pub fn id(self) -> i32 {
        match self {
            Version::Head => HEAD_VERSION_ID,
            Version::Id(id) => id as i32,
        }
    }

    pub fn is_head(self) -> bool {
        matches!(self, Version::Head)
    }

    /// Parse a version folder name: `Head` in any case, or a decimal id.
    pub fn parse_segment(segment: &str) -> Option<Self> {
        if segment.eq_ignore_ascii_case(HEAD_FOLDER_NAME) {
            return Some(Version::Head);
        }
        segment.parse::<i32>().ok().and_then(Version::from_id)
    }

    /// Folder name used for this version in the virtual view
    pub fn folder_name(self) -> String {
        match self {
            Version::Head => HEAD_FOLDER_NAME.to_string(),
            Version::Id(id) => id.to_string(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.folder_name())
    }
}

/// Depth of a parsed path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathLevel {
    /// Path could not be translated
    Invalid,
    /// Root of a virtual view share
    Root,
    /// Store folder of a virtual view (`\store`)
    Store,
    /// Version folder of a virtual view (`\store\Head`)
    Version,
    /// Real node inside a store
    Node,
}

/// Share path translated into store addressing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    store_name: Option<String>,
    version: Version,
    has_version: bool,
    relative_path: Option<String>,
    canonical_path: Option<String>,
    level: PathLevel,
}

impl StorePath {
    /// Parse a path of a virtual view share: `\store\version\rest...`
    pub fn parse_virtual(share_path: &str) -> Self {
        let Some(segments) = split_segments(share_path) else {
            return Self::invalid();
        };

        let Some(store) = segments.first() else {
            return Self::root();
        };

        if segments.len() == 1 {
            return Self {
                store_name: Some(store.to_string()),
                version: Version::Head,
                has_version: false,
                relative_path: None,
                canonical_path: None,
                level: PathLevel::Store,
            };
        }

        let Some(version) = Version::parse_segment(segments[1]) else {
            return Self::invalid();
        };

        let rest = &segments[2..];
        let level = if rest.is_empty() {
            PathLevel::Version
        } else {
            PathLevel::Node
        };

        Self {
            store_name: Some(store.to_string()),
            version,
            has_version: true,
            relative_path: Some(share_relative(rest)),
            canonical_path: Some(format!(
                "{}{}{}",
                store,
                STORE_NAME_SEPARATOR,
                store_relative(rest)
            )),
            level,
        }
    }

    /// Translate a path of a share bound to `store` (or `store:/base`) at `version`
    pub fn for_store(store: &str, version: Version, share_path: &str) -> Self {
        let Some(segments) = split_segments(share_path) else {
            return Self::invalid();
        };

        let (store_name, base) = match store.split_once(STORE_NAME_SEPARATOR) {
            Some((name, base)) => (name, Some(base.trim_end_matches(STORE_SEPARATOR))),
            None => (store, None),
        };

        if store_name.is_empty() {
            return Self::invalid();
        }

        let canonical = format!(
            "{}{}{}{}",
            store_name,
            STORE_NAME_SEPARATOR,
            base.unwrap_or(""),
            store_relative(&segments)
        );

        Self {
            store_name: Some(store_name.to_string()),
            version,
            has_version: true,
            relative_path: Some(share_relative(&segments)),
            canonical_path: Some(canonical),
            level: PathLevel::Node,
        }
    }

    fn root() -> Self {
        Self {
            store_name: None,
            version: Version::Head,
            has_version: false,
            relative_path: None,
            canonical_path: None,
            level: PathLevel::Root,
        }
    }

    fn invalid() -> Self {
        Self {
            store_name: None,
            version: Version::Head,
            has_version: false,
            relative_path: None,
            canonical_path: None,
            level: PathLevel::Invalid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.level != PathLevel::Invalid
    }

    pub fn level(&self) -> PathLevel {
        self.level
    }

    pub fn is_root_path(&self) -> bool {
        self.level == PathLevel::Root
    }

    /// True when the path addresses a synthetic store or version folder
    pub fn is_pseudo_path(&self) -> bool {
        matches!(
            self.level,
            PathLevel::Root | PathLevel::Store | PathLevel::Version
        )
    }

    pub fn store_name(&self) -> Option<&str> {
        self.store_name.as_deref()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn has_version(&self) -> bool {
        self.has_version
    }

    /// Share-style path inside the store, `\` for the store root
    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    /// Store-addressed path, `store:/relative/path`
    pub fn canonical_path(&self) -> Option<&str> {
        self.canonical_path.as_deref()
    }

    /// Opaque file id derived from the path
    pub fn file_id(&self) -> u64 {
        match (&self.canonical_path, &self.store_name) {
            (Some(canonical), _) => path_hash(canonical),
            (None, Some(store)) => path_hash(store),
            (None, None) => path_hash(SHARE_SEPARATOR_STR),
        }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            PathLevel::Invalid => f.write_str("[Invalid]"),
            PathLevel::Root => f.write_str("[Root]"),
            PathLevel::Store => write!(f, "[{}]", self.store_name.as_deref().unwrap_or("")),
            _ => write!(
                f,
                "[{},{}]",
                self.canonical_path.as_deref().unwrap_or(""),
                self.version
            ),
        }
    }
}

/// Split a share path on either separator. Returns `None` for paths that
/// try to step outside the share with `.` or `..` segments.
fn split_segments(share_path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = share_path
        .split([SHARE_SEPARATOR, STORE_SEPARATOR])
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.iter().any(|s| *s == ".." || *s == ".") {
        warn!("Rejecting share path with relative segments: {}", share_path);
        return None;
    }

    Some(segments)
}

fn share_relative(segments: &[&str]) -> String {
    format!("{}{}", SHARE_SEPARATOR, segments.join(SHARE_SEPARATOR_STR))
}

fn store_relative(segments: &[&str]) -> String {
    format!("{}{}", STORE_SEPARATOR, segments.join(STORE_SEPARATOR_STR))
}

/// Stable hash of a path, used for file ids
pub fn path_hash(path: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

/// Normalize a share path to use `\` and no trailing separator.
pub fn normalize_share_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split([SHARE_SEPARATOR, STORE_SEPARATOR])
        .filter(|segment| !segment.is_empty())
        .collect();
    share_relative(&segments)
}

/// Split a share path into its parent folder and final name.
///
/// The root splits into (`\`, ``).
pub fn split_share_path(path: &str) -> (String, String) {
    let normalized = normalize_share_path(path);
    match normalized.rsplit_once(SHARE_SEPARATOR) {
        Some(("", name)) => (SHARE_SEPARATOR_STR.to_string(), name.to_string()),
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => (SHARE_SEPARATOR_STR.to_string(), normalized),
    }
}

/// Append a name to a share folder path
pub fn join_share_path(parent: &str, name: &str) -> String {
    if parent.ends_with(SHARE_SEPARATOR) {
        format!("{}{}", parent, name)
    } else {
        format!("{}{}{}", parent, SHARE_SEPARATOR, name)
    }
}

/// Split a store-addressed path into its parent folder and final name.
///
/// `main:/docs/readme.txt` splits into (`main:/docs`, `readme.txt`). The
/// store root has no parent and returns `None`.
pub fn split_store_path(canonical: &str) -> Option<(String, String)> {
    let (store, path) = canonical.split_once(STORE_NAME_SEPARATOR)?;
    let path = path.trim_end_matches(STORE_SEPARATOR);
    let (parent, name) = path.rsplit_once(STORE_SEPARATOR)?;
    if name.is_empty() {
        return None;
    }

    let parent = if parent.is_empty() {
        STORE_SEPARATOR_STR
    } else {
        parent
    };
    Some((
        format!("{}{}{}", store, STORE_NAME_SEPARATOR, parent),
        name.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_view_node_path() {
        let path = StorePath::parse_virtual("\\main\\Head\\docs\\readme.txt");

        assert!(path.is_valid());
        assert!(!path.is_pseudo_path());
        assert_eq!(path.store_name(), Some("main"));
        assert_eq!(path.version(), Version::Head);
        assert!(path.has_version());
        assert_eq!(path.relative_path(), Some("\\docs\\readme.txt"));
        assert_eq!(path.canonical_path(), Some("main:/docs/readme.txt"));
    }

    #[test]
    fn test_virtual_view_numbered_version() {
        let path = StorePath::parse_virtual("/main/12/a/b");
        assert_eq!(path.version(), Version::Id(12));
        assert_eq!(path.canonical_path(), Some("main:/a/b"));
    }

    #[test]
    fn test_virtual_view_pseudo_levels() {
        let root = StorePath::parse_virtual("\\");
        assert!(root.is_valid());
        assert!(root.is_root_path());
        assert!(root.is_pseudo_path());
        assert_eq!(root.store_name(), None);

        let store = StorePath::parse_virtual("\\main");
        assert_eq!(store.level(), PathLevel::Store);
        assert!(store.is_pseudo_path());
        assert!(!store.has_version());
        assert_eq!(store.canonical_path(), None);

        let version = StorePath::parse_virtual("\\main\\head");
        assert_eq!(version.level(), PathLevel::Version);
        assert!(version.is_pseudo_path());
        assert!(version.has_version());
        assert_eq!(version.version(), Version::Head);
        assert_eq!(version.canonical_path(), Some("main:/"));
    }

    #[test]
    fn test_invalid_version_clears_store() {
        for bad in ["\\main\\latest\\x", "\\main\\-2", "\\main\\1.5", "\\main\\99999999999"] {
            let path = StorePath::parse_virtual(bad);
            assert!(!path.is_valid(), "expected {} to be invalid", bad);
            assert_eq!(path.store_name(), None);
            assert!(!path.has_version());
        }
    }

    #[test]
    fn test_sentinel_version_is_head() {
        let path = StorePath::parse_virtual("\\main\\-1\\docs");
        assert!(path.is_valid());
        assert_eq!(path.version(), Version::Head);
    }

    #[test]
    fn test_relative_segments_rejected() {
        assert!(!StorePath::parse_virtual("\\main\\Head\\..\\other").is_valid());
        assert!(!StorePath::for_store("main", Version::Head, "\\docs\\..\\..").is_valid());
    }

    #[test]
    fn test_single_store_paths() {
        let root = StorePath::for_store("main", Version::Head, "\\");
        assert_eq!(root.canonical_path(), Some("main:/"));
        assert_eq!(root.relative_path(), Some("\\"));

        let empty = StorePath::for_store("main", Version::Id(3), "");
        assert_eq!(empty.canonical_path(), Some("main:/"));
        assert_eq!(empty.version(), Version::Id(3));

        let file = StorePath::for_store("main", Version::Head, "\\docs\\readme.txt");
        assert_eq!(file.canonical_path(), Some("main:/docs/readme.txt"));
        assert_eq!(file.store_name(), Some("main"));
        assert!(!file.is_pseudo_path());
    }

    #[test]
    fn test_single_store_with_base_folder() {
        let file = StorePath::for_store("main:/www/", Version::Head, "\\index.html");
        assert_eq!(file.canonical_path(), Some("main:/www/index.html"));
        assert_eq!(file.store_name(), Some("main"));

        let with_colon = StorePath::for_store("main:", Version::Head, "\\a");
        assert_eq!(with_colon.canonical_path(), Some("main:/a"));
    }

    #[test]
    fn test_version_parse_segment() {
        assert_eq!(Version::parse_segment("HEAD"), Some(Version::Head));
        assert_eq!(Version::parse_segment("0"), Some(Version::Id(0)));
        assert_eq!(Version::parse_segment("7"), Some(Version::Id(7)));
        assert_eq!(Version::parse_segment("-7"), None);
        assert_eq!(Version::parse_segment("abc"), None);
        assert_eq!(Version::Head.folder_name(), "Head");
        assert_eq!(Version::Id(2).id(), 2);
        assert_eq!(Version::Head.id(), -1);
    }

    #[test]
    fn test_share_path_helpers() {
        assert_eq!(
            split_share_path("\\docs\\readme.txt"),
            ("\\docs".to_string(), "readme.txt".to_string())
        );
        assert_eq!(
            split_share_path("/docs"),
            ("\\".to_string(), "docs".to_string())
        );
        assert_eq!(split_share_path("\\"), ("\\".to_string(), String::new()));
        assert_eq!(join_share_path("\\", "a"), "\\a");
        assert_eq!(join_share_path("\\a", "b"), "\\a\\b");
        assert_eq!(normalize_share_path("a/b\\c\\"), "\\a\\b\\c");
    }

    #[test]
    fn test_split_store_path() {
        assert_eq!(
            split_store_path("main:/docs/readme.txt"),
            Some(("main:/docs".to_string(), "readme.txt".to_string()))
        );
        assert_eq!(
            split_store_path("main:/docs"),
            Some(("main:/".to_string(), "docs".to_string()))
        );
        assert_eq!(split_store_path("main:/"), None);
        assert_eq!(split_store_path("no-store"), None);
    }

    #[test]
    fn test_file_id_is_stable() {
        let a = StorePath::parse_virtual("\\main\\Head\\x");
        let b = StorePath::for_store("main", Version::Head, "\\x");
        assert_eq!(a.file_id(), b.file_id());
    }
}
