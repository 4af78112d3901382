// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Search Contexts
//!
//! Resumable cursors over directory search results. Real store listings,
//! pseudo folder lists and single-node results all answer the same
//! [`SearchContext`] contract, so the disk driver can return any of them
//! from one search call.
//!
//! Resume ids are one past the index of the last returned entry: resuming
//! at id `N` continues at index `N - 1`, which yields that entry again.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Wildcard directory searches with resumable positions

use crate::domain::file_info::{FileAttributes, FileInfo};
use crate::domain::pseudo_file::PseudoFile;
use crate::domain::store::NodeDescriptor;
use crate::domain::store_path::{join_share_path, path_hash};
use regex::{Regex, RegexBuilder};

/// Cursor over search results
pub trait SearchContext: Send {
    fn has_more_files(&self) -> bool;

    /// Next matching entry, or `None` when the search is exhausted
    fn next_file_info(&mut self) -> Option<FileInfo>;

    fn next_file_name(&mut self) -> Option<String> {
        self.next_file_info().map(|info| info.name)
    }

    /// Total entries in the result set, when known
    fn number_of_entries(&self) -> Option<usize>;

    fn resume_id(&self) -> u32;

    fn restart_at(&mut self, resume_id: u32) -> bool;

    fn restart_at_info(&mut self, info: &FileInfo) -> bool;
}

/// Case-insensitive file name pattern with `*` and `?` wildcards
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    pattern: String,
    regex: Regex,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        // "*.*" matches every name, with or without an extension
        let body = if pattern == "*.*" {
            ".*".to_string()
        } else {
            pattern
                .chars()
                .map(|c| match c {
                    '*' => ".*".to_string(),
                    '?' => ".".to_string(),
                    other => regex::escape(&other.to_string()),
                })
                .collect()
        };

        let regex = RegexBuilder::new(&format!("^{}$", body))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_wildcard(name: &str) -> bool {
        name.contains(['*', '?'])
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Directory entries are returned only when directories were requested
fn matches_attributes(is_directory: bool, search_attrs: FileAttributes) -> bool {
    !is_directory || search_attrs.contains(FileAttributes::DIRECTORY)
}

/// Search over a snapshot of a real store folder
pub struct AvmSearchContext {
    entries: Vec<NodeDescriptor>,
    index: usize,
    pattern: Option<WildcardPattern>,
    search_attrs: FileAttributes,
    rel_path: String,
    read_only: bool,
}

impl AvmSearchContext {
    /// `rel_path` is the share path of the searched folder; it seeds file ids.
    pub fn new(
        entries: Vec<NodeDescriptor>,
        search_attrs: FileAttributes,
        pattern: Option<WildcardPattern>,
        rel_path: impl Into<String>,
        read_only: bool,
    ) -> Self {
        Self {
            entries,
            index: 0,
            pattern,
            search_attrs,
            rel_path: rel_path.into(),
            read_only,
        }
    }

    fn entry_matches(&self, entry: &NodeDescriptor) -> bool {
        let name_ok = self
            .pattern
            .as_ref()
            .is_none_or(|p| p.matches(&entry.name));
        name_ok && matches_attributes(entry.is_directory(), self.search_attrs)
    }
}

impl SearchContext for AvmSearchContext {
    fn has_more_files(&self) -> bool {
        self.index < self.entries.len()
    }

    fn next_file_info(&mut self) -> Option<FileInfo> {
        while self.index < self.entries.len() {
            let entry = &self.entries[self.index];
            self.index += 1;

            if self.entry_matches(entry) {
                let file_id = path_hash(&join_share_path(&self.rel_path, &entry.name));
                return Some(FileInfo::for_node(
                    entry,
                    &entry.name,
                    file_id,
                    self.read_only,
                ));
            }
        }
        None
    }

    fn number_of_entries(&self) -> Option<usize> {
        Some(self.entries.len())
    }

    fn resume_id(&self) -> u32 {
        self.index as u32
    }

    fn restart_at(&mut self, resume_id: u32) -> bool {
        let Some(idx) = (resume_id as usize).checked_sub(1) else {
            return false;
        };
        if idx >= self.entries.len() {
            return false;
        }
        self.index = idx;
        true
    }

    fn restart_at_info(&mut self, info: &FileInfo) -> bool {
        let start = self.index.min(self.entries.len());
        match self.entries[..start]
            .iter()
            .rposition(|entry| entry.name.eq_ignore_ascii_case(&info.name))
        {
            Some(idx) => {
                self.index = idx;
                true
            }
            None => false,
        }
    }
}

/// Search over a list of pseudo folders
///
/// Without a pattern every entry matches; the caller has already narrowed
/// the list to the requested name. Hidden is carried by the pseudo file
/// itself, using the same name rule as store listings.
pub struct PseudoFileListSearchContext {
    files: Vec<PseudoFile>,
    index: usize,
    pattern: Option<WildcardPattern>,
    rel_path: String,
}

impl PseudoFileListSearchContext {
    pub fn new(
        files: Vec<PseudoFile>,
        pattern: Option<WildcardPattern>,
        rel_path: impl Into<String>,
    ) -> Self {
        Self {
            files,
            index: 0,
            pattern,
            rel_path: rel_path.into(),
        }
    }
}

impl SearchContext for PseudoFileListSearchContext {
    fn has_more_files(&self) -> bool {
        self.index < self.files.len()
    }

    fn next_file_info(&mut self) -> Option<FileInfo> {
        while self.index < self.files.len() {
            let file = &self.files[self.index];
            self.index += 1;

            let name_ok = self
                .pattern
                .as_ref()
                .is_none_or(|p| p.matches(file.name()));
            if name_ok {
                return Some(file.file_info(&join_share_path(&self.rel_path, file.name())));
            }
        }
        None
    }

    fn number_of_entries(&self) -> Option<usize> {
        Some(self.files.len())
    }

    fn resume_id(&self) -> u32 {
        self.index as u32
    }

    fn restart_at(&mut self, resume_id: u32) -> bool {
        let Some(idx) = (resume_id as usize).checked_sub(1) else {
            return false;
        };
        if idx >= self.files.len() {
            return false;
        }
        self.index = idx;
        true
    }

    fn restart_at_info(&mut self, info: &FileInfo) -> bool {
        let start = self.index.min(self.files.len());
        match self.files[..start]
            .iter()
            .rposition(|file| file.name().eq_ignore_ascii_case(&info.name))
        {
            Some(idx) => {
                self.index = idx;
                true
            }
            None => false,
        }
    }
}

/// Search yielding exactly one node
pub struct SingleFileSearchContext {
    info: FileInfo,
    done: bool,
}

impl SingleFileSearchContext {
    pub fn new(node: &NodeDescriptor, rel_path: &str, read_only: bool) -> Self {
        Self {
            info: FileInfo::for_node(node, &node.name, path_hash(rel_path), read_only),
            done: false,
        }
    }
}

impl SearchContext for SingleFileSearchContext {
    fn has_more_files(&self) -> bool {
        !self.done
    }

    fn next_file_info(&mut self) -> Option<FileInfo> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(self.info.clone())
    }

    fn number_of_entries(&self) -> Option<usize> {
        Some(1)
    }

    fn resume_id(&self) -> u32 {
        u32::from(self.done)
    }

    fn restart_at(&mut self, resume_id: u32) -> bool {
        if resume_id != 1 {
            return false;
        }
        self.done = false;
        true
    }

    fn restart_at_info(&mut self, info: &FileInfo) -> bool {
        if !info.name.eq_ignore_ascii_case(&self.info.name) {
            return false;
        }
        self.done = false;
        true
    }
}
