// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! File State Cache
//!
//! Per-share cache of path states. A state carries the pseudo folders listed
//! beneath its path, a delete-on-close marker, and an expiry time. The root
//! state of a virtual view never expires.
//!
//! Keys are case-insensitive share paths. All access goes through
//! `parking_lot` locks; callers only issue single add/remove mutations and
//! never rely on atomicity across calls.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Cached per-path state with expiry and pseudo folder lists

use crate::domain::pseudo_file::{PseudoFile, PseudoFileList};
use crate::domain::store_path::normalize_share_path;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cached state of one share path
#[derive(Debug)]
pub struct FileState {
    path: String,
    expires_at: Option<Instant>,
    pseudo_files: PseudoFileList,
    delete_on_close: bool,
}

impl FileState {
    pub fn new(path: impl Into<String>, expires_at: Option<Instant>) -> Self {
        Self {
            path: path.into(),
            expires_at,
            pseudo_files: PseudoFileList::new(),
            delete_on_close: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// `None` makes the state permanent
    pub fn set_expiry_time(&mut self, expires_at: Option<Instant>) {
        self.expires_at = expires_at;
    }

    pub fn add_pseudo_file(&mut self, file: PseudoFile) -> bool {
        self.pseudo_files.add(file)
    }

    pub fn remove_pseudo_file(&mut self, name: &str) -> Option<PseudoFile> {
        self.pseudo_files.remove(name, false)
    }

    pub fn has_pseudo_files(&self) -> bool {
        !self.pseudo_files.is_empty()
    }

    pub fn pseudo_file_list(&self) -> &PseudoFileList {
        &self.pseudo_files
    }

    pub fn set_delete_on_close(&mut self, delete_on_close: bool) {
        self.delete_on_close = delete_on_close;
    }

    pub fn delete_on_close(&self) -> bool {
        self.delete_on_close
    }
}

pub type SharedFileState = Arc<RwLock<FileState>>;

/// Table of file states for one share
#[derive(Debug)]
pub struct FileStateTable {
    states: RwLock<HashMap<String, SharedFileState>>,
    expiry: Duration,
}

impl FileStateTable {
    pub fn new(expiry: Duration) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            expiry,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    fn key(path: &str) -> String {
        normalize_share_path(path).to_uppercase()
    }

    /// Find the state for `path`, optionally creating it.
    ///
    /// Expired states are dropped on lookup. A created state never expires
    /// when `never_expire` is set.
    pub fn find_file_state(
        &self,
        path: &str,
        create: bool,
        never_expire: bool,
    ) -> Option<SharedFileState> {
        let key = Self::key(path);
        let now = Instant::now();

        {
            let states = self.states.read();
            if let Some(state) = states.get(&key) {
                if !state.read().has_expired(now) {
                    return Some(state.clone());
                }
            }
        }

        let mut states = self.states.write();
        if let Some(state) = states.get(&key) {
            if !state.read().has_expired(now) {
                return Some(state.clone());
            }
            debug!("File state expired: {}", path);
            states.remove(&key);
        }

        if !create {
            return None;
        }

        let expires_at = if never_expire {
            None
        } else {
            Some(now + self.expiry)
        };
        let state = Arc::new(RwLock::new(FileState::new(
            normalize_share_path(path),
            expires_at,
        )));
        states.insert(key, state.clone());
        Some(state)
    }

    pub fn remove_file_state(&self, path: &str) -> Option<SharedFileState> {
        self.states.write().remove(&Self::key(path))
    }

    /// Drop every expired state, returning how many were removed
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut states = self.states.write();
        let before = states.len();
        states.retain(|_, state| !state.read().has_expired(now));
        before - states.len()
    }

    pub fn clear(&self) {
        self.states.write().clear();
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_creates_only_when_asked() {
        let table = FileStateTable::new(Duration::from_secs(60));
        assert!(table.find_file_state("\\main", false, false).is_none());

        let state = table.find_file_state("\\main", true, false).unwrap();
        assert!(!state.read().is_permanent());

        let again = table.find_file_state("\\MAIN", false, false).unwrap();
        assert!(Arc::ptr_eq(&state, &again));
    }

    #[test]
    fn test_permanent_state_survives_expiry() {
        let table = FileStateTable::new(Duration::ZERO);
        let root = table.find_file_state("\\", true, true).unwrap();
        assert!(root.read().is_permanent());

        table.find_file_state("\\temp", true, false);
        assert_eq!(table.remove_expired(), 1);
        assert!(table.find_file_state("\\", false, false).is_some());
        assert!(table.find_file_state("\\temp", false, false).is_none());
    }

    #[test]
    fn test_pseudo_files_on_state() {
        let table = FileStateTable::new(Duration::from_secs(60));
        let state = table.find_file_state("/main", true, false).unwrap();
        {
            let mut guard = state.write();
            guard.add_pseudo_file(PseudoFile::dummy("Head"));
            guard.add_pseudo_file(PseudoFile::dummy("1"));
        }
        assert_eq!(state.read().pseudo_file_list().len(), 2);
        assert!(state.write().remove_pseudo_file("head").is_some());
        assert_eq!(state.read().path(), "\\main");

        assert!(table.remove_file_state("\\main").is_some());
        assert!(table.is_empty());
    }
}
