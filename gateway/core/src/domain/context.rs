// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AVM Filesystem Context
//!
//! Per-share state. A share is either bound to one store (optionally a base
//! folder inside it) at one version, or is a virtual view presenting every
//! store and version as a two-level tree of pseudo folders.
//!
//! The context owns the share's file-state cache. In virtual view mode it
//! also receives store lifecycle events and keeps the cached pseudo folders
//! in step with them, reporting each change to the registered
//! [`ChangeNotifier`].
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Per-share addressing and cached pseudo folder state

use crate::domain::constants::SHARE_SEPARATOR_STR;
use crate::domain::events::{ChangeNotifier, NotifyAction, StoreLifecycleEvent};
use crate::domain::file_state::{FileStateTable, SharedFileState};
use crate::domain::pseudo_file::PseudoFile;
use crate::domain::store::StoreDescriptor;
use crate::domain::store_path::{join_share_path, StorePath, Version};
use crate::domain::store_type::{StoreType, StoreTypes};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Addressing mode of a share
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextMode {
    /// Bound to `store` or `store:/base/path` at one version
    SingleStore {
        store_path: String,
        version: Version,
        create_store: bool,
    },
    /// Stores of the `show` types and their versions as pseudo folders
    VirtualView { show: StoreTypes },
}

pub struct AvmContext {
    share_name: String,
    mode: ContextMode,
    states: FileStateTable,
    notifier: RwLock<Option<Arc<dyn ChangeNotifier>>>,
    /// Task applying lifecycle events to this context
    listener: Mutex<Option<AbortHandle>>,
    new_stores: Mutex<Vec<PseudoFile>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for AvmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvmContext")
            .field("share_name", &self.share_name)
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AvmContext {
    pub fn single_store(
        share_name: impl Into<String>,
        store_path: impl Into<String>,
        version: Version,
        state_expiry: Duration,
    ) -> Self {
        Self::new(
            share_name.into(),
            ContextMode::SingleStore {
                store_path: store_path.into(),
                version,
                create_store: false,
            },
            state_expiry,
        )
    }

    pub fn virtual_view(
        share_name: impl Into<String>,
        show: StoreTypes,
        state_expiry: Duration,
    ) -> Self {
        Self::new(
            share_name.into(),
            ContextMode::VirtualView { show },
            state_expiry,
        )
    }

    fn new(share_name: String, mode: ContextMode, state_expiry: Duration) -> Self {
        Self {
            share_name,
            mode,
            states: FileStateTable::new(state_expiry),
            notifier: RwLock::new(None),
            listener: Mutex::new(None),
            new_stores: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Create the store (and base folders) at HEAD when missing on registration
    pub fn with_create_store(mut self, create: bool) -> Self {
        if let ContextMode::SingleStore { create_store, .. } = &mut self.mode {
            *create_store = create;
        }
        self
    }

    pub fn share_name(&self) -> &str {
        &self.share_name
    }

    pub fn mode(&self) -> &ContextMode {
        &self.mode
    }

    pub fn is_virtual_view(&self) -> bool {
        matches!(self.mode, ContextMode::VirtualView { .. })
    }

    /// Store types listed by a virtual view
    pub fn show_options(&self) -> Option<StoreTypes> {
        match self.mode {
            ContextMode::VirtualView { show } => Some(show),
            ContextMode::SingleStore { .. } => None,
        }
    }

    /// Bound store path (`store` or `store:/base`), `None` in virtual view
    pub fn store_path(&self) -> Option<&str> {
        match &self.mode {
            ContextMode::SingleStore { store_path, .. } => Some(store_path),
            ContextMode::VirtualView { .. } => None,
        }
    }

    /// Bound store name, `None` in virtual view
    pub fn store_name(&self) -> Option<&str> {
        self.store_path()
            .map(|path| path.split_once(':').map_or(path, |(name, _)| name))
    }

    /// Bound version; a virtual view reports HEAD
    pub fn version(&self) -> Version {
        match &self.mode {
            ContextMode::SingleStore { version, .. } => *version,
            ContextMode::VirtualView { .. } => Version::Head,
        }
    }

    pub fn create_store(&self) -> bool {
        matches!(self.mode, ContextMode::SingleStore { create_store: true, .. })
    }

    /// Mutations are allowed only on a single-store share bound to HEAD
    pub fn is_writable(&self) -> bool {
        !self.is_virtual_view() && self.version().is_head()
    }

    pub fn state_table(&self) -> &FileStateTable {
        &self.states
    }

    /// Translate a share path according to the addressing mode
    pub fn build_store_path(&self, share_path: &str) -> StorePath {
        match &self.mode {
            ContextMode::SingleStore {
                store_path,
                version,
                ..
            } => StorePath::for_store(store_path, *version, share_path),
            ContextMode::VirtualView { .. } => StorePath::parse_virtual(share_path),
        }
    }

    /// Whether a store appears in this share's virtual root
    pub fn shows_store(&self, store_type: StoreType) -> bool {
        self.show_options()
            .is_some_and(|show| show.shows(store_type))
    }

    /// Root state holding one pseudo folder per visible store. The root state
    /// is permanent.
    pub fn seed_root(&self, stores: &[StoreDescriptor]) -> Option<SharedFileState> {
        let state = self
            .states
            .find_file_state(SHARE_SEPARATOR_STR, true, true)?;
        {
            let mut guard = state.write();
            for store in stores.iter().filter(|s| self.shows_store(s.store_type)) {
                guard.add_pseudo_file(PseudoFile::store(&store.name, Some(store.created)));
            }
        }
        debug!(
            "Seeded virtual root of share {} with {} stores",
            self.share_name,
            state.read().pseudo_file_list().len()
        );
        Some(state)
    }

    /// Stores announced before the root listing existed
    pub fn take_new_stores(&self) -> Vec<PseudoFile> {
        std::mem::take(&mut *self.new_stores.lock())
    }

    pub fn set_change_notifier(&self, notifier: Arc<dyn ChangeNotifier>) {
        *self.notifier.write() = Some(notifier);
    }

    pub fn has_change_handler(&self) -> bool {
        self.notifier.read().is_some()
    }

    fn notify(&self, action: NotifyAction, path: &str) {
        let notifier = self.notifier.read().clone();
        if let Some(notifier) = notifier {
            notifier.notify_directory_changed(action, path);
        }
    }

    /// Track the task delivering lifecycle events, stopping any earlier one
    pub fn set_event_listener(&self, listener: AbortHandle) {
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }
    }

    pub fn has_event_listener(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|listener| !listener.is_finished())
    }

    /// A lagged receiver has lost events, so the whole pseudo cache is
    /// dropped and rebuilt on next access.
    pub fn handle_lagged(&self, missed: u64) {
        warn!(
            "Share {} missed {} lifecycle events, dropping pseudo folder cache",
            self.share_name, missed
        );
        self.new_stores.lock().clear();
        self.states.clear();
    }

    pub fn handle_event(&self, event: &StoreLifecycleEvent) {
        if !self.is_virtual_view() {
            return;
        }

        match event {
            StoreLifecycleEvent::StoreCreated {
                name,
                store_type,
                created_at,
            } => self.store_created(name, *store_type, *created_at),
            StoreLifecycleEvent::StorePurged { name } => self.store_purged(name),
            StoreLifecycleEvent::VersionCreated {
                store,
                id,
                created_at,
            } => self.version_created(store, *id, *created_at),
            StoreLifecycleEvent::VersionPurged { store, id } => self.version_purged(store, *id),
        }
    }

    pub fn store_created(&self, name: &str, store_type: StoreType, created: DateTime<Utc>) {
        if !self.shows_store(store_type) {
            debug!(
                "Share {} does not list {} store {}",
                self.share_name, store_type, name
            );
            return;
        }

        let Some(root) = self
            .states
            .find_file_state(SHARE_SEPARATOR_STR, false, false)
        else {
            self.new_stores
                .lock()
                .push(PseudoFile::store(name, Some(created)));
            return;
        };

        let added = root
            .write()
            .add_pseudo_file(PseudoFile::store(name, Some(created)));
        if added {
            debug!("Added pseudo folder for store {}", name);
            self.notify(NotifyAction::Added, &join_share_path(SHARE_SEPARATOR_STR, name));
        }
    }

    pub fn store_purged(&self, name: &str) {
        let store_path = join_share_path(SHARE_SEPARATOR_STR, name);
        self.states.remove_file_state(&store_path);
        self.new_stores
            .lock()
            .retain(|queued| !queued.name().eq_ignore_ascii_case(name));

        let removed = self
            .states
            .find_file_state(SHARE_SEPARATOR_STR, false, false)
            .and_then(|root| root.write().remove_pseudo_file(name));
        if removed.is_some() {
            debug!("Removed pseudo folder for store {}", name);
            self.notify(NotifyAction::Removed, &store_path);
        }
    }

    pub fn version_created(&self, store: &str, id: u32, created: DateTime<Utc>) {
        let store_path = join_share_path(SHARE_SEPARATOR_STR, store);
        let Some(state) = self.states.find_file_state(&store_path, false, false) else {
            return;
        };

        let added = {
            let mut guard = state.write();
            // The version list is built in full on first access
            guard.has_pseudo_files()
                && guard.add_pseudo_file(PseudoFile::version(
                    store,
                    Version::Id(id),
                    Some(created),
                ))
        };
        if added {
            self.notify(
                NotifyAction::Added,
                &join_share_path(&store_path, &id.to_string()),
            );
        }
    }

    pub fn version_purged(&self, store: &str, id: u32) {
        let store_path = join_share_path(SHARE_SEPARATOR_STR, store);
        let removed = self
            .states
            .find_file_state(&store_path, false, false)
            .and_then(|state| state.write().remove_pseudo_file(&id.to_string()));
        if removed.is_some() {
            self.notify(
                NotifyAction::Removed,
                &join_share_path(&store_path, &id.to_string()),
            );
        }
    }

    /// Release the context's resources when its share goes away
    pub fn close_context(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        *self.notifier.write() = None;
        self.states.clear();
        info!("Closed share context {}", self.share_name);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
