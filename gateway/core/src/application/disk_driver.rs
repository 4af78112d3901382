// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AVM Disk Driver
//!
//! Serves the filesystem contract for AVM shares. Every operation translates
//! its share path(s) through the share's [`AvmContext`], then either answers
//! from the pseudo folder cache (store and version folders of a virtual
//! view) or runs exactly one store transaction: read-only for queries,
//! read/write for mutations.
//!
//! Mutations are refused before any transaction is begun when the context
//! is not writable or the target is a pseudo folder.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Filesystem operations of AVM shares over the store and its transactions

use crate::application::disk_interface::{DiskInterface, SeekOrigin, SrvSession, TreeConnection};
use crate::application::network_file::{AvmNetworkFile, NetworkFile};
use crate::application::transaction::run_in_transaction;
use crate::domain::config::ShareConfig;
use crate::domain::constants::{DEFAULT_STATE_EXPIRY_SECS, SHARE_SEPARATOR_STR};
use crate::domain::context::{AvmContext, ContextMode};
use crate::domain::errors::{map_store_error, DiskError};
use crate::domain::file_info::{
    AccessMode, FileAttributes, FileInfo, FileOpenParams, FileStatus, SetFileInfo,
};
use crate::domain::file_state::SharedFileState;
use crate::domain::pseudo_file::PseudoFile;
use crate::domain::search::{
    AvmSearchContext, PseudoFileListSearchContext, SearchContext, SingleFileSearchContext,
    WildcardPattern,
};
use crate::domain::store::{
    AvmStore, NodeDescriptor, StoreDescriptor, StoreError, TransactionManager,
};
use crate::domain::store_path::{
    join_share_path, normalize_share_path, split_share_path, split_store_path, PathLevel,
    StorePath, Version,
};
use crate::infrastructure::event_bus::{EventBusError, LifecycleEventBus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Disk driver over one AVM store
pub struct AvmDiskDriver {
    store: Arc<dyn AvmStore>,
    txn: Arc<dyn TransactionManager>,
    events: LifecycleEventBus,
    state_expiry: Duration,
}

impl AvmDiskDriver {
    pub fn new(
        store: Arc<dyn AvmStore>,
        txn: Arc<dyn TransactionManager>,
        events: LifecycleEventBus,
    ) -> Self {
        Self {
            store,
            txn,
            events,
            state_expiry: Duration::from_secs(DEFAULT_STATE_EXPIRY_SECS),
        }
    }

    /// Expiry of cached file states created by new contexts
    pub fn with_state_expiry(mut self, expiry: Duration) -> Self {
        self.state_expiry = expiry;
        self
    }

    pub fn store(&self) -> &Arc<dyn AvmStore> {
        &self.store
    }

    pub fn state_expiry(&self) -> Duration {
        self.state_expiry
    }

    /// Build the context for a configured share
    pub fn create_context(&self, share: &ShareConfig) -> Result<Arc<AvmContext>, DiskError> {
        let context = match (&share.store, &share.virtual_view) {
            (None, Some(view)) => {
                let show = view.show_options().map_err(|e| {
                    DiskError::InvalidContext(format!("share {}: {}", share.name, e))
                })?;
                AvmContext::virtual_view(&share.name, show, self.state_expiry)
            }
            (Some(store), None) => {
                let store_name = store.split_once(':').map_or(store.as_str(), |(name, _)| name);
                if store_name.is_empty() {
                    return Err(DiskError::InvalidContext(format!(
                        "share {} has an empty store name",
                        share.name
                    )));
                }
                let version = share.parsed_version().ok_or_else(|| {
                    DiskError::InvalidContext(format!(
                        "share {} has invalid version {}",
                        share.name,
                        share.version.as_deref().unwrap_or_default()
                    ))
                })?;
                AvmContext::single_store(&share.name, store, version, self.state_expiry)
                    .with_create_store(share.create_store)
            }
            _ => {
                return Err(DiskError::InvalidContext(format!(
                    "share {} needs exactly one of store or virtual view",
                    share.name
                )))
            }
        };

        debug!("Created context for share {}: {:?}", share.name, context.mode());
        Ok(Arc::new(context))
    }

    /// Attach a context to the store.
    ///
    /// A virtual view starts a task applying store lifecycle events as they
    /// are published and lists the stores into its root. A single-store
    /// share checks that its root folder exists, creating the store and base
    /// folders when configured to.
    pub async fn register_context(&self, context: &Arc<AvmContext>) -> Result<(), DiskError> {
        match context.mode() {
            ContextMode::VirtualView { show } => {
                if !context.has_event_listener() {
                    self.spawn_event_listener(context);
                }
                let stores = self.list_stores().await?;
                context.seed_root(&stores);
                info!(
                    "Registered virtual view share {} (stores={})",
                    context.share_name(),
                    show.option_names().join(",")
                );
                Ok(())
            }
            ContextMode::SingleStore {
                store_path,
                version,
                create_store,
            } => {
                let root = context.build_store_path(SHARE_SEPARATOR_STR);
                let canonical = root
                    .canonical_path()
                    .map(str::to_string)
                    .ok_or_else(|| DiskError::InvalidContext(store_path.clone()))?;

                let found = run_in_transaction(&*self.txn, true, async {
                    match self.store.lookup(*version, &canonical).await {
                        Ok(node) => Ok(node),
                        Err(StoreError::NotFound(_)) => Ok(None),
                        Err(e) => Err(map_store_error(e, &canonical)),
                    }
                })
                .await?;

                match found {
                    Some(node) if node.is_directory() => {}
                    Some(_) => {
                        return Err(DiskError::InvalidContext(format!(
                            "{} is not a folder",
                            store_path
                        )))
                    }
                    None if *create_store && version.is_head() => {
                        self.create_store_path(&canonical).await?;
                    }
                    None => {
                        return Err(DiskError::InvalidContext(format!(
                            "{} not found at version {}",
                            store_path, version
                        )))
                    }
                }

                info!(
                    "Registered share {} on {} version {}",
                    context.share_name(),
                    store_path,
                    version
                );
                Ok(())
            }
        }
    }

    /// Create a store and every folder of `canonical` at HEAD
    async fn create_store_path(&self, canonical: &str) -> Result<(), DiskError> {
        let (store, rest) = canonical
            .split_once(':')
            .ok_or_else(|| DiskError::InvalidContext(canonical.to_string()))?;

        run_in_transaction(&*self.txn, false, async {
            let existing = self
                .store
                .get_store(store)
                .await
                .map_err(|e| map_store_error(e, store))?;
            if existing.is_none() {
                self.store
                    .create_store(store)
                    .await
                    .map_err(|e| map_store_error(e, store))?;
                info!("Created store {}", store);
            }

            let mut parent = format!("{}:/", store);
            for segment in rest.split('/').filter(|s| !s.is_empty()) {
                let child = if parent.ends_with('/') {
                    format!("{}{}", parent, segment)
                } else {
                    format!("{}/{}", parent, segment)
                };
                let found = self
                    .store
                    .lookup(Version::Head, &child)
                    .await
                    .map_err(|e| map_store_error(e, &child))?;
                if found.is_none() {
                    self.store
                        .create_directory(&parent, segment)
                        .await
                        .map_err(|e| map_store_error(e, &child))?;
                    debug!("Created base folder {}", child);
                }
                parent = child;
            }
            Ok(())
        })
        .await
    }

    async fn list_stores(&self) -> Result<Vec<StoreDescriptor>, DiskError> {
        run_in_transaction(&*self.txn, true, async {
            self.store
                .get_stores()
                .await
                .map_err(|e| map_store_error(e, SHARE_SEPARATOR_STR))
        })
        .await
    }

    /// Apply lifecycle events to `context` as they are published, until the
    /// context is closed or dropped
    fn spawn_event_listener(&self, context: &Arc<AvmContext>) {
        let mut receiver = self.events.subscribe();
        let weak = Arc::downgrade(context);
        let share = context.share_name().to_string();

        let listener = tokio::spawn(async move {
            loop {
                let received = receiver.recv().await;
                let Some(context) = weak.upgrade() else {
                    break;
                };
                match received {
                    Ok(event) => context.handle_event(&event),
                    Err(EventBusError::Lagged(missed)) => context.handle_lagged(missed),
                    Err(EventBusError::Empty) => {}
                    Err(EventBusError::Closed) => {
                        debug!("Lifecycle event bus closed for share {}", share);
                        break;
                    }
                }
            }
        });
        context.set_event_listener(listener.abort_handle());
    }

    /// Names of every store
    pub async fn store_names(&self) -> Result<Vec<String>, DiskError> {
        Ok(self
            .list_stores()
            .await?
            .into_iter()
            .map(|store| store.name)
            .collect())
    }

    /// Whether `store` has a root folder at `version`. A missing store or
    /// version, or a root of the wrong type, answers `false`.
    pub async fn store_version_exists(
        &self,
        store: &str,
        version: Version,
    ) -> Result<bool, DiskError> {
        let path = format!("{}:/", store);
        run_in_transaction(&*self.txn, true, async {
            match self.store.lookup(version, &path).await {
                Ok(Some(node)) => Ok(node.is_directory()),
                Ok(None) => Ok(false),
                Err(StoreError::NotFound(_)) | Err(StoreError::WrongType(_)) => {
                    debug!("No root folder for {} at version {}", store, version);
                    Ok(false)
                }
                Err(e) => Err(map_store_error(e, &path)),
            }
        })
        .await
    }

    /// Root state of a virtual view, rebuilt from the store when missing
    async fn root_state(&self, context: &AvmContext) -> Result<SharedFileState, DiskError> {
        let existing = context
            .state_table()
            .find_file_state(SHARE_SEPARATOR_STR, false, false);
        let root = match existing {
            Some(root) => root,
            None => {
                let stores = self.list_stores().await?;
                context.seed_root(&stores).ok_or_else(|| {
                    DiskError::InvalidContext(context.share_name().to_string())
                })?
            }
        };

        let queued = context.take_new_stores();
        if !queued.is_empty() {
            let mut guard = root.write();
            for store in queued {
                guard.add_pseudo_file(store);
            }
        }
        Ok(root)
    }

    /// Version folders of a store, listed from the store on first access
    async fn store_state(
        &self,
        context: &AvmContext,
        store_name: &str,
    ) -> Result<Option<SharedFileState>, DiskError> {
        let root = self.root_state(context).await?;
        let store_folder = root.read().pseudo_file_list().find(store_name, false).cloned();
        let Some(store_folder) = store_folder else {
            return Ok(None);
        };

        let store_path = join_share_path(SHARE_SEPARATOR_STR, store_folder.name());
        let state = context
            .state_table()
            .find_file_state(&store_path, true, false)
            .ok_or_else(|| DiskError::FileNotFound(store_path.clone()))?;
        if state.read().has_pseudo_files() {
            return Ok(Some(state));
        }

        let name = store_folder.name().to_string();
        let versions = run_in_transaction(&*self.txn, true, async {
            self.store
                .get_store_versions(&name)
                .await
                .map_err(|e| map_store_error(e, &store_path))
        })
        .await?;

        {
            let mut guard = state.write();
            for version in &versions {
                guard.add_pseudo_file(PseudoFile::version(
                    &name,
                    Version::Id(version.id),
                    Some(version.created),
                ));
            }
            guard.add_pseudo_file(PseudoFile::version(
                &name,
                Version::Head,
                Some(store_folder.created()),
            ));
        }
        debug!(
            "Listed {} versions of store {} for share {}",
            versions.len(),
            name,
            context.share_name()
        );
        Ok(Some(state))
    }

    /// Pseudo folder addressed by a root, store or version path
    pub async fn find_pseudo_folder(
        &self,
        context: &AvmContext,
        path: &StorePath,
    ) -> Result<Option<PseudoFile>, DiskError> {
        match (path.level(), path.store_name()) {
            (PathLevel::Root, _) => Ok(Some(PseudoFile::dummy(SHARE_SEPARATOR_STR))),
            (PathLevel::Store, Some(store)) => {
                let root = self.root_state(context).await?;
                let found = root.read().pseudo_file_list().find(store, false).cloned();
                Ok(found)
            }
            (PathLevel::Version, Some(store)) => {
                let Some(state) = self.store_state(context, store).await? else {
                    return Ok(None);
                };
                let found = state
                    .read()
                    .pseudo_file_list()
                    .find(&path.version().folder_name(), false)
                    .cloned();
                Ok(found)
            }
            _ => Ok(None),
        }
    }

    /// Pseudo folders listed beneath a root or store path
    pub async fn pseudo_listing(
        &self,
        context: &AvmContext,
        path: &StorePath,
    ) -> Result<Option<Vec<PseudoFile>>, DiskError> {
        match (path.level(), path.store_name()) {
            (PathLevel::Root, _) => {
                let root = self.root_state(context).await?;
                let files = root.read().pseudo_file_list().to_vec();
                Ok(Some(files))
            }
            (PathLevel::Store, Some(store)) => {
                let Some(state) = self.store_state(context, store).await? else {
                    return Ok(None);
                };
                let files = state.read().pseudo_file_list().to_vec();
                Ok(Some(files))
            }
            _ => Ok(None),
        }
    }

    fn is_pseudo(context: &AvmContext, path: &StorePath) -> bool {
        context.is_virtual_view() && path.is_pseudo_path()
    }

    /// Refuse a mutation of `path` unless the share is writable
    fn check_writable(
        context: &AvmContext,
        path: &StorePath,
        share_path: &str,
    ) -> Result<(), DiskError> {
        if Self::is_pseudo(context, path) {
            return Err(DiskError::AccessDenied(format!(
                "{} is a store or version folder",
                share_path
            )));
        }
        if !context.is_writable() {
            return Err(DiskError::AccessDenied(format!(
                "share {} is read-only",
                context.share_name()
            )));
        }
        Ok(())
    }

    fn canonical(path: &StorePath, share_path: &str) -> Result<String, DiskError> {
        path.canonical_path()
            .map(str::to_string)
            .ok_or_else(|| DiskError::FileNotFound(share_path.to_string()))
    }

    fn split_parent(canonical: &str, share_path: &str) -> Result<(String, String), DiskError> {
        split_store_path(canonical).ok_or_else(|| {
            DiskError::AccessDenied(format!("{} is the share root", share_path))
        })
    }

    fn avm_file(file: &mut NetworkFile) -> Result<&mut AvmNetworkFile, DiskError> {
        match file {
            NetworkFile::Avm(file) => Ok(file),
            NetworkFile::PseudoFolder(handle) => Err(DiskError::AccessDenied(format!(
                "{} is a store or version folder",
                handle.path()
            ))),
        }
    }

    async fn lookup_node(
        &self,
        version: Version,
        canonical: &str,
        share_path: &str,
    ) -> Result<Option<NodeDescriptor>, DiskError> {
        run_in_transaction(&*self.txn, true, async {
            self.store
                .lookup(version, canonical)
                .await
                .map_err(|e| map_store_error(e, share_path))
        })
        .await
    }
}

#[async_trait]
impl DiskInterface for AvmDiskDriver {
    async fn create_directory(
        &self,
        tree: &TreeConnection,
        params: &FileOpenParams,
    ) -> Result<(), DiskError> {
        let context = tree.context();
        let path = context.build_store_path(&params.path);
        debug!("create_directory: path={} storePath={}", params.path, path);

        Self::check_writable(context, &path, &params.path)?;
        let canonical = Self::canonical(&path, &params.path)?;
        let (parent, name) = Self::split_parent(&canonical, &params.path)?;

        run_in_transaction(&*self.txn, false, async {
            self.store
                .create_directory(&parent, &name)
                .await
                .map_err(|e| map_store_error(e, &params.path))
        })
        .await
    }

    async fn create_file(
        &self,
        tree: &TreeConnection,
        params: &FileOpenParams,
    ) -> Result<NetworkFile, DiskError> {
        let context = tree.context();
        let path = context.build_store_path(&params.path);
        debug!("create_file: path={} storePath={}", params.path, path);

        Self::check_writable(context, &path, &params.path)?;
        let canonical = Self::canonical(&path, &params.path)?;
        let (parent, name) = Self::split_parent(&canonical, &params.path)?;

        let node = run_in_transaction(&*self.txn, false, async {
            self.store
                .create_file(&parent, &name)
                .await
                .map_err(|e| map_store_error(e, &params.path))?;
            self.store
                .lookup(Version::Head, &canonical)
                .await
                .map_err(|e| map_store_error(e, &params.path))?
                .ok_or_else(|| DiskError::FileNotFound(params.path.clone()))
        })
        .await?;

        let mut file = AvmNetworkFile::new(
            Arc::clone(&self.store),
            node,
            normalize_share_path(&params.path),
            Version::Head,
            AccessMode::ReadWrite,
        );
        file.set_delete_on_close(params.delete_on_close);
        Ok(NetworkFile::Avm(file))
    }

    async fn open_file(
        &self,
        tree: &TreeConnection,
        params: &FileOpenParams,
    ) -> Result<NetworkFile, DiskError> {
        let context = tree.context();
        let path = context.build_store_path(&params.path);
        debug!(
            "open_file: path={} storePath={} access={:?}",
            params.path, path, params.access
        );

        if !path.is_valid() {
            return Err(DiskError::FileNotFound(params.path.clone()));
        }
        if (params.access.allows_write() || params.delete_on_close) && !context.is_writable() {
            return Err(DiskError::AccessDenied(format!(
                "{} cannot be opened for write on share {}",
                params.path,
                context.share_name()
            )));
        }

        if Self::is_pseudo(context, &path) {
            let folder = self
                .find_pseudo_folder(context, &path)
                .await?
                .ok_or_else(|| DiskError::FileNotFound(params.path.clone()))?;
            return Ok(NetworkFile::PseudoFolder(
                folder.open_placeholder(&normalize_share_path(&params.path)),
            ));
        }

        let access = if params.is_read_only_access() || !context.is_writable() {
            AccessMode::ReadOnly
        } else {
            AccessMode::ReadWrite
        };

        let canonical = Self::canonical(&path, &params.path)?;
        let node = self
            .lookup_node(path.version(), &canonical, &params.path)
            .await?
            .ok_or_else(|| DiskError::FileNotFound(params.path.clone()))?;
        if params.directory && !node.is_directory() {
            return Err(DiskError::PathNotFound(params.path.clone()));
        }

        let mut file = AvmNetworkFile::new(
            Arc::clone(&self.store),
            node,
            normalize_share_path(&params.path),
            path.version(),
            access,
        );
        file.set_delete_on_close(params.delete_on_close);
        debug!("Opened {} with {:?} access", params.path, access);
        Ok(NetworkFile::Avm(file))
    }

    async fn close_file(
        &self,
        tree: &TreeConnection,
        file: &mut NetworkFile,
    ) -> Result<(), DiskError> {
        let file = match file {
            NetworkFile::PseudoFolder(handle) => {
                handle.close();
                return Ok(());
            }
            NetworkFile::Avm(file) => file,
        };
        if file.is_closed() {
            return Ok(());
        }

        let context = tree.context();
        let share_path = file.share_path().to_string();
        let marked = context
            .state_table()
            .find_file_state(&share_path, false, false)
            .is_some_and(|state| state.read().delete_on_close());
        let delete = (file.delete_on_close() || marked) && context.is_writable();
        let read_only = !file.has_write_channel() && !delete;
        debug!("close_file: path={} delete={}", share_path, delete);

        run_in_transaction(&*self.txn, read_only, async {
            file.close().await?;
            if delete {
                let (parent, name) = Self::split_parent(file.canonical_path(), &share_path)?;
                if file.is_directory() {
                    let children = self
                        .store
                        .get_directory_listing(Version::Head, file.canonical_path())
                        .await
                        .map_err(|e| map_store_error(e, &share_path))?;
                    if !children.is_empty() {
                        return Err(DiskError::DirectoryNotEmpty(share_path.clone()));
                    }
                }
                self.store
                    .remove_node(&parent, &name)
                    .await
                    .map_err(|e| map_store_error(e, &share_path))?;
            }
            Ok(())
        })
        .await?;

        if delete {
            context.state_table().remove_file_state(&share_path);
            debug!("Deleted {} on close", share_path);
        }
        Ok(())
    }

    async fn read_file(
        &self,
        _tree: &TreeConnection,
        file: &mut NetworkFile,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, DiskError> {
        let file = Self::avm_file(file)?;
        let read_only = !file.has_write_channel();
        run_in_transaction(&*self.txn, read_only, file.read(buf, offset)).await
    }

    async fn write_file(
        &self,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        data: &[u8],
        offset: u64,
    ) -> Result<usize, DiskError> {
        if !tree.context().is_writable() {
            return Err(DiskError::AccessDenied(format!(
                "share {} is read-only",
                tree.share_name()
            )));
        }
        let file = Self::avm_file(file)?;
        run_in_transaction(&*self.txn, false, file.write(data, offset)).await
    }

    async fn seek_file(
        &self,
        _tree: &TreeConnection,
        file: &mut NetworkFile,
        pos: i64,
        origin: SeekOrigin,
    ) -> Result<u64, DiskError> {
        let file = Self::avm_file(file)?;
        let read_only = !file.has_write_channel();
        run_in_transaction(&*self.txn, read_only, file.seek(pos, origin)).await
    }

    async fn truncate_file(
        &self,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        size: u64,
    ) -> Result<(), DiskError> {
        if !tree.context().is_writable() {
            return Err(DiskError::AccessDenied(format!(
                "share {} is read-only",
                tree.share_name()
            )));
        }
        let file = Self::avm_file(file)?;
        run_in_transaction(&*self.txn, false, file.truncate(size)).await
    }

    async fn flush_file(
        &self,
        _tree: &TreeConnection,
        file: &mut NetworkFile,
    ) -> Result<(), DiskError> {
        if file.is_closed() {
            return Err(DiskError::FileClosed(file.share_path().to_string()));
        }
        Ok(())
    }

    async fn delete_file(&self, tree: &TreeConnection, path: &str) -> Result<(), DiskError> {
        let context = tree.context();
        let store_path = context.build_store_path(path);
        debug!("delete_file: path={} storePath={}", path, store_path);

        Self::check_writable(context, &store_path, path)?;
        let canonical = Self::canonical(&store_path, path)?;
        let (parent, name) = Self::split_parent(&canonical, path)?;

        run_in_transaction(&*self.txn, false, async {
            let node = self
                .store
                .lookup(store_path.version(), &canonical)
                .await
                .map_err(|e| map_store_error(e, path))?
                .ok_or_else(|| DiskError::FileNotFound(path.to_string()))?;
            if node.is_directory() {
                return Err(DiskError::PathNotFound(format!("{} is a folder", path)));
            }
            self.store
                .remove_node(&parent, &name)
                .await
                .map_err(|e| map_store_error(e, path))
        })
        .await?;

        context.state_table().remove_file_state(path);
        Ok(())
    }

    async fn delete_directory(&self, tree: &TreeConnection, path: &str) -> Result<(), DiskError> {
        let context = tree.context();
        let store_path = context.build_store_path(path);
        debug!("delete_directory: path={} storePath={}", path, store_path);

        Self::check_writable(context, &store_path, path)?;
        let canonical = Self::canonical(&store_path, path)?;
        let (parent, name) = Self::split_parent(&canonical, path)?;

        run_in_transaction(&*self.txn, false, async {
            let node = self
                .store
                .lookup(store_path.version(), &canonical)
                .await
                .map_err(|e| map_store_error(e, path))?
                .ok_or_else(|| DiskError::FileNotFound(path.to_string()))?;
            if !node.is_directory() {
                return Err(DiskError::PathNotFound(format!("{} is not a folder", path)));
            }

            let children = self
                .store
                .get_directory_listing(store_path.version(), &canonical)
                .await
                .map_err(|e| map_store_error(e, path))?;
            if !children.is_empty() {
                return Err(DiskError::DirectoryNotEmpty(path.to_string()));
            }

            self.store
                .remove_node(&parent, &name)
                .await
                .map_err(|e| map_store_error(e, path))
        })
        .await?;

        context.state_table().remove_file_state(path);
        Ok(())
    }

    async fn rename_file(
        &self,
        tree: &TreeConnection,
        old_path: &str,
        new_path: &str,
    ) -> Result<(), DiskError> {
        let context = tree.context();
        let from = context.build_store_path(old_path);
        let to = context.build_store_path(new_path);
        debug!("rename_file: {} -> {} ({} -> {})", old_path, new_path, from, to);

        Self::check_writable(context, &from, old_path)?;
        Self::check_writable(context, &to, new_path)?;
        let from_canonical = Self::canonical(&from, old_path)?;
        let to_canonical = Self::canonical(&to, new_path)?;
        let (from_parent, from_name) = Self::split_parent(&from_canonical, old_path)?;
        let (to_parent, to_name) = Self::split_parent(&to_canonical, new_path)?;

        run_in_transaction(&*self.txn, false, async {
            self.store
                .rename(&from_parent, &from_name, &to_parent, &to_name)
                .await
                .map_err(|e| map_store_error(e, old_path))
        })
        .await?;

        context.state_table().remove_file_state(old_path);
        Ok(())
    }

    async fn file_exists(&self, tree: &TreeConnection, path: &str) -> FileStatus {
        let context = tree.context();
        let store_path = context.build_store_path(path);
        if !store_path.is_valid() {
            return FileStatus::NotExist;
        }

        if Self::is_pseudo(context, &store_path) {
            return match self.find_pseudo_folder(context, &store_path).await {
                Ok(Some(_)) => FileStatus::DirectoryExists,
                Ok(None) => FileStatus::NotExist,
                Err(e) => {
                    debug!("file_exists: pseudo lookup of {} failed: {}", path, e);
                    FileStatus::NotExist
                }
            };
        }

        let Some(canonical) = store_path.canonical_path() else {
            return FileStatus::NotExist;
        };
        match self.lookup_node(store_path.version(), canonical, path).await {
            Ok(Some(node)) if node.is_directory() => FileStatus::DirectoryExists,
            Ok(Some(_)) => FileStatus::FileExists,
            Ok(None) => FileStatus::NotExist,
            Err(e) => {
                debug!("file_exists: lookup of {} failed: {}", path, e);
                FileStatus::NotExist
            }
        }
    }

    async fn get_file_information(
        &self,
        tree: &TreeConnection,
        path: &str,
    ) -> Result<Option<FileInfo>, DiskError> {
        let context = tree.context();
        let store_path = context.build_store_path(path);
        debug!("get_file_information: path={} storePath={}", path, store_path);
        if !store_path.is_valid() {
            return Ok(None);
        }

        if Self::is_pseudo(context, &store_path) {
            let folder = self.find_pseudo_folder(context, &store_path).await?;
            return Ok(folder.map(|f| f.file_info(&normalize_share_path(path))));
        }

        let canonical = Self::canonical(&store_path, path)?;
        let node = match self.lookup_node(store_path.version(), &canonical, path).await {
            Ok(node) => node,
            Err(DiskError::FileNotFound(_)) | Err(DiskError::PathNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(node.map(|node| {
            let name = if node.name.is_empty() {
                tree.share_name().to_string()
            } else {
                node.name.clone()
            };
            FileInfo::for_node(&node, &name, store_path.file_id(), !context.is_writable())
        }))
    }

    async fn set_file_information(
        &self,
        tree: &TreeConnection,
        path: &str,
        info: &SetFileInfo,
    ) -> Result<(), DiskError> {
        let context = tree.context();
        let store_path = context.build_store_path(path);
        debug!("set_file_information: path={} info={:?}", path, info);

        match info.delete_on_close {
            Some(true) => {
                Self::check_writable(context, &store_path, path)?;
                let state = context
                    .state_table()
                    .find_file_state(path, true, false)
                    .ok_or_else(|| DiskError::FileNotFound(path.to_string()))?;
                state.write().set_delete_on_close(true);
            }
            Some(false) => {
                if let Some(state) = context.state_table().find_file_state(path, false, false) {
                    state.write().set_delete_on_close(false);
                }
            }
            None => {}
        }

        if let Some(modified) = info.modified {
            debug!("Ignoring modification time {} for {}", modified, path);
        }
        Ok(())
    }

    async fn start_search(
        &self,
        tree: &TreeConnection,
        path: &str,
        attributes: FileAttributes,
    ) -> Result<Box<dyn SearchContext>, DiskError> {
        let context = tree.context();
        let read_only = !context.is_writable();
        let (folder, last) = split_share_path(path);
        debug!("start_search: path={} attributes={:?}", path, attributes);

        if WildcardPattern::is_wildcard(&last) {
            let pattern = WildcardPattern::new(&last)
                .map_err(|e| DiskError::FileNotFound(format!("{}: {}", path, e)))?;
            let folder_path = context.build_store_path(&folder);
            if !folder_path.is_valid() {
                return Err(DiskError::FileNotFound(path.to_string()));
            }

            if context.is_virtual_view()
                && matches!(folder_path.level(), PathLevel::Root | PathLevel::Store)
            {
                let files = self
                    .pseudo_listing(context, &folder_path)
                    .await?
                    .ok_or_else(|| DiskError::FileNotFound(path.to_string()))?;
                return Ok(Box::new(PseudoFileListSearchContext::new(
                    files,
                    Some(pattern),
                    folder,
                )));
            }

            let canonical = Self::canonical(&folder_path, path)?;
            let entries = run_in_transaction(&*self.txn, true, async {
                self.store
                    .get_directory_listing(folder_path.version(), &canonical)
                    .await
                    .map_err(|e| map_store_error(e, path))
            })
            .await?;
            debug!("start_search: {} entries in {}", entries.len(), canonical);
            return Ok(Box::new(AvmSearchContext::new(
                entries,
                attributes,
                Some(pattern),
                folder,
                read_only,
            )));
        }

        let store_path = context.build_store_path(path);
        if !store_path.is_valid() {
            return Err(DiskError::FileNotFound(path.to_string()));
        }

        if Self::is_pseudo(context, &store_path) {
            let file = self
                .find_pseudo_folder(context, &store_path)
                .await?
                .ok_or_else(|| DiskError::FileNotFound(path.to_string()))?;
            return Ok(Box::new(PseudoFileListSearchContext::new(
                vec![file],
                None,
                folder,
            )));
        }

        let canonical = Self::canonical(&store_path, path)?;
        let node = self
            .lookup_node(store_path.version(), &canonical, path)
            .await?
            .ok_or_else(|| DiskError::FileNotFound(path.to_string()))?;
        Ok(Box::new(SingleFileSearchContext::new(
            &node,
            &normalize_share_path(path),
            read_only,
        )))
    }

    fn is_read_only(&self, tree: &TreeConnection) -> bool {
        !tree.context().is_writable()
    }

    fn tree_opened(&self, session: &SrvSession, tree: &TreeConnection) {
        info!(
            "Tree connected: share={} session={} user={}",
            tree.share_name(),
            session.id(),
            session.user()
        );
    }

    fn tree_closed(&self, session: &SrvSession, tree: &TreeConnection) {
        info!(
            "Tree disconnected: share={} session={} user={}",
            tree.share_name(),
            session.id(),
            session.user()
        );
    }
}
