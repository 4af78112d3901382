// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Versioned Store
//!
//! Reference implementation of [`AvmStore`] and [`TransactionManager`]. Each
//! store holds a mutable HEAD tree plus immutable snapshots numbered from 1.
//! Content lives in a shared blob table keyed by content url, so snapshots
//! share content with HEAD until HEAD is rewritten. Blobs are reference
//! counted by the nodes that point at them and dropped with the last one.
//!
//! Store names and node names are matched case-insensitively and keep the
//! spelling they were created with.
//!
//! Store and version creation and purge are published on the
//! [`LifecycleEventBus`] when one is attached.
//!
//! Transactions carry no isolation; the manager only counts them so callers
//! can verify that every begin is paired with exactly one commit or rollback.

use crate::domain::constants::DEFAULT_MIME_TYPE;
use crate::domain::events::StoreLifecycleEvent;
use crate::domain::store::{
    AvmStore, ContentData, ContentReader, ContentWriter, NodeDescriptor, NodeKind,
    StoreDescriptor, StoreError, Transaction, TransactionManager, VersionDescriptor,
};
use crate::domain::store_path::Version;
use crate::domain::store_type::StoreType;
use crate::infrastructure::event_bus::LifecycleEventBus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Largest file a content writer grows to unless configured otherwise.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1 << 30;

struct BlobEntry {
    data: Arc<Vec<u8>>,
    /// Nodes across HEAD and snapshots pointing at this blob
    refs: usize,
}

/// Content blobs keyed by content url.
///
/// A blob written by a closed writer starts unreferenced and is either
/// retained by a commit or discarded when the commit fails.
#[derive(Default)]
struct BlobTable {
    entries: HashMap<String, BlobEntry>,
}

impl BlobTable {
    fn insert(&mut self, data: Vec<u8>, refs: usize) -> String {
        let url = format!("mem://{}", Uuid::new_v4());
        self.entries.insert(
            url.clone(),
            BlobEntry {
                data: Arc::new(data),
                refs,
            },
        );
        url
    }

    fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.entries.get(url).map(|entry| Arc::clone(&entry.data))
    }

    fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    fn retain(&mut self, url: &str) {
        if let Some(entry) = self.entries.get_mut(url) {
            entry.refs += 1;
        }
    }

    fn release(&mut self, url: &str) {
        let unused = match self.entries.get_mut(url) {
            Some(entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            None => false,
        };
        if unused {
            self.entries.remove(url);
        }
    }

    /// Drop a blob that no node has retained
    fn discard(&mut self, url: &str) {
        if self.entries.get(url).is_some_and(|entry| entry.refs == 0) {
            self.entries.remove(url);
        }
    }

    fn retain_tree(&mut self, node: &MemoryNode) {
        if let Some(url) = &node.content_url {
            self.retain(url);
        }
        for child in node.children.values() {
            self.retain_tree(child);
        }
    }

    fn release_tree(&mut self, node: &MemoryNode) {
        if let Some(url) = &node.content_url {
            self.release(url);
        }
        for child in node.children.values() {
            self.release_tree(child);
        }
    }
}

type SharedBlobs = Arc<RwLock<BlobTable>>;

#[derive(Debug, Clone)]
struct MemoryNode {
    name: String,
    kind: NodeKind,
    content_url: Option<String>,
    length: u64,
    mime_type: Option<String>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    accessed: DateTime<Utc>,
    /// Children keyed by lowercased name
    children: BTreeMap<String, MemoryNode>,
}

impl MemoryNode {
    fn new(name: &str, kind: NodeKind) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            kind,
            content_url: None,
            length: 0,
            mime_type: None,
            created: now,
            modified: now,
            accessed: now,
            children: BTreeMap::new(),
        }
    }

    fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    fn descriptor(&self, path: String) -> NodeDescriptor {
        NodeDescriptor {
            path,
            name: self.name.clone(),
            kind: self.kind,
            length: self.length,
            created: self.created,
            modified: self.modified,
            accessed: self.accessed,
        }
    }

    fn total_content(&self) -> u64 {
        match self.kind {
            NodeKind::File => self.length,
            NodeKind::Directory => self.children.values().map(MemoryNode::total_content).sum(),
        }
    }
}

fn child_key(name: &str) -> String {
    name.to_lowercase()
}

fn store_key(name: &str) -> String {
    name.to_lowercase()
}

struct StoreData {
    descriptor: StoreDescriptor,
    head: MemoryNode,
    snapshots: BTreeMap<u32, (VersionDescriptor, MemoryNode)>,
    next_version: u32,
}

impl StoreData {
    fn tree(&self, version: Version) -> Result<&MemoryNode, StoreError> {
        match version {
            Version::Head => Ok(&self.head),
            Version::Id(id) => self
                .snapshots
                .get(&id)
                .map(|(_, tree)| tree)
                .ok_or_else(|| {
                    StoreError::NotFound(format!("{}:{}", self.descriptor.name, id))
                }),
        }
    }
}

type StoreTable = BTreeMap<String, StoreData>;

/// `store:/a/b` split into the store name and path segments
struct ParsedPath {
    store: String,
    segments: Vec<String>,
}

impl ParsedPath {
    fn parse(path: &str) -> Result<Self, StoreError> {
        let (store, rest) = path
            .split_once(':')
            .ok_or_else(|| StoreError::BadArgument(format!("not a store path: {}", path)))?;
        if store.is_empty() {
            return Err(StoreError::BadArgument(format!("empty store name: {}", path)));
        }
        Ok(Self {
            store: store.to_string(),
            segments: rest
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    fn child(&self, name: &str) -> String {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        format!("{}:/{}", self.store, segments.join("/"))
    }

    fn canonical(&self) -> String {
        format!("{}:/{}", self.store, self.segments.join("/"))
    }

    /// Store addressed by this path. Rewrites the store name to the spelling
    /// the store was created with.
    fn resolve<'a>(&mut self, stores: &'a StoreTable) -> Result<&'a StoreData, StoreError> {
        let data = stores
            .get(&store_key(&self.store))
            .ok_or_else(|| StoreError::NotFound(self.store.clone()))?;
        self.store.clone_from(&data.descriptor.name);
        Ok(data)
    }

    fn resolve_mut<'a>(
        &mut self,
        stores: &'a mut StoreTable,
    ) -> Result<&'a mut StoreData, StoreError> {
        let data = stores
            .get_mut(&store_key(&self.store))
            .ok_or_else(|| StoreError::NotFound(self.store.clone()))?;
        self.store.clone_from(&data.descriptor.name);
        Ok(data)
    }
}

fn walk<'a>(
    root: &'a MemoryNode,
    segments: &[String],
) -> Result<Option<&'a MemoryNode>, StoreError> {
    let mut node = root;
    for segment in segments {
        if !node.is_directory() {
            return Err(StoreError::WrongType(segment.clone()));
        }
        match node.children.get(&child_key(segment)) {
            Some(child) => node = child,
            None => return Ok(None),
        }
    }
    Ok(Some(node))
}

fn walk_mut<'a>(
    root: &'a mut MemoryNode,
    segments: &[String],
) -> Result<Option<&'a mut MemoryNode>, StoreError> {
    let mut node = root;
    for segment in segments {
        if !node.is_directory() {
            return Err(StoreError::WrongType(segment.clone()));
        }
        match node.children.get_mut(&child_key(segment)) {
            Some(child) => node = child,
            None => return Ok(None),
        }
    }
    Ok(Some(node))
}

/// Existing HEAD folder addressed by `path`
fn head_folder_mut<'a>(
    data: &'a mut StoreData,
    path: &ParsedPath,
) -> Result<&'a mut MemoryNode, StoreError> {
    match walk_mut(&mut data.head, &path.segments)? {
        Some(node) if node.is_directory() => Ok(node),
        Some(_) => Err(StoreError::WrongType(path.canonical())),
        None => Err(StoreError::NotFound(path.canonical())),
    }
}

/// Versioned content store held entirely in memory
pub struct MemoryAvmStore {
    /// Stores keyed by lowercased name
    stores: RwLock<StoreTable>,
    blobs: SharedBlobs,
    quota: Option<u64>,
    max_file_size: u64,
    events: Option<LifecycleEventBus>,
}

impl MemoryAvmStore {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(BTreeMap::new()),
            blobs: Arc::new(RwLock::new(BlobTable::default())),
            quota: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            events: None,
        }
    }

    /// Publish store lifecycle events on `bus`
    pub fn with_event_bus(mut self, bus: LifecycleEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Limit the HEAD content of each store to `bytes`
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Refuse to grow any single file past `bytes`
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    fn publish(&self, event: StoreLifecycleEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Number of content blobs currently held
    pub fn blob_count(&self) -> usize {
        self.blobs.read().entries.len()
    }

    /// Total size of all content blobs currently held
    pub fn blob_bytes(&self) -> u64 {
        self.blobs
            .read()
            .entries
            .values()
            .map(|entry| entry.data.len() as u64)
            .sum()
    }

    /// Freeze the current HEAD of `store` as a new numbered version
    pub fn create_snapshot(&self, store: &str) -> Result<u32, StoreError> {
        let (name, id) = {
            let mut stores = self.stores.write();
            let data = stores
                .get_mut(&store_key(store))
                .ok_or_else(|| StoreError::NotFound(store.to_string()))?;
            let id = data.next_version;
            data.next_version += 1;
            let descriptor = VersionDescriptor {
                store: data.descriptor.name.clone(),
                id,
                created: Utc::now(),
                tag: None,
            };
            let tree = data.head.clone();
            self.blobs.write().retain_tree(&tree);
            data.snapshots.insert(id, (descriptor, tree));
            (data.descriptor.name.clone(), id)
        };

        info!("Created snapshot {} of store {}", id, name);
        self.publish(StoreLifecycleEvent::version_created(&name, id));
        Ok(id)
    }

    /// Remove a store with all its versions
    pub fn purge_store(&self, store: &str) -> Result<(), StoreError> {
        let removed = {
            let mut stores = self.stores.write();
            let removed = stores
                .remove(&store_key(store))
                .ok_or_else(|| StoreError::NotFound(store.to_string()))?;
            let mut blobs = self.blobs.write();
            blobs.release_tree(&removed.head);
            for (_, tree) in removed.snapshots.values() {
                blobs.release_tree(tree);
            }
            removed
        };

        let name = removed.descriptor.name;
        info!("Purged store {}", name);
        self.publish(StoreLifecycleEvent::store_purged(&name));
        Ok(())
    }

    pub fn purge_version(&self, store: &str, id: u32) -> Result<(), StoreError> {
        let name = {
            let mut stores = self.stores.write();
            let data = stores
                .get_mut(&store_key(store))
                .ok_or_else(|| StoreError::NotFound(store.to_string()))?;
            let (_, tree) = data
                .snapshots
                .remove(&id)
                .ok_or_else(|| StoreError::NotFound(format!("{}:{}", store, id)))?;
            self.blobs.write().release_tree(&tree);
            data.descriptor.name.clone()
        };

        info!("Purged version {} of store {}", id, name);
        self.publish(StoreLifecycleEvent::version_purged(&name, id));
        Ok(())
    }

    /// Mime type last committed for the HEAD node at `path`
    pub fn content_mime_type(&self, path: &str) -> Result<Option<String>, StoreError> {
        let mut parsed = ParsedPath::parse(path)?;
        let stores = self.stores.read();
        let data = parsed.resolve(&stores)?;
        Ok(walk(&data.head, &parsed.segments)?.and_then(|node| node.mime_type.clone()))
    }

    /// Copy a local directory tree into the HEAD of `store`, creating the
    /// store when it does not exist. Existing nodes are left untouched.
    /// Returns the number of files imported.
    pub fn import_directory(&self, store: &str, root: &Path) -> Result<usize, StoreError> {
        if !self.stores.read().contains_key(&store_key(store)) {
            self.insert_store(store, StoreType::from_store_name(store))?;
        }

        let mut imported = 0;
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| StoreError::Io(e.to_string()))?;
            let segments: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let Some((name, parents)) = segments.split_last() else {
                continue;
            };

            let kind = if entry.file_type().is_dir() {
                NodeKind::Directory
            } else if entry.file_type().is_file() {
                NodeKind::File
            } else {
                debug!("Skipping special file {:?}", entry.path());
                continue;
            };

            let content = match kind {
                NodeKind::File => {
                    Some(std::fs::read(entry.path()).map_err(|e| StoreError::Io(e.to_string()))?)
                }
                NodeKind::Directory => None,
            };

            let mut stores = self.stores.write();
            let mut parent = ParsedPath {
                store: store.to_string(),
                segments: parents.to_vec(),
            };
            let data = parent.resolve_mut(&mut stores)?;
            let folder = head_folder_mut(data, &parent)?;
            if let Entry::Vacant(slot) = folder.children.entry(child_key(name)) {
                let mut node = MemoryNode::new(name, kind);
                if let Some(bytes) = content {
                    node.length = bytes.len() as u64;
                    node.content_url = Some(self.blobs.write().insert(bytes, 1));
                    imported += 1;
                }
                slot.insert(node);
            }
        }

        info!("Imported {} files from {:?} into store {}", imported, root, store);
        Ok(imported)
    }

    /// Create a store with an explicit type, such as a web project's staging
    /// store whose plain name would classify it as a normal store.
    pub fn create_store_of_type(
        &self,
        name: &str,
        store_type: StoreType,
    ) -> Result<(), StoreError> {
        self.insert_store(name, store_type)
    }

    fn insert_store(&self, name: &str, store_type: StoreType) -> Result<(), StoreError> {
        {
            let mut stores = self.stores.write();
            let key = store_key(name);
            if stores.contains_key(&key) {
                return Err(StoreError::AlreadyExists(name.to_string()));
            }
            let descriptor = StoreDescriptor {
                name: name.to_string(),
                creator: "avmfs".to_string(),
                created: Utc::now(),
                store_type,
            };
            stores.insert(
                key,
                StoreData {
                    descriptor,
                    head: MemoryNode::new("", NodeKind::Directory),
                    snapshots: BTreeMap::new(),
                    next_version: 1,
                },
            );
        }

        info!("Created store {} ({})", name, store_type);
        self.publish(StoreLifecycleEvent::store_created(name, store_type));
        Ok(())
    }

    fn create_node(&self, parent: &str, name: &str, kind: NodeKind) -> Result<(), StoreError> {
        let mut path = ParsedPath::parse(parent)?;
        let mut stores = self.stores.write();
        let data = path.resolve_mut(&mut stores)?;
        let folder = head_folder_mut(data, &path)?;

        let key = child_key(name);
        if folder.children.contains_key(&key) {
            return Err(StoreError::AlreadyExists(path.child(name)));
        }
        folder.modified = Utc::now();
        folder.children.insert(key, MemoryNode::new(name, kind));
        Ok(())
    }

    fn commit_content(&self, path: &str, content: &ContentData) -> Result<(), StoreError> {
        let mut parsed = ParsedPath::parse(path)?;
        let mut stores = self.stores.write();
        let data = parsed.resolve_mut(&mut stores)?;

        if let Some(limit) = self.quota {
            let current = data.head.total_content();
            let previous = walk(&data.head, &parsed.segments)?
                .map(|node| node.length)
                .unwrap_or(0);
            if current.saturating_sub(previous) + content.size > limit {
                return Err(StoreError::QuotaExceeded {
                    path: parsed.canonical(),
                    limit_bytes: limit,
                });
            }
        }

        let node = walk_mut(&mut data.head, &parsed.segments)?
            .ok_or_else(|| StoreError::NotFound(parsed.canonical()))?;
        if node.is_directory() {
            return Err(StoreError::WrongType(parsed.canonical()));
        }

        let mut blobs = self.blobs.write();
        if !blobs.contains(&content.content_url) {
            return Err(StoreError::BadArgument(format!(
                "unknown content {}",
                content.content_url
            )));
        }
        blobs.retain(&content.content_url);
        if let Some(previous) = node.content_url.replace(content.content_url.clone()) {
            blobs.release(&previous);
        }

        node.length = content.size;
        node.mime_type = Some(content.mime_type.clone());
        node.modified = Utc::now();
        Ok(())
    }

    fn blob(&self, url: Option<&String>) -> Arc<Vec<u8>> {
        url.and_then(|url| self.blobs.read().get(url))
            .unwrap_or_default()
    }
}

impl Default for MemoryAvmStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AvmStore for MemoryAvmStore {
    async fn lookup(
        &self,
        version: Version,
        path: &str,
    ) -> Result<Option<NodeDescriptor>, StoreError> {
        let mut parsed = ParsedPath::parse(path)?;
        let stores = self.stores.read();
        let tree = parsed.resolve(&stores)?.tree(version)?;
        Ok(walk(tree, &parsed.segments)?.map(|node| node.descriptor(parsed.canonical())))
    }

    async fn create_directory(&self, parent: &str, name: &str) -> Result<(), StoreError> {
        self.create_node(parent, name, NodeKind::Directory)
    }

    async fn create_file(&self, parent: &str, name: &str) -> Result<(), StoreError> {
        self.create_node(parent, name, NodeKind::File)
    }

    async fn remove_node(&self, parent: &str, name: &str) -> Result<(), StoreError> {
        let mut path = ParsedPath::parse(parent)?;
        let mut stores = self.stores.write();
        let data = path.resolve_mut(&mut stores)?;
        let folder = head_folder_mut(data, &path)?;
        let removed = folder
            .children
            .remove(&child_key(name))
            .ok_or_else(|| StoreError::NotFound(path.child(name)))?;
        folder.modified = Utc::now();
        self.blobs.write().release_tree(&removed);
        Ok(())
    }

    async fn rename(
        &self,
        src_parent: &str,
        src_name: &str,
        dst_parent: &str,
        dst_name: &str,
    ) -> Result<(), StoreError> {
        let mut src = ParsedPath::parse(src_parent)?;
        let mut dst = ParsedPath::parse(dst_parent)?;
        if store_key(&src.store) != store_key(&dst.store) {
            return Err(StoreError::BadArgument(format!(
                "cannot move {} across stores to {}",
                src.child(src_name),
                dst.child(dst_name)
            )));
        }

        let mut stores = self.stores.write();
        let data = src.resolve_mut(&mut stores)?;
        dst.store.clone_from(&src.store);

        let same_entry = src.segments.iter().map(|s| child_key(s)).eq(dst
            .segments
            .iter()
            .map(|s| child_key(s)))
            && child_key(src_name) == child_key(dst_name);
        if !same_entry
            && head_folder_mut(data, &dst)?
                .children
                .contains_key(&child_key(dst_name))
        {
            return Err(StoreError::AlreadyExists(dst.child(dst_name)));
        }

        let mut node = head_folder_mut(data, &src)?
            .children
            .remove(&child_key(src_name))
            .ok_or_else(|| StoreError::NotFound(src.child(src_name)))?;
        node.name = dst_name.to_string();
        node.modified = Utc::now();

        match head_folder_mut(data, &dst) {
            Ok(folder) => {
                folder.children.insert(child_key(dst_name), node);
                Ok(())
            }
            Err(err) => {
                // Destination vanished under a moved folder; put the node back.
                node.name = src_name.to_string();
                head_folder_mut(data, &src)?
                    .children
                    .insert(child_key(src_name), node);
                Err(err)
            }
        }
    }

    async fn get_directory_listing(
        &self,
        version: Version,
        path: &str,
    ) -> Result<Vec<NodeDescriptor>, StoreError> {
        let mut parsed = ParsedPath::parse(path)?;
        let stores = self.stores.read();
        let tree = parsed.resolve(&stores)?.tree(version)?;
        let folder = walk(tree, &parsed.segments)?
            .ok_or_else(|| StoreError::NotFound(parsed.canonical()))?;
        if !folder.is_directory() {
            return Err(StoreError::WrongType(parsed.canonical()));
        }

        Ok(folder
            .children
            .values()
            .map(|child| child.descriptor(parsed.child(&child.name)))
            .collect())
    }

    async fn get_stores(&self) -> Result<Vec<StoreDescriptor>, StoreError> {
        Ok(self
            .stores
            .read()
            .values()
            .map(|data| data.descriptor.clone())
            .collect())
    }

    async fn get_store(&self, name: &str) -> Result<Option<StoreDescriptor>, StoreError> {
        Ok(self
            .stores
            .read()
            .get(&store_key(name))
            .map(|data| data.descriptor.clone()))
    }

    async fn get_store_versions(&self, name: &str) -> Result<Vec<VersionDescriptor>, StoreError> {
        let stores = self.stores.read();
        let data = stores
            .get(&store_key(name))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(data
            .snapshots
            .values()
            .map(|(descriptor, _)| descriptor.clone())
            .collect())
    }

    async fn create_store(&self, name: &str) -> Result<(), StoreError> {
        self.insert_store(name, StoreType::from_store_name(name))
    }

    async fn get_content_reader(
        &self,
        version: Version,
        path: &str,
    ) -> Result<Box<dyn ContentReader>, StoreError> {
        let mut parsed = ParsedPath::parse(path)?;
        let stores = self.stores.read();
        let tree = parsed.resolve(&stores)?.tree(version)?;
        let node = walk(tree, &parsed.segments)?
            .ok_or_else(|| StoreError::NotFound(parsed.canonical()))?;
        if node.is_directory() {
            return Err(StoreError::WrongType(parsed.canonical()));
        }

        Ok(Box::new(MemoryContentReader {
            data: self.blob(node.content_url.as_ref()),
        }))
    }

    async fn get_content_writer(
        &self,
        path: &str,
        overwrite: bool,
    ) -> Result<Box<dyn ContentWriter>, StoreError> {
        let mut parsed = ParsedPath::parse(path)?;
        let stores = self.stores.read();
        let data = parsed.resolve(&stores)?;
        let node = walk(&data.head, &parsed.segments)?
            .ok_or_else(|| StoreError::NotFound(parsed.canonical()))?;
        if node.is_directory() {
            return Err(StoreError::WrongType(parsed.canonical()));
        }

        let initial = if overwrite {
            Vec::new()
        } else {
            self.blob(node.content_url.as_ref()).to_vec()
        };
        let limit = self
            .quota
            .map_or(self.max_file_size, |quota| quota.min(self.max_file_size));

        Ok(Box::new(MemoryContentWriter {
            path: parsed.canonical(),
            data: initial,
            limit,
            blobs: Arc::clone(&self.blobs),
        }))
    }

    async fn set_content_data(&self, path: &str, content: ContentData) -> Result<(), StoreError> {
        let result = self.commit_content(path, &content);
        if result.is_err() {
            self.blobs.write().discard(&content.content_url);
        }
        result
    }
}

struct MemoryContentReader {
    data: Arc<Vec<u8>>,
}

fn slice_at(data: &[u8], offset: u64, len: usize) -> Vec<u8> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let end = start.saturating_add(len).min(data.len());
    data[start..end].to_vec()
}

#[async_trait]
impl ContentReader for MemoryContentReader {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        Ok(slice_at(&self.data, offset, len))
    }
}

struct MemoryContentWriter {
    path: String,
    data: Vec<u8>,
    /// Largest size the content may grow to
    limit: u64,
    blobs: SharedBlobs,
}

impl MemoryContentWriter {
    fn checked_size(&self, size: u64) -> Result<usize, StoreError> {
        if size > self.limit {
            return Err(StoreError::QuotaExceeded {
                path: self.path.clone(),
                limit_bytes: self.limit,
            });
        }
        usize::try_from(size)
            .map_err(|_| StoreError::BadArgument(format!("size {} out of range", size)))
    }
}

#[async_trait]
impl ContentWriter for MemoryContentWriter {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        Ok(slice_at(&self.data, offset, len))
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize, StoreError> {
        let end = offset.checked_add(data.len() as u64).ok_or_else(|| {
            StoreError::BadArgument(format!("write of {} bytes at {}", data.len(), offset))
        })?;
        let end = self.checked_size(end)?;
        let start = end - data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    async fn truncate(&mut self, size: u64) -> Result<(), StoreError> {
        let size = self.checked_size(size)?;
        self.data.resize(size, 0);
        Ok(())
    }

    async fn close(&mut self) -> Result<ContentData, StoreError> {
        let size = self.data.len() as u64;
        let url = self.blobs.write().insert(self.data.clone(), 0);
        Ok(ContentData {
            content_url: url,
            size,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
        })
    }
}

/// Snapshot of transaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionCounts {
    pub begun: usize,
    pub read_only: usize,
    pub committed: usize,
    pub rolled_back: usize,
    pub failed_rollbacks: usize,
}

impl TransactionCounts {
    /// Transactions begun but not yet finished
    pub fn open(&self) -> usize {
        self.begun - self.committed - self.rolled_back - self.failed_rollbacks
    }
}

#[derive(Default)]
struct TransactionCounters {
    begun: AtomicUsize,
    read_only: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    failed_rollbacks: AtomicUsize,
}

/// Transaction manager for [`MemoryAvmStore`]
#[derive(Default)]
pub struct MemoryTransactionManager {
    counters: Arc<TransactionCounters>,
    fail_rollback: AtomicBool,
}

impl MemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent rollback report a failure
    pub fn set_fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    pub fn counts(&self) -> TransactionCounts {
        TransactionCounts {
            begun: self.counters.begun.load(Ordering::SeqCst),
            read_only: self.counters.read_only.load(Ordering::SeqCst),
            committed: self.counters.committed.load(Ordering::SeqCst),
            rolled_back: self.counters.rolled_back.load(Ordering::SeqCst),
            failed_rollbacks: self.counters.failed_rollbacks.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl TransactionManager for MemoryTransactionManager {
    async fn begin(&self, read_only: bool) -> Result<Box<dyn Transaction>, StoreError> {
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        if read_only {
            self.counters.read_only.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Box::new(MemoryTransaction {
            counters: Arc::clone(&self.counters),
            read_only,
            fail_rollback: self.fail_rollback.load(Ordering::SeqCst),
        }))
    }
}

struct MemoryTransaction {
    counters: Arc<TransactionCounters>,
    read_only: bool,
    fail_rollback: bool,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        if self.fail_rollback {
            self.counters.failed_rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Io("rollback failed".to_string()));
        }
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_docs() -> MemoryAvmStore {
        let store = MemoryAvmStore::new();
        store.create_store("main").await.unwrap();
        store.create_directory("main:/", "docs").await.unwrap();
        store.create_file("main:/docs", "readme.txt").await.unwrap();
        store
    }

    async fn write_content(store: &MemoryAvmStore, path: &str, bytes: &[u8]) {
        let mut writer = store.get_content_writer(path, true).await.unwrap();
        writer.write_at(0, bytes).await.unwrap();
        let data = writer.close().await.unwrap();
        store.set_content_data(path, data).await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let store = store_with_docs().await;

        let node = store
            .lookup(Version::Head, "main:/DOCS/Readme.TXT")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.name, "readme.txt");
        assert!(node.is_file());

        let root = store.lookup(Version::Head, "main:/").await.unwrap().unwrap();
        assert!(root.is_directory());

        assert!(store
            .lookup(Version::Head, "main:/missing")
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            store.lookup(Version::Head, "other:/").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.lookup(Version::Id(3), "main:/").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_conflicts() {
        let store = store_with_docs().await;

        assert!(matches!(
            store.create_directory("main:/", "Docs").await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.create_file("main:/docs/readme.txt", "x").await,
            Err(StoreError::WrongType(_))
        ));
        assert!(matches!(
            store.create_file("main:/nowhere", "x").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_content_write_and_snapshot() {
        let store = store_with_docs().await;
        write_content(&store, "main:/docs/readme.txt", b"hello").await;

        assert_eq!(
            store.content_mime_type("main:/docs/readme.txt").unwrap().as_deref(),
            Some(DEFAULT_MIME_TYPE)
        );

        let id = store.create_snapshot("main").unwrap();
        assert_eq!(id, 1);
        write_content(&store, "main:/docs/readme.txt", b"changed").await;

        let old = store
            .get_content_reader(Version::Id(1), "main:/docs/readme.txt")
            .await
            .unwrap();
        assert_eq!(old.read_at(0, 64).await.unwrap(), b"hello");

        let head = store
            .get_content_reader(Version::Head, "main:/docs/readme.txt")
            .await
            .unwrap();
        assert_eq!(head.size(), 7);
        assert_eq!(head.read_at(3, 2).await.unwrap(), b"ng");

        let versions = store.get_store_versions("main").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].id, 1);
    }

    #[tokio::test]
    async fn test_writer_appends_to_existing_content() {
        let store = store_with_docs().await;
        write_content(&store, "main:/docs/readme.txt", b"hello").await;

        let mut writer = store
            .get_content_writer("main:/docs/readme.txt", false)
            .await
            .unwrap();
        assert_eq!(writer.size(), 5);
        writer.write_at(5, b" world").await.unwrap();
        assert_eq!(writer.read_at(0, 11).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_quota() {
        let store = MemoryAvmStore::new().with_quota(8);
        store.create_store("main").await.unwrap();
        store.create_file("main:/", "a.bin").await.unwrap();
        store.create_file("main:/", "b.bin").await.unwrap();
        write_content(&store, "main:/a.bin", b"12345").await;

        // A single writer cannot grow past the quota
        let mut writer = store.get_content_writer("main:/b.bin", true).await.unwrap();
        assert!(matches!(
            writer.write_at(0, b"too large").await,
            Err(StoreError::QuotaExceeded { limit_bytes: 8, .. })
        ));

        // The store total is checked when the content is committed
        writer.write_at(0, b"6789").await.unwrap();
        let data = writer.close().await.unwrap();
        assert_eq!(store.blob_count(), 2);
        assert!(matches!(
            store.set_content_data("main:/b.bin", data).await,
            Err(StoreError::QuotaExceeded { limit_bytes: 8, .. })
        ));
        assert_eq!(store.blob_count(), 1);

        // The writer keeps its content, so a smaller retry can commit
        writer.truncate(3).await.unwrap();
        let data = writer.close().await.unwrap();
        store.set_content_data("main:/b.bin", data).await.unwrap();
        assert_eq!(store.blob_bytes(), 8);
    }

    #[tokio::test]
    async fn test_writer_rejects_out_of_range_offsets() {
        let store = store_with_docs().await.with_max_file_size(1024);
        let mut writer = store
            .get_content_writer("main:/docs/readme.txt", true)
            .await
            .unwrap();

        assert!(matches!(
            writer.write_at(u64::MAX - 1, b"xx").await,
            Err(StoreError::BadArgument(_))
        ));
        assert!(matches!(
            writer.write_at(1 << 40, b"x").await,
            Err(StoreError::QuotaExceeded { limit_bytes: 1024, .. })
        ));
        assert!(matches!(
            writer.truncate(u64::MAX).await,
            Err(StoreError::QuotaExceeded { .. })
        ));
        assert_eq!(writer.size(), 0);

        writer.write_at(1020, b"tail").await.unwrap();
        assert_eq!(writer.size(), 1024);
    }

    #[tokio::test]
    async fn test_blobs_follow_node_lifetime() {
        let store = store_with_docs().await;
        let path = "main:/docs/readme.txt";

        // Appending in chunks keeps a single copy of the content
        let chunk = [7u8; 1024];
        for i in 0..100u64 {
            let mut writer = store.get_content_writer(path, false).await.unwrap();
            writer.write_at(i * 1024, &chunk).await.unwrap();
            let data = writer.close().await.unwrap();
            store.set_content_data(path, data).await.unwrap();
        }
        assert_eq!(store.blob_count(), 1);
        assert_eq!(store.blob_bytes(), 100 * 1024);

        // A snapshot keeps the old content alive after HEAD is rewritten
        store.create_snapshot("main").unwrap();
        write_content(&store, path, b"small").await;
        assert_eq!(store.blob_count(), 2);
        store.purge_version("main", 1).unwrap();
        assert_eq!(store.blob_count(), 1);
        assert_eq!(store.blob_bytes(), 5);

        store.remove_node("main:/docs", "readme.txt").await.unwrap();
        assert_eq!(store.blob_count(), 0);

        store.create_file("main:/docs", "b.txt").await.unwrap();
        write_content(&store, "main:/docs/b.txt", b"bee").await;
        store.create_snapshot("main").unwrap();
        store.purge_store("main").unwrap();
        assert_eq!(store.blob_count(), 0);
        assert_eq!(store.blob_bytes(), 0);
    }

    #[tokio::test]
    async fn test_store_names_are_case_insensitive() {
        let store = MemoryAvmStore::new();
        store.create_store("Main").await.unwrap();
        store.create_directory("MAIN:/", "docs").await.unwrap();

        assert!(matches!(
            store.create_store("main").await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(
            store.get_store("main").await.unwrap().unwrap().name,
            "Main"
        );

        let node = store
            .lookup(Version::Head, "main:/Docs")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.path, "Main:/docs");

        assert_eq!(store.create_snapshot("mAiN").unwrap(), 1);
        let versions = store.get_store_versions("main").await.unwrap();
        assert_eq!(versions[0].store, "Main");

        store
            .rename("main:/", "docs", "MAIN:/", "papers")
            .await
            .unwrap();
        let listing = store
            .get_directory_listing(Version::Id(1), "MAIN:/")
            .await
            .unwrap();
        assert_eq!(listing[0].path, "Main:/docs");

        store.purge_store("MAIN").unwrap();
        assert!(store.get_stores().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_and_listing() {
        let store = store_with_docs().await;
        store.create_file("main:/docs", "b.txt").await.unwrap();

        assert!(matches!(
            store.rename("main:/docs", "b.txt", "main:/docs", "README.txt").await,
            Err(StoreError::AlreadyExists(_))
        ));

        store
            .rename("main:/docs", "b.txt", "main:/", "moved.txt")
            .await
            .unwrap();
        store
            .rename("main:/docs", "readme.txt", "main:/docs", "README.txt")
            .await
            .unwrap();

        let names: Vec<String> = store
            .get_directory_listing(Version::Head, "main:/")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["docs", "moved.txt"]);

        let docs = store
            .get_directory_listing(Version::Head, "main:/docs")
            .await
            .unwrap();
        assert_eq!(docs[0].name, "README.txt");
        assert_eq!(docs[0].path, "main:/docs/README.txt");
    }

    #[tokio::test]
    async fn test_lifecycle_events_published() {
        let bus = LifecycleEventBus::new(16);
        let mut receiver = bus.subscribe();
        let store = MemoryAvmStore::new().with_event_bus(bus);

        store.create_store("web").await.unwrap();
        store.create_snapshot("web").unwrap();
        store.purge_version("web", 1).unwrap();
        store.purge_store("web").unwrap();

        assert!(matches!(
            receiver.try_recv(),
            Ok(StoreLifecycleEvent::StoreCreated { .. })
        ));
        assert!(matches!(
            receiver.try_recv(),
            Ok(StoreLifecycleEvent::VersionCreated { id: 1, .. })
        ));
        assert!(matches!(
            receiver.try_recv(),
            Ok(StoreLifecycleEvent::VersionPurged { id: 1, .. })
        ));
        assert!(matches!(
            receiver.try_recv(),
            Ok(StoreLifecycleEvent::StorePurged { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_types() {
        let store = MemoryAvmStore::new();
        store.create_store("web--alice").await.unwrap();
        store.create_store_of_type("web", StoreType::WebStagingMain).unwrap();

        let types: Vec<(String, StoreType)> = store
            .get_stores()
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.name, s.store_type))
            .collect();
        assert_eq!(
            types,
            vec![
                ("web".to_string(), StoreType::WebStagingMain),
                ("web--alice".to_string(), StoreType::WebAuthorMain),
            ]
        );
    }

    #[test]
    fn test_import_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("a.txt"), b"alpha").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();

        let store = MemoryAvmStore::new();
        let imported = store.import_directory("site", dir.path()).unwrap();
        assert_eq!(imported, 2);

        let reader =
            tokio_test::block_on(store.get_content_reader(Version::Head, "site:/docs/a.txt"))
                .unwrap();
        assert_eq!(tokio_test::block_on(reader.read_at(0, 16)).unwrap(), b"alpha");
        assert!(tokio_test::block_on(store.lookup(Version::Head, "site:/docs"))
            .unwrap()
            .is_some_and(|node| node.is_directory()));
    }

    #[tokio::test]
    async fn test_transaction_counts() {
        let txn = MemoryTransactionManager::new();
        let first = txn.begin(true).await.unwrap();
        assert!(first.is_read_only());
        first.commit().await.unwrap();

        let second = txn.begin(false).await.unwrap();
        assert_eq!(txn.counts().open(), 1);
        second.rollback().await.unwrap();

        let counts = txn.counts();
        assert_eq!(counts.begun, 2);
        assert_eq!(counts.read_only, 1);
        assert_eq!(counts.committed, 1);
        assert_eq!(counts.rolled_back, 1);
        assert_eq!(counts.open(), 0);
    }
}
