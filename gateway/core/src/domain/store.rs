// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! AVM Store Collaborator - Anti-Corruption Layer for the versioned store
//!
//! Abstracts the transactional, versioned content store behind async traits
//! so the disk driver never depends on a concrete backend. Every call is
//! expected to run inside a caller-managed transaction obtained from the
//! [`TransactionManager`].
//!
//! Store paths use the store's native syntax, `<store>:/<path>`.

use crate::domain::store_path::Version;
use crate::domain::store_type::StoreType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Node type in the store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Snapshot of a node at a version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Store-addressed path of the node
    pub path: String,
    /// Name of the node within its parent
    pub name: String,
    pub kind: NodeKind,
    /// Content length in bytes (0 for directories)
    pub length: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
}

impl NodeDescriptor {
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// Store summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreDescriptor {
    pub name: String,
    pub creator: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub store_type: StoreType,
}

/// Snapshot summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionDescriptor {
    pub store: String,
    pub id: u32,
    pub created: DateTime<Utc>,
    pub tag: Option<String>,
}

/// Descriptor of committed content, returned when a writer closes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentData {
    pub content_url: String,
    pub size: u64,
    pub mime_type: String,
}

/// Store errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Wrong node type: {0}")]
    WrongType(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Content quota exceeded: path={path}, limit={limit_bytes}")]
    QuotaExceeded { path: String, limit_bytes: u64 },

    #[error("Node is locked: {0}")]
    Locked(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Bad argument: {0}")]
    BadArgument(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Sequential read channel over one content version
#[async_trait]
pub trait ContentReader: Send + Sync {
    fn size(&self) -> u64;

    /// Read up to `len` bytes at `offset`; short at end of content
    async fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, StoreError>;
}

/// Writable content channel
///
/// Closing the writer yields the [`ContentData`] that must be committed to
/// the node with [`AvmStore::set_content_data`]. The writer keeps its
/// content after `close`, so a failed commit can be retried with a fresh
/// `close`.
#[async_trait]
pub trait ContentWriter: Send + Sync {
    fn size(&self) -> u64;

    async fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, StoreError>;

    /// Write `data` at `offset`, growing the content as needed. Growth past
    /// the store's size limit fails with `QuotaExceeded`.
    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize, StoreError>;

    async fn truncate(&mut self, size: u64) -> Result<(), StoreError>;

    async fn close(&mut self) -> Result<ContentData, StoreError>;
}

/// Versioned content store
///
/// Lookups of a missing node answer `Ok(None)`; a missing store or version
/// is `StoreError::NotFound`.
#[async_trait]
pub trait AvmStore: Send + Sync {
    async fn lookup(
        &self,
        version: Version,
        path: &str,
    ) -> Result<Option<NodeDescriptor>, StoreError>;

    /// Create a folder `name` under the HEAD folder `parent`
    async fn create_directory(&self, parent: &str, name: &str) -> Result<(), StoreError>;

    /// Create an empty file `name` under the HEAD folder `parent`
    async fn create_file(&self, parent: &str, name: &str) -> Result<(), StoreError>;

    async fn remove_node(&self, parent: &str, name: &str) -> Result<(), StoreError>;

    async fn rename(
        &self,
        src_parent: &str,
        src_name: &str,
        dst_parent: &str,
        dst_name: &str,
    ) -> Result<(), StoreError>;

    /// Children of a folder, ordered by name
    async fn get_directory_listing(
        &self,
        version: Version,
        path: &str,
    ) -> Result<Vec<NodeDescriptor>, StoreError>;

    async fn get_stores(&self) -> Result<Vec<StoreDescriptor>, StoreError>;

    async fn get_store(&self, name: &str) -> Result<Option<StoreDescriptor>, StoreError>;

    /// Snapshots of a store, ordered by id. HEAD is not included.
    async fn get_store_versions(&self, name: &str) -> Result<Vec<VersionDescriptor>, StoreError>;

    async fn create_store(&self, name: &str) -> Result<(), StoreError>;

    async fn get_content_reader(
        &self,
        version: Version,
        path: &str,
    ) -> Result<Box<dyn ContentReader>, StoreError>;

    /// Writer on the HEAD content of `path`. With `overwrite` the writer
    /// starts empty, otherwise it starts with the current content.
    async fn get_content_writer(
        &self,
        path: &str,
        overwrite: bool,
    ) -> Result<Box<dyn ContentWriter>, StoreError>;

    /// Commit closed writer content to the HEAD node at `path`. Content that
    /// fails to commit is discarded by the store.
    async fn set_content_data(&self, path: &str, data: ContentData) -> Result<(), StoreError>;
}

/// One open transaction
#[async_trait]
pub trait Transaction: Send {
    fn is_read_only(&self) -> bool;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self, read_only: bool) -> Result<Box<dyn Transaction>, StoreError>;
}
