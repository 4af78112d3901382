// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Filesystem contract served to file-sharing protocol sessions
//!
//! A protocol server resolves a share to a [`TreeConnection`] through the
//! share mapper and then drives every file operation through
//! [`DiskInterface`]. Paths are share-relative and may use either `\` or
//! `/` as separator.

use crate::application::network_file::NetworkFile;
use crate::domain::context::AvmContext;
use crate::domain::errors::DiskError;
use crate::domain::file_info::{FileAttributes, FileInfo, FileOpenParams, FileStatus, SetFileInfo};
use crate::domain::search::SearchContext;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Origin of a seek on an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// A share resolved for one session
#[derive(Debug, Clone)]
pub struct TreeConnection {
    share_name: String,
    context: Arc<AvmContext>,
}

impl TreeConnection {
    pub fn new(share_name: impl Into<String>, context: Arc<AvmContext>) -> Self {
        Self {
            share_name: share_name.into(),
            context,
        }
    }

    pub fn share_name(&self) -> &str {
        &self.share_name
    }

    pub fn context(&self) -> &Arc<AvmContext> {
        &self.context
    }
}

/// Share created on demand for the lifetime of one session
#[derive(Debug, Clone)]
pub struct DynamicShare {
    pub name: String,
    pub context: Arc<AvmContext>,
}

/// One protocol session
#[derive(Debug)]
pub struct SrvSession {
    id: Uuid,
    user: String,
    dynamic_shares: Vec<DynamicShare>,
}

impl SrvSession {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: user.into(),
            dynamic_shares: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Dynamic share previously created in this session
    pub fn find_dynamic_share(&self, name: &str) -> Option<&DynamicShare> {
        self.dynamic_shares
            .iter()
            .find(|share| share.name.eq_ignore_ascii_case(name))
    }

    pub fn add_dynamic_share(&mut self, share: DynamicShare) {
        self.dynamic_shares.push(share);
    }

    pub fn dynamic_shares(&self) -> &[DynamicShare] {
        &self.dynamic_shares
    }

    pub(crate) fn take_dynamic_shares(&mut self) -> Vec<DynamicShare> {
        std::mem::take(&mut self.dynamic_shares)
    }
}

/// Filesystem operations on a connected share
#[async_trait]
pub trait DiskInterface: Send + Sync {
    async fn create_directory(
        &self,
        tree: &TreeConnection,
        params: &FileOpenParams,
    ) -> Result<(), DiskError>;

    /// Create an empty file and return it opened for read/write
    async fn create_file(
        &self,
        tree: &TreeConnection,
        params: &FileOpenParams,
    ) -> Result<NetworkFile, DiskError>;

    async fn open_file(
        &self,
        tree: &TreeConnection,
        params: &FileOpenParams,
    ) -> Result<NetworkFile, DiskError>;

    /// Commit pending content and release the handle. Closing twice is a no-op.
    async fn close_file(&self, tree: &TreeConnection, file: &mut NetworkFile)
        -> Result<(), DiskError>;

    async fn read_file(
        &self,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, DiskError>;

    async fn write_file(
        &self,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        data: &[u8],
        offset: u64,
    ) -> Result<usize, DiskError>;

    async fn seek_file(
        &self,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        pos: i64,
        origin: SeekOrigin,
    ) -> Result<u64, DiskError>;

    async fn truncate_file(
        &self,
        tree: &TreeConnection,
        file: &mut NetworkFile,
        size: u64,
    ) -> Result<(), DiskError>;

    async fn flush_file(&self, tree: &TreeConnection, file: &mut NetworkFile)
        -> Result<(), DiskError>;

    async fn delete_file(&self, tree: &TreeConnection, path: &str) -> Result<(), DiskError>;

    async fn delete_directory(&self, tree: &TreeConnection, path: &str) -> Result<(), DiskError>;

    async fn rename_file(
        &self,
        tree: &TreeConnection,
        old_path: &str,
        new_path: &str,
    ) -> Result<(), DiskError>;

    async fn file_exists(&self, tree: &TreeConnection, path: &str) -> FileStatus;

    /// Information for `path`, `None` when nothing exists there
    async fn get_file_information(
        &self,
        tree: &TreeConnection,
        path: &str,
    ) -> Result<Option<FileInfo>, DiskError>;

    async fn set_file_information(
        &self,
        tree: &TreeConnection,
        path: &str,
        info: &SetFileInfo,
    ) -> Result<(), DiskError>;

    /// Start a search. A final path segment containing `*` or `?` lists the
    /// parent folder filtered by that pattern; any other path yields at most
    /// the single entry it names.
    async fn start_search(
        &self,
        tree: &TreeConnection,
        path: &str,
        attributes: FileAttributes,
    ) -> Result<Box<dyn SearchContext>, DiskError>;

    fn is_read_only(&self, tree: &TreeConnection) -> bool;

    fn tree_opened(&self, session: &SrvSession, tree: &TreeConnection);

    fn tree_closed(&self, session: &SrvSession, tree: &TreeConnection);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store_path::Version;
    use std::time::Duration;

    #[test]
    fn test_session_dynamic_share_lookup() {
        let mut session = SrvSession::new("alice");
        assert!(session.find_dynamic_share("main_2").is_none());

        let context = Arc::new(AvmContext::single_store(
            "main_2",
            "main",
            Version::Id(2),
            Duration::from_secs(60),
        ));
        session.add_dynamic_share(DynamicShare {
            name: "main_2".to_string(),
            context: Arc::clone(&context),
        });

        let found = session.find_dynamic_share("MAIN_2").unwrap();
        assert!(Arc::ptr_eq(&found.context, &context));
        assert_eq!(session.take_dynamic_shares().len(), 1);
        assert!(session.dynamic_shares().is_empty());
    }
}
