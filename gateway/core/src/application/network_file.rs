// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Network File Handle
//!
//! Random-access file semantics over the store's single-channel content
//! readers and writers. A handle starts without a channel and opens one on
//! first use:
//!
//! ```text
//! Unopened --read--> Read --write--> Write --close--> Closed
//!     \______________write_____________/
//! ```
//!
//! A write channel is never downgraded back to a read channel. Closing a
//! handle that holds a write channel commits the written content to the node.

use crate::application::disk_interface::SeekOrigin;
use crate::domain::constants::guess_mime_type;
use crate::domain::errors::{map_store_error, DiskError};
use crate::domain::file_info::{AccessMode, FileInfo};
use crate::domain::pseudo_file::PseudoFolderHandle;
use crate::domain::store::{AvmStore, ContentReader, ContentWriter, NodeDescriptor};
use crate::domain::store_path::Version;
use std::sync::Arc;
use tracing::debug;

enum ChannelState {
    Unopened,
    Read(Box<dyn ContentReader>),
    Write(Box<dyn ContentWriter>),
    Closed,
}

impl ChannelState {
    fn label(&self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::Closed => "closed",
        }
    }
}

/// Open file or folder on a real store node
pub struct AvmNetworkFile {
    store: Arc<dyn AvmStore>,
    node: NodeDescriptor,
    share_path: String,
    canonical_path: String,
    version: Version,
    access: AccessMode,
    mime_type: &'static str,
    channel: ChannelState,
    position: u64,
    size: u64,
    delete_on_close: bool,
}

impl std::fmt::Debug for AvmNetworkFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvmNetworkFile")
            .field("share_path", &self.share_path)
            .field("canonical_path", &self.canonical_path)
            .field("version", &self.version)
            .field("access", &self.access)
            .field("channel", &self.channel.label())
            .field("position", &self.position)
            .field("size", &self.size)
            .finish()
    }
}

impl AvmNetworkFile {
    pub fn new(
        store: Arc<dyn AvmStore>,
        node: NodeDescriptor,
        share_path: impl Into<String>,
        version: Version,
        access: AccessMode,
    ) -> Self {
        let mime_type = guess_mime_type(&node.name);
        let size = if node.is_directory() { 0 } else { node.length };
        Self {
            store,
            canonical_path: node.path.clone(),
            node,
            share_path: share_path.into(),
            version,
            access,
            mime_type,
            channel: ChannelState::Unopened,
            position: 0,
            size,
            delete_on_close: false,
        }
    }

    pub fn share_path(&self) -> &str {
        &self.share_path
    }

    pub fn canonical_path(&self) -> &str {
        &self.canonical_path
    }

    pub fn node(&self) -> &NodeDescriptor {
        &self.node
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_directory(&self) -> bool {
        self.node.is_directory()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.channel, ChannelState::Closed)
    }

    pub fn has_read_channel(&self) -> bool {
        matches!(self.channel, ChannelState::Read(_))
    }

    pub fn has_write_channel(&self) -> bool {
        matches!(self.channel, ChannelState::Write(_))
    }

    pub fn delete_on_close(&self) -> bool {
        self.delete_on_close
    }

    pub fn set_delete_on_close(&mut self, delete: bool) {
        self.delete_on_close = delete;
    }

    /// Current information, with the size seen through the open channel
    pub fn file_info(&self, file_id: u64, read_only: bool) -> FileInfo {
        let mut info = FileInfo::for_node(&self.node, &self.node.name, file_id, read_only);
        if !self.is_directory() {
            info.set_size(self.size);
        }
        info
    }

    /// Make sure a channel suitable for reading (or writing) is open.
    ///
    /// `truncate` opens a write channel on empty content and resets the
    /// position.
    pub async fn open_content(&mut self, write: bool, truncate: bool) -> Result<(), DiskError> {
        if self.is_directory() {
            return Err(DiskError::AccessDenied(format!(
                "{} is a directory",
                self.share_path
            )));
        }

        let open_writer = match (&self.channel, write) {
            (ChannelState::Closed, _) => {
                return Err(DiskError::FileClosed(self.share_path.clone()))
            }
            (ChannelState::Write(_), _) | (ChannelState::Read(_), false) => return Ok(()),
            (ChannelState::Unopened, false) => false,
            (ChannelState::Unopened, true) | (ChannelState::Read(_), true) => true,
        };

        if !open_writer {
            let reader = self
                .store
                .get_content_reader(self.version, &self.canonical_path)
                .await
                .map_err(|e| map_store_error(e, &self.share_path))?;
            self.size = reader.size();
            self.channel = ChannelState::Read(reader);
            debug!("Opened read channel on {}", self.canonical_path);
            return Ok(());
        }

        if !self.access.allows_write() {
            return Err(DiskError::AccessDenied(format!(
                "{} is open read-only",
                self.share_path
            )));
        }
        let writer = self
            .store
            .get_content_writer(&self.canonical_path, truncate)
            .await
            .map_err(|e| map_store_error(e, &self.share_path))?;
        if truncate {
            self.position = 0;
        }
        self.size = writer.size();
        self.channel = ChannelState::Write(writer);
        debug!(
            "Opened write channel on {} (overwrite={})",
            self.canonical_path, truncate
        );
        Ok(())
    }

    pub async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, DiskError> {
        self.open_content(false, false).await?;

        let data = match &self.channel {
            ChannelState::Read(reader) => reader.read_at(offset, buf.len()).await,
            ChannelState::Write(writer) => writer.read_at(offset, buf.len()).await,
            _ => return Err(DiskError::FileClosed(self.share_path.clone())),
        }
        .map_err(|e| map_store_error(e, &self.share_path))?;

        let count = data.len().min(buf.len());
        buf[..count].copy_from_slice(&data[..count]);
        self.position = offset + count as u64;
        Ok(count)
    }

    pub async fn write(&mut self, data: &[u8], offset: u64) -> Result<usize, DiskError> {
        self.open_content(true, false).await?;

        let ChannelState::Write(writer) = &mut self.channel else {
            return Err(DiskError::FileClosed(self.share_path.clone()));
        };
        let written = writer
            .write_at(offset, data)
            .await
            .map_err(|e| map_store_error(e, &self.share_path))?;
        self.size = writer.size();
        self.position = offset + written as u64;
        Ok(written)
    }

    pub async fn seek(&mut self, pos: i64, origin: SeekOrigin) -> Result<u64, DiskError> {
        self.open_content(false, false).await?;

        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => self.position,
            SeekOrigin::End => self.size,
        };
        let target = i128::from(base) + i128::from(pos);
        self.position = u64::try_from(target).map_err(|_| {
            DiskError::Io(format!("{}: invalid seek to {}", self.share_path, target))
        })?;
        Ok(self.position)
    }

    pub async fn truncate(&mut self, size: u64) -> Result<(), DiskError> {
        if size == 0 && matches!(self.channel, ChannelState::Unopened) {
            return self.open_content(true, true).await;
        }

        self.open_content(true, false).await?;
        let ChannelState::Write(writer) = &mut self.channel else {
            return Err(DiskError::FileClosed(self.share_path.clone()));
        };
        writer
            .truncate(size)
            .await
            .map_err(|e| map_store_error(e, &self.share_path))?;
        self.size = size;
        self.position = self.position.min(size);
        Ok(())
    }

    /// Release the channel, committing written content. Returns true when
    /// content was committed. A failed commit keeps the write channel open
    /// so the caller can shrink the content and close again.
    pub async fn close(&mut self) -> Result<bool, DiskError> {
        let ChannelState::Write(writer) = &mut self.channel else {
            self.channel = ChannelState::Closed;
            return Ok(false);
        };

        let mut data = writer
            .close()
            .await
            .map_err(|e| map_store_error(e, &self.share_path))?;
        data.mime_type = self.mime_type.to_string();
        let size = data.size;
        self.store
            .set_content_data(&self.canonical_path, data)
            .await
            .map_err(|e| map_store_error(e, &self.share_path))?;

        self.channel = ChannelState::Closed;
        self.size = size;
        debug!("Committed content of {} ({} bytes)", self.canonical_path, size);
        Ok(true)
    }
}

/// Handle returned by open on a file or folder
#[derive(Debug)]
pub enum NetworkFile {
    Avm(AvmNetworkFile),
    /// Placeholder for a synthetic store or version folder
    PseudoFolder(PseudoFolderHandle),
}

impl NetworkFile {
    pub fn share_path(&self) -> &str {
        match self {
            Self::Avm(file) => file.share_path(),
            Self::PseudoFolder(handle) => handle.path(),
        }
    }

    pub fn is_directory(&self) -> bool {
        match self {
            Self::Avm(file) => file.is_directory(),
            Self::PseudoFolder(_) => true,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Avm(file) => file.is_closed(),
            Self::PseudoFolder(handle) => handle.is_closed(),
        }
    }

    pub fn as_avm(&self) -> Option<&AvmNetworkFile> {
        match self {
            Self::Avm(file) => Some(file),
            Self::PseudoFolder(_) => None,
        }
    }

    pub fn as_avm_mut(&mut self) -> Option<&mut AvmNetworkFile> {
        match self {
            Self::Avm(file) => Some(file),
            Self::PseudoFolder(_) => None,
        }
    }
}
