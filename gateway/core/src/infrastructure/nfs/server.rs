// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! NFS Server Implementation
//!
//! Provides a user-space NFSv3 server using the nfsserve crate as transport
//! for one AVM share.
//!
//! ## Architecture
//!
//! ### Component Responsibilities
//! - **AvmNfsAdapter**: Implements `nfsserve::NFSFileSystem`
//!   - Maps NFSv3 RPC operations (LOOKUP, GETATTR, READ, WRITE, READDIR,
//!     CREATE, MKDIR, REMOVE, RENAME, SETATTR) onto [`DiskInterface`]
//!   - Keeps `fileid3` values stable through [`FileHandleTable`]
//!   - Translates [`DiskError`] into `nfsstat3`
//! - **NfsServer**: Manages server lifecycle and TCP listener
//!   - Spawns a tokio task running `nfsserve::tcp::NFSTcp`
//!   - Stops by aborting that task
//!
//! ## Content Commit
//! NFSv3 has no close. Every READ and WRITE opens a network file, performs
//! the single transfer and closes it, so each WRITE is committed to the
//! store before the reply is sent.

use crate::application::disk_driver::AvmDiskDriver;
use crate::application::disk_interface::{DiskInterface, TreeConnection};
use crate::application::network_file::NetworkFile;
use crate::domain::errors::DiskError;
use crate::domain::file_info::{FileAttributes, FileInfo, FileOpenParams, FileStatus};
use crate::domain::store_path::{join_share_path, split_share_path};
use crate::infrastructure::nfs::file_handle::{FileHandleTable, ROOT_FILE_ID};
use chrono::{DateTime, Utc};
use nfsserve::nfs::{
    fattr3, fileid3, filename3, ftype3, nfspath3, nfsstat3, nfsstring, nfstime3, sattr3,
    set_size3, specdata3,
};
use nfsserve::tcp::{NFSTcp, NFSTcpListener};
use nfsserve::vfs::{self, NFSFileSystem, VFSCapabilities};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// NFS server errors
#[derive(Debug, Error)]
pub enum NfsServerError {
    #[error("Failed to bind to {address}: {error}")]
    BindFailed { address: String, error: String },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(fileid3),
}

/// Filesystem error to NFSv3 status
pub fn nfs_status(err: &DiskError) -> nfsstat3 {
    match err {
        DiskError::FileNotFound(_) => nfsstat3::NFS3ERR_NOENT,
        DiskError::PathNotFound(_) => nfsstat3::NFS3ERR_NOTDIR,
        DiskError::AccessDenied(_) => nfsstat3::NFS3ERR_ACCES,
        DiskError::FileExists(_) => nfsstat3::NFS3ERR_EXIST,
        DiskError::DirectoryNotEmpty(_) => nfsstat3::NFS3ERR_NOTEMPTY,
        DiskError::DiskFull(_) => nfsstat3::NFS3ERR_NOSPC,
        DiskError::InvalidContext(_) | DiskError::FileClosed(_) | DiskError::Io(_) => {
            nfsstat3::NFS3ERR_IO
        }
    }
}

fn nfs_time(time: DateTime<Utc>) -> nfstime3 {
    nfstime3 {
        seconds: u32::try_from(time.timestamp()).unwrap_or(0),
        nseconds: time.timestamp_subsec_nanos(),
    }
}

/// Build NFS attributes for a file
fn to_fattr3(info: &FileInfo, fileid: fileid3) -> fattr3 {
    let directory = info.is_directory();
    let mode = match (directory, info.is_read_only()) {
        (true, false) => 0o755,
        (true, true) => 0o555,
        (false, false) => 0o644,
        (false, true) => 0o444,
    };

    fattr3 {
        ftype: if directory {
            ftype3::NF3DIR
        } else {
            ftype3::NF3REG
        },
        mode,
        nlink: if directory { 2 } else { 1 },
        uid: 0,
        gid: 0,
        size: info.size,
        used: info.allocation_size,
        rdev: specdata3 {
            specdata1: 0,
            specdata2: 0,
        },
        fsid: 0,
        fileid,
        atime: nfs_time(info.accessed),
        mtime: nfs_time(info.modified),
        ctime: nfs_time(info.created),
    }
}

fn file_name(name: &filename3) -> Result<&str, nfsstat3> {
    std::str::from_utf8(name).map_err(|_| nfsstat3::NFS3ERR_INVAL)
}

/// NFS file system adapter for one share
pub struct AvmNfsAdapter {
    driver: Arc<AvmDiskDriver>,
    tree: TreeConnection,
    handles: Arc<FileHandleTable>,
}

impl AvmNfsAdapter {
    /// Adapter for `tree`. Store and version folders dropped from a virtual
    /// view are forgotten by the file id table as they go.
    pub fn new(driver: Arc<AvmDiskDriver>, tree: TreeConnection) -> Self {
        let handles = Arc::new(FileHandleTable::new());
        tree.context().set_change_notifier(handles.clone());
        Self {
            driver,
            tree,
            handles,
        }
    }

    pub fn tree(&self) -> &TreeConnection {
        &self.tree
    }

    fn path_of(&self, id: fileid3) -> Result<String, nfsstat3> {
        self.handles.path(id).ok_or_else(|| {
            warn!("{}", NfsServerError::InvalidHandle(id));
            nfsstat3::NFS3ERR_STALE
        })
    }

    fn child_path(&self, dirid: fileid3, name: &filename3) -> Result<String, nfsstat3> {
        let parent = self.path_of(dirid)?;
        Ok(join_share_path(&parent, file_name(name)?))
    }

    /// Close `file`, reporting the first error of `result` or the close
    async fn finish<T>(
        &self,
        file: &mut NetworkFile,
        result: Result<T, DiskError>,
    ) -> Result<T, nfsstat3> {
        let closed = self.driver.close_file(&self.tree, file).await;
        let value = result.map_err(|e| nfs_status(&e))?;
        closed.map_err(|e| nfs_status(&e))?;
        Ok(value)
    }
}

#[async_trait::async_trait]
impl NFSFileSystem for AvmNfsAdapter {
    fn root_dir(&self) -> fileid3 {
        ROOT_FILE_ID
    }

    fn capabilities(&self) -> VFSCapabilities {
        if self.driver.is_read_only(&self.tree) {
            VFSCapabilities::ReadOnly
        } else {
            VFSCapabilities::ReadWrite
        }
    }

    async fn lookup(&self, dirid: fileid3, filename: &filename3) -> Result<fileid3, nfsstat3> {
        debug!("NFS LOOKUP: dirid={}, filename={:?}", dirid, filename);
        let name = file_name(filename)?;
        let parent = self.path_of(dirid)?;

        let path = match name {
            "." => return Ok(dirid),
            ".." => split_share_path(&parent).0,
            _ => join_share_path(&parent, name),
        };
        match self.driver.file_exists(&self.tree, &path).await {
            FileStatus::NotExist => Err(nfsstat3::NFS3ERR_NOENT),
            _ => Ok(self.handles.register(&path)),
        }
    }

    async fn getattr(&self, id: fileid3) -> Result<fattr3, nfsstat3> {
        debug!("NFS GETATTR: id={}", id);
        let path = self.path_of(id)?;
        let info = self
            .driver
            .get_file_information(&self.tree, &path)
            .await
            .map_err(|e| nfs_status(&e))?
            .ok_or(nfsstat3::NFS3ERR_NOENT)?;
        Ok(to_fattr3(&info, id))
    }

    async fn setattr(&self, id: fileid3, setattr: sattr3) -> Result<fattr3, nfsstat3> {
        debug!("NFS SETATTR: id={}", id);
        if let set_size3::size(size) = setattr.size {
            let path = self.path_of(id)?;
            let mut file = self
                .driver
                .open_file(&self.tree, &FileOpenParams::read_write(path))
                .await
                .map_err(|e| nfs_status(&e))?;
            let result = self.driver.truncate_file(&self.tree, &mut file, size).await;
            self.finish(&mut file, result).await?;
        }
        self.getattr(id).await
    }

    async fn read(
        &self,
        id: fileid3,
        offset: u64,
        count: u32,
    ) -> Result<(Vec<u8>, bool), nfsstat3> {
        debug!("NFS READ: id={}, offset={}, count={}", id, offset, count);
        let path = self.path_of(id)?;
        let mut file = self
            .driver
            .open_file(&self.tree, &FileOpenParams::read_only(path))
            .await
            .map_err(|e| nfs_status(&e))?;

        // Never allocate past the end of the file, whatever the client asks for
        let remaining = file
            .as_avm()
            .map_or(0, |f| f.size())
            .saturating_sub(offset);
        let len = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(count as usize);
        let mut buf = vec![0u8; len];
        let result = self
            .driver
            .read_file(&self.tree, &mut file, &mut buf, offset)
            .await;
        let size = file.as_avm().map_or(0, |f| f.size());
        let read = self.finish(&mut file, result).await?;

        buf.truncate(read);
        let eof = offset.saturating_add(read as u64) >= size;
        Ok((buf, eof))
    }

    async fn write(&self, id: fileid3, offset: u64, data: &[u8]) -> Result<fattr3, nfsstat3> {
        debug!("NFS WRITE: id={}, offset={}, len={}", id, offset, data.len());
        let path = self.path_of(id)?;
        let mut file = self
            .driver
            .open_file(&self.tree, &FileOpenParams::read_write(path))
            .await
            .map_err(|e| nfs_status(&e))?;

        let result = self
            .driver
            .write_file(&self.tree, &mut file, data, offset)
            .await;
        self.finish(&mut file, result).await.map_err(|status| {
            error!("NFS write failed for id {}: {:?}", id, status);
            status
        })?;
        self.getattr(id).await
    }

    async fn create(
        &self,
        dirid: fileid3,
        filename: &filename3,
        attr: sattr3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        debug!("NFS CREATE: dirid={}, filename={:?}", dirid, filename);
        let path = self.child_path(dirid, filename)?;
        let mut file = self
            .driver
            .create_file(&self.tree, &FileOpenParams::read_write(path.clone()))
            .await
            .map_err(|e| nfs_status(&e))?;

        let result = match attr.size {
            set_size3::size(size) if size > 0 => {
                self.driver.truncate_file(&self.tree, &mut file, size).await
            }
            _ => Ok(()),
        };
        self.finish(&mut file, result).await?;

        let fileid = self.handles.register(&path);
        Ok((fileid, self.getattr(fileid).await?))
    }

    async fn create_exclusive(
        &self,
        dirid: fileid3,
        filename: &filename3,
    ) -> Result<fileid3, nfsstat3> {
        debug!("NFS CREATE_EXCLUSIVE: dirid={}, filename={:?}", dirid, filename);
        let (fileid, _attrs) = self.create(dirid, filename, sattr3::default()).await?;
        Ok(fileid)
    }

    async fn mkdir(
        &self,
        dirid: fileid3,
        dirname: &filename3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        debug!("NFS MKDIR: dirid={}, dirname={:?}", dirid, dirname);
        let path = self.child_path(dirid, dirname)?;
        self.driver
            .create_directory(&self.tree, &FileOpenParams::directory(path.clone()))
            .await
            .map_err(|e| nfs_status(&e))?;

        let fileid = self.handles.register(&path);
        Ok((fileid, self.getattr(fileid).await?))
    }

    async fn remove(&self, dirid: fileid3, filename: &filename3) -> Result<(), nfsstat3> {
        debug!("NFS REMOVE: dirid={}, filename={:?}", dirid, filename);
        let path = self.child_path(dirid, filename)?;

        let result = match self.driver.file_exists(&self.tree, &path).await {
            FileStatus::NotExist => return Err(nfsstat3::NFS3ERR_NOENT),
            FileStatus::DirectoryExists => self.driver.delete_directory(&self.tree, &path).await,
            FileStatus::FileExists => self.driver.delete_file(&self.tree, &path).await,
        };
        result.map_err(|e| nfs_status(&e))?;
        self.handles.forget(&path);
        Ok(())
    }

    async fn rename(
        &self,
        from_dirid: fileid3,
        from_filename: &filename3,
        to_dirid: fileid3,
        to_filename: &filename3,
    ) -> Result<(), nfsstat3> {
        debug!(
            "NFS RENAME: from_dirid={}, from_filename={:?}, to_dirid={}, to_filename={:?}",
            from_dirid, from_filename, to_dirid, to_filename
        );
        let from = self.child_path(from_dirid, from_filename)?;
        let to = self.child_path(to_dirid, to_filename)?;

        self.driver
            .rename_file(&self.tree, &from, &to)
            .await
            .map_err(|e| nfs_status(&e))?;
        self.handles.rename(&from, &to);
        Ok(())
    }

    async fn readdir(
        &self,
        dirid: fileid3,
        start_after: fileid3,
        max_entries: usize,
    ) -> Result<vfs::ReadDirResult, nfsstat3> {
        debug!(
            "NFS READDIR: dirid={}, start_after={}, max={}",
            dirid, start_after, max_entries
        );
        let dir = self.path_of(dirid)?;
        let pattern = join_share_path(&dir, "*");

        let mut search = self
            .driver
            .start_search(&self.tree, &pattern, FileAttributes::DIRECTORY)
            .await
            .map_err(|e| nfs_status(&e))?;
        let mut listing = Vec::new();
        while let Some(info) = search.next_file_info() {
            listing.push(info);
        }

        let mut skipping = start_after != 0;
        let mut entries = Vec::new();
        let mut end = true;
        for info in listing {
            let fileid = self.handles.register(&join_share_path(&dir, &info.name));
            if skipping {
                if fileid == start_after {
                    skipping = false;
                }
                continue;
            }
            if entries.len() >= max_entries {
                end = false;
                break;
            }
            entries.push(vfs::DirEntry {
                fileid,
                name: nfsstring::from(info.name.as_bytes()),
                attr: to_fattr3(&info, fileid),
            });
        }

        if skipping {
            return Err(nfsstat3::NFS3ERR_BAD_COOKIE);
        }
        Ok(vfs::ReadDirResult { entries, end })
    }

    async fn symlink(
        &self,
        dirid: fileid3,
        linkname: &filename3,
        symlink_data: &nfspath3,
        _attr: &sattr3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        debug!(
            "NFS SYMLINK: dirid={}, linkname={:?}, target={:?}",
            dirid, linkname, symlink_data
        );
        Err(nfsstat3::NFS3ERR_NOTSUPP)
    }

    async fn readlink(&self, id: fileid3) -> Result<nfspath3, nfsstat3> {
        debug!("NFS READLINK: id={}", id);
        Err(nfsstat3::NFS3ERR_NOTSUPP)
    }
}

/// NFS Server
///
/// Exports one share over NFSv3 TCP.
pub struct NfsServer {
    driver: Arc<AvmDiskDriver>,
    tree: TreeConnection,
    bind_address: String,
    port: u16,
    server_handle: Arc<Mutex<Option<AbortHandle>>>,
}

impl NfsServer {
    pub fn new(
        driver: Arc<AvmDiskDriver>,
        tree: TreeConnection,
        bind_address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            driver,
            tree,
            bind_address: bind_address.into(),
            port,
            server_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Bind the listener and spawn the server task.
    ///
    /// Returns the port actually bound, which differs from the configured
    /// one when that is 0.
    pub async fn start(&self) -> Result<u16, NfsServerError> {
        if self.is_running() {
            return Err(NfsServerError::ServerError(
                "NFS server is already running".to_string(),
            ));
        }

        let address = format!("{}:{}", self.bind_address, self.port);
        info!(
            "Starting NFS server for share {} on {}",
            self.tree.share_name(),
            address
        );

        let adapter = AvmNfsAdapter::new(Arc::clone(&self.driver), self.tree.clone());
        let listener = NFSTcpListener::bind(&address, adapter)
            .await
            .map_err(|e| NfsServerError::BindFailed {
                address: address.clone(),
                error: e.to_string(),
            })?;
        let port = listener.get_listen_port();

        let handle = tokio::spawn(async move {
            info!("NFS server task started");
            if let Err(e) = listener.handle_forever().await {
                error!("NFS server error: {}", e);
            }
            info!("NFS server task stopped");
        });

        *self.server_handle.lock() = Some(handle.abort_handle());
        info!("NFS server listening on port {}", port);
        Ok(port)
    }

    pub fn stop(&self) {
        if let Some(handle) = self.server_handle.lock().take() {
            handle.abort();
            info!("NFS server stopped");
        } else {
            warn!("NFS server was not running");
        }
    }

    pub fn is_running(&self) -> bool {
        self.server_handle
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn share_name(&self) -> &str {
        self.tree.share_name()
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ShareConfig;
    use crate::domain::store::AvmStore;
    use crate::infrastructure::event_bus::LifecycleEventBus;
    use crate::infrastructure::memory_store::{MemoryAvmStore, MemoryTransactionManager};

    fn name(s: &str) -> filename3 {
        nfsstring::from(s.as_bytes())
    }

    async fn adapter(version: &str) -> (Arc<MemoryAvmStore>, AvmNfsAdapter) {
        let bus = LifecycleEventBus::new(16);
        let store = Arc::new(MemoryAvmStore::new().with_event_bus(bus.clone()));
        store.create_store("main").await.unwrap();
        store.create_file("main:/", "seed.txt").await.unwrap();
        store.create_snapshot("main").unwrap();

        let txn = Arc::new(MemoryTransactionManager::new());
        let driver = Arc::new(AvmDiskDriver::new(store.clone(), txn, bus));
        let config = ShareConfig {
            name: "main".to_string(),
            store: Some("main".to_string()),
            version: Some(version.to_string()),
            ..ShareConfig::default()
        };
        let context = driver.create_context(&config).unwrap();
        driver.register_context(&context).await.unwrap();
        let tree = TreeConnection::new("main", context);
        (store, AvmNfsAdapter::new(driver, tree))
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            nfs_status(&DiskError::FileNotFound("x".into())),
            nfsstat3::NFS3ERR_NOENT
        ));
        assert!(matches!(
            nfs_status(&DiskError::PathNotFound("x".into())),
            nfsstat3::NFS3ERR_NOTDIR
        ));
        assert!(matches!(
            nfs_status(&DiskError::DirectoryNotEmpty("x".into())),
            nfsstat3::NFS3ERR_NOTEMPTY
        ));
        assert!(matches!(
            nfs_status(&DiskError::DiskFull("x".into())),
            nfsstat3::NFS3ERR_NOSPC
        ));
        assert!(matches!(
            nfs_status(&DiskError::AccessDenied("x".into())),
            nfsstat3::NFS3ERR_ACCES
        ));
        assert!(matches!(
            nfs_status(&DiskError::Io("x".into())),
            nfsstat3::NFS3ERR_IO
        ));
    }

    #[tokio::test]
    async fn test_create_write_read_roundtrip() {
        let (_store, fs) = adapter("head").await;

        let (docs, attr) = fs.mkdir(ROOT_FILE_ID, &name("docs")).await.unwrap();
        assert!(matches!(attr.ftype, ftype3::NF3DIR));

        let (readme, _) = fs
            .create(docs, &name("readme.txt"), sattr3::default())
            .await
            .unwrap();
        let attr = fs.write(readme, 0, b"hello").await.unwrap();
        assert_eq!(attr.size, 5);

        let (data, eof) = fs.read(readme, 0, 64).await.unwrap();
        assert_eq!(data, b"hello");
        assert!(eof);

        let (data, eof) = fs.read(readme, 1, 2).await.unwrap();
        assert_eq!(data, b"el");
        assert!(!eof);

        assert_eq!(fs.lookup(ROOT_FILE_ID, &name("docs")).await.unwrap(), docs);
        assert_eq!(fs.lookup(docs, &name("..")).await.unwrap(), ROOT_FILE_ID);
        assert!(matches!(
            fs.lookup(docs, &name("missing")).await,
            Err(nfsstat3::NFS3ERR_NOENT)
        ));
    }

    #[tokio::test]
    async fn test_readdir_pages_and_remove() {
        let (_store, fs) = adapter("head").await;
        for file in ["a.txt", "b.txt", "c.txt"] {
            fs.create(ROOT_FILE_ID, &name(file), sattr3::default())
                .await
                .unwrap();
        }

        let first = fs.readdir(ROOT_FILE_ID, 0, 2).await.unwrap();
        let names: Vec<&[u8]> = first.entries.iter().map(|e| &e.name[..]).collect();
        assert_eq!(names, vec![&b"a.txt"[..], &b"b.txt"[..]]);
        assert!(!first.end);

        let last = first.entries.last().unwrap().fileid;
        let rest = fs.readdir(ROOT_FILE_ID, last, 10).await.unwrap();
        let names: Vec<&[u8]> = rest.entries.iter().map(|e| &e.name[..]).collect();
        assert_eq!(names, vec![&b"c.txt"[..], &b"seed.txt"[..]]);
        assert!(rest.end);

        fs.remove(ROOT_FILE_ID, &name("b.txt")).await.unwrap();
        assert!(matches!(
            fs.remove(ROOT_FILE_ID, &name("b.txt")).await,
            Err(nfsstat3::NFS3ERR_NOENT)
        ));
    }

    #[tokio::test]
    async fn test_read_count_is_bounded_by_file_size() {
        let (_store, fs) = adapter("head").await;
        let (id, _) = fs
            .create(ROOT_FILE_ID, &name("small.txt"), sattr3::default())
            .await
            .unwrap();
        fs.write(id, 0, b"abc").await.unwrap();

        let (data, eof) = fs.read(id, 0, u32::MAX).await.unwrap();
        assert_eq!(data, b"abc");
        assert!(eof);

        let (data, eof) = fs.read(id, 10, u32::MAX).await.unwrap();
        assert!(data.is_empty());
        assert!(eof);
    }

    #[tokio::test]
    async fn test_adapter_tracks_folder_changes() {
        let (_store, fs) = adapter("head").await;
        assert!(fs.tree().context().has_change_handler());
    }

    #[tokio::test]
    async fn test_rename_keeps_file_id() {
        let (_store, fs) = adapter("head").await;
        let (id, _) = fs
            .create(ROOT_FILE_ID, &name("old.txt"), sattr3::default())
            .await
            .unwrap();

        fs.rename(ROOT_FILE_ID, &name("old.txt"), ROOT_FILE_ID, &name("new.txt"))
            .await
            .unwrap();
        assert_eq!(fs.lookup(ROOT_FILE_ID, &name("new.txt")).await.unwrap(), id);
        assert!(fs.getattr(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_historical_share_is_read_only() {
        let (_store, fs) = adapter("1").await;
        assert!(matches!(fs.capabilities(), VFSCapabilities::ReadOnly));

        let seed = fs.lookup(ROOT_FILE_ID, &name("seed.txt")).await.unwrap();
        assert!(fs.read(seed, 0, 16).await.is_ok());
        assert!(matches!(
            fs.write(seed, 0, b"x").await,
            Err(nfsstat3::NFS3ERR_ACCES)
        ));
        assert!(matches!(
            fs.mkdir(ROOT_FILE_ID, &name("new")).await,
            Err(nfsstat3::NFS3ERR_ACCES)
        ));
        assert!(matches!(
            fs.readlink(seed).await,
            Err(nfsstat3::NFS3ERR_NOTSUPP)
        ));
    }

    #[tokio::test]
    async fn test_server_start_stop() {
        let (_store, fs) = adapter("head").await;
        let server = NfsServer::new(
            Arc::clone(&fs.driver),
            fs.tree().clone(),
            "127.0.0.1",
            0,
        );

        let port = server.start().await.unwrap();
        assert_ne!(port, 0);
        assert!(server.is_running());
        assert!(server.start().await.is_err());

        server.stop();
        assert!(!server.is_running());
    }
}
