// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! NFS Server Infrastructure
//!
//! User-space NFSv3 export of one AVM share, built on the nfsserve crate.
//!
//! ## Architecture
//! ```text
//! NFS client → NFSv3 Protocol (TCP)
//!   → AvmNfsAdapter (implements nfsserve::NFSFileSystem)
//!   → AvmDiskDriver (DiskInterface over one TreeConnection)
//!   → AvmStore + TransactionManager
//! ```
//!
//! ## Protocol Notes
//! - **nolock mount option**: no NLM (Network Lock Manager) support
//! - **TCP only**
//! - **No symlinks**: SYMLINK and READLINK answer `NFS3ERR_NOTSUPP`
//! - Historical-version shares export read-only

pub mod file_handle;
pub mod server;

pub use file_handle::{FileHandleTable, ROOT_FILE_ID};
pub use server::{nfs_status, AvmNfsAdapter, NfsServer, NfsServerError};
