// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Filesystem Error Taxonomy
//!
//! Errors reported by the disk driver to the protocol layer, and the single
//! mapping from store errors into them. Nothing from the store error type
//! crosses the driver boundary unmapped.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Filesystem error kinds and their mapping from store errors

use crate::domain::store::StoreError;
use thiserror::Error;

/// Filesystem-layer errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiskError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("File exists: {0}")]
    FileExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Disk full: {0}")]
    DiskFull(String),

    #[error("Invalid share context: {0}")]
    InvalidContext(String),

    #[error("File is closed: {0}")]
    FileClosed(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Map a store failure on `path` to the filesystem vocabulary.
///
/// Wrong-type failures become path-not-found; the distinction from
/// not-found is not kept.
pub fn map_store_error(err: StoreError, path: &str) -> DiskError {
    match err {
        StoreError::NotFound(_) => DiskError::FileNotFound(path.to_string()),
        StoreError::WrongType(_) => DiskError::PathNotFound(path.to_string()),
        StoreError::AlreadyExists(_) => DiskError::FileExists(path.to_string()),
        StoreError::QuotaExceeded { .. } => DiskError::DiskFull(path.to_string()),
        StoreError::Locked(_) | StoreError::AccessDenied(_) => {
            DiskError::AccessDenied(path.to_string())
        }
        StoreError::BadArgument(_) => DiskError::FileNotFound(path.to_string()),
        StoreError::Io(msg) => DiskError::Io(format!("{}: {}", path, msg)),
    }
}
