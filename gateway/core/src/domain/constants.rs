// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gateway Constants
//!
//! Naming conventions shared by the share layer and the store layer.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Immutable lookup tables and separators

/// Directory separator used in share-relative paths.
pub const SHARE_SEPARATOR: char = '\\';
pub const SHARE_SEPARATOR_STR: &str = "\\";

/// Directory separator used in store-addressed paths.
pub const STORE_SEPARATOR: char = '/';
pub const STORE_SEPARATOR_STR: &str = "/";

/// Separator between the store name and the path inside the store.
pub const STORE_NAME_SEPARATOR: char = ':';

/// Version id of the mutable HEAD of a store.
pub const HEAD_VERSION_ID: i32 = -1;

/// Folder name for the HEAD version in the virtual view.
pub const HEAD_FOLDER_NAME: &str = "Head";

/// Share names matching this pattern are bound to `<store>_<version>`.
pub const DYNAMIC_SHARE_PATTERN: &str = r"^[A-Za-z0-9-]+_[0-9]+$";

/// Well-known OS marker files reported as hidden.
pub const HIDDEN_MARKER_FILES: [&str; 2] = ["Desktop.ini", "Thumbs.db"];

/// File allocation granularity reported in file information.
pub const ALLOCATION_UNIT: u64 = 512;

/// Default expiry for non-permanent file states.
pub const DEFAULT_STATE_EXPIRY_SECS: u64 = 300;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("csv", "text/csv"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("xml", "text/xml"),
    ("pdf", "application/pdf"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("zip", "application/zip"),
    ("doc", "application/msword"),
    ("xls", "application/vnd.ms-excel"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("md", "text/markdown"),
    ("ftl", "text/plain"),
    ("jsp", "text/plain"),
];

/// Guess a mime type from the extension of a file name.
pub fn guess_mime_type(name: &str) -> &'static str {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return DEFAULT_MIME_TYPE;
    };

    MIME_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}
