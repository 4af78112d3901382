// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Share paths, pseudo folders, search contexts, share contexts, store types
//! and the store traits the application layer drives.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Gateway model independent of any store backend or wire protocol

pub mod constants;
pub mod store_path;
pub mod file_info;
pub mod pseudo_file;
pub mod file_state;
pub mod search;
pub mod store;
pub mod store_type;
pub mod events;
pub mod errors;
pub mod context;
pub mod config;
