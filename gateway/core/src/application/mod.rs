// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates store transactions behind the filesystem contract

pub mod transaction;
pub mod disk_interface;
pub mod network_file;
pub mod disk_driver;
pub mod share_mapper;

pub use disk_driver::AvmDiskDriver;
pub use disk_interface::{DiskInterface, SrvSession, TreeConnection};
pub use network_file::NetworkFile;
pub use share_mapper::AvmShareMapper;
