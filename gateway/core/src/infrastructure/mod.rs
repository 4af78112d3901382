// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Concrete store, lifecycle event bus and NFS transport

pub mod event_bus;
pub mod memory_store;
pub mod nfs;
