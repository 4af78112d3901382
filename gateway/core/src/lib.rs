// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AVM Gateway Core
//!
//! Exposes a versioned AVM content store through a file-sharing layer.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Path translation, pseudo folders, search cursors, share
//!   contexts, the disk driver, network file handles and share mapping

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
