// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AVM gateway CLI library
//!
//! Commands and the embedded gateway live here so they can be tested
//! without the binary.

pub mod commands;
pub mod embedded;
