// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the avmfs CLI

pub mod config;
pub mod ls;
pub mod serve;

pub use self::config::ConfigCommand;
pub use self::ls::LsArgs;
pub use self::serve::ServeArgs;
