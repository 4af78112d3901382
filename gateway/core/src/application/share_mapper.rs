// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AVM Share Mapper
//!
//! Resolves share names requested by a session to a [`TreeConnection`].
//! Static shares come from configuration and live as long as the mapper.
//! A name of the form `<store>_<version>` is synthesized on demand into a
//! read-only share bound to that snapshot, cached in the requesting
//! session and closed with it.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Resolve share names to tree connections, static or per-session

use crate::application::disk_driver::AvmDiskDriver;
use crate::application::disk_interface::{DiskInterface, DynamicShare, SrvSession, TreeConnection};
use crate::domain::config::{GatewayConfigManifest, ShareConfig};
use crate::domain::constants::DYNAMIC_SHARE_PATTERN;
use crate::domain::context::AvmContext;
use crate::domain::store_path::Version;
use anyhow::Context as _;
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AvmShareMapper {
    driver: Arc<AvmDiskDriver>,
    shares: RwLock<Vec<(String, Arc<AvmContext>)>>,
    dynamic_shares: bool,
    pattern: Regex,
}

impl AvmShareMapper {
    pub fn new(driver: Arc<AvmDiskDriver>, dynamic_shares: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            driver,
            shares: RwLock::new(Vec::new()),
            dynamic_shares,
            pattern: Regex::new(DYNAMIC_SHARE_PATTERN)?,
        })
    }

    /// Build a mapper with every configured share created and registered
    pub async fn from_config(
        driver: Arc<AvmDiskDriver>,
        config: &GatewayConfigManifest,
    ) -> anyhow::Result<Self> {
        let mapper = Self::new(driver, config.spec.dynamic_shares)
            .context("Failed to compile dynamic share pattern")?;

        for share in &config.spec.shares {
            let context = mapper
                .driver
                .create_context(share)
                .with_context(|| format!("Invalid share '{}'", share.name))?;
            mapper
                .driver
                .register_context(&context)
                .await
                .with_context(|| format!("Failed to register share '{}'", share.name))?;
            mapper.add_static_share(&share.name, context);
        }

        info!(
            "Share mapper ready: {} static share(s), dynamic shares {}",
            config.spec.shares.len(),
            if mapper.dynamic_shares { "enabled" } else { "disabled" }
        );
        Ok(mapper)
    }

    pub fn driver(&self) -> &Arc<AvmDiskDriver> {
        &self.driver
    }

    pub fn dynamic_shares_enabled(&self) -> bool {
        self.dynamic_shares
    }

    /// Add a share that stays mounted for the lifetime of the mapper.
    /// A share with the same name (any case) is replaced.
    pub fn add_static_share(&self, name: &str, context: Arc<AvmContext>) {
        let mut shares = self.shares.write();
        if let Some(pos) = shares
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            let (_, old) = shares.remove(pos);
            old.close_context();
        }
        shares.push((name.to_string(), context));
    }

    pub fn share_names(&self) -> Vec<String> {
        self.shares.read().iter().map(|(name, _)| name.clone()).collect()
    }

    fn find_static(&self, name: &str) -> Option<TreeConnection> {
        self.shares
            .read()
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(existing, context)| TreeConnection::new(existing.clone(), Arc::clone(context)))
    }

    /// Split a dynamic share name into store and version id
    fn parse_dynamic_name(&self, name: &str) -> Option<(String, u32)> {
        if !self.pattern.is_match(name) {
            return None;
        }
        let (store, version) = name.rsplit_once('_')?;
        let version = version.parse::<u32>().ok()?;
        Some((store.to_string(), version))
    }

    /// Resolve `name` for `session`.
    ///
    /// Static shares are tried first, then the session's dynamic shares, then
    /// a new dynamic share when `create` is set and dynamic shares are on.
    pub async fn find_share(
        &self,
        session: &mut SrvSession,
        name: &str,
        create: bool,
    ) -> Option<TreeConnection> {
        if let Some(tree) = self.find_static(name) {
            return Some(tree);
        }

        if let Some(share) = session.find_dynamic_share(name) {
            debug!("Reusing dynamic share {} for session {}", name, session.id());
            return Some(TreeConnection::new(share.name.clone(), Arc::clone(&share.context)));
        }

        if !create || !self.dynamic_shares {
            return None;
        }
        let (store, version) = self.parse_dynamic_name(name)?;

        match self
            .driver
            .store_version_exists(&store, Version::Id(version))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!("No store {} with version {} for share {}", store, version, name);
                return None;
            }
            Err(e) => {
                warn!("Failed to validate dynamic share {}: {}", name, e);
                return None;
            }
        }

        let config = ShareConfig {
            name: name.to_string(),
            store: Some(store),
            version: Some(version.to_string()),
            ..ShareConfig::default()
        };
        let context = match self.driver.create_context(&config) {
            Ok(context) => context,
            Err(e) => {
                warn!("Failed to create context for dynamic share {}: {}", name, e);
                return None;
            }
        };

        session.add_dynamic_share(DynamicShare {
            name: name.to_string(),
            context: Arc::clone(&context),
        });
        let tree = TreeConnection::new(name, context);
        self.driver.tree_opened(session, &tree);
        info!(
            "Created dynamic share {} for session {}",
            name,
            session.id()
        );
        Some(tree)
    }

    /// Close every dynamic share of `session`
    pub fn delete_shares(&self, session: &mut SrvSession) {
        for share in session.take_dynamic_shares() {
            let tree = TreeConnection::new(share.name.clone(), Arc::clone(&share.context));
            self.driver.tree_closed(session, &tree);
            share.context.close_context();
            debug!("Closed dynamic share {}", share.name);
        }
    }
}
