// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded gateway
//!
//! Builds the in-process store, disk driver and share mapper from a
//! configuration manifest.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use avm_gateway_core::{
    application::{disk_interface::DiskInterface, AvmDiskDriver, AvmShareMapper, SrvSession},
    domain::{config::GatewayConfigManifest, file_info::FileAttributes, file_info::FileInfo},
    infrastructure::{
        event_bus::LifecycleEventBus,
        memory_store::{MemoryAvmStore, MemoryTransactionManager},
    },
};

pub struct EmbeddedGateway {
    store: Arc<MemoryAvmStore>,
    driver: Arc<AvmDiskDriver>,
    mapper: AvmShareMapper,
}

impl EmbeddedGateway {
    /// Build the gateway. When `seed` is given, the HEAD of every configured
    /// store is filled from that local directory before shares register.
    pub async fn new(config: &GatewayConfigManifest, seed: Option<&Path>) -> Result<Self> {
        let event_bus = LifecycleEventBus::with_default_capacity();
        let store = Arc::new(MemoryAvmStore::new().with_event_bus(event_bus.clone()));
        let txn = Arc::new(MemoryTransactionManager::new());

        if let Some(dir) = seed {
            let stores: BTreeSet<&str> = config
                .spec
                .shares
                .iter()
                .filter_map(|share| share.store.as_deref())
                .map(|store| store.split_once(':').map_or(store, |(name, _)| name))
                .collect();
            for name in stores {
                let count = store
                    .import_directory(name, dir)
                    .with_context(|| format!("Failed to seed store '{}' from {:?}", name, dir))?;
                info!("Seeded store {} with {} entries from {:?}", name, count, dir);
            }
        }

        let driver = Arc::new(
            AvmDiskDriver::new(store.clone(), txn, event_bus).with_state_expiry(
                Duration::from_secs(config.spec.state_cache.expiry_seconds),
            ),
        );
        let mapper = AvmShareMapper::from_config(driver.clone(), config).await?;

        Ok(Self {
            store,
            driver,
            mapper,
        })
    }

    pub fn store(&self) -> &Arc<MemoryAvmStore> {
        &self.store
    }

    pub fn driver(&self) -> &Arc<AvmDiskDriver> {
        &self.driver
    }

    pub fn mapper(&self) -> &AvmShareMapper {
        &self.mapper
    }

    /// Entries of `path` in `share`, resolved as a session would
    pub async fn list(&self, share: &str, path: &str) -> Result<Vec<FileInfo>> {
        let mut session = SrvSession::new("avmfs");
        let tree = self
            .mapper
            .find_share(&mut session, share, true)
            .await
            .with_context(|| format!("Share '{}' not found", share))?;
        self.driver.tree_opened(&session, &tree);

        let pattern = if path.ends_with(['\\', '/']) || path.is_empty() {
            format!("{}*", path)
        } else {
            format!("{}\\*", path)
        };
        let result = self
            .driver
            .start_search(&tree, &pattern, FileAttributes::DIRECTORY)
            .await;

        self.driver.tree_closed(&session, &tree);
        self.mapper.delete_shares(&mut session);

        let mut search = result.with_context(|| format!("Failed to list '{}'", path))?;
        let mut entries = Vec::new();
        while let Some(info) = search.next_file_info() {
            entries.push(info);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avm_gateway_core::domain::store::AvmStore;

    #[tokio::test]
    async fn test_default_config_lists_shares() {
        let config = GatewayConfigManifest::default();
        let gateway = EmbeddedGateway::new(&config, None).await.unwrap();

        gateway.store().create_file("main:/", "notes.txt").await.unwrap();
        gateway.store().create_snapshot("main").unwrap();

        let names: Vec<String> = gateway
            .list("main", "\\")
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["notes.txt"]);

        let stores: Vec<String> = gateway
            .list("avm", "")
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(stores, vec!["main"]);

        let snapshot = gateway.list("main_1", "/").await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].is_read_only());
        assert!(gateway.list("main_7", "/").await.is_err());
    }

    #[tokio::test]
    async fn test_seed_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("readme.txt"), b"hello").unwrap();

        let config = GatewayConfigManifest::default();
        let gateway = EmbeddedGateway::new(&config, Some(dir.path())).await.unwrap();

        let entries = gateway.list("main", "\\docs").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "readme.txt");
        assert_eq!(entries[0].size, 5);
    }
}
