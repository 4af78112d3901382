// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for share resolution
//!
//! These tests verify:
//! 1. Shares declared in a gateway manifest are registered at startup
//! 2. `<store>_<version>` names resolve to per-session snapshot shares
//! 3. Dynamic shares are cached per session and closed with it

use std::sync::Arc;

use avm_gateway_core::application::{AvmDiskDriver, AvmShareMapper, DiskInterface, SrvSession};
use avm_gateway_core::domain::config::GatewayConfigManifest;
use avm_gateway_core::domain::file_info::{FileOpenParams, FileStatus};
use avm_gateway_core::domain::store::AvmStore;
use avm_gateway_core::domain::store_path::Version;
use avm_gateway_core::infrastructure::event_bus::LifecycleEventBus;
use avm_gateway_core::infrastructure::memory_store::{MemoryAvmStore, MemoryTransactionManager};

const MANIFEST: &str = r#"
apiVersion: avmfs/v1
kind: GatewayConfig
metadata:
  name: test-gateway
spec:
  shares:
    - name: main
      store: main
      createStore: true
    - name: site
      store: web:/www/static
      version: head
      createStore: true
    - name: avm
      virtualView:
        showSandboxes: false
  dynamicShares: true
"#;

struct Setup {
    store: Arc<MemoryAvmStore>,
    txn: Arc<MemoryTransactionManager>,
    mapper: AvmShareMapper,
}

async fn setup(manifest: &str) -> Setup {
    let config = GatewayConfigManifest::from_yaml_str(manifest).unwrap();
    config.validate().unwrap();

    let bus = LifecycleEventBus::new(64);
    let store = Arc::new(MemoryAvmStore::new().with_event_bus(bus.clone()));
    let txn = Arc::new(MemoryTransactionManager::new());
    let driver = Arc::new(AvmDiskDriver::new(store.clone(), txn.clone(), bus));
    let mapper = AvmShareMapper::from_config(driver, &config).await.unwrap();
    Setup { store, txn, mapper }
}

#[tokio::test]
async fn test_manifest_shares_are_registered() {
    let s = setup(MANIFEST).await;

    let mut shares = s.mapper.share_names();
    shares.sort();
    assert_eq!(shares, vec!["avm", "main", "site"]);

    // createStore built both stores and the base folders
    assert!(s
        .store
        .lookup(Version::Head, "web:/www/static")
        .await
        .unwrap()
        .is_some());
    assert!(s.store.get_store("main").await.unwrap().is_some());

    let mut session = SrvSession::new("alice");
    let site = s
        .mapper
        .find_share(&mut session, "SITE", false)
        .await
        .unwrap();
    let driver = s.mapper.driver();
    let mut file = driver
        .create_file(&site, &FileOpenParams::read_write("\\index.html"))
        .await
        .unwrap();
    driver.close_file(&site, &mut file).await.unwrap();

    assert!(s
        .store
        .lookup(Version::Head, "web:/www/static/index.html")
        .await
        .unwrap()
        .is_some());
    assert!(session.dynamic_shares().is_empty());
}

#[tokio::test]
async fn test_dynamic_share_is_cached_per_session() {
    let s = setup(MANIFEST).await;
    s.store.create_file("main:/", "a.txt").await.unwrap();
    s.store.create_snapshot("main").unwrap();
    s.store.create_snapshot("main").unwrap();

    let mut session = SrvSession::new("alice");
    let first = s
        .mapper
        .find_share(&mut session, "main_2", true)
        .await
        .unwrap();
    assert_eq!(session.dynamic_shares().len(), 1);
    assert!(s.mapper.driver().is_read_only(&first));

    let begun = s.txn.counts().begun;
    let second = s
        .mapper
        .find_share(&mut session, "main_2", true)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(first.context(), second.context()));
    assert_eq!(s.txn.counts().begun, begun);

    assert_eq!(
        s.mapper
            .driver()
            .file_exists(&first, "\\a.txt")
            .await,
        FileStatus::FileExists
    );

    // Other sessions get their own context
    let mut other = SrvSession::new("bob");
    let theirs = s
        .mapper
        .find_share(&mut other, "main_2", true)
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(first.context(), theirs.context()));

    assert!(s
        .mapper
        .find_share(&mut session, "main_9", true)
        .await
        .is_none());
    assert!(s
        .mapper
        .find_share(&mut session, "nostore_1", true)
        .await
        .is_none());
    assert!(s
        .mapper
        .find_share(&mut session, "main_1", false)
        .await
        .is_none());

    s.mapper.delete_shares(&mut session);
    assert!(session.dynamic_shares().is_empty());
    assert!(first.context().is_closed());
    assert!(!theirs.context().is_closed());
}

#[tokio::test]
async fn test_dynamic_shares_can_be_disabled() {
    let manifest = MANIFEST.replace("dynamicShares: true", "dynamicShares: false");
    let s = setup(&manifest).await;
    s.store.create_snapshot("main").unwrap();

    let mut session = SrvSession::new("alice");
    assert!(!s.mapper.dynamic_shares_enabled());
    assert!(s
        .mapper
        .find_share(&mut session, "main_1", true)
        .await
        .is_none());
    assert!(s
        .mapper
        .find_share(&mut session, "avm", true)
        .await
        .is_some());
}
