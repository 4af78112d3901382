// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the AVM disk driver
//!
//! These tests verify:
//! 1. A writable HEAD share supports the full create/write/read/delete cycle
//! 2. Every store call runs inside a transaction that is finished afterwards
//! 3. Directory searches can be resumed from a saved position
//! 4. Historical shares stay read-only through every entry point

use std::sync::Arc;

use avm_gateway_core::application::disk_interface::SeekOrigin;
use avm_gateway_core::application::{AvmDiskDriver, DiskInterface, TreeConnection};
use avm_gateway_core::domain::config::ShareConfig;
use avm_gateway_core::domain::errors::DiskError;
use avm_gateway_core::domain::file_info::{FileAttributes, FileOpenParams, FileStatus};
use avm_gateway_core::domain::store::AvmStore;
use avm_gateway_core::domain::store_path::Version;
use avm_gateway_core::infrastructure::event_bus::LifecycleEventBus;
use avm_gateway_core::infrastructure::memory_store::{MemoryAvmStore, MemoryTransactionManager};

struct Gateway {
    store: Arc<MemoryAvmStore>,
    txn: Arc<MemoryTransactionManager>,
    driver: AvmDiskDriver,
}

fn gateway() -> Gateway {
    let bus = LifecycleEventBus::new(64);
    let store = Arc::new(MemoryAvmStore::new().with_event_bus(bus.clone()));
    let txn = Arc::new(MemoryTransactionManager::new());
    let driver = AvmDiskDriver::new(store.clone(), txn.clone(), bus);
    Gateway { store, txn, driver }
}

async fn connect(gw: &Gateway, name: &str, store: &str, version: &str) -> TreeConnection {
    let config = ShareConfig {
        name: name.to_string(),
        store: Some(store.to_string()),
        version: Some(version.to_string()),
        create_store: true,
        ..ShareConfig::default()
    };
    let context = gw.driver.create_context(&config).unwrap();
    gw.driver.register_context(&context).await.unwrap();
    TreeConnection::new(name, context)
}

#[tokio::test]
async fn test_write_then_read_back_on_head_share() {
    let gw = gateway();
    let tree = connect(&gw, "main", "main", "head").await;

    gw.driver
        .create_directory(&tree, &FileOpenParams::directory("\\docs"))
        .await
        .unwrap();

    let mut file = gw
        .driver
        .create_file(&tree, &FileOpenParams::read_write("\\docs\\readme.txt"))
        .await
        .unwrap();
    let written = gw
        .driver
        .write_file(&tree, &mut file, b"hello", 0)
        .await
        .unwrap();
    assert_eq!(written, 5);
    gw.driver.close_file(&tree, &mut file).await.unwrap();

    let mut file = gw
        .driver
        .open_file(&tree, &FileOpenParams::read_only("\\DOCS\\README.TXT"))
        .await
        .unwrap();
    let mut buf = [0u8; 16];
    let read = gw
        .driver
        .read_file(&tree, &mut file, &mut buf, 0)
        .await
        .unwrap();
    assert_eq!(&buf[..read], b"hello");

    let end = gw
        .driver
        .seek_file(&tree, &mut file, 0, SeekOrigin::End)
        .await
        .unwrap();
    assert_eq!(end, 5);
    gw.driver.close_file(&tree, &mut file).await.unwrap();

    assert_eq!(
        gw.driver.file_exists(&tree, "\\docs\\readme.txt").await,
        FileStatus::FileExists
    );
    assert_eq!(
        gw.driver.file_exists(&tree, "\\docs").await,
        FileStatus::DirectoryExists
    );

    let info = gw
        .driver
        .get_file_information(&tree, "\\docs\\readme.txt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.size, 5);
    assert!(!info.is_read_only());

    assert!(matches!(
        gw.driver.delete_directory(&tree, "\\docs").await,
        Err(DiskError::DirectoryNotEmpty(_))
    ));
    gw.driver
        .delete_file(&tree, "\\docs\\readme.txt")
        .await
        .unwrap();
    gw.driver.delete_directory(&tree, "\\docs").await.unwrap();

    assert_eq!(
        gw.driver.file_exists(&tree, "\\docs").await,
        FileStatus::NotExist
    );
    assert!(gw
        .store
        .lookup(Version::Head, "main:/docs")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_transactions_are_always_finished() {
    let gw = gateway();
    let tree = connect(&gw, "main", "main", "head").await;

    // A mix of successful and failing calls
    gw.driver
        .create_directory(&tree, &FileOpenParams::directory("\\a"))
        .await
        .unwrap();
    assert!(gw
        .driver
        .create_directory(&tree, &FileOpenParams::directory("\\a"))
        .await
        .is_err());
    assert!(gw
        .driver
        .open_file(&tree, &FileOpenParams::read_only("\\missing.txt"))
        .await
        .is_err());
    assert!(gw.driver.delete_file(&tree, "\\missing.txt").await.is_err());
    assert!(gw
        .driver
        .rename_file(&tree, "\\missing.txt", "\\other.txt")
        .await
        .is_err());
    gw.driver.file_exists(&tree, "\\a").await;
    gw.driver
        .start_search(&tree, "\\*", FileAttributes::DIRECTORY)
        .await
        .unwrap();

    let counts = gw.txn.counts();
    assert!(counts.begun > 0);
    assert!(counts.committed > 0);
    assert!(counts.rolled_back > 0);
    assert_eq!(counts.open(), 0);

    // Failed rollbacks are logged and the original error still surfaces
    gw.txn.set_fail_rollback(true);
    assert!(matches!(
        gw.driver.delete_file(&tree, "\\missing.txt").await,
        Err(DiskError::FileNotFound(_))
    ));
    let counts = gw.txn.counts();
    assert_eq!(counts.failed_rollbacks, 1);
    assert_eq!(counts.open(), 0);
}

#[tokio::test]
async fn test_search_resumes_from_saved_position() {
    let gw = gateway();
    let tree = connect(&gw, "main", "main", "head").await;

    for name in ["one.txt", "two.txt", "three.txt"] {
        let mut file = gw
            .driver
            .create_file(&tree, &FileOpenParams::read_write(format!("\\{}", name)))
            .await
            .unwrap();
        gw.driver.close_file(&tree, &mut file).await.unwrap();
    }

    let mut search = gw
        .driver
        .start_search(&tree, "\\*.txt", FileAttributes::empty())
        .await
        .unwrap();
    let first = search.next_file_info().unwrap();
    let resume = search.resume_id();
    let second = search.next_file_info().unwrap();
    search.next_file_info().unwrap();
    assert!(!search.has_more_files());

    assert!(search.restart_at(resume));
    assert_eq!(search.next_file_info().unwrap().name, first.name);
    assert_eq!(search.next_file_info().unwrap().name, second.name);

    assert!(search.restart_at_info(&second));
    assert_eq!(search.next_file_info().unwrap().name, second.name);

    assert!(!search.restart_at(99));
}

#[tokio::test]
async fn test_snapshot_share_serves_frozen_content() {
    let gw = gateway();
    let head = connect(&gw, "main", "main", "head").await;

    let mut file = gw
        .driver
        .create_file(&head, &FileOpenParams::read_write("\\notes.txt"))
        .await
        .unwrap();
    gw.driver
        .write_file(&head, &mut file, b"v1", 0)
        .await
        .unwrap();
    gw.driver.close_file(&head, &mut file).await.unwrap();

    let id = gw.store.create_snapshot("main").unwrap();

    let mut file = gw
        .driver
        .open_file(&head, &FileOpenParams::read_write("\\notes.txt"))
        .await
        .unwrap();
    gw.driver
        .truncate_file(&head, &mut file, 0)
        .await
        .unwrap();
    gw.driver
        .write_file(&head, &mut file, b"second", 0)
        .await
        .unwrap();
    gw.driver.close_file(&head, &mut file).await.unwrap();

    let snapshot = connect(&gw, "main_1", "main", &id.to_string()).await;
    assert!(gw.driver.is_read_only(&snapshot));

    let mut file = gw
        .driver
        .open_file(&snapshot, &FileOpenParams::read_only("\\notes.txt"))
        .await
        .unwrap();
    let mut buf = [0u8; 16];
    let read = gw
        .driver
        .read_file(&snapshot, &mut file, &mut buf, 0)
        .await
        .unwrap();
    assert_eq!(&buf[..read], b"v1");
    gw.driver.close_file(&snapshot, &mut file).await.unwrap();

    assert!(matches!(
        gw.driver
            .create_file(&snapshot, &FileOpenParams::read_write("\\new.txt"))
            .await,
        Err(DiskError::AccessDenied(_))
    ));

    let mut search = gw
        .driver
        .start_search(&snapshot, "\\*", FileAttributes::empty())
        .await
        .unwrap();
    let info = search.next_file_info().unwrap();
    assert_eq!(info.name, "notes.txt");
    assert_eq!(info.size, 2);
    assert!(info.is_read_only());
}
