// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Transaction scoping for single filesystem calls
//!
//! Every store access made by the disk driver runs inside exactly one
//! transaction: begun before the first store call, committed when the
//! operation succeeds and rolled back when it fails. A failing rollback is
//! logged and never replaces the error that caused it.

use crate::domain::errors::{map_store_error, DiskError};
use crate::domain::store::TransactionManager;
use std::future::Future;
use tracing::warn;

/// Run `operation` inside a fresh transaction.
///
/// `operation` is not polled until the transaction has begun.
pub async fn run_in_transaction<T, F>(
    txn: &dyn TransactionManager,
    read_only: bool,
    operation: F,
) -> Result<T, DiskError>
where
    F: Future<Output = Result<T, DiskError>>,
{
    let transaction = txn
        .begin(read_only)
        .await
        .map_err(|e| map_store_error(e, "transaction begin"))?;

    match operation.await {
        Ok(value) => {
            transaction
                .commit()
                .await
                .map_err(|e| map_store_error(e, "transaction commit"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = transaction.rollback().await {
                warn!(
                    "Failed to roll back transaction after '{}': {}",
                    err, rollback_err
                );
            }
            Err(err)
        }
    }
}
