// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Store lifecycle events and directory change notification.
//!
//! The store publishes lifecycle events when stores and versions come and
//! go. Virtual view contexts apply them to their cached pseudo folders and
//! report the resulting directory changes to a registered [`ChangeNotifier`].

use crate::domain::store_type::StoreType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store and version lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreLifecycleEvent {
    StoreCreated {
        name: String,
        #[serde(default)]
        store_type: StoreType,
        created_at: DateTime<Utc>,
    },
    StorePurged {
        name: String,
    },
    VersionCreated {
        store: String,
        id: u32,
        created_at: DateTime<Utc>,
    },
    VersionPurged {
        store: String,
        id: u32,
    },
}

impl StoreLifecycleEvent {
    pub fn store_created(name: impl Into<String>, store_type: StoreType) -> Self {
        Self::StoreCreated {
            name: name.into(),
            store_type,
            created_at: Utc::now(),
        }
    }

    pub fn store_purged(name: impl Into<String>) -> Self {
        Self::StorePurged { name: name.into() }
    }

    pub fn version_created(store: impl Into<String>, id: u32) -> Self {
        Self::VersionCreated {
            store: store.into(),
            id,
            created_at: Utc::now(),
        }
    }

    pub fn version_purged(store: impl Into<String>, id: u32) -> Self {
        Self::VersionPurged {
            store: store.into(),
            id,
        }
    }

    /// Store the event refers to
    pub fn store_name(&self) -> &str {
        match self {
            Self::StoreCreated { name, .. } | Self::StorePurged { name } => name,
            Self::VersionCreated { store, .. } | Self::VersionPurged { store, .. } => store,
        }
    }
}

/// Kind of directory change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyAction {
    Added,
    Removed,
}

/// Sink for directory change notifications
pub trait ChangeNotifier: Send + Sync {
    fn notify_directory_changed(&self, action: NotifyAction, path: &str);
}
