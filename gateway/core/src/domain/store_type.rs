// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Store Types
//!
//! Web content projects keep a staging store per project with author
//! sandboxes and preview stores beside it. The type of a store decides
//! whether a virtual view lists it.
//!
//! Types follow from the store name unless the store records one when it is
//! created:
//!
//! | Store name | Type |
//! |------------|------|
//! | `sitestore` | [`StoreType::SiteStore`] |
//! | `<project>--preview` | [`StoreType::WebStagingPreview`] |
//! | `<project>--workflow-<id>--preview` | [`StoreType::WebStagingPreview`] |
//! | `<project>--<user>--preview` | [`StoreType::WebAuthorPreview`] |
//! | `<project>--<user>` | [`StoreType::WebAuthorMain`] |
//! | anything else | [`StoreType::Normal`] |
//!
//! A project's staging store has a plain name, so it is only known as
//! [`StoreType::WebStagingMain`] when created with that type.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Store classification and virtual view show options

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Separator between a web project and the sandbox owner in a store name.
pub const SANDBOX_MARKER: &str = "--";

const PREVIEW_SUFFIX: &str = "--preview";
const WORKFLOW_MARKER: &str = "--workflow-";
const SITE_STORE_NAME: &str = "sitestore";

/// Kind of store, as far as virtual views are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Normal,
    SiteStore,
    WebStagingMain,
    WebStagingPreview,
    WebAuthorMain,
    WebAuthorPreview,
}

impl StoreType {
    pub fn from_store_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name == SITE_STORE_NAME {
            return Self::SiteStore;
        }

        if let Some(base) = name.strip_suffix(PREVIEW_SUFFIX) {
            return if base.contains(SANDBOX_MARKER) && !base.contains(WORKFLOW_MARKER) {
                Self::WebAuthorPreview
            } else {
                Self::WebStagingPreview
            };
        }
        if name.contains(SANDBOX_MARKER) {
            return Self::WebAuthorMain;
        }
        Self::Normal
    }

    /// Show option that lists stores of this type
    pub fn show_option(self) -> StoreTypes {
        match self {
            Self::Normal => StoreTypes::NORMAL,
            Self::SiteStore => StoreTypes::SITE,
            Self::WebStagingMain => StoreTypes::STAGING,
            Self::WebAuthorMain => StoreTypes::AUTHOR,
            Self::WebStagingPreview | Self::WebAuthorPreview => StoreTypes::PREVIEW,
        }
    }

    /// Author sandboxes and their previews belong to a single user
    pub fn is_sandbox(self) -> bool {
        matches!(self, Self::WebAuthorMain | Self::WebAuthorPreview)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::SiteStore => "SiteStore",
            Self::WebStagingMain => "StagingMain",
            Self::WebStagingPreview => "StagingPreview",
            Self::WebAuthorMain => "AuthorMain",
            Self::WebAuthorPreview => "AuthorPreview",
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Store types listed by a virtual view
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StoreTypes: u32 {
        const NORMAL = 0x01;
        const SITE = 0x02;
        const AUTHOR = 0x04;
        const PREVIEW = 0x08;
        const STAGING = 0x10;
    }
}

impl StoreTypes {
    /// Everything except user sandboxes and previews
    pub const DEFAULT_SHOW: Self = Self::NORMAL.union(Self::SITE).union(Self::STAGING);

    /// Option for one configured name: `normal`, `site`, `author`, `preview`
    /// or `staging`, in any case
    pub fn from_option_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "normal" => Some(Self::NORMAL),
            "site" => Some(Self::SITE),
            "author" => Some(Self::AUTHOR),
            "preview" => Some(Self::PREVIEW),
            "staging" => Some(Self::STAGING),
            _ => None,
        }
    }

    pub fn shows(self, store_type: StoreType) -> bool {
        self.contains(store_type.show_option())
    }

    /// Configured names of the options set, in a fixed order
    pub fn option_names(self) -> Vec<&'static str> {
        [
            (Self::NORMAL, "normal"),
            (Self::SITE, "site"),
            (Self::STAGING, "staging"),
            (Self::AUTHOR, "author"),
            (Self::PREVIEW, "preview"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl Default for StoreTypes {
    fn default() -> Self {
        Self::DEFAULT_SHOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_name() {
        assert_eq!(StoreType::from_store_name("main"), StoreType::Normal);
        assert_eq!(StoreType::from_store_name("web-staging"), StoreType::Normal);
        assert_eq!(StoreType::from_store_name("SiteStore"), StoreType::SiteStore);
        assert_eq!(StoreType::from_store_name("web--preview"), StoreType::WebStagingPreview);
        assert_eq!(
            StoreType::from_store_name("web--workflow-42--preview"),
            StoreType::WebStagingPreview
        );
        assert_eq!(StoreType::from_store_name("web--alice"), StoreType::WebAuthorMain);
        assert_eq!(
            StoreType::from_store_name("web--alice--preview"),
            StoreType::WebAuthorPreview
        );
    }

    #[test]
    fn test_show_options_per_type() {
        let cases = [
            (StoreType::Normal, StoreTypes::NORMAL),
            (StoreType::SiteStore, StoreTypes::SITE),
            (StoreType::WebStagingMain, StoreTypes::STAGING),
            (StoreType::WebStagingPreview, StoreTypes::PREVIEW),
            (StoreType::WebAuthorMain, StoreTypes::AUTHOR),
            (StoreType::WebAuthorPreview, StoreTypes::PREVIEW),
        ];
        for (store_type, option) in cases {
            assert!(option.shows(store_type), "{} hidden", store_type);
            assert!(!(StoreTypes::all() - option).shows(store_type));
        }

        assert!(StoreTypes::default().shows(StoreType::WebStagingMain));
        assert!(!StoreTypes::default().shows(StoreType::WebAuthorMain));
        assert!(!StoreTypes::default().shows(StoreType::WebStagingPreview));
        assert!(StoreType::WebAuthorPreview.is_sandbox());
        assert!(!StoreType::WebStagingPreview.is_sandbox());
    }

    #[test]
    fn test_option_names() {
        assert_eq!(StoreTypes::from_option_name(" Author "), Some(StoreTypes::AUTHOR));
        assert_eq!(StoreTypes::from_option_name("sandbox"), None);
        assert_eq!(
            StoreTypes::DEFAULT_SHOW.option_names(),
            vec!["normal", "site", "staging"]
        );
    }
}
