// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for the AVM file-sharing gateway:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Static shares, bound to a store/version or presenting a virtual view
// - Dynamic `<store>_<version>` shares
// - File-state cache expiry
// - NFS export settings

use crate::domain::constants::DEFAULT_STATE_EXPIRY_SECS;
use crate::domain::store_path::Version;
use crate::domain::store_type::StoreTypes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "avmfs/v1";
pub const KIND: &str = "GatewayConfig";

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "avmfs/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GatewayConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub shares: Vec<ShareConfig>,

    /// Allow `<store>_<version>` share names to be resolved on demand
    #[serde(default = "default_true")]
    pub dynamic_shares: bool,

    #[serde(default)]
    pub state_cache: StateCacheConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfs: Option<NfsConfig>,
}

/// One statically configured share
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareConfig {
    pub name: String,

    /// `store` or `store:/base/path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,

    /// `head` or a non-negative version id (default: head)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Create the store and base folders at HEAD when missing
    #[serde(default)]
    pub create_store: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_view: Option<VirtualViewConfig>,
}

impl ShareConfig {
    /// Parsed version, HEAD when unset. `None` for malformed values.
    pub fn parsed_version(&self) -> Option<Version> {
        match self.version.as_deref() {
            None => Some(Version::Head),
            Some(raw) => Version::parse_segment(raw.trim()),
        }
    }
}

/// Store types a virtual view lists.
///
/// `stores` names the show options (`normal`, `site`, `staging`, `author`,
/// `preview`). Without it, `showSandboxes` lists every type and the default
/// lists everything except author sandboxes and previews.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualViewConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stores: Option<Vec<String>>,

    #[serde(default)]
    pub show_sandboxes: bool,
}

impl VirtualViewConfig {
    pub fn with_stores(stores: &[&str]) -> Self {
        Self {
            stores: Some(stores.iter().map(|s| s.to_string()).collect()),
            show_sandboxes: false,
        }
    }

    pub fn show_options(&self) -> anyhow::Result<StoreTypes> {
        let Some(names) = &self.stores else {
            return Ok(if self.show_sandboxes {
                StoreTypes::all()
            } else {
                StoreTypes::default()
            });
        };

        names.iter().try_fold(StoreTypes::empty(), |show, name| {
            StoreTypes::from_option_name(name)
                .map(|option| show | option)
                .ok_or_else(|| {
                    anyhow::anyhow!("Unknown store type '{}' in virtualView.stores", name)
                })
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCacheConfig {
    #[serde(default = "default_state_expiry")]
    pub expiry_seconds: u64,
}

impl Default for StateCacheConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: default_state_expiry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_nfs_port")]
    pub port: u16,

    /// Share exported over NFS
    pub export_share: String,
}

fn default_true() -> bool {
    true
}

fn default_state_expiry() -> u64 {
    DEFAULT_STATE_EXPIRY_SECS
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_nfs_port() -> u16 {
    11111
}

impl Default for GatewayConfigSpec {
    fn default() -> Self {
        Self {
            shares: vec![
                ShareConfig {
                    name: "main".to_string(),
                    store: Some("main".to_string()),
                    version: Some("head".to_string()),
                    create_store: true,
                    virtual_view: None,
                },
                ShareConfig {
                    name: "avm".to_string(),
                    virtual_view: Some(VirtualViewConfig::default()),
                    ..ShareConfig::default()
                },
            ],
            dynamic_shares: true,
            state_cache: StateCacheConfig::default(),
            nfs: Some(NfsConfig {
                enabled: true,
                bind_address: default_bind_address(),
                port: default_nfs_port(),
                export_share: "main".to_string(),
            }),
        }
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "avm-gateway".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AVMFS_CONFIG_PATH environment variable
    /// 2. ./avmfs-config.yaml (working directory)
    /// 3. ~/.avmfs/config.yaml (user home)
    /// 4. /etc/avmfs/config.yaml (system, Unix) or C:\ProgramData\Avmfs\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AVMFS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./avmfs-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".avmfs").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/avmfs/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Avmfs\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AVMFS_DYNAMIC_SHARES") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: AVMFS_DYNAMIC_SHARES=true");
                    self.spec.dynamic_shares = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: AVMFS_DYNAMIC_SHARES=false");
                    self.spec.dynamic_shares = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid AVMFS_DYNAMIC_SHARES value '{}', expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("AVMFS_NFS_PORT") {
            match (val.parse::<u16>(), self.spec.nfs.as_mut()) {
                (Ok(port), Some(nfs)) => {
                    tracing::info!("Environment override: AVMFS_NFS_PORT={}", port);
                    nfs.port = port;
                }
                (Ok(_), None) => {
                    tracing::warn!("AVMFS_NFS_PORT set but no nfs section configured. Ignoring.");
                }
                (Err(_), _) => {
                    tracing::warn!("Invalid value for AVMFS_NFS_PORT: '{}'. Ignoring.", val);
                }
            }
        }
    }

    /// Find a static share by name (case-insensitive)
    pub fn share(&self, name: &str) -> Option<&ShareConfig> {
        self.spec
            .shares
            .iter()
            .find(|share| share.name.eq_ignore_ascii_case(name))
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let mut seen = HashSet::new();
        for share in &self.spec.shares {
            if share.name.trim().is_empty() {
                anyhow::bail!("Share name cannot be empty");
            }
            if !seen.insert(share.name.to_uppercase()) {
                anyhow::bail!("Duplicate share name: {}", share.name);
            }

            match (&share.store, &share.virtual_view) {
                (Some(_), Some(_)) => anyhow::bail!(
                    "Share '{}' cannot have both store and virtualView",
                    share.name
                ),
                (None, None) => anyhow::bail!(
                    "Share '{}' must have either store or virtualView",
                    share.name
                ),
                (Some(store), None) => {
                    let store_name = store.split_once(':').map_or(store.as_str(), |(n, _)| n);
                    if store_name.is_empty() {
                        anyhow::bail!("Share '{}' has an empty store name", share.name);
                    }
                    let Some(version) = share.parsed_version() else {
                        anyhow::bail!(
                            "Share '{}' has invalid version '{}'",
                            share.name,
                            share.version.as_deref().unwrap_or_default()
                        );
                    };
                    if share.create_store && !version.is_head() {
                        anyhow::bail!(
                            "Share '{}' can only create its store at head",
                            share.name
                        );
                    }
                }
                (None, Some(view)) => {
                    if share.version.is_some() || share.create_store {
                        anyhow::bail!(
                            "Virtual view share '{}' cannot set version or createStore",
                            share.name
                        );
                    }
                    view.show_options()
                        .map_err(|e| anyhow::anyhow!("Share '{}': {}", share.name, e))?;
                }
            }
        }

        if let Some(nfs) = &self.spec.nfs {
            if nfs.enabled && self.share(&nfs.export_share).is_none() {
                anyhow::bail!("NFS export share '{}' not found in shares", nfs.export_share);
            }
        }

        Ok(())
    }
}
