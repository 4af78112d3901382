// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use avm_gateway_core::domain::config::GatewayConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./avmfs-config.yaml)
        #[arg(short, long, default_value = "./avmfs-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AVMFS_CONFIG_PATH: {}",
            std::env::var("AVMFS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./avmfs-config.yaml");
        println!("  4. ~/.avmfs/config.yaml");
        println!("  5. /etc/avmfs/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Shares:".bold());
    for share in &config.spec.shares {
        match (&share.store, &share.virtual_view) {
            (Some(store), _) => {
                println!(
                    "  {} → {} @ {}{}",
                    share.name.bold(),
                    store,
                    share.version.as_deref().unwrap_or("head"),
                    if share.create_store {
                        " (create)".dimmed().to_string()
                    } else {
                        String::new()
                    }
                );
            }
            (None, Some(view)) => {
                let stores = match view.show_options() {
                    Ok(show) => show.option_names().join(", "),
                    Err(e) => e.to_string().red().to_string(),
                };
                println!(
                    "  {} → virtual view ({})",
                    share.name.bold(),
                    stores.dimmed()
                );
            }
            (None, None) => println!("  {} → {}", share.name.bold(), "(unbound)".red()),
        }
    }
    println!();

    println!("{}", "Gateway:".bold());
    println!(
        "  Dynamic shares: {}",
        if config.spec.dynamic_shares {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    );
    println!(
        "  File state expiry: {}s",
        config.spec.state_cache.expiry_seconds
    );
    match &config.spec.nfs {
        Some(nfs) if nfs.enabled => println!(
            "  NFS: {}:{} exporting {}",
            nfs.bind_address, nfs.port, nfs.export_share
        ),
        _ => println!("  NFS: {}", "disabled".dimmed()),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    let sample = include_str!("../../templates/avmfs-config.yaml");

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_is_valid() {
        let config =
            GatewayConfigManifest::from_yaml_str(include_str!("../../templates/avmfs-config.yaml"))
                .unwrap();
        config.validate().unwrap();
        assert!(config.share("MAIN").is_some());
    }

    #[tokio::test]
    async fn test_generate_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("avmfs-config.yaml");

        generate(output.clone()).await.unwrap();
        let config = GatewayConfigManifest::from_yaml_file(&output).unwrap();
        assert_eq!(config.kind, "GatewayConfig");
    }
}
