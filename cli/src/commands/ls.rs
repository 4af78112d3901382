// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! List command

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use avm_gateway_core::domain::config::GatewayConfigManifest;
use avm_gateway_core::domain::file_info::FileInfo;

use crate::embedded::EmbeddedGateway;

#[derive(Args)]
pub struct LsArgs {
    /// Share name; <store>_<version> resolves a snapshot
    #[arg(value_name = "SHARE")]
    pub share: String,

    /// Folder within the share
    #[arg(value_name = "PATH", default_value = "\\")]
    pub path: String,

    /// Seed the HEAD of each configured store from this local directory
    #[arg(long, value_name = "DIR")]
    pub seed: Option<PathBuf>,

    /// Print entries as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print the names of all stores
    #[arg(long)]
    pub stores: bool,
}

pub async fn execute(args: LsArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let gateway = EmbeddedGateway::new(&config, args.seed.as_deref()).await?;

    if args.stores {
        let names = gateway
            .driver()
            .store_names()
            .await
            .context("Failed to list stores")?;
        println!("{}", "Stores:".bold());
        for name in names {
            println!("  {}", name);
        }
        println!();
    }

    let entries = gateway.list(&args.share, &args.path).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{}", format!("{}:{}", args.share, args.path).bold());
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    println!("{}", format!("{} entries", entries.len()).dimmed());
    Ok(())
}

fn format_entry(entry: &FileInfo) -> String {
    let flags = format!(
        "{}{}{}",
        if entry.is_directory() { 'd' } else { '-' },
        if entry.is_read_only() { 'r' } else { 'w' },
        if entry.is_hidden() { 'h' } else { '-' },
    );
    let name = if entry.is_directory() {
        format!("{}\\", entry.name).blue().to_string()
    } else {
        entry.name.clone()
    };
    format!(
        "  {} {:>10} {} {}",
        flags,
        entry.size,
        entry.modified.format("%Y-%m-%d %H:%M"),
        name
    )
}
