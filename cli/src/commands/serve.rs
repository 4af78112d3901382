// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Serve command
//!
//! Registers every configured share and exports one of them over NFS until
//! interrupted.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use avm_gateway_core::application::SrvSession;
use avm_gateway_core::domain::config::GatewayConfigManifest;
use avm_gateway_core::infrastructure::nfs::NfsServer;

use crate::embedded::EmbeddedGateway;

#[derive(Args)]
pub struct ServeArgs {
    /// Seed the HEAD of each configured store from this local directory
    #[arg(long, value_name = "DIR")]
    pub seed: Option<PathBuf>,

    /// Share to export (default: spec.nfs.exportShare)
    #[arg(long, value_name = "SHARE")]
    pub share: Option<String>,
}

pub async fn execute(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let nfs = config
        .spec
        .nfs
        .clone()
        .filter(|nfs| nfs.enabled)
        .context("NFS export is disabled in the configuration")?;
    let share_name = args.share.unwrap_or_else(|| nfs.export_share.clone());

    let gateway = EmbeddedGateway::new(&config, args.seed.as_deref()).await?;

    let mut session = SrvSession::new("nfs");
    let tree = gateway
        .mapper()
        .find_share(&mut session, &share_name, true)
        .await
        .with_context(|| format!("Share '{}' not found", share_name))?;

    let server = NfsServer::new(
        gateway.driver().clone(),
        tree,
        nfs.bind_address.clone(),
        nfs.port,
    );
    let port = server
        .start()
        .await
        .context("Failed to start NFS server")?;

    println!(
        "{}",
        format!(
            "✓ Exporting share '{}' on {}:{}",
            share_name, nfs.bind_address, port
        )
        .green()
    );
    println!(
        "  mount -t nfs -o nolock,vers=3,tcp,port={},mountport={} <host>:/ <dir>",
        port, port
    );
    println!("{}", "Press Ctrl-C to stop".dimmed());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    server.stop();
    gateway.mapper().delete_shares(&mut session);
    Ok(())
}
