// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Brooklyn management node
//!
//! Restores the managed object graph from persisted mementos, then keeps
//! checkpointing it (master) or mirroring it read-only (standby), with the
//! task garbage collector running alongside.

use std::sync::Arc;
use tracing::{info, warn};

use brooklyn_rebind::config::Config;
use brooklyn_rebind::persistence::SqlitePersistenceStore;
use brooklyn_rebind::runtime::ManagementRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brooklyn_rebind=info,brooklyn_tasks=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        persistence_path = %config.persistence_path.display(),
        ha_mode = %config.ha_mode,
        "Starting Brooklyn management node"
    );

    let store = SqlitePersistenceStore::from_path(&config.persistence_path).await?;
    info!("Persistence store ready");

    let runtime = ManagementRuntime::builder()
        .store(Arc::new(store))
        .config(&config)
        .build()?
        .start()
        .await?;

    if let Some(report) = runtime.manager().last_report() {
        info!(
            entities = report.entities,
            locations = report.locations,
            warnings = report.warnings.len(),
            "Management node ready"
        );
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Brooklyn management node shut down");

    Ok(())
}
