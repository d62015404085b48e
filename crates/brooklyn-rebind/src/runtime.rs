// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable management node.
//!
//! [`ManagementRuntime`] wires the task garbage collector, the rebind manager
//! and the periodic persister into an existing tokio application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use brooklyn_rebind::persistence::SqlitePersistenceStore;
//! use brooklyn_rebind::runtime::ManagementRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqlitePersistenceStore::from_path(".data/brooklyn.db").await?;
//!
//!     let runtime = ManagementRuntime::builder()
//!         .store(Arc::new(store))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... the node is now rebound and checkpointing ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! A master node rebinds before `start` returns; a failed rebind fails the
//! start. A standby node starts its read-only loop instead and can be
//! promoted with [`ManagementRuntime::promote_to_master`].

use std::sync::Arc;

use anyhow::Result;
use brooklyn_tasks::{BasicExecutionManager, GarbageCollector, GcConfig, GcHandle};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::{BasicCatalogInitialization, CatalogInitialization};
use crate::config::{Config, RebindConfig};
use crate::iteration::RebindReport;
use crate::management::ManagementContext;
use crate::manager::{RebindManager, RebindMode};
use crate::persistence::PersistenceStore;

/// Builder for creating a [`ManagementRuntime`].
pub struct ManagementRuntimeBuilder {
    store: Option<Arc<dyn PersistenceStore>>,
    management: Option<Arc<ManagementContext>>,
    catalog_init: Arc<dyn CatalogInitialization>,
    mode: RebindMode,
    rebind: RebindConfig,
    gc: GcConfig,
}

impl Default for ManagementRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            management: None,
            catalog_init: Arc::new(BasicCatalogInitialization),
            mode: RebindMode::Master,
            rebind: RebindConfig::default(),
            gc: GcConfig::default(),
        }
    }
}

impl ManagementRuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence store (required).
    pub fn store(mut self, store: Arc<dyn PersistenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an existing management context, for example one with custom
    /// constructors registered.
    ///
    /// Default: a fresh context with the basic types.
    pub fn management(mut self, management: Arc<ManagementContext>) -> Self {
        self.management = Some(management);
        self
    }

    pub fn catalog_initialization(mut self, catalog_init: Arc<dyn CatalogInitialization>) -> Self {
        self.catalog_init = catalog_init;
        self
    }

    /// Default: [`RebindMode::Master`]
    pub fn mode(mut self, mode: RebindMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rebind_config(mut self, config: RebindConfig) -> Self {
        self.rebind = config;
        self
    }

    pub fn gc_config(mut self, config: GcConfig) -> Self {
        self.gc = config;
        self
    }

    /// Apply mode, rebind and GC settings from a loaded [`Config`].
    pub fn config(self, config: &Config) -> Self {
        self.mode(config.ha_mode)
            .rebind_config(config.rebind.clone())
            .gc_config(config.gc.clone())
    }

    pub fn build(self) -> Result<ManagementRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let management = self
            .management
            .unwrap_or_else(|| ManagementContext::new(Arc::new(BasicExecutionManager::new())));

        Ok(ManagementRuntimeConfig {
            store,
            management,
            catalog_init: self.catalog_init,
            mode: self.mode,
            rebind: self.rebind,
            gc: self.gc,
        })
    }
}

/// Validated runtime settings, ready to start.
pub struct ManagementRuntimeConfig {
    store: Arc<dyn PersistenceStore>,
    management: Arc<ManagementContext>,
    catalog_init: Arc<dyn CatalogInitialization>,
    mode: RebindMode,
    rebind: RebindConfig,
    gc: GcConfig,
}

impl ManagementRuntimeConfig {
    /// Start the garbage collector, rebind or start the standby loop, and
    /// start the persister.
    pub async fn start(self) -> Result<ManagementRuntime> {
        let management = self.management;

        let gc = GarbageCollector::new(
            management.execution_manager().clone(),
            management.clone(),
            self.gc,
        );
        management.set_garbage_collector(&gc);
        let gc_handle = gc.spawn();

        let read_only_period = self.rebind.read_only_period;
        let persist_period = self.rebind.persist_period;
        let manager = Arc::new(
            RebindManager::new(management.clone(), self.store, self.rebind, self.mode)
                .with_catalog_initialization(self.catalog_init),
        );

        let read_only_shutdown = CancellationToken::new();
        let read_only_handle = if self.mode.is_read_only() {
            let manager = manager.clone();
            let shutdown = read_only_shutdown.clone();
            Some(tokio::spawn(async move {
                manager.run_read_only(read_only_period, shutdown).await;
            }))
        } else {
            if let Err(failure) = manager.rebind().await {
                gc_handle.abort();
                return Err(failure.into());
            }
            None
        };

        let persister_shutdown = Arc::new(Notify::new());
        let persister_handle = {
            let manager = manager.clone();
            let shutdown = persister_shutdown.clone();
            tokio::spawn(async move {
                manager.run_persister(persist_period, shutdown).await;
            })
        };

        info!(mode = %self.mode, "ManagementRuntime started");

        Ok(ManagementRuntime {
            manager,
            gc_handle,
            read_only_handle,
            read_only_shutdown,
            persister_handle,
            persister_shutdown,
        })
    }
}

/// A running management node.
pub struct ManagementRuntime {
    manager: Arc<RebindManager>,
    gc_handle: GcHandle,
    read_only_handle: Option<JoinHandle<()>>,
    read_only_shutdown: CancellationToken,
    persister_handle: JoinHandle<()>,
    persister_shutdown: Arc<Notify>,
}

impl ManagementRuntime {
    pub fn builder() -> ManagementRuntimeBuilder {
        ManagementRuntimeBuilder::new()
    }

    pub fn manager(&self) -> &Arc<RebindManager> {
        &self.manager
    }

    pub fn management(&self) -> &Arc<ManagementContext> {
        self.manager.management()
    }

    pub fn garbage_collector(&self) -> &Arc<GarbageCollector> {
        self.gc_handle.collector()
    }

    /// Stop the standby loop and take over as master.
    pub async fn promote_to_master(&mut self) -> Result<RebindReport> {
        self.read_only_shutdown.cancel();
        let report = self.manager.promote_to_master().await?;
        if let Some(handle) = self.read_only_handle.take()
            && let Err(e) = handle.await
        {
            error!("Read-only rebind loop panicked: {}", e);
        }
        Ok(report)
    }

    /// Stop background work, writing a final checkpoint when master.
    pub async fn shutdown(self) -> Result<()> {
        info!("ManagementRuntime shutting down...");

        self.read_only_shutdown.cancel();
        self.persister_shutdown.notify_one();

        if let Some(handle) = self.read_only_handle
            && let Err(e) = handle.await
        {
            error!("Read-only rebind loop panicked: {}", e);
        }
        if let Err(e) = self.persister_handle.await {
            error!("Persister panicked: {}", e);
        }

        let result = if self.manager.can_persist() {
            self.manager.persist().await.map_err(anyhow::Error::from)
        } else {
            if !self.manager.mode().is_read_only() {
                warn!("Skipping final checkpoint, live state was not restored");
            }
            Ok(())
        };

        self.gc_handle.shutdown().await;
        info!("ManagementRuntime shutdown complete");
        result
    }

    /// Stop background work without waiting or checkpointing.
    pub fn abort(self) {
        self.read_only_shutdown.cancel();
        if let Some(handle) = self.read_only_handle {
            handle.abort();
        }
        self.persister_handle.abort();
        self.gc_handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.persister_handle.is_finished() && self.garbage_collector().is_running()
    }
}
