// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Entry point for rebind passes and checkpoints.
//!
//! [`RebindManager`] runs one pass at a time. A master node rebinds once and
//! then checkpoints its live state; a standby node rebinds read-only on a
//! period until it is promoted.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{BasicCatalogInitialization, CatalogInitialization};
use crate::config::RebindConfig;
use crate::error::{RebindError, RebindFailure, Result};
use crate::exception_handler::DefaultRebindExceptionHandler;
use crate::iteration::{RebindIteration, RebindReport};
use crate::management::ManagementContext;
use crate::persistence::PersistenceStore;

/// High-availability role of this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebindMode {
    /// Owns the persisted state: activates objects and writes checkpoints.
    Master,
    /// Mirrors the persisted state, ready to take over.
    HotStandby,
    /// Mirrors the persisted state for inspection only.
    ReadOnly,
}

impl RebindMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Some(RebindMode::Master),
            "hot_standby" | "hot-standby" => Some(RebindMode::HotStandby),
            "read_only" | "read-only" => Some(RebindMode::ReadOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RebindMode::Master => "master",
            RebindMode::HotStandby => "hot_standby",
            RebindMode::ReadOnly => "read_only",
        }
    }

    pub fn is_read_only(&self) -> bool {
        !matches!(self, RebindMode::Master)
    }
}

impl fmt::Display for RebindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializes rebind passes and owns the node's HA mode.
pub struct RebindManager {
    management: Arc<ManagementContext>,
    store: Arc<dyn PersistenceStore>,
    catalog_init: Arc<dyn CatalogInitialization>,
    config: RebindConfig,
    mode: RwLock<RebindMode>,
    rebind_active: Semaphore,
    /// Interrupts the read-only pass in flight.
    read_only_cancel: Mutex<CancellationToken>,
    last_report: RwLock<Option<RebindReport>>,
    /// Set by a successful rebind as master, cleared by a failed one.
    master_restored: AtomicBool,
}

impl RebindManager {
    pub fn new(
        management: Arc<ManagementContext>,
        store: Arc<dyn PersistenceStore>,
        config: RebindConfig,
        mode: RebindMode,
    ) -> Self {
        Self {
            management,
            store,
            catalog_init: Arc::new(BasicCatalogInitialization),
            config,
            mode: RwLock::new(mode),
            rebind_active: Semaphore::new(1),
            read_only_cancel: Mutex::new(CancellationToken::new()),
            last_report: RwLock::new(None),
            master_restored: AtomicBool::new(false),
        }
    }

    /// Replace how persisted catalog state is installed.
    pub fn with_catalog_initialization(mut self, catalog_init: Arc<dyn CatalogInitialization>) -> Self {
        self.catalog_init = catalog_init;
        self
    }

    pub fn mode(&self) -> RebindMode {
        *self.mode.read()
    }

    pub fn management(&self) -> &Arc<ManagementContext> {
        &self.management
    }

    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.store
    }

    /// Report of the most recent successful pass.
    pub fn last_report(&self) -> Option<RebindReport> {
        self.last_report.read().clone()
    }

    /// Run one pass in the current mode. Waits for a pass already running.
    pub async fn rebind(&self) -> std::result::Result<RebindReport, RebindFailure> {
        let _permit = self.rebind_active.acquire().await.map_err(|e| RebindFailure {
            cause: Some(e.to_string()),
            errors: Vec::new(),
            warnings: Vec::new(),
        })?;

        let mode = self.mode();
        let cancel = self.read_only_cancel.lock().clone();
        let handler = Arc::new(DefaultRebindExceptionHandler::new(self.config.failure_modes));
        let result = RebindIteration::new(
            mode,
            self.management.clone(),
            self.store.clone(),
            handler,
            self.catalog_init.clone(),
            self.config.legacy_catalog_scan,
        )
        .with_cancellation(cancel)
        .run()
        .await;

        if mode == RebindMode::Master {
            self.master_restored.store(result.is_ok(), Ordering::SeqCst);
        }
        let report = result?;
        *self.last_report.write() = Some(report.clone());
        Ok(report)
    }

    /// Whether [`persist`](Self::persist) may write: master, with the live
    /// state restored by a successful rebind.
    pub fn can_persist(&self) -> bool {
        !self.mode().is_read_only() && self.master_restored.load(Ordering::SeqCst)
    }

    /// Write the live state to the store. Master only, and only after a
    /// successful rebind as master, so a partial graph never replaces the
    /// persisted one.
    pub async fn persist(&self) -> Result<()> {
        let mode = self.mode();
        if mode.is_read_only() {
            return Err(RebindError::NotPermitted(mode));
        }
        if !self.master_restored.load(Ordering::SeqCst) {
            return Err(RebindError::StateNotRestored);
        }
        let raw = self.management.snapshot()?;
        self.store.checkpoint(&raw).await?;
        debug!(records = raw.len(), "Persisted management state");
        Ok(())
    }

    /// Rebind read-only every `period` until `shutdown` fires or the node is
    /// promoted. Failed passes are logged and retried on the next tick.
    pub async fn run_read_only(&self, period: Duration, shutdown: CancellationToken) {
        info!(period_ms = period.as_millis() as u64, "Read-only rebind loop started");

        loop {
            if !self.mode().is_read_only() {
                break;
            }
            match self.rebind().await {
                Ok(report) => debug!(entities = report.entities, "Read-only rebind finished"),
                Err(failure) => warn!(error = %failure, "Read-only rebind failed"),
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = tokio::time::sleep(period) => {}
            }
        }

        info!("Read-only rebind loop stopped");
    }

    /// Become master: interrupt any read-only pass, then rebind as master.
    ///
    /// If that rebind fails the node stays master but does not checkpoint
    /// until a later rebind succeeds.
    pub async fn promote_to_master(&self) -> std::result::Result<RebindReport, RebindFailure> {
        let previous = {
            let mut mode = self.mode.write();
            let previous = *mode;
            *mode = RebindMode::Master;
            previous
        };
        if previous == RebindMode::Master {
            debug!("Already master, rebinding");
        } else {
            let cancel = {
                let mut token = self.read_only_cancel.lock();
                std::mem::replace(&mut *token, CancellationToken::new())
            };
            cancel.cancel();

            match self.last_report() {
                Some(report) if report.is_complete() => {
                    info!(
                        from = %previous,
                        entities = report.entities,
                        finished_at = %report.finished_at,
                        "Promoting to master from a complete read-only state"
                    );
                }
                Some(_) => warn!(from = %previous, "Last read-only rebind was incomplete"),
                None => warn!(from = %previous, "Promoting to master without a read-only rebind"),
            }
        }

        self.rebind().await.inspect_err(|failure| {
            error!(error = %failure, "Rebind as master failed after promotion");
        })
    }

    /// Checkpoint every `period` until notified. Errors are logged.
    pub async fn run_persister(&self, period: Duration, shutdown: Arc<Notify>) {
        info!(period_ms = period.as_millis() as u64, "Persister started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,

                _ = tokio::time::sleep(period) => {
                    if !self.can_persist() {
                        debug!(mode = %self.mode(), "Skipping checkpoint");
                        continue;
                    }
                    if let Err(e) = self.persist().await {
                        error!(error = %e, "Failed to persist management state");
                    }
                }
            }
        }

        info!("Persister stopped");
    }
}
