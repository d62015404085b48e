// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Failure policy for rebind passes.
//!
//! Every per-object problem is routed to a [`RebindExceptionHandler`], which
//! records it and decides, per failure class, whether to abort immediately
//! ([`FailureMode::FailFast`]), fail the pass once it completes
//! ([`FailureMode::FailAtEnd`]), or carry on ([`FailureMode::Continue`]).

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{ProblemKind, RebindError, RebindFailure, RebindProblem, Result};
use crate::memento::BrooklynObjectType;
use crate::objects::{Adjunct, CatalogItem, Entity, Location, ManagedBundle};

/// What to do when a class of problem occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    FailFast,
    FailAtEnd,
    Continue,
}

impl FailureMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Some(FailureMode::FailFast),
            "fail_at_end" => Some(FailureMode::FailAtEnd),
            "continue" => Some(FailureMode::Continue),
            _ => None,
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureMode::FailFast => "fail_fast",
            FailureMode::FailAtEnd => "fail_at_end",
            FailureMode::Continue => "continue",
        })
    }
}

/// Failure mode per problem class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebindFailureModes {
    pub dangling_ref: FailureMode,
    pub load: FailureMode,
    pub create: FailureMode,
    pub rebind: FailureMode,
    pub add_adjunct: FailureMode,
    pub manage: FailureMode,
    pub not_found: FailureMode,
}

impl Default for RebindFailureModes {
    fn default() -> Self {
        Self {
            dangling_ref: FailureMode::Continue,
            load: FailureMode::FailAtEnd,
            create: FailureMode::FailAtEnd,
            rebind: FailureMode::FailAtEnd,
            add_adjunct: FailureMode::Continue,
            manage: FailureMode::FailAtEnd,
            not_found: FailureMode::FailAtEnd,
        }
    }
}

impl RebindFailureModes {
    pub fn mode_for(&self, kind: ProblemKind) -> FailureMode {
        match kind {
            ProblemKind::LoadMemento => self.load,
            ProblemKind::DanglingReference => self.dangling_ref,
            ProblemKind::Create => self.create,
            ProblemKind::NotFound => self.not_found,
            ProblemKind::Rebind => self.rebind,
            ProblemKind::AddAdjunct => self.add_adjunct,
            ProblemKind::Manage => self.manage,
            ProblemKind::Failed => FailureMode::FailFast,
        }
    }
}

/// Hooks invoked by a rebind pass for every problem it meets.
///
/// Hooks returning `Result` abort the pass when they return an error.
/// Dangling-reference hooks may return a substitute object; the pass caches
/// it so the same id always yields the same substitute.
pub trait RebindExceptionHandler: Send + Sync {
    fn on_start(&self);

    /// A non-fatal irregularity, such as a catalog fallback.
    fn on_warning(&self, message: &str);

    fn on_load_memento_failed(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        error: &RebindError,
    ) -> Result<()>;

    fn on_dangling_entity_ref(&self, id: &str) -> Result<Option<Arc<Entity>>>;

    fn on_dangling_location_ref(&self, id: &str) -> Result<Option<Arc<Location>>>;

    fn on_dangling_adjunct_ref(
        &self,
        kind: BrooklynObjectType,
        id: &str,
    ) -> Result<Option<Arc<Adjunct>>>;

    fn on_dangling_policy_ref(&self, id: &str) -> Result<Option<Arc<Adjunct>>> {
        self.on_dangling_adjunct_ref(BrooklynObjectType::Policy, id)
    }

    fn on_dangling_enricher_ref(&self, id: &str) -> Result<Option<Arc<Adjunct>>> {
        self.on_dangling_adjunct_ref(BrooklynObjectType::Enricher, id)
    }

    fn on_dangling_feed_ref(&self, id: &str) -> Result<Option<Arc<Adjunct>>> {
        self.on_dangling_adjunct_ref(BrooklynObjectType::Feed, id)
    }

    fn on_dangling_catalog_item_ref(&self, id: &str) -> Result<Option<Arc<CatalogItem>>>;

    fn on_dangling_bundle_ref(&self, id: &str) -> Result<Option<Arc<ManagedBundle>>>;

    fn on_create_failed(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        error: &RebindError,
    ) -> Result<()>;

    fn on_not_found(&self, object_type: BrooklynObjectType, id: &str) -> Result<()>;

    fn on_rebind_failed(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        error: &RebindError,
    ) -> Result<()>;

    fn on_add_adjunct_failed(
        &self,
        entity_id: &str,
        adjunct: &Adjunct,
        error: &RebindError,
    ) -> Result<()>;

    fn on_manage_failed(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        error: &RebindError,
    ) -> Result<()>;

    /// The pass finished. Errors if any recorded problem fails at end.
    fn on_done(&self) -> std::result::Result<(), RebindFailure>;

    /// The pass aborted with `cause`.
    fn on_failed(&self, cause: &RebindError) -> RebindFailure;

    fn errors(&self) -> Vec<RebindProblem>;

    fn warnings(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
struct HandlerState {
    errors: Vec<RebindProblem>,
    warnings: Vec<String>,
    /// Recorded problems whose mode is fail-at-end.
    fail_at_end: usize,
    started: bool,
}

/// Handler driven by [`RebindFailureModes`].
///
/// Dangling entity and location references in continue mode are replaced by
/// placeholders and recorded as warnings.
#[derive(Debug)]
pub struct DefaultRebindExceptionHandler {
    modes: RebindFailureModes,
    state: Mutex<HandlerState>,
}

impl Default for DefaultRebindExceptionHandler {
    fn default() -> Self {
        Self::new(RebindFailureModes::default())
    }
}

impl DefaultRebindExceptionHandler {
    pub fn new(modes: RebindFailureModes) -> Self {
        Self {
            modes,
            state: Mutex::new(HandlerState::default()),
        }
    }

    pub fn modes(&self) -> &RebindFailureModes {
        &self.modes
    }

    /// Record a problem and apply its failure mode.
    fn record(
        &self,
        kind: ProblemKind,
        object_type: BrooklynObjectType,
        id: &str,
        message: String,
    ) -> Result<()> {
        let problem = RebindProblem {
            kind,
            object_type: Some(object_type),
            id: Some(id.to_string()),
            message,
        };
        let mode = self.modes.mode_for(kind);
        error!(kind = %kind, object_type = %object_type, id = %id, mode = %mode, "{}", problem.message);

        let mut state = self.state.lock();
        state.errors.push(problem.clone());
        match mode {
            FailureMode::FailFast => Err(RebindError::Aborted(problem.to_string())),
            FailureMode::FailAtEnd => {
                state.fail_at_end += 1;
                Ok(())
            }
            FailureMode::Continue => Ok(()),
        }
    }

    /// Returns whether a substitute should be handed out.
    fn dangling(&self, object_type: BrooklynObjectType, id: &str) -> Result<bool> {
        match self.modes.dangling_ref {
            FailureMode::Continue => {
                warn!(object_type = %object_type, id = %id, "Dangling reference");
                self.state
                    .lock()
                    .warnings
                    .push(format!("dangling reference to {object_type} {id}"));
                Ok(true)
            }
            FailureMode::FailFast | FailureMode::FailAtEnd => {
                let missing = RebindError::DanglingReference {
                    object_type,
                    id: id.to_string(),
                };
                self.record(ProblemKind::DanglingReference, object_type, id, missing.to_string())?;
                Ok(false)
            }
        }
    }

    fn failure(&self, cause: Option<String>) -> RebindFailure {
        let state = self.state.lock();
        RebindFailure {
            cause,
            errors: state.errors.clone(),
            warnings: state.warnings.clone(),
        }
    }
}

impl RebindExceptionHandler for DefaultRebindExceptionHandler {
    fn on_start(&self) {
        let mut state = self.state.lock();
        *state = HandlerState {
            started: true,
            ..HandlerState::default()
        };
        debug!(modes = ?self.modes, "Rebind exception handler started");
    }

    fn on_warning(&self, message: &str) {
        warn!("{message}");
        self.state.lock().warnings.push(message.to_string());
    }

    fn on_load_memento_failed(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        error: &RebindError,
    ) -> Result<()> {
        self.record(ProblemKind::LoadMemento, object_type, id, error.to_string())
    }

    fn on_dangling_entity_ref(&self, id: &str) -> Result<Option<Arc<Entity>>> {
        let substitute = self.dangling(BrooklynObjectType::Entity, id)?;
        Ok(substitute.then(|| Entity::placeholder(id)))
    }

    fn on_dangling_location_ref(&self, id: &str) -> Result<Option<Arc<Location>>> {
        let substitute = self.dangling(BrooklynObjectType::Location, id)?;
        Ok(substitute.then(|| Location::placeholder(id)))
    }

    fn on_dangling_adjunct_ref(
        &self,
        kind: BrooklynObjectType,
        id: &str,
    ) -> Result<Option<Arc<Adjunct>>> {
        self.dangling(kind, id)?;
        Ok(None)
    }

    fn on_dangling_catalog_item_ref(&self, id: &str) -> Result<Option<Arc<CatalogItem>>> {
        self.dangling(BrooklynObjectType::CatalogItem, id)?;
        Ok(None)
    }

    fn on_dangling_bundle_ref(&self, id: &str) -> Result<Option<Arc<ManagedBundle>>> {
        self.dangling(BrooklynObjectType::ManagedBundle, id)?;
        Ok(None)
    }

    fn on_create_failed(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        error: &RebindError,
    ) -> Result<()> {
        self.record(ProblemKind::Create, object_type, id, error.to_string())
    }

    fn on_not_found(&self, object_type: BrooklynObjectType, id: &str) -> Result<()> {
        self.record(
            ProblemKind::NotFound,
            object_type,
            id,
            format!("{object_type} {id} was not instantiated"),
        )
    }

    fn on_rebind_failed(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        error: &RebindError,
    ) -> Result<()> {
        self.record(ProblemKind::Rebind, object_type, id, error.to_string())
    }

    fn on_add_adjunct_failed(
        &self,
        entity_id: &str,
        adjunct: &Adjunct,
        error: &RebindError,
    ) -> Result<()> {
        self.record(
            ProblemKind::AddAdjunct,
            adjunct.kind(),
            adjunct.id(),
            format!("cannot attach to entity {entity_id}: {error}"),
        )
    }

    fn on_manage_failed(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        error: &RebindError,
    ) -> Result<()> {
        self.record(ProblemKind::Manage, object_type, id, error.to_string())
    }

    fn on_done(&self) -> std::result::Result<(), RebindFailure> {
        let (fail_at_end, started) = {
            let state = self.state.lock();
            (state.fail_at_end, state.started)
        };
        if !started {
            warn!("Rebind exception handler finished without being started");
        }
        if fail_at_end > 0 {
            return Err(self.failure(None));
        }
        Ok(())
    }

    fn on_failed(&self, cause: &RebindError) -> RebindFailure {
        self.state.lock().errors.push(RebindProblem {
            kind: ProblemKind::Failed,
            object_type: None,
            id: None,
            message: cause.to_string(),
        });
        self.failure(Some(cause.to_string()))
    }

    fn errors(&self) -> Vec<RebindProblem> {
        self.state.lock().errors.clone()
    }

    fn warnings(&self) -> Vec<String> {
        self.state.lock().warnings.clone()
    }
}
