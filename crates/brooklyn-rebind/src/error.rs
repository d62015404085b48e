// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for rebind.

use std::fmt;

use thiserror::Error;

use crate::memento::BrooklynObjectType;
use crate::iteration::RebindPhase;

/// Errors raised while loading persisted state or rebuilding objects from it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RebindError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Persistence store error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisted data for a single object could not be parsed.
    #[error("corrupt {object_type} memento {id}: {reason}")]
    CorruptMemento {
        object_type: BrooklynObjectType,
        id: String,
        reason: String,
    },

    /// Every step of type resolution failed.
    #[error("cannot resolve type '{type_name}' for {object_type} {id}; tried: {}", .attempts.join("; "))]
    TypeResolution {
        object_type: BrooklynObjectType,
        id: String,
        type_name: String,
        attempts: Vec<String>,
    },

    /// An id referenced by another object does not exist.
    #[error("dangling reference to {object_type} {id}")]
    DanglingReference {
        object_type: BrooklynObjectType,
        id: String,
    },

    /// An id was registered twice in one rebind.
    #[error("duplicate {object_type} id {id}")]
    DuplicateId {
        object_type: BrooklynObjectType,
        id: String,
    },

    /// Restoring an object's state from its memento failed.
    #[error("failed to reconstruct {object_type} {id}: {reason}")]
    Reconstruct {
        object_type: BrooklynObjectType,
        id: String,
        reason: String,
    },

    /// Attaching or managing an object failed.
    #[error("failed to manage {object_type} {id}: {reason}")]
    Manage {
        object_type: BrooklynObjectType,
        id: String,
        reason: String,
    },

    /// A bundle could not be installed.
    #[error("bundle {0} unavailable: {1}")]
    Bundle(String, String),

    /// Phases must run strictly in order.
    #[error("illegal rebind phase transition from {from} to {to}")]
    IllegalPhaseTransition { from: RebindPhase, to: RebindPhase },

    /// A read-only rebind was interrupted by promotion or shutdown.
    #[error("rebind interrupted before {0}")]
    Interrupted(RebindPhase),

    /// The operation is not allowed in the current HA mode.
    #[error("operation not permitted in {0} mode")]
    NotPermitted(crate::manager::RebindMode),

    /// No rebind as master has succeeded, so live state is incomplete.
    #[error("live state not restored; the last rebind as master failed or never ran")]
    StateNotRestored,

    /// The exception handler chose to abort the pass.
    #[error("rebind aborted: {0}")]
    Aborted(String),
}

/// Result type for rebind operations.
pub type Result<T> = std::result::Result<T, RebindError>;

/// Category of a problem recorded during a rebind pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    LoadMemento,
    DanglingReference,
    Create,
    NotFound,
    Rebind,
    AddAdjunct,
    Manage,
    Failed,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProblemKind::LoadMemento => "load",
            ProblemKind::DanglingReference => "dangling-reference",
            ProblemKind::Create => "create",
            ProblemKind::NotFound => "not-found",
            ProblemKind::Rebind => "rebind",
            ProblemKind::AddAdjunct => "add-adjunct",
            ProblemKind::Manage => "manage",
            ProblemKind::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single problem recorded by the exception handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindProblem {
    pub kind: ProblemKind,
    pub object_type: Option<BrooklynObjectType>,
    pub id: Option<String>,
    pub message: String,
}

impl fmt::Display for RebindProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.object_type, &self.id) {
            (Some(t), Some(id)) => write!(f, "[{}] {t} {id}: {}", self.kind, self.message),
            _ => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Outcome of a failed rebind pass: every accumulated error and warning.
#[derive(Debug, Clone, Error)]
#[error("rebind failed with {} error(s){}", .errors.len(), .cause.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
pub struct RebindFailure {
    pub cause: Option<String>,
    pub errors: Vec<RebindProblem>,
    pub warnings: Vec<String>,
}

impl RebindFailure {
    /// Ids of the objects that failed, in the order they were reported.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.errors.iter().filter_map(|p| p.id.as_deref()).collect()
    }
}
