// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the task registry and garbage collector.

use thiserror::Error;

/// Errors from loading task or garbage collection configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value could not be parsed.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    /// A duration string was malformed.
    #[error("invalid duration '{0}': expected a number with optional unit (ms, s, m, h, d)")]
    Duration(String),
}

/// Errors from task execution helpers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TaskError {
    /// The task was not found in the registry.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The task was already completed.
    #[error("task already completed: {0}")]
    AlreadyDone(String),
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, TaskError>;
