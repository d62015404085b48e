// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task registry and task garbage collection for a management node.
//!
//! Every piece of work a management node does (effector calls, sensor
//! feeds, rebind steps) runs as a [`task::Task`] registered with an
//! [`execution_manager::ExecutionManager`]. Completed tasks stay in the
//! registry so their history can be inspected, which means the registry
//! grows without bound unless something prunes it. That is the job of the
//! [`gc::GarbageCollector`].
//!
//! ```text
//!                       ┌───────────────────────────┐
//!   submit / run ──────►│  BasicExecutionManager    │◄──── EntityExecutionContext
//!                       │  tasks · by_tag · by_sub  │      (one task at a time
//!                       └─────────────┬─────────────┘       per entity)
//!                       on_task_done  │   snapshots / delete
//!                                     ▼
//!                       ┌───────────────────────────┐
//!                       │     GarbageCollector      │◄──── GcConfig snapshot
//!                       │ immediate · unmanaged ·   │      per cycle
//!                       │ aged · per-name · tags ·  │
//!                       │ global                    │
//!                       └───────────────────────────┘
//! ```
//!
//! # Deletion rules
//!
//! | Pass | Deletes | Default limit |
//! |------|---------|---------------|
//! | immediate | transient tasks, tasks whose submitter was deleted | - |
//! | unmanaged | all done tasks of an unmanaged entity | - |
//! | aged | done root tasks ended before `now - max_task_age` | 30 days |
//! | per-name | oldest done tasks sharing a name within a tag | 10 |
//! | tags | oldest done tasks whose every tag is over capacity | 1000 per entity, 50 per tag |
//! | global | oldest done tasks | 100000 |
//!
//! A task with an unfinished dependent is never deleted.

/// Garbage collector configuration.
pub mod config;
/// Error types.
pub mod error;
/// Task registry and per-entity serialized execution.
pub mod execution_manager;
/// The task garbage collector.
pub mod gc;
/// Task model.
pub mod task;

pub use config::GcConfig;
pub use error::{ConfigError, TaskError};
pub use execution_manager::{
    BasicExecutionManager, EntityExecutionContext, ExecutionManager, TaskListener, current_task,
};
pub use gc::{EntityManagementView, GarbageCollector, GcHandle, GcOutcome};
pub use task::{Clock, ManualClock, SystemClock, TagCategory, Task, TaskId, TaskSpec, TaskStatus, TaskTag};
