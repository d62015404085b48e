// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task model: identity, tags, submitter back-references and completion state.
//!
//! A [`Task`] is an immutable identity (id, name, tags, submitter) plus a small
//! piece of mutable state guarded by a lock. Tasks are shared as `Arc<Task>`;
//! the registry in [`crate::execution_manager`] is the only owner that matters
//! for lifetime, and removal from it is what "deleting" a task means.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Unique task identifier.
pub type TaskId = String;

/// Opaque tag attached to a task.
///
/// Entity tags (context and target) drive the per-entity caps, markers such as
/// [`TaskTag::Transient`] drive immediate deletion, and everything else is a
/// generic non-entity tag subject to the per-tag cap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskTag {
    /// The entity in whose execution context the task runs.
    ContextEntity(String),
    /// The entity a task acts upon, when different from its context.
    TargetEntity(String),
    /// Marks an effector invocation.
    Effector,
    /// Name of the effector being invoked.
    EffectorName(String),
    /// Marks a task as a sub-task of another.
    SubTask,
    /// Delete as soon as the task completes.
    Transient,
    /// Never delete on completion.
    NonTransient,
    /// Attached output stream (stdout, stderr, ...).
    Stream(String),
    /// Free-form tag.
    Named(String),
}

impl TaskTag {
    /// Returns the entity id for entity tags.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            TaskTag::ContextEntity(id) | TaskTag::TargetEntity(id) => Some(id),
            _ => None,
        }
    }

    /// Marker and stream tags are never used for capacity accounting.
    pub fn is_ignored_for_gc(&self) -> bool {
        matches!(
            self,
            TaskTag::Effector
                | TaskTag::SubTask
                | TaskTag::Transient
                | TaskTag::NonTransient
                | TaskTag::Stream(_)
        )
    }

    /// Capacity category of this tag, or `None` when ignored for GC.
    pub fn category(&self) -> Option<TagCategory> {
        if self.is_ignored_for_gc() {
            None
        } else if self.entity_id().is_some() {
            Some(TagCategory::Entity)
        } else {
            Some(TagCategory::NonEntity)
        }
    }
}

impl fmt::Display for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskTag::ContextEntity(id) => write!(f, "entity:{id}"),
            TaskTag::TargetEntity(id) => write!(f, "target:{id}"),
            TaskTag::Effector => f.write_str("EFFECTOR"),
            TaskTag::EffectorName(name) => write!(f, "effector:{name}"),
            TaskTag::SubTask => f.write_str("SUB-TASK"),
            TaskTag::Transient => f.write_str("TRANSIENT"),
            TaskTag::NonTransient => f.write_str("NON-TRANSIENT"),
            TaskTag::Stream(name) => write!(f, "stream:{name}"),
            TaskTag::Named(name) => f.write_str(name),
        }
    }
}

/// Capacity categories used by the over-capacity sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagCategory {
    /// Context and target entity tags.
    Entity,
    /// Every other tag that is not ignored for GC.
    NonEntity,
}

impl TagCategory {
    pub fn accepts(&self, tag: &TaskTag) -> bool {
        tag.category() == Some(*self)
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl TaskStatus {
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed(_) | TaskStatus::Cancelled
        )
    }
}

/// Description of a task to register.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub display_name: String,
    pub tags: BTreeSet<TaskTag>,
    pub submitter: Option<TaskId>,
    /// Register the task as a child of its submitter. The submitter then owns
    /// the child's deletion.
    pub as_child: bool,
}

impl TaskSpec {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            tags: BTreeSet::new(),
            submitter: None,
            as_child: false,
        }
    }

    pub fn tag(mut self, tag: TaskTag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Record `submitter` as the task that submitted this one.
    pub fn submitted_by(mut self, submitter: impl Into<TaskId>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }

    /// Submit as a registered child of `parent`.
    pub fn child_of(mut self, parent: impl Into<TaskId>) -> Self {
        self.submitter = Some(parent.into());
        self.as_child = true;
        self
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    completion_seq: u64,
}

/// A unit of work tracked by the execution manager.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    display_name: String,
    tags: BTreeSet<TaskTag>,
    submitter: Option<TaskId>,
    submitted_at: DateTime<Utc>,
    state: RwLock<TaskState>,
    children: Mutex<Vec<TaskId>>,
}

impl Task {
    pub(crate) fn new(id: TaskId, spec: TaskSpec, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: spec.display_name,
            tags: spec.tags,
            submitter: spec.submitter,
            submitted_at,
            state: RwLock::new(TaskState {
                status: TaskStatus::Queued,
                started_at: None,
                ended_at: None,
                completion_seq: 0,
            }),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn tags(&self) -> &BTreeSet<TaskTag> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &TaskTag) -> bool {
        self.tags.contains(tag)
    }

    /// Id of the task that submitted this one, if any.
    pub fn submitter(&self) -> Option<&str> {
        self.submitter.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn status(&self) -> TaskStatus {
        self.state.read().status.clone()
    }

    pub fn is_done(&self) -> bool {
        self.state.read().status.is_done()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().ended_at
    }

    /// Ids of tasks registered as children of this one.
    pub fn children(&self) -> Vec<TaskId> {
        self.children.lock().clone()
    }

    pub fn has_child(&self, id: &str) -> bool {
        self.children.lock().iter().any(|c| c == id)
    }

    /// First entity this task is associated with (context before target).
    pub fn context_entity(&self) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|t| match t {
                TaskTag::ContextEntity(id) => Some(id.as_str()),
                _ => None,
            })
            .or_else(|| self.tags.iter().find_map(TaskTag::entity_id))
    }

    pub fn is_sub_task(&self) -> bool {
        self.tags.contains(&TaskTag::SubTask)
    }

    pub(crate) fn add_child(&self, id: TaskId) {
        self.children.lock().push(id);
    }

    pub(crate) fn mark_started(&self, at: DateTime<Utc>) {
        let mut state = self.state.write();
        if matches!(state.status, TaskStatus::Queued) {
            state.status = TaskStatus::Running;
            state.started_at = Some(at);
        }
    }

    /// Returns false when the task had already completed.
    pub(crate) fn mark_done(&self, status: TaskStatus, at: DateTime<Utc>, seq: u64) -> bool {
        debug_assert!(status.is_done());
        let mut state = self.state.write();
        if state.status.is_done() {
            return false;
        }
        state.started_at.get_or_insert(at);
        state.status = status;
        state.ended_at = Some(at);
        state.completion_seq = seq;
        true
    }

    fn completion_key(&self) -> (Option<DateTime<Utc>>, u64) {
        let state = self.state.read();
        (state.ended_at, state.completion_seq)
    }
}

/// Orders completed tasks oldest first, by end time then completion order.
/// Tasks that have not ended sort last.
pub fn oldest_first(a: &Arc<Task>, b: &Arc<Task>) -> Ordering {
    let (a_end, a_seq) = a.completion_key();
    let (b_end, b_seq) = b.completion_key();
    match (a_end, b_end) {
        (Some(x), Some(y)) => x.cmp(&y).then(a_seq.cmp(&b_seq)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.submitted_at.cmp(&b.submitted_at),
    }
}

/// Source of wall-clock time for task timestamps.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
