// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task registry and execution.
//!
//! [`ExecutionManager`] is the view the garbage collector works against:
//! snapshot reads of the registry, tag lookups, deletion and a completion
//! listener. [`BasicExecutionManager`] keeps the registry in concurrent maps
//! and runs submitted futures on the tokio runtime.
//!
//! [`EntityExecutionContext`] serializes the work done on behalf of a single
//! entity: each call runs as a task tagged with the entity and holds the
//! entity's lock for its whole duration.

use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::task::{Clock, SystemClock, Task, TaskId, TaskSpec, TaskStatus, TaskTag};

tokio::task_local! {
    static CURRENT_TASK: Arc<Task>;
}

/// The task whose future is currently being polled, if it was started through
/// [`BasicExecutionManager::submit`] or an [`EntityExecutionContext`].
pub fn current_task() -> Option<Arc<Task>> {
    CURRENT_TASK.try_with(Arc::clone).ok()
}

/// Receives a callback whenever a task completes.
pub trait TaskListener: Send + Sync {
    /// Called inline on the thread that completed the task.
    fn on_task_done(&self, task: &Arc<Task>);
}

/// Registry operations used by the garbage collector.
pub trait ExecutionManager: Send + Sync {
    /// Current time according to the manager's clock.
    fn now(&self) -> DateTime<Utc>;

    fn get_task(&self, id: &str) -> Option<Arc<Task>>;

    /// Snapshot of every task in the registry.
    fn all_tasks_live(&self) -> Vec<Arc<Task>>;

    /// Snapshot of every tag carried by at least one registered task.
    fn get_task_tags(&self) -> Vec<TaskTag>;

    /// Snapshot of the tasks carrying `tag`, or `None` if no task has it.
    fn tasks_with_tag_live_or_null(&self, tag: &TaskTag) -> Option<Vec<Arc<Task>>>;

    /// True when an unfinished task names `task` as its submitter.
    fn has_unfinished_dependents(&self, task: &Task) -> bool;

    /// Remove a completed task from the registry.
    ///
    /// Returns false when the task is unknown, not done, or still the
    /// submitter of an unfinished task.
    fn delete_task(&self, task: &Task) -> bool;

    /// Delete every completed task carrying `tag`. Returns the number deleted.
    fn delete_done_in_tag(&self, tag: &TaskTag) -> usize;

    /// Register a completion listener. Dropped listeners are pruned lazily.
    fn add_listener(&self, listener: Weak<dyn TaskListener>);

    /// Release spare capacity held by the registry indexes.
    fn compact(&self) {}
}

/// Concurrent-map backed task registry.
#[derive(Debug)]
pub struct BasicExecutionManager {
    tasks: DashMap<TaskId, Arc<Task>>,
    by_tag: DashMap<TaskTag, HashSet<TaskId>>,
    /// submitter id -> ids of tasks it submitted
    by_submitter: DashMap<TaskId, HashSet<TaskId>>,
    listeners: RwLock<Vec<Weak<dyn TaskListener>>>,
    clock: Arc<dyn Clock>,
    completion_seq: AtomicU64,
}

impl Default for BasicExecutionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicExecutionManager {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: DashMap::new(),
            by_tag: DashMap::new(),
            by_submitter: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            clock,
            completion_seq: AtomicU64::new(0),
        }
    }

    /// Number of tasks in the registry.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Register a task without running anything. The caller drives it through
    /// [`start`](Self::start) and [`complete`](Self::complete).
    pub fn register(&self, spec: TaskSpec) -> Arc<Task> {
        let id = Uuid::new_v4().to_string();
        let as_child = spec.as_child;
        let task = Arc::new(Task::new(id.clone(), spec, self.clock.now()));

        self.tasks.insert(id.clone(), task.clone());
        for tag in task.tags() {
            self.by_tag.entry(tag.clone()).or_default().insert(id.clone());
        }
        if let Some(submitter) = task.submitter() {
            self.by_submitter
                .entry(submitter.to_string())
                .or_default()
                .insert(id.clone());
            if as_child && let Some(parent) = self.get_task(submitter) {
                parent.add_child(id.clone());
            }
        }

        trace!(task_id = %id, name = %task.display_name(), "Task registered");
        task
    }

    pub fn start(&self, task: &Task) {
        task.mark_started(self.clock.now());
    }

    /// Mark a task done and notify listeners.
    pub fn complete(&self, task: &Arc<Task>, status: TaskStatus) -> Result<()> {
        let seq = self.completion_seq.fetch_add(1, Ordering::SeqCst) + 1;
        if !task.mark_done(status, self.clock.now(), seq) {
            return Err(TaskError::AlreadyDone(task.id().to_string()));
        }
        self.notify_done(task);
        Ok(())
    }

    /// Complete the registered task with the given id.
    pub fn complete_by_id(&self, id: &str, status: TaskStatus) -> Result<()> {
        let task = self
            .get_task(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        self.complete(&task, status)
    }

    /// Register and spawn `work` on the runtime.
    ///
    /// The task completes as succeeded or failed according to the future's
    /// result; an aborted future leaves the task cancelled.
    pub fn submit<F, T, E>(self: &Arc<Self>, spec: TaskSpec, work: F) -> (Arc<Task>, JoinHandle<std::result::Result<T, E>>)
    where
        F: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let task = self.register(spec);
        let manager = self.clone();
        let running = task.clone();
        let guard = CancelOnDrop {
            manager: Arc::downgrade(self),
            task: Some(task.clone()),
        };
        let handle = tokio::spawn(async move {
            let mut guard = guard;
            manager.start(&running);
            let result = CURRENT_TASK.scope(running.clone(), work).await;
            guard.task = None;
            let status = match &result {
                Ok(_) => TaskStatus::Succeeded,
                Err(e) => TaskStatus::Failed(e.to_string()),
            };
            let _ = manager.complete(&running, status);
            result
        });
        (task, handle)
    }

    fn notify_done(&self, task: &Arc<Task>) {
        let listeners: Vec<Arc<dyn TaskListener>> = {
            let mut guard = self.listeners.write();
            guard.retain(|l| l.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_task_done(task);
        }
    }

    fn unindex(&self, task: &Task) {
        for tag in task.tags() {
            let now_empty = match self.by_tag.get_mut(tag) {
                Some(mut ids) => {
                    ids.remove(task.id());
                    ids.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.by_tag.remove_if(tag, |_, ids| ids.is_empty());
            }
        }
        if let Some(submitter) = task.submitter() {
            let now_empty = match self.by_submitter.get_mut(submitter) {
                Some(mut ids) => {
                    ids.remove(task.id());
                    ids.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.by_submitter.remove_if(submitter, |_, ids| ids.is_empty());
            }
        }
    }
}

impl ExecutionManager for BasicExecutionManager {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn get_task(&self, id: &str) -> Option<Arc<Task>> {
        self.tasks.get(id).map(|t| t.value().clone())
    }

    fn all_tasks_live(&self) -> Vec<Arc<Task>> {
        self.tasks.iter().map(|t| t.value().clone()).collect()
    }

    fn get_task_tags(&self) -> Vec<TaskTag> {
        self.by_tag.iter().map(|e| e.key().clone()).collect()
    }

    fn tasks_with_tag_live_or_null(&self, tag: &TaskTag) -> Option<Vec<Arc<Task>>> {
        let ids: Vec<TaskId> = self.by_tag.get(tag)?.iter().cloned().collect();
        let tasks: Vec<Arc<Task>> = ids.iter().filter_map(|id| self.get_task(id)).collect();
        if tasks.is_empty() { None } else { Some(tasks) }
    }

    fn has_unfinished_dependents(&self, task: &Task) -> bool {
        let Some(ids) = self
            .by_submitter
            .get(task.id())
            .map(|ids| ids.iter().cloned().collect::<Vec<_>>())
        else {
            return false;
        };
        ids.iter()
            .filter_map(|id| self.get_task(id))
            .any(|dependent| !dependent.is_done())
    }

    fn delete_task(&self, task: &Task) -> bool {
        if !task.is_done() {
            debug!(task_id = %task.id(), "Refusing to delete unfinished task");
            return false;
        }
        if self.has_unfinished_dependents(task) {
            debug!(task_id = %task.id(), "Refusing to delete task with unfinished dependents");
            return false;
        }
        if self.tasks.remove(task.id()).is_none() {
            // Already deleted by a concurrent caller.
            return false;
        }
        self.unindex(task);
        trace!(task_id = %task.id(), "Task deleted");
        true
    }

    fn delete_done_in_tag(&self, tag: &TaskTag) -> usize {
        let Some(tasks) = self.tasks_with_tag_live_or_null(tag) else {
            return 0;
        };
        tasks
            .iter()
            .filter(|t| t.is_done())
            .filter(|t| self.delete_task(t))
            .count()
    }

    fn add_listener(&self, listener: Weak<dyn TaskListener>) {
        self.listeners.write().push(listener);
    }

    fn compact(&self) {
        self.tasks.shrink_to_fit();
        self.by_tag.shrink_to_fit();
        self.by_submitter.shrink_to_fit();
    }
}

/// Marks a spawned task cancelled if its future is dropped before finishing.
struct CancelOnDrop {
    manager: Weak<BasicExecutionManager>,
    task: Option<Arc<Task>>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let (Some(task), Some(manager)) = (self.task.take(), self.manager.upgrade()) {
            let _ = manager.complete(&task, TaskStatus::Cancelled);
        }
    }
}

/// Serialized execution context for one entity.
///
/// Work submitted through [`run`](Self::run) executes one call at a time, each
/// as a task tagged with the entity, so the garbage collector sees it like any
/// other entity task.
#[derive(Debug)]
pub struct EntityExecutionContext {
    entity_id: String,
    manager: Arc<BasicExecutionManager>,
    serial: tokio::sync::Mutex<()>,
}

impl EntityExecutionContext {
    pub fn new(entity_id: impl Into<String>, manager: Arc<BasicExecutionManager>) -> Self {
        Self {
            entity_id: entity_id.into(),
            manager,
            serial: tokio::sync::Mutex::new(()),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Run `work` as a task in this entity's context.
    pub async fn run<F, T, E>(&self, name: &str, work: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        self.run_with_tags(name, [], work).await
    }

    /// Like [`run`](Self::run) with extra tags on the task.
    pub async fn run_with_tags<F, T, E>(
        &self,
        name: &str,
        tags: impl IntoIterator<Item = TaskTag>,
        work: F,
    ) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let _serial = self.serial.lock().await;

        let mut spec = TaskSpec::new(name).tag(TaskTag::ContextEntity(self.entity_id.clone()));
        for tag in tags {
            spec = spec.tag(tag);
        }
        if let Some(parent) = current_task() {
            spec = spec.submitted_by(parent.id());
        }
        let task = self.manager.register(spec);
        self.manager.start(&task);

        let result = CURRENT_TASK.scope(task.clone(), work).await;
        let status = match &result {
            Ok(_) => TaskStatus::Succeeded,
            Err(e) => TaskStatus::Failed(e.to_string()),
        };
        let _ = self.manager.complete(&task, status);
        result
    }
}
