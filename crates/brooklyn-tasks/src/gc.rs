// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task garbage collector.
//!
//! Bounds the size of the task registry without deleting anything still
//! referenced. Each collection runs these passes in order:
//!
//! 1. immediate deletion (transient tasks, tasks whose submitter is gone)
//! 2. tasks of entities that were unmanaged, once the unmanage task finished
//! 3. completed root tasks older than `max_task_age`
//! 4. per display name within a tag, keeping the newest `max_tasks_per_name`
//! 5. over-capacity tags, entity tags then non-entity tags
//! 6. global cap, oldest completed first
//!
//! Passes 1, 5 and 6 repeat until nothing more is deleted, since each deletion
//! can make a dependent task eligible, bounded by [`MAX_GC_ROUNDS`].
//!
//! A task is never deleted while an unfinished task names it as submitter;
//! [`ExecutionManager::delete_task`] refuses such deletions and the passes
//! only count deletions that went through.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::GcConfig;
use crate::execution_manager::{ExecutionManager, TaskListener, current_task};
use crate::task::{Task, TagCategory, TaskTag, oldest_first};

/// Upper bound on repeat rounds of passes 1, 5 and 6 per collection.
pub const MAX_GC_ROUNDS: usize = 10;

/// Answers whether an entity is still under management.
pub trait EntityManagementView: Send + Sync {
    fn is_managed(&self, entity_id: &str) -> bool;
}

/// Number of tasks deleted by each pass of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcOutcome {
    pub immediate: usize,
    pub unmanaged_entities: usize,
    pub aged: usize,
    pub per_name: usize,
    pub over_capacity: usize,
    pub global: usize,
    pub rounds: usize,
}

impl GcOutcome {
    pub fn total(&self) -> usize {
        self.immediate
            + self.unmanaged_entities
            + self.aged
            + self.per_name
            + self.over_capacity
            + self.global
    }
}

/// Periodic and on-completion task garbage collector.
pub struct GarbageCollector {
    execution_manager: Arc<dyn ExecutionManager>,
    entities: Arc<dyn EntityManagementView>,
    config: RwLock<Arc<GcConfig>>,
    /// entity id -> task that was unmanaging it
    unmanaged_entities_needing_gc: Mutex<HashMap<String, Option<Arc<Task>>>>,
    collecting: Mutex<()>,
    running: AtomicBool,
    shutdown: Arc<Notify>,
}

impl GarbageCollector {
    /// Create a collector and register it for completion callbacks.
    pub fn new(
        execution_manager: Arc<dyn ExecutionManager>,
        entities: Arc<dyn EntityManagementView>,
        config: GcConfig,
    ) -> Arc<Self> {
        let gc = Arc::new(Self {
            execution_manager,
            entities,
            config: RwLock::new(Arc::new(config)),
            unmanaged_entities_needing_gc: Mutex::new(HashMap::new()),
            collecting: Mutex::new(()),
            running: AtomicBool::new(true),
            shutdown: Arc::new(Notify::new()),
        });
        let listener = Arc::downgrade(&gc);
        gc.execution_manager.add_listener(listener);
        gc
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<GcConfig> {
        self.config.read().clone()
    }

    /// Replace the configuration. Takes effect at the next cycle.
    pub fn update_config(&self, config: GcConfig) {
        *self.config.write() = Arc::new(config);
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop collecting. The periodic loop exits after its current cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Spawn the periodic loop on the current runtime.
    pub fn spawn(self: &Arc<Self>) -> GcHandle {
        let gc = self.clone();
        GcHandle {
            shutdown: self.shutdown.clone(),
            gc: self.clone(),
            handle: tokio::spawn(async move { gc.run().await }),
        }
    }

    /// Run the periodic collection loop until shutdown is signalled.
    ///
    /// Each collection runs on the blocking pool. The period is re-read from
    /// the configuration before every sleep.
    pub async fn run(self: Arc<Self>) {
        let mut period = self.config().period;
        info!(period_secs = period.as_secs_f64(), "Task garbage collector started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Task garbage collector received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(period) => {
                    if !self.is_running() {
                        break;
                    }
                    let gc = self.clone();
                    match tokio::task::spawn_blocking(move || gc.gc_tasks()).await {
                        Ok(outcome) if outcome.total() > 0 => {
                            info!(
                                deleted = outcome.total(),
                                immediate = outcome.immediate,
                                unmanaged = outcome.unmanaged_entities,
                                aged = outcome.aged,
                                per_name = outcome.per_name,
                                over_capacity = outcome.over_capacity,
                                global = outcome.global,
                                rounds = outcome.rounds,
                                "Task garbage collection completed"
                            );
                        }
                        Ok(_) => debug!("Task garbage collection found nothing to delete"),
                        Err(e) => error!(error = %e, "Task garbage collection panicked"),
                    }

                    let next = self.config().period;
                    if next != period {
                        info!(
                            old_period_secs = period.as_secs_f64(),
                            new_period_secs = next.as_secs_f64(),
                            "Rescheduling task garbage collector"
                        );
                        period = next;
                    }
                }
            }
        }

        info!("Task garbage collector stopped");
    }

    /// Record that an entity has been unmanaged. Its tasks are deleted by the
    /// next collection after the current task (the one doing the unmanage)
    /// has finished.
    pub fn on_unmanaged(&self, entity_id: &str) {
        self.unmanaged_entities_needing_gc
            .lock()
            .insert(entity_id.to_string(), current_task());
    }

    /// Run one full collection. Concurrent calls are serialized.
    pub fn gc_tasks(&self) -> GcOutcome {
        let _collecting = self.collecting.lock();
        let mut outcome = GcOutcome::default();
        if !self.is_running() {
            return outcome;
        }
        let config = self.config();

        loop {
            let mut deleted = self.expire_transient_tasks(&config);
            outcome.immediate += deleted;

            if outcome.rounds == 0 {
                let unmanaged = self.expire_unmanaged_entity_tasks();
                let aged = self.expire_aged_tasks(&config);
                let per_name = self.expire_tasks_over_name_capacity(&config);
                outcome.unmanaged_entities += unmanaged;
                outcome.aged += aged;
                outcome.per_name += per_name;
                deleted += unmanaged + aged + per_name;
            }

            let over_capacity = self.expire_over_capacity_tags(&config);
            outcome.over_capacity += over_capacity;
            let global = self.expire_if_over_capacity_globally(&config);
            outcome.global += global;
            deleted += over_capacity + global;

            outcome.rounds += 1;
            if deleted == 0 {
                break;
            }
            if outcome.rounds >= MAX_GC_ROUNDS {
                warn!(
                    rounds = outcome.rounds,
                    "Task garbage collection still deleting after round limit"
                );
                break;
            }
        }

        if config.do_system_gc {
            self.execution_manager.compact();
        }
        outcome
    }

    /// Whether a completed task can be deleted as soon as it finishes.
    ///
    /// With `check_submitter` false only the transient marker is considered.
    pub fn should_delete_task_immediately(&self, task: &Task, check_submitter: bool) -> bool {
        if !task.is_done() {
            return false;
        }

        let submitter = task.submitter().and_then(|id| self.execution_manager.get_task(id));
        if let Some(parent) = &submitter
            && parent.has_child(task.id())
        {
            // the submitter owns this child's deletion
            return false;
        }

        if task.has_tag(&TaskTag::Transient) {
            return true;
        }
        if !check_submitter
            || task.has_tag(&TaskTag::Effector)
            || task.has_tag(&TaskTag::NonTransient)
        {
            return false;
        }
        if let Some(entity) = task.context_entity()
            && self.entities.is_managed(entity)
        {
            return false;
        }

        // submitter expired: it had one, and it is no longer registered
        task.submitter().is_some() && submitter.is_none()
    }

    fn delete(&self, task: &Task) -> bool {
        self.execution_manager.delete_task(task)
    }

    /// Pass 1.
    fn expire_transient_tasks(&self, config: &GcConfig) -> usize {
        let mut deleted = 0;
        for task in self.execution_manager.all_tasks_live() {
            if self.should_delete_task_immediately(&task, config.check_subtask_submitters)
                && self.delete(&task)
            {
                deleted += 1;
            }
        }
        deleted
    }

    /// Pass 2.
    fn expire_unmanaged_entity_tasks(&self) -> usize {
        let pending: Vec<(String, Option<Arc<Task>>)> = self
            .unmanaged_entities_needing_gc
            .lock()
            .iter()
            .map(|(id, task)| (id.clone(), task.clone()))
            .collect();

        let mut deleted = 0;
        for (entity_id, unmanaging_task) in pending {
            if self.entities.is_managed(&entity_id) {
                continue;
            }
            if let Some(task) = &unmanaging_task
                && !task.is_done()
            {
                continue;
            }
            deleted += self
                .execution_manager
                .delete_done_in_tag(&TaskTag::ContextEntity(entity_id.clone()));
            deleted += self
                .execution_manager
                .delete_done_in_tag(&TaskTag::TargetEntity(entity_id.clone()));
            self.unmanaged_entities_needing_gc.lock().remove(&entity_id);
            debug!(entity_id = %entity_id, "Deleted tasks of unmanaged entity");
        }
        deleted
    }

    /// Pass 3.
    fn expire_aged_tasks(&self, config: &GcConfig) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(config.max_task_age) else {
            return 0;
        };
        // An age reaching past the start of the calendar expires nothing.
        let Some(cutoff) = self.execution_manager.now().checked_sub_signed(max_age) else {
            return 0;
        };

        let mut deleted = 0;
        for task in self.execution_manager.all_tasks_live() {
            if !task.is_done() || task.is_sub_task() {
                continue;
            }
            if let Some(ended) = task.ended_at()
                && ended < cutoff
                && self.delete(&task)
            {
                deleted += 1;
            }
        }
        deleted
    }

    /// Pass 4.
    fn expire_tasks_over_name_capacity(&self, config: &GcConfig) -> usize {
        let mut deleted = 0;
        for tag in self.execution_manager.get_task_tags() {
            if tag.is_ignored_for_gc() {
                continue;
            }
            let Some(tasks) = self.execution_manager.tasks_with_tag_live_or_null(&tag) else {
                continue;
            };
            if tasks.len() <= config.max_tasks_per_name {
                continue;
            }

            let mut by_name: HashMap<&str, Vec<&Arc<Task>>> = HashMap::new();
            for task in tasks.iter().filter(|t| t.is_done()) {
                by_name.entry(task.display_name()).or_default().push(task);
            }
            for (_, mut named) in by_name {
                if named.len() <= config.max_tasks_per_name {
                    continue;
                }
                named.sort_by(|a, b| oldest_first(a, b));
                let excess = named.len() - config.max_tasks_per_name;
                for task in named.into_iter().take(excess) {
                    if self.delete(task) {
                        deleted += 1;
                    }
                }
            }
        }
        deleted
    }

    /// Pass 5, entity tags then non-entity tags.
    fn expire_over_capacity_tags(&self, config: &GcConfig) -> usize {
        let mut deleted = 0;
        for category in [TagCategory::Entity, TagCategory::NonEntity] {
            let mut over = self.tags_over_capacity(config, category);
            if !over.is_empty() {
                debug!(
                    category = ?category,
                    tags = over.len(),
                    "Tags over capacity"
                );
                deleted += self.expire_over_capacity_tags_in_category(&mut over, category);
            }
        }
        deleted
    }

    /// How far over its cap each tag of `category` is. Counts include tasks
    /// that are still running.
    pub(crate) fn tags_over_capacity(
        &self,
        config: &GcConfig,
        category: TagCategory,
    ) -> HashMap<TaskTag, usize> {
        let cap = match category {
            TagCategory::Entity => config.max_tasks_per_entity,
            TagCategory::NonEntity => config.max_tasks_per_tag,
        };
        let mut over = HashMap::new();
        for tag in self.execution_manager.get_task_tags() {
            if !category.accepts(&tag) {
                continue;
            }
            let Some(tasks) = self.execution_manager.tasks_with_tag_live_or_null(&tag) else {
                continue;
            };
            if tasks.len() > cap {
                over.insert(tag, tasks.len() - cap);
            }
        }
        over
    }

    /// Delete tasks whose every tag in `category` is over capacity, oldest
    /// first, decrementing the counters as tasks go.
    ///
    /// A completed task that also carries an under-capacity tag of the same
    /// category is kept, and instead counts as one task's worth of grace
    /// against each of its over-capacity tags.
    pub(crate) fn expire_over_capacity_tags_in_category(
        &self,
        over: &mut HashMap<TaskTag, usize>,
        category: TagCategory,
    ) -> usize {
        over.retain(|_, count| *count > 0);
        if over.is_empty() {
            return 0;
        }

        let mut candidates: Vec<Arc<Task>> = Vec::new();
        for task in self.execution_manager.all_tasks_live() {
            if !task.is_done() {
                continue;
            }
            let in_category = task.tags().iter().filter(|t| category.accepts(t)).count();
            let too_full = task
                .tags()
                .iter()
                .filter(|t| category.accepts(t) && over.contains_key(*t))
                .count();
            if too_full == 0 {
                continue;
            }
            if too_full == in_category {
                candidates.push(task);
                continue;
            }

            // grace: an under-capacity tag shelters this task and the
            // over-capacity tags it shares are credited for it
            for tag in task.tags().iter().filter(|t| category.accepts(t)) {
                decrement(over, tag);
            }
            if over.is_empty() {
                return 0;
            }
        }

        if candidates.is_empty() {
            return 0;
        }
        candidates.sort_by(oldest_first);

        let mut deleted = 0;
        for task in candidates {
            let still_over = task
                .tags()
                .iter()
                .filter(|t| category.accepts(t))
                .all(|t| over.contains_key(t));
            if !still_over || !self.delete(&task) {
                continue;
            }
            deleted += 1;
            for tag in task.tags().iter().filter(|t| category.accepts(t)) {
                decrement(over, tag);
            }
            if over.is_empty() {
                break;
            }
        }
        deleted
    }

    /// Pass 6.
    fn expire_if_over_capacity_globally(&self, config: &GcConfig) -> usize {
        let live = self.execution_manager.all_tasks_live();
        if live.len() <= config.max_tasks_global {
            return 0;
        }

        let mut done: Vec<Arc<Task>> = live.iter().filter(|t| t.is_done()).cloned().collect();
        let mut to_delete = live.len() - config.max_tasks_global;
        if to_delete > done.len() {
            warn!(
                live = live.len(),
                done = done.len(),
                max = config.max_tasks_global,
                "Too many unfinished tasks to get under the global cap"
            );
            to_delete = done.len();
        }
        done.sort_by(oldest_first);

        done.iter()
            .take(to_delete)
            .filter(|t| self.delete(t))
            .count()
    }
}

fn decrement(over: &mut HashMap<TaskTag, usize>, tag: &TaskTag) {
    let exhausted = match over.get_mut(tag) {
        Some(count) => {
            *count = count.saturating_sub(1);
            *count == 0
        }
        None => false,
    };
    if exhausted {
        over.remove(tag);
    }
}

impl TaskListener for GarbageCollector {
    fn on_task_done(&self, task: &Arc<Task>) {
        if self.is_running() && self.should_delete_task_immediately(task, true) {
            self.delete(task);
        }
    }
}

/// Handle to a spawned collector loop.
pub struct GcHandle {
    gc: Arc<GarbageCollector>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl GcHandle {
    pub fn collector(&self) -> &Arc<GarbageCollector> {
        &self.gc
    }

    /// Signal the loop and wait for it to finish its current cycle.
    pub async fn shutdown(self) {
        self.gc.stop();
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            error!("Task garbage collector panicked during shutdown");
        }
    }

    /// Stop immediately without waiting for the current cycle.
    pub fn abort(self) {
        self.gc.running.store(false, Ordering::SeqCst);
        self.handle.abort();
    }
}
