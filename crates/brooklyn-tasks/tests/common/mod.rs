// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for garbage collector tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use brooklyn_tasks::{
    BasicExecutionManager, EntityManagementView, GarbageCollector, GcConfig, ManualClock, Task,
    TaskSpec, TaskStatus,
};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

/// Set of managed entity ids.
#[derive(Default)]
pub struct TestEntities(Mutex<HashSet<String>>);

impl TestEntities {
    pub fn manage(&self, id: &str) {
        self.0.lock().insert(id.to_string());
    }

    pub fn unmanage(&self, id: &str) {
        self.0.lock().remove(id);
    }
}

impl EntityManagementView for TestEntities {
    fn is_managed(&self, entity_id: &str) -> bool {
        self.0.lock().contains(entity_id)
    }
}

/// Execution manager, collector and a manual clock wired together.
pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub em: Arc<BasicExecutionManager>,
    pub entities: Arc<TestEntities>,
    pub gc: Arc<GarbageCollector>,
}

impl Fixture {
    pub fn new(config: GcConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        let em = Arc::new(BasicExecutionManager::with_clock(clock.clone()));
        let entities = Arc::new(TestEntities::default());
        let gc = GarbageCollector::new(em.clone(), entities.clone(), config);
        Self {
            clock,
            em,
            entities,
            gc,
        }
    }

    /// Register and complete a task one second after the previous one.
    pub fn done_task(&self, spec: TaskSpec) -> Arc<Task> {
        let task = self.running_task(spec);
        self.finish(&task);
        task
    }

    pub fn running_task(&self, spec: TaskSpec) -> Arc<Task> {
        self.clock.advance(chrono::Duration::seconds(1));
        let task = self.em.register(spec);
        self.em.start(&task);
        task
    }

    pub fn finish(&self, task: &Arc<Task>) {
        self.clock.advance(chrono::Duration::seconds(1));
        self.em.complete(task, TaskStatus::Succeeded).unwrap();
    }

    pub fn exists(&self, task: &Task) -> bool {
        use brooklyn_tasks::ExecutionManager;
        self.em.get_task(task.id()).is_some()
    }
}
