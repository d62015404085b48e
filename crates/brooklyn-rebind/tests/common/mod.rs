// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for rebind tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use brooklyn_rebind::memento::{AdjunctMemento, ConfigValue, EntityMemento, LocationMemento, MementoCore};
use brooklyn_rebind::objects::{Adjunct, BrooklynObject, Entity, RebindSupport};
use brooklyn_rebind::serializer;
use brooklyn_rebind::{
    InMemoryPersistenceStore, ManagementContext, Memento, RawMementoData, RebindConfig,
    RebindManager, RebindMode,
};
use brooklyn_tasks::BasicExecutionManager;
use parking_lot::Mutex;

/// Type name whose instances record their hooks.
pub const RECORDING: &str = "test.Recording";

/// Ordered log of hook invocations, e.g. `reconstruct:app`.
pub type Events = Arc<Mutex<Vec<String>>>;

/// Records every hook call; fails the hooks of the listed ids.
pub struct RecordingSupport {
    events: Events,
    fail_reconstruct: Arc<HashSet<String>>,
    fail_attach: Arc<HashSet<String>>,
}

impl RebindSupport for RecordingSupport {
    fn reconstruct(&self, object: &BrooklynObject, _memento: &MementoCore) -> anyhow::Result<()> {
        self.events.lock().push(format!("reconstruct:{}", object.id()));
        if self.fail_reconstruct.contains(object.id()) {
            anyhow::bail!("reconstruct hook rejected {}", object.id());
        }
        Ok(())
    }

    fn on_attached(&self, adjunct: &Arc<Adjunct>, entity: &Arc<Entity>) -> anyhow::Result<()> {
        self.events
            .lock()
            .push(format!("attached:{}@{}", adjunct.id(), entity.id()));
        if self.fail_attach.contains(adjunct.id()) {
            anyhow::bail!("attach hook rejected {}", adjunct.id());
        }
        Ok(())
    }

    fn on_managed(&self, object: &BrooklynObject) -> anyhow::Result<()> {
        self.events.lock().push(format!("managed:{}", object.id()));
        Ok(())
    }
}

/// Store, management context and hook log for one test.
pub struct Fixture {
    pub store: Arc<InMemoryPersistenceStore>,
    pub management: Arc<ManagementContext>,
    pub events: Events,
}

impl Fixture {
    pub fn new(mementos: Vec<Memento>) -> Self {
        Self::with_failures(mementos, &[], &[])
    }

    /// Objects whose ids are listed fail their reconstruct or attach hook.
    pub fn with_failures(mementos: Vec<Memento>, fail_reconstruct: &[&str], fail_attach: &[&str]) -> Self {
        let store = Arc::new(InMemoryPersistenceStore::with_data(raw(mementos)));
        let management = ManagementContext::new(Arc::new(BasicExecutionManager::new()));
        let events: Events = Arc::new(Mutex::new(Vec::new()));

        let fail_reconstruct: Arc<HashSet<String>> =
            Arc::new(fail_reconstruct.iter().map(|s| s.to_string()).collect());
        let fail_attach: Arc<HashSet<String>> = Arc::new(fail_attach.iter().map(|s| s.to_string()).collect());
        let log = events.clone();
        management.constructors().register(RECORDING, move || {
            Arc::new(RecordingSupport {
                events: log.clone(),
                fail_reconstruct: fail_reconstruct.clone(),
                fail_attach: fail_attach.clone(),
            }) as Arc<dyn RebindSupport>
        });

        Self {
            store,
            management,
            events,
        }
    }

    pub fn manager(&self, mode: RebindMode) -> RebindManager {
        self.manager_with(mode, RebindConfig::default())
    }

    pub fn manager_with(&self, mode: RebindMode, config: RebindConfig) -> RebindManager {
        RebindManager::new(self.management.clone(), self.store.clone(), config, mode)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Position of `event` in the log.
    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event} not recorded in {:?}", self.events()))
    }
}

pub fn raw(mementos: Vec<Memento>) -> RawMementoData {
    serializer::to_raw(mementos).expect("mementos serialize")
}

pub fn entity(id: &str, type_name: &str, parent: Option<&str>, children: &[&str]) -> EntityMemento {
    let mut m = EntityMemento::new(id, type_name);
    m.parent = parent.map(str::to_string);
    m.children = children.iter().map(|c| c.to_string()).collect();
    m
}

pub fn location(id: &str, parent: Option<&str>, children: &[&str]) -> LocationMemento {
    let mut m = LocationMemento::new(id, RECORDING);
    m.parent = parent.map(str::to_string);
    m.children = children.iter().map(|c| c.to_string()).collect();
    m
}

pub fn policy(id: &str, entity: &str) -> AdjunctMemento {
    let mut m = AdjunctMemento::new(id, RECORDING);
    m.entity = Some(entity.to_string());
    m
}

/// The application / child / policy graph: `app` with child `child1`, which
/// owns policy `p1` whose `target` config references `app`.
pub fn app_child_policy() -> Vec<Memento> {
    let app = entity("app", "BasicApplication", None, &["child1"]);
    let mut child = entity("child1", RECORDING, Some("app"), &[]);
    child.policies = vec!["p1".to_string()];
    child
        .core
        .config
        .insert("owner".to_string(), ConfigValue::EntityRef("app".to_string()));
    let mut p1 = policy("p1", "child1");
    p1.core
        .config
        .insert("target".to_string(), ConfigValue::EntityRef("app".to_string()));

    vec![Memento::Entity(app), Memento::Entity(child), Memento::Policy(p1)]
}
