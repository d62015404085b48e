// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::{
    Adjunct, BasicRebindSupport, BrooklynObject, ObjectLifecycle, RebindSupport, ResolvedConfig,
    ResolvedValue, config_to_memento,
};
use crate::memento::{BrooklynObjectType, EntityMemento};

/// Type name given to stand-ins for dangling entity references.
pub const PLACEHOLDER_TYPE: &str = "placeholder";

#[derive(Default)]
struct EntityState {
    display_name: Option<String>,
    catalog_item_id: Option<String>,
    search_path: Vec<String>,
    parent: Option<String>,
    children: Vec<String>,
    members: Vec<String>,
    locations: Vec<String>,
    config: ResolvedConfig,
    attributes: BTreeMap<String, Value>,
    adjuncts: Vec<Arc<Adjunct>>,
    lifecycle: ObjectLifecycle,
}

/// A managed entity.
pub struct Entity {
    id: String,
    type_name: String,
    support: Arc<dyn RebindSupport>,
    placeholder: bool,
    state: RwLock<EntityState>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("placeholder", &self.placeholder)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

impl Entity {
    /// Create an entity shell with no state restored.
    pub fn new(
        id: impl Into<String>,
        type_name: impl Into<String>,
        support: Arc<dyn RebindSupport>,
        catalog_item_id: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            type_name: type_name.into(),
            support,
            placeholder: false,
            state: RwLock::new(EntityState {
                catalog_item_id,
                ..EntityState::default()
            }),
        })
    }

    /// Stand-in for an entity that is referenced but does not exist.
    pub fn placeholder(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            type_name: PLACEHOLDER_TYPE.to_string(),
            support: Arc::new(BasicRebindSupport),
            placeholder: true,
            state: RwLock::new(EntityState::default()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn support(&self) -> &Arc<dyn RebindSupport> {
        &self.support
    }

    pub fn display_name(&self) -> Option<String> {
        self.state.read().display_name.clone()
    }

    pub fn catalog_item_id(&self) -> Option<String> {
        self.state.read().catalog_item_id.clone()
    }

    pub fn parent_id(&self) -> Option<String> {
        self.state.read().parent.clone()
    }

    pub fn children(&self) -> Vec<String> {
        self.state.read().children.clone()
    }

    pub fn members(&self) -> Vec<String> {
        self.state.read().members.clone()
    }

    pub fn locations(&self) -> Vec<String> {
        self.state.read().locations.clone()
    }

    pub fn config(&self, key: &str) -> Option<ResolvedValue> {
        self.state.read().config.get(key).cloned()
    }

    pub fn set_config(&self, key: impl Into<String>, value: ResolvedValue) {
        self.state.write().config.insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.state.read().attributes.get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: Value) {
        self.state.write().attributes.insert(key.into(), value);
    }

    pub fn set_display_name(&self, name: impl Into<String>) {
        self.state.write().display_name = Some(name.into());
    }

    pub fn add_child(&self, child: &Entity) {
        let mut state = self.state.write();
        if !state.children.iter().any(|c| c == child.id()) {
            state.children.push(child.id().to_string());
        }
        drop(state);
        child.state.write().parent = Some(self.id.clone());
    }

    pub(crate) fn remove_child(&self, child_id: &str) {
        self.state.write().children.retain(|c| c != child_id);
    }

    pub fn add_location(&self, location_id: impl Into<String>) {
        self.state.write().locations.push(location_id.into());
    }

    /// Attach an adjunct to this entity's owned set. Used when building a
    /// graph by hand; rebind restores the set from the memento.
    pub fn add_adjunct(&self, adjunct: Arc<Adjunct>) {
        self.state.write().adjuncts.push(adjunct);
    }

    pub fn adjuncts(&self) -> Vec<Arc<Adjunct>> {
        self.state.read().adjuncts.clone()
    }

    pub fn adjuncts_of(&self, kind: BrooklynObjectType) -> Vec<Arc<Adjunct>> {
        self.state
            .read()
            .adjuncts
            .iter()
            .filter(|a| a.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn policies(&self) -> Vec<Arc<Adjunct>> {
        self.adjuncts_of(BrooklynObjectType::Policy)
    }

    pub fn enrichers(&self) -> Vec<Arc<Adjunct>> {
        self.adjuncts_of(BrooklynObjectType::Enricher)
    }

    pub fn feeds(&self) -> Vec<Arc<Adjunct>> {
        self.adjuncts_of(BrooklynObjectType::Feed)
    }

    pub(crate) fn remove_adjunct(&self, id: &str) {
        self.state.write().adjuncts.retain(|a| a.id() != id);
    }

    pub fn lifecycle(&self) -> ObjectLifecycle {
        self.state.read().lifecycle
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: ObjectLifecycle) {
        self.state.write().lifecycle = lifecycle;
    }

    /// Restore state from `memento`, then run the type's reconstruct hook.
    ///
    /// `children` and `adjuncts` are the subsets of the memento's ids that
    /// exist in this rebind.
    pub(crate) fn reconstruct(
        self: &Arc<Self>,
        memento: &EntityMemento,
        config: ResolvedConfig,
        children: Vec<String>,
        adjuncts: Vec<Arc<Adjunct>>,
    ) -> anyhow::Result<()> {
        {
            let mut state = self.state.write();
            state.display_name = memento.core.display_name.clone();
            if memento.core.catalog_item_id.is_some() && state.catalog_item_id.is_none() {
                state.catalog_item_id = memento.core.catalog_item_id.clone();
            }
            state.search_path = memento.core.catalog_item_id_search_path.clone();
            state.parent = memento.parent.clone();
            state.children = children;
            state.members = memento.members.clone();
            state.locations = memento.locations.clone();
            state.config = config;
            state.attributes = memento.attributes.clone();
            state.adjuncts = adjuncts;
        }
        self.support
            .reconstruct(&BrooklynObject::Entity(self.clone()), &memento.core)?;
        self.set_lifecycle(ObjectLifecycle::Reconstructed);
        Ok(())
    }

    /// Snapshot the current state.
    pub fn to_memento(&self) -> EntityMemento {
        let state = self.state.read();
        let mut memento = EntityMemento::new(self.id.clone(), self.type_name.clone());
        memento.core.display_name = state.display_name.clone();
        memento.core.catalog_item_id = state.catalog_item_id.clone();
        memento.core.catalog_item_id_search_path = state.search_path.clone();
        memento.core.config = config_to_memento(&state.config);
        memento.parent = state.parent.clone();
        memento.children = state.children.clone();
        memento.members = state.members.clone();
        memento.locations = state.locations.clone();
        memento.attributes = state.attributes.clone();
        for adjunct in &state.adjuncts {
            let ids = match adjunct.kind() {
                BrooklynObjectType::Policy => &mut memento.policies,
                BrooklynObjectType::Enricher => &mut memento.enrichers,
                _ => &mut memento.feeds,
            };
            ids.push(adjunct.id().to_string());
        }
        memento
    }
}
