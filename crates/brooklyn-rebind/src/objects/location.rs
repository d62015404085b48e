// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    BasicRebindSupport, BrooklynObject, ObjectLifecycle, RebindSupport, ResolvedConfig,
    ResolvedValue, config_to_memento,
};
use crate::memento::LocationMemento;

#[derive(Default)]
struct LocationState {
    display_name: Option<String>,
    catalog_item_id: Option<String>,
    parent: Option<String>,
    children: Vec<String>,
    config: ResolvedConfig,
    lifecycle: ObjectLifecycle,
}

/// A location entities can be deployed to.
pub struct Location {
    id: String,
    type_name: String,
    support: Arc<dyn RebindSupport>,
    placeholder: bool,
    state: RwLock<LocationState>,
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

impl Location {
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
            state: RwLock::new(LocationState {
                catalog_item_id,
                ..LocationState::default()
            }),
        })
    }

    pub fn placeholder(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            type_name: super::entity::PLACEHOLDER_TYPE.to_string(),
            support: Arc::new(BasicRebindSupport),
            placeholder: true,
            state: RwLock::new(LocationState::default()),
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

    pub fn add_child(&self, child: &Location) {
        self.state.write().children.push(child.id().to_string());
        child.state.write().parent = Some(self.id.clone());
    }

    pub fn config(&self, key: &str) -> Option<ResolvedValue> {
        self.state.read().config.get(key).cloned()
    }

    pub fn set_config(&self, key: impl Into<String>, value: ResolvedValue) {
        self.state.write().config.insert(key.into(), value);
    }

    pub fn lifecycle(&self) -> ObjectLifecycle {
        self.state.read().lifecycle
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: ObjectLifecycle) {
        self.state.write().lifecycle = lifecycle;
    }

    pub(crate) fn reconstruct(
        self: &Arc<Self>,
        memento: &LocationMemento,
        config: ResolvedConfig,
        children: Vec<String>,
    ) -> anyhow::Result<()> {
        {
            let mut state = self.state.write();
            state.display_name = memento.core.display_name.clone();
            if state.catalog_item_id.is_none() {
                state.catalog_item_id = memento.core.catalog_item_id.clone();
            }
            state.parent = memento.parent.clone();
            state.children = children;
            state.config = config;
        }
        self.support
            .reconstruct(&BrooklynObject::Location(self.clone()), &memento.core)?;
        self.set_lifecycle(ObjectLifecycle::Reconstructed);
        Ok(())
    }

    pub fn to_memento(&self) -> LocationMemento {
        let state = self.state.read();
        let mut memento = LocationMemento::new(self.id.clone(), self.type_name.clone());
        memento.core.display_name = state.display_name.clone();
        memento.core.catalog_item_id = state.catalog_item_id.clone();
        memento.core.config = config_to_memento(&state.config);
        memento.parent = state.parent.clone();
        memento.children = state.children.clone();
        memento
    }
}
