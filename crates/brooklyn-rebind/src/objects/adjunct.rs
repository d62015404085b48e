// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{
    BrooklynObject, Entity, ObjectLifecycle, RebindSupport, ResolvedConfig, ResolvedValue,
    config_to_memento,
};
use crate::memento::{AdjunctMemento, BrooklynObjectType};

#[derive(Default)]
struct AdjunctState {
    display_name: Option<String>,
    catalog_item_id: Option<String>,
    unique_tag: Option<String>,
    entity_id: Option<String>,
    entity: Weak<Entity>,
    config: ResolvedConfig,
    lifecycle: ObjectLifecycle,
    running: bool,
}

/// A policy, enricher or feed owned by an entity.
pub struct Adjunct {
    id: String,
    kind: BrooklynObjectType,
    type_name: String,
    support: Arc<dyn RebindSupport>,
    state: RwLock<AdjunctState>,
}

impl fmt::Debug for Adjunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adjunct")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl Adjunct {
    pub fn new(
        id: impl Into<String>,
        kind: BrooklynObjectType,
        type_name: impl Into<String>,
        support: Arc<dyn RebindSupport>,
        catalog_item_id: Option<String>,
    ) -> Arc<Self> {
        debug_assert!(kind.is_adjunct());
        Arc::new(Self {
            id: id.into(),
            kind,
            type_name: type_name.into(),
            support,
            state: RwLock::new(AdjunctState {
                catalog_item_id,
                ..AdjunctState::default()
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> BrooklynObjectType {
        self.kind
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn display_name(&self) -> Option<String> {
        self.state.read().display_name.clone()
    }

    pub fn catalog_item_id(&self) -> Option<String> {
        self.state.read().catalog_item_id.clone()
    }

    pub fn unique_tag(&self) -> Option<String> {
        self.state.read().unique_tag.clone()
    }

    /// Id of the owning entity as recorded in the memento.
    pub fn entity_id(&self) -> Option<String> {
        self.state.read().entity_id.clone()
    }

    /// The owning entity while it is alive and this adjunct is attached.
    pub fn entity(&self) -> Option<Arc<Entity>> {
        self.state.read().entity.upgrade()
    }

    pub fn config(&self, key: &str) -> Option<ResolvedValue> {
        self.state.read().config.get(key).cloned()
    }

    pub fn set_config(&self, key: impl Into<String>, value: ResolvedValue) {
        self.state.write().config.insert(key.into(), value);
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    pub fn lifecycle(&self) -> ObjectLifecycle {
        self.state.read().lifecycle
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: ObjectLifecycle) {
        self.state.write().lifecycle = lifecycle;
    }

    pub(crate) fn reconstruct(
        self: &Arc<Self>,
        memento: &AdjunctMemento,
        config: ResolvedConfig,
    ) -> anyhow::Result<()> {
        {
            let mut state = self.state.write();
            state.display_name = memento.core.display_name.clone();
            if state.catalog_item_id.is_none() {
                state.catalog_item_id = memento.core.catalog_item_id.clone();
            }
            state.unique_tag = memento.unique_tag.clone();
            state.entity_id = memento.entity.clone();
            state.config = config;
        }
        self.support
            .reconstruct(&BrooklynObject::Adjunct(self.clone()), &memento.core)?;
        self.set_lifecycle(ObjectLifecycle::Reconstructed);
        Ok(())
    }

    /// Link to the owning entity without activating.
    pub(crate) fn associate(&self, entity: &Arc<Entity>) {
        let mut state = self.state.write();
        state.entity = Arc::downgrade(entity);
        state.entity_id = Some(entity.id().to_string());
    }

    /// Attach to `entity` and start running.
    pub fn attach(self: &Arc<Self>, entity: &Arc<Entity>) -> anyhow::Result<()> {
        self.associate(entity);
        if let Err(e) = self.support.on_attached(self, entity) {
            self.detach();
            return Err(e);
        }
        let mut state = self.state.write();
        state.running = true;
        state.lifecycle = ObjectLifecycle::Attached;
        Ok(())
    }

    /// Stop running and drop the link to the owning entity.
    pub fn detach(&self) {
        let mut state = self.state.write();
        state.running = false;
        state.entity = Weak::new();
    }

    pub fn to_memento(&self) -> AdjunctMemento {
        let state = self.state.read();
        let mut memento = AdjunctMemento::new(self.id.clone(), self.type_name.clone());
        memento.core.display_name = state.display_name.clone();
        memento.core.catalog_item_id = state.catalog_item_id.clone();
        memento.core.config = config_to_memento(&state.config);
        memento.entity = state.entity_id.clone();
        memento.unique_tag = state.unique_tag.clone();
        memento
    }
}
