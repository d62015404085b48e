// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registries of managed objects and the services they share.

use std::sync::{Arc, Weak};

use brooklyn_tasks::{
    BasicExecutionManager, EntityExecutionContext, EntityManagementView, GarbageCollector,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::catalog::{BasicTypeRegistry, BundleRegistry, ConstructorRegistry, TypeRegistry, TypeUpgrades};
use crate::error::Result;
use crate::memento::{BrooklynObjectType, Memento, RawMementoData};
use crate::objects::{
    BrooklynObject, CatalogItem, Entity, Location, ManagedBundle, ObjectLifecycle,
};
use crate::serializer;

/// Live objects known to this node, plus the registries used to build them.
pub struct ManagementContext {
    execution_manager: Arc<BasicExecutionManager>,
    types: Arc<dyn TypeRegistry>,
    upgrades: Arc<TypeUpgrades>,
    constructors: Arc<ConstructorRegistry>,
    bundle_registry: Arc<BundleRegistry>,
    entities: DashMap<String, Arc<Entity>>,
    locations: DashMap<String, Arc<Location>>,
    catalog_items: DashMap<String, Arc<CatalogItem>>,
    bundles: DashMap<String, Arc<ManagedBundle>>,
    execution_contexts: DashMap<String, Arc<EntityExecutionContext>>,
    gc: RwLock<Weak<GarbageCollector>>,
}

impl std::fmt::Debug for ManagementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementContext")
            .field("entities", &self.entities.len())
            .field("locations", &self.locations.len())
            .field("catalog_items", &self.catalog_items.len())
            .field("bundles", &self.bundles.len())
            .finish()
    }
}

impl ManagementContext {
    /// A context with empty registries and the basic types.
    pub fn new(execution_manager: Arc<BasicExecutionManager>) -> Arc<Self> {
        Self::with_registries(
            execution_manager,
            Arc::new(BasicTypeRegistry::new()),
            Arc::new(TypeUpgrades::new()),
            Arc::new(ConstructorRegistry::with_basic_types()),
            Arc::new(BundleRegistry::new()),
        )
    }

    pub fn with_registries(
        execution_manager: Arc<BasicExecutionManager>,
        types: Arc<dyn TypeRegistry>,
        upgrades: Arc<TypeUpgrades>,
        constructors: Arc<ConstructorRegistry>,
        bundle_registry: Arc<BundleRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            execution_manager,
            types,
            upgrades,
            constructors,
            bundle_registry,
            entities: DashMap::new(),
            locations: DashMap::new(),
            catalog_items: DashMap::new(),
            bundles: DashMap::new(),
            execution_contexts: DashMap::new(),
            gc: RwLock::new(Weak::new()),
        })
    }

    pub fn execution_manager(&self) -> &Arc<BasicExecutionManager> {
        &self.execution_manager
    }

    pub fn types(&self) -> &Arc<dyn TypeRegistry> {
        &self.types
    }

    pub fn upgrades(&self) -> &Arc<TypeUpgrades> {
        &self.upgrades
    }

    pub fn constructors(&self) -> &Arc<ConstructorRegistry> {
        &self.constructors
    }

    pub fn bundle_registry(&self) -> &Arc<BundleRegistry> {
        &self.bundle_registry
    }

    /// Collector to notify when entities are unmanaged.
    pub fn set_garbage_collector(&self, gc: &Arc<GarbageCollector>) {
        *self.gc.write() = Arc::downgrade(gc);
    }

    /// The serialized execution context of an entity, created on first use.
    pub fn execution_context(&self, entity_id: &str) -> Arc<EntityExecutionContext> {
        self.execution_contexts
            .entry(entity_id.to_string())
            .or_insert_with(|| {
                Arc::new(EntityExecutionContext::new(
                    entity_id,
                    self.execution_manager.clone(),
                ))
            })
            .clone()
    }

    pub fn entity(&self, id: &str) -> Option<Arc<Entity>> {
        self.entities.get(id).map(|e| e.value().clone())
    }

    pub fn entities(&self) -> Vec<Arc<Entity>> {
        self.entities.iter().map(|e| e.value().clone()).collect()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.key().clone()).collect()
    }

    /// Managed entities without a managed parent.
    pub fn applications(&self) -> Vec<Arc<Entity>> {
        self.entities
            .iter()
            .filter(|e| {
                e.value()
                    .parent_id()
                    .is_none_or(|p| !self.entities.contains_key(&p))
            })
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn location(&self, id: &str) -> Option<Arc<Location>> {
        self.locations.get(id).map(|l| l.value().clone())
    }

    pub fn locations(&self) -> Vec<Arc<Location>> {
        self.locations.iter().map(|l| l.value().clone()).collect()
    }

    pub fn location_ids(&self) -> Vec<String> {
        self.locations.iter().map(|l| l.key().clone()).collect()
    }

    pub fn catalog_items(&self) -> Vec<Arc<CatalogItem>> {
        self.catalog_items.iter().map(|c| c.value().clone()).collect()
    }

    pub fn bundles(&self) -> Vec<Arc<ManagedBundle>> {
        self.bundles.iter().map(|b| b.value().clone()).collect()
    }

    /// Start managing an entity. Runs its managed hook unless `read_only`.
    pub fn manage_entity(&self, entity: &Arc<Entity>, read_only: bool) -> anyhow::Result<()> {
        if !read_only {
            entity
                .support()
                .on_managed(&BrooklynObject::Entity(entity.clone()))?;
        }
        entity.set_lifecycle(ObjectLifecycle::Managed);
        if let Some(previous) = self.entities.insert(entity.id().to_string(), entity.clone())
            && !Arc::ptr_eq(&previous, entity)
        {
            for adjunct in previous.adjuncts() {
                adjunct.detach();
            }
        }
        debug!(entity_id = %entity.id(), read_only, "Managing entity");
        Ok(())
    }

    pub fn manage_location(&self, location: &Arc<Location>, read_only: bool) -> anyhow::Result<()> {
        if !read_only {
            location
                .support()
                .on_managed(&BrooklynObject::Location(location.clone()))?;
        }
        location.set_lifecycle(ObjectLifecycle::Managed);
        self.locations.insert(location.id().to_string(), location.clone());
        Ok(())
    }

    pub fn register_catalog_item(&self, item: Arc<CatalogItem>) {
        self.catalog_items.insert(item.id().to_string(), item);
    }

    pub fn register_bundle(&self, bundle: Arc<ManagedBundle>) {
        self.bundles.insert(bundle.id().to_string(), bundle);
    }

    /// Ids of `root` and its managed descendants, parents first.
    pub(crate) fn subtree(&self, root: &str) -> Vec<String> {
        let mut ids = vec![root.to_string()];
        let mut i = 0;
        while i < ids.len() {
            if let Some(entity) = self.entity(&ids[i]) {
                for child in entity.children() {
                    if !ids.contains(&child) {
                        ids.push(child);
                    }
                }
            }
            i += 1;
        }
        ids
    }

    /// Stop managing an entity and its descendants.
    ///
    /// The work runs as a task in the entity's execution context. The garbage
    /// collector deletes the entities' tasks once that task has finished.
    /// Returns the ids that were unmanaged.
    pub async fn unmanage_entity(self: &Arc<Self>, id: &str) -> Result<Vec<String>> {
        let ids = self.subtree(id);
        let this = self.clone();
        let unmanaged = ids.clone();
        self.execution_context(id)
            .run("Unmanage entity", async move {
                for id in unmanaged.iter().rev() {
                    this.remove_entity(id);
                    if let Some(gc) = this.gc.read().upgrade() {
                        gc.on_unmanaged(id);
                    }
                }
                Ok::<_, crate::error::RebindError>(())
            })
            .await?;

        if let Some(parent) = self.entities_parent_of(id) {
            parent.remove_child(id);
        }
        info!(entity_id = %id, count = ids.len(), "Unmanaged entity");
        Ok(ids)
    }

    fn entities_parent_of(&self, id: &str) -> Option<Arc<Entity>> {
        self.entities
            .iter()
            .find(|e| e.value().children().iter().any(|c| c == id))
            .map(|e| e.value().clone())
    }

    /// Remove an entity from the registries and stop its adjuncts.
    fn remove_entity(&self, id: &str) -> Option<Arc<Entity>> {
        let (_, entity) = self.entities.remove(id)?;
        for adjunct in entity.adjuncts() {
            adjunct.detach();
            adjunct.set_lifecycle(ObjectLifecycle::Unmanaged);
        }
        entity.set_lifecycle(ObjectLifecycle::Unmanaged);
        Some(entity)
    }

    /// Forget an entity without unmanaging it, as read-only nodes do for
    /// objects that disappeared from the persisted state.
    pub fn drop_entity(&self, id: &str) -> Option<Arc<Entity>> {
        self.execution_contexts.remove(id);
        self.entities.remove(id).map(|(_, e)| e)
    }

    pub fn unmanage_location(&self, id: &str) -> Option<Arc<Location>> {
        let (_, location) = self.locations.remove(id)?;
        location.set_lifecycle(ObjectLifecycle::Unmanaged);
        Some(location)
    }

    pub fn drop_location(&self, id: &str) -> Option<Arc<Location>> {
        self.locations.remove(id).map(|(_, l)| l)
    }

    /// Mementos of everything managed.
    pub fn mementos(&self) -> Vec<Memento> {
        let mut mementos = Vec::new();
        for entity in self.entities() {
            for adjunct in entity.adjuncts() {
                let m = adjunct.to_memento();
                mementos.push(match adjunct.kind() {
                    BrooklynObjectType::Policy => Memento::Policy(m),
                    BrooklynObjectType::Enricher => Memento::Enricher(m),
                    _ => Memento::Feed(m),
                });
            }
            mementos.push(Memento::Entity(entity.to_memento()));
        }
        for location in self.locations() {
            mementos.push(Memento::Location(location.to_memento()));
        }
        for item in self.catalog_items() {
            mementos.push(Memento::CatalogItem(item.to_memento()));
        }
        for bundle in self.bundles() {
            mementos.push(Memento::ManagedBundle(bundle.to_memento()));
        }
        mementos
    }

    /// Persisted form of everything managed.
    pub fn snapshot(&self) -> Result<RawMementoData> {
        serializer::to_raw(self.mementos())
    }
}

impl EntityManagementView for ManagementContext {
    fn is_managed(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Adjunct, BasicRebindSupport};
    use brooklyn_tasks::{ExecutionManager, GcConfig, TaskTag};

    fn entity(id: &str) -> Arc<Entity> {
        Entity::new(id, "BasicEntity", Arc::new(BasicRebindSupport), None)
    }

    #[tokio::test]
    async fn test_unmanage_removes_subtree_and_notifies_gc() {
        let em = Arc::new(BasicExecutionManager::new());
        let mgmt = ManagementContext::new(em.clone());
        let gc = GarbageCollector::new(em.clone(), mgmt.clone(), GcConfig::default());
        mgmt.set_garbage_collector(&gc);

        let app = entity("app");
        let child = entity("child");
        app.add_child(&child);
        let policy = Adjunct::new("p1", BrooklynObjectType::Policy, "BasicPolicy", Arc::new(BasicRebindSupport), None);
        child.add_adjunct(policy.clone());
        policy.attach(&child).unwrap();
        for e in [&app, &child] {
            mgmt.manage_entity(e, false).unwrap();
        }

        // Some history for the child.
        mgmt.execution_context("child")
            .run("work", async { Ok::<_, std::convert::Infallible>(()) })
            .await
            .unwrap();

        let removed = mgmt.unmanage_entity("child").await.unwrap();
        assert_eq!(removed, vec!["child".to_string()]);
        assert!(!mgmt.is_managed("child"));
        assert!(mgmt.is_managed("app"));
        assert!(app.children().is_empty());
        assert!(!policy.is_running());
        assert_eq!(child.lifecycle(), ObjectLifecycle::Unmanaged);

        let outcome = gc.gc_tasks();
        assert!(outcome.unmanaged_entities > 0);
        assert!(
            em.tasks_with_tag_live_or_null(&TaskTag::ContextEntity("child".into()))
                .is_none_or(|t| t.is_empty())
        );
    }

    #[test]
    fn test_snapshot_contains_graph() {
        let mgmt = ManagementContext::new(Arc::new(BasicExecutionManager::new()));
        let app = entity("app");
        let policy = Adjunct::new("p1", BrooklynObjectType::Policy, "BasicPolicy", Arc::new(BasicRebindSupport), None);
        app.add_adjunct(policy);
        mgmt.manage_entity(&app, true).unwrap();
        let loc = Location::new("l1", "BasicLocation", Arc::new(BasicRebindSupport), None);
        mgmt.manage_location(&loc, true).unwrap();

        let raw = mgmt.snapshot().unwrap();
        assert!(raw.entities.contains_key("app"));
        assert!(raw.policies.contains_key("p1"));
        assert!(raw.locations.contains_key("l1"));
        assert_eq!(mgmt.applications().len(), 1);
    }
}
