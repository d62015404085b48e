// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry of the objects created by one rebind pass.
//!
//! Objects are registered as soon as they are instantiated, so mementos
//! loaded later can resolve references to them by id. The context is
//! discarded when the pass ends.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{RebindError, Result};
use crate::exception_handler::RebindExceptionHandler;
use crate::memento::BrooklynObjectType;
use crate::objects::{Adjunct, AdjunctProxy, CatalogItem, Entity, Location, ManagedBundle};

type Registry<K, V> = RwLock<HashMap<K, V>>;

/// Objects of one rebind pass, keyed by id.
#[derive(Debug, Default)]
pub struct RebindContext {
    read_only: bool,
    entities: Registry<String, Arc<Entity>>,
    locations: Registry<String, Arc<Location>>,
    adjuncts: Registry<(BrooklynObjectType, String), Arc<Adjunct>>,
    catalog_items: Registry<String, Arc<CatalogItem>>,
    bundles: Registry<String, Arc<ManagedBundle>>,
    // Substitutes handed out for dangling ids, `None` when there was none.
    entity_substitutes: Registry<String, Option<Arc<Entity>>>,
    location_substitutes: Registry<String, Option<Arc<Location>>>,
    adjunct_substitutes: Registry<(BrooklynObjectType, String), Option<Arc<Adjunct>>>,
    catalog_substitutes: Registry<String, Option<Arc<CatalogItem>>>,
    bundle_substitutes: Registry<String, Option<Arc<ManagedBundle>>>,
    proxies: Registry<(BrooklynObjectType, String), Arc<AdjunctProxy>>,
}

fn insert_once<K: Eq + Hash, V>(
    registry: &Registry<K, V>,
    key: K,
    value: V,
    object_type: BrooklynObjectType,
    id: &str,
) -> Result<()> {
    let mut map = registry.write();
    if map.contains_key(&key) {
        return Err(RebindError::DuplicateId {
            object_type,
            id: id.to_string(),
        });
    }
    map.insert(key, value);
    Ok(())
}

/// Registered object, else the cached substitute, else ask `on_dangling`
/// once and cache its answer.
fn get_or_dangling<K, V>(
    registry: &Registry<K, Arc<V>>,
    substitutes: &Registry<K, Option<Arc<V>>>,
    key: K,
    on_dangling: impl FnOnce() -> Result<Option<Arc<V>>>,
) -> Result<Option<Arc<V>>>
where
    K: Eq + Hash,
{
    if let Some(found) = registry.read().get(&key) {
        return Ok(Some(found.clone()));
    }
    if let Some(cached) = substitutes.read().get(&key) {
        return Ok(cached.clone());
    }
    let substitute = on_dangling()?;
    Ok(substitutes.write().entry(key).or_insert(substitute).clone())
}

impl RebindContext {
    pub fn new(read_only: bool) -> Self {
        Self {
            read_only,
            ..Self::default()
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn register_entity(&self, entity: Arc<Entity>) -> Result<()> {
        let id = entity.id().to_string();
        insert_once(&self.entities, id.clone(), entity, BrooklynObjectType::Entity, &id)
    }

    pub fn register_location(&self, location: Arc<Location>) -> Result<()> {
        let id = location.id().to_string();
        insert_once(&self.locations, id.clone(), location, BrooklynObjectType::Location, &id)
    }

    pub fn register_adjunct(&self, adjunct: Arc<Adjunct>) -> Result<()> {
        let kind = adjunct.kind();
        let id = adjunct.id().to_string();
        insert_once(&self.adjuncts, (kind, id.clone()), adjunct, kind, &id)
    }

    pub fn register_catalog_item(&self, item: Arc<CatalogItem>) -> Result<()> {
        let id = item.id().to_string();
        insert_once(&self.catalog_items, id.clone(), item, BrooklynObjectType::CatalogItem, &id)
    }

    pub fn register_bundle(&self, bundle: Arc<ManagedBundle>) -> Result<()> {
        let id = bundle.id().to_string();
        insert_once(&self.bundles, id.clone(), bundle, BrooklynObjectType::ManagedBundle, &id)
    }

    /// Drop an object that failed after registration.
    pub fn unregister(&self, object_type: BrooklynObjectType, id: &str) {
        match object_type {
            BrooklynObjectType::Entity => {
                self.entities.write().remove(id);
            }
            BrooklynObjectType::Location => {
                self.locations.write().remove(id);
            }
            BrooklynObjectType::CatalogItem => {
                self.catalog_items.write().remove(id);
            }
            BrooklynObjectType::ManagedBundle => {
                self.bundles.write().remove(id);
            }
            kind => {
                self.adjuncts.write().remove(&(kind, id.to_string()));
            }
        }
    }

    pub fn entity(&self, id: &str) -> Option<Arc<Entity>> {
        self.entities.read().get(id).cloned()
    }

    pub fn location(&self, id: &str) -> Option<Arc<Location>> {
        self.locations.read().get(id).cloned()
    }

    pub fn adjunct(&self, kind: BrooklynObjectType, id: &str) -> Option<Arc<Adjunct>> {
        self.adjuncts.read().get(&(kind, id.to_string())).cloned()
    }

    pub fn catalog_item(&self, id: &str) -> Option<Arc<CatalogItem>> {
        self.catalog_items.read().get(id).cloned()
    }

    pub fn bundle(&self, id: &str) -> Option<Arc<ManagedBundle>> {
        self.bundles.read().get(id).cloned()
    }

    pub fn entities(&self) -> Vec<Arc<Entity>> {
        self.entities.read().values().cloned().collect()
    }

    pub fn locations(&self) -> Vec<Arc<Location>> {
        self.locations.read().values().cloned().collect()
    }

    pub fn adjuncts(&self, kind: BrooklynObjectType) -> Vec<Arc<Adjunct>> {
        self.adjuncts
            .read()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub fn catalog_items(&self) -> Vec<Arc<CatalogItem>> {
        self.catalog_items.read().values().cloned().collect()
    }

    pub fn bundles(&self) -> Vec<Arc<ManagedBundle>> {
        self.bundles.read().values().cloned().collect()
    }

    pub fn entity_or_dangling(
        &self,
        id: &str,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<Option<Arc<Entity>>> {
        get_or_dangling(&self.entities, &self.entity_substitutes, id.to_string(), || {
            handler.on_dangling_entity_ref(id)
        })
    }

    pub fn location_or_dangling(
        &self,
        id: &str,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<Option<Arc<Location>>> {
        get_or_dangling(&self.locations, &self.location_substitutes, id.to_string(), || {
            handler.on_dangling_location_ref(id)
        })
    }

    pub fn adjunct_or_dangling(
        &self,
        kind: BrooklynObjectType,
        id: &str,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<Option<Arc<Adjunct>>> {
        get_or_dangling(
            &self.adjuncts,
            &self.adjunct_substitutes,
            (kind, id.to_string()),
            || match kind {
                BrooklynObjectType::Policy => handler.on_dangling_policy_ref(id),
                BrooklynObjectType::Enricher => handler.on_dangling_enricher_ref(id),
                _ => handler.on_dangling_feed_ref(id),
            },
        )
    }

    pub fn catalog_item_or_dangling(
        &self,
        id: &str,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<Option<Arc<CatalogItem>>> {
        get_or_dangling(&self.catalog_items, &self.catalog_substitutes, id.to_string(), || {
            handler.on_dangling_catalog_item_ref(id)
        })
    }

    pub fn bundle_or_dangling(
        &self,
        id: &str,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<Option<Arc<ManagedBundle>>> {
        get_or_dangling(&self.bundles, &self.bundle_substitutes, id.to_string(), || {
            handler.on_dangling_bundle_ref(id)
        })
    }

    /// The forward-reference proxy for an adjunct, created on first use.
    pub fn adjunct_proxy(&self, kind: BrooklynObjectType, id: &str) -> Arc<AdjunctProxy> {
        let key = (kind, id.to_string());
        if let Some(proxy) = self.proxies.read().get(&key) {
            return proxy.clone();
        }
        self.proxies
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(AdjunctProxy::new(kind, id)))
            .clone()
    }

    pub fn proxies(&self) -> Vec<Arc<AdjunctProxy>> {
        self.proxies.read().values().cloned().collect()
    }
}
