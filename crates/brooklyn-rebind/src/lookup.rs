// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resolution of by-id references in persisted config.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::RebindContext;
use crate::error::Result;
use crate::exception_handler::RebindExceptionHandler;
use crate::memento::{BrooklynObjectType, ConfigValue};
use crate::objects::{
    AdjunctProxy, CatalogItem, Entity, Location, ManagedBundle, ObjectRef, ResolvedConfig,
    ResolvedValue,
};

/// Resolves ids found while loading mementos to live objects.
pub trait LookupContext {
    fn lookup_entity(&self, id: &str) -> Result<Option<Arc<Entity>>>;

    fn lookup_location(&self, id: &str) -> Result<Option<Arc<Location>>>;

    /// Adjuncts are not instantiated when mementos are loaded, so references
    /// to them resolve to a proxy bound later.
    fn lookup_adjunct(&self, kind: BrooklynObjectType, id: &str) -> Arc<AdjunctProxy>;

    fn lookup_catalog_item(&self, id: &str) -> Result<Option<Arc<CatalogItem>>>;

    fn lookup_bundle(&self, id: &str) -> Result<Option<Arc<ManagedBundle>>>;
}

/// Lookup over a [`RebindContext`], sending unknown ids to the exception
/// handler's dangling-reference hooks.
pub struct RebindContextLookup<'a> {
    context: &'a RebindContext,
    handler: &'a dyn RebindExceptionHandler,
}

impl<'a> RebindContextLookup<'a> {
    pub fn new(context: &'a RebindContext, handler: &'a dyn RebindExceptionHandler) -> Self {
        Self { context, handler }
    }
}

impl LookupContext for RebindContextLookup<'_> {
    fn lookup_entity(&self, id: &str) -> Result<Option<Arc<Entity>>> {
        self.context.entity_or_dangling(id, self.handler)
    }

    fn lookup_location(&self, id: &str) -> Result<Option<Arc<Location>>> {
        self.context.location_or_dangling(id, self.handler)
    }

    fn lookup_adjunct(&self, kind: BrooklynObjectType, id: &str) -> Arc<AdjunctProxy> {
        self.context.adjunct_proxy(kind, id)
    }

    fn lookup_catalog_item(&self, id: &str) -> Result<Option<Arc<CatalogItem>>> {
        self.context.catalog_item_or_dangling(id, self.handler)
    }

    fn lookup_bundle(&self, id: &str) -> Result<Option<Arc<ManagedBundle>>> {
        self.context.bundle_or_dangling(id, self.handler)
    }
}

/// Resolve every value of a persisted config map.
pub fn resolve_config(
    config: &BTreeMap<String, ConfigValue>,
    lookup: &dyn LookupContext,
) -> Result<ResolvedConfig> {
    config
        .iter()
        .map(|(k, v)| Ok((k.clone(), resolve_value(v, lookup)?)))
        .collect()
}

pub fn resolve_value(value: &ConfigValue, lookup: &dyn LookupContext) -> Result<ResolvedValue> {
    let missing = |object_type, id: &str| ResolvedValue::Missing {
        object_type,
        id: id.to_string(),
    };

    let resolved = match value {
        ConfigValue::Literal(v) => ResolvedValue::Literal(v.clone()),
        ConfigValue::EntityRef(id) => match lookup.lookup_entity(id)? {
            Some(entity) => ResolvedValue::Entity(ObjectRef::new(id.clone(), &entity)),
            None => missing(BrooklynObjectType::Entity, id),
        },
        ConfigValue::LocationRef(id) => match lookup.lookup_location(id)? {
            Some(location) => ResolvedValue::Location(ObjectRef::new(id.clone(), &location)),
            None => missing(BrooklynObjectType::Location, id),
        },
        ConfigValue::PolicyRef(id) => {
            ResolvedValue::Adjunct(lookup.lookup_adjunct(BrooklynObjectType::Policy, id))
        }
        ConfigValue::EnricherRef(id) => {
            ResolvedValue::Adjunct(lookup.lookup_adjunct(BrooklynObjectType::Enricher, id))
        }
        ConfigValue::FeedRef(id) => {
            ResolvedValue::Adjunct(lookup.lookup_adjunct(BrooklynObjectType::Feed, id))
        }
        ConfigValue::CatalogItemRef(id) => match lookup.lookup_catalog_item(id)? {
            Some(item) => ResolvedValue::CatalogItem(item),
            None => missing(BrooklynObjectType::CatalogItem, id),
        },
        ConfigValue::BundleRef(id) => match lookup.lookup_bundle(id)? {
            Some(bundle) => ResolvedValue::Bundle(bundle),
            None => missing(BrooklynObjectType::ManagedBundle, id),
        },
        ConfigValue::Deferred(expr) => ResolvedValue::Deferred(expr.clone()),
        ConfigValue::Nested(memento) => ResolvedValue::Nested(memento.clone()),
        ConfigValue::List(items) => ResolvedValue::List(
            items
                .iter()
                .map(|v| resolve_value(v, lookup))
                .collect::<Result<_>>()?,
        ),
        ConfigValue::Map(map) => ResolvedValue::Map(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), resolve_value(v, lookup)?)))
                .collect::<Result<_>>()?,
        ),
    };
    Ok(resolved)
}
