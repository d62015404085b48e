// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Live object graph rebuilt by rebind.
//!
//! Entities and locations form trees linked by id. Adjuncts (policies,
//! enrichers, feeds) are owned by one entity and point back to it weakly.
//! Config values that reference other objects hold weak handles, so the
//! graph never keeps an object alive through a reference cycle.
//!
//! Type-specific behaviour lives behind [`RebindSupport`], created by the
//! constructor registered for the object's type name.

mod adjunct;
mod catalog;
mod entity;
mod location;

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, Weak};

use serde_json::Value;

use crate::memento::{BrooklynObjectType, ConfigValue, Memento, MementoCore};

pub use adjunct::Adjunct;
pub use catalog::{CatalogItem, ManagedBundle};
pub use entity::Entity;
pub use location::Location;

/// Where an object is in its rebind lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectLifecycle {
    /// Instantiated, no state restored yet.
    #[default]
    Shell,
    Reconstructed,
    /// Adjunct attached to its entity and running.
    Attached,
    Managed,
    Failed,
    Unmanaged,
}

/// Type-specific hooks invoked during rebind.
///
/// Generic state (config, relationships, attributes) is restored before
/// [`reconstruct`](Self::reconstruct) is called. Hooks must not start
/// business activity before [`on_attached`](Self::on_attached) or
/// [`on_managed`](Self::on_managed).
pub trait RebindSupport: Send + Sync {
    fn reconstruct(&self, _object: &BrooklynObject, _memento: &MementoCore) -> anyhow::Result<()> {
        Ok(())
    }

    /// An adjunct was attached to its entity. Feeds and enrichers start here.
    fn on_attached(&self, _adjunct: &Arc<Adjunct>, _entity: &Arc<Entity>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_managed(&self, _object: &BrooklynObject) -> anyhow::Result<()> {
        Ok(())
    }
}

/// No-op behaviour for types without custom rebind logic.
#[derive(Debug, Default)]
pub struct BasicRebindSupport;

impl RebindSupport for BasicRebindSupport {}

/// Any live object.
#[derive(Debug, Clone)]
pub enum BrooklynObject {
    Entity(Arc<Entity>),
    Location(Arc<Location>),
    Adjunct(Arc<Adjunct>),
    CatalogItem(Arc<CatalogItem>),
    ManagedBundle(Arc<ManagedBundle>),
}

impl BrooklynObject {
    pub fn id(&self) -> &str {
        match self {
            BrooklynObject::Entity(o) => o.id(),
            BrooklynObject::Location(o) => o.id(),
            BrooklynObject::Adjunct(o) => o.id(),
            BrooklynObject::CatalogItem(o) => o.id(),
            BrooklynObject::ManagedBundle(o) => o.id(),
        }
    }

    pub fn object_type(&self) -> BrooklynObjectType {
        match self {
            BrooklynObject::Entity(_) => BrooklynObjectType::Entity,
            BrooklynObject::Location(_) => BrooklynObjectType::Location,
            BrooklynObject::Adjunct(o) => o.kind(),
            BrooklynObject::CatalogItem(_) => BrooklynObjectType::CatalogItem,
            BrooklynObject::ManagedBundle(_) => BrooklynObjectType::ManagedBundle,
        }
    }
}

/// Weak reference to a live object, remembering the id it was resolved from.
pub struct ObjectRef<T> {
    id: String,
    target: Weak<T>,
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            target: self.target.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.id)
            .field("alive", &(self.target.strong_count() > 0))
            .finish()
    }
}

impl<T> ObjectRef<T> {
    pub fn new(id: impl Into<String>, target: &Arc<T>) -> Self {
        Self {
            id: id.into(),
            target: Arc::downgrade(target),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The referenced object, if it is still alive.
    pub fn get(&self) -> Option<Arc<T>> {
        self.target.upgrade()
    }
}

/// Stand-in for an adjunct referenced before it has been instantiated.
///
/// Bound at most once, after which it forwards to the real adjunct.
#[derive(Debug)]
pub struct AdjunctProxy {
    id: String,
    kind: BrooklynObjectType,
    delegate: OnceLock<Weak<Adjunct>>,
}

impl AdjunctProxy {
    pub fn new(kind: BrooklynObjectType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            delegate: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> BrooklynObjectType {
        self.kind
    }

    /// Returns false if the proxy was already bound.
    pub fn bind(&self, adjunct: &Arc<Adjunct>) -> bool {
        self.delegate.set(Arc::downgrade(adjunct)).is_ok()
    }

    pub fn is_bound(&self) -> bool {
        self.delegate.get().is_some()
    }

    pub fn get(&self) -> Option<Arc<Adjunct>> {
        self.delegate.get().and_then(Weak::upgrade)
    }
}

/// A config value with its references resolved against the live graph.
#[derive(Debug, Clone)]
pub enum ResolvedValue {
    Literal(Value),
    Entity(ObjectRef<Entity>),
    Location(ObjectRef<Location>),
    Adjunct(Arc<AdjunctProxy>),
    CatalogItem(Arc<CatalogItem>),
    Bundle(Arc<ManagedBundle>),
    /// A reference that could not be resolved and had no substitute.
    Missing {
        object_type: BrooklynObjectType,
        id: String,
    },
    Deferred(String),
    Nested(Box<Memento>),
    List(Vec<ResolvedValue>),
    Map(BTreeMap<String, ResolvedValue>),
}

/// Resolved config of one object.
pub type ResolvedConfig = BTreeMap<String, ResolvedValue>;

impl ResolvedValue {
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            ResolvedValue::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<Arc<Entity>> {
        match self {
            ResolvedValue::Entity(r) => r.get(),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<Arc<Location>> {
        match self {
            ResolvedValue::Location(r) => r.get(),
            _ => None,
        }
    }

    pub fn as_adjunct(&self) -> Option<Arc<Adjunct>> {
        match self {
            ResolvedValue::Adjunct(p) => p.get(),
            _ => None,
        }
    }

    /// Convert back to the persisted form. References become ids again.
    pub fn to_config_value(&self) -> ConfigValue {
        match self {
            ResolvedValue::Literal(v) => ConfigValue::Literal(v.clone()),
            ResolvedValue::Entity(r) => ConfigValue::EntityRef(r.id().to_string()),
            ResolvedValue::Location(r) => ConfigValue::LocationRef(r.id().to_string()),
            ResolvedValue::Adjunct(p) => ConfigValue::reference_to(p.kind(), p.id()),
            ResolvedValue::CatalogItem(c) => ConfigValue::CatalogItemRef(c.id().to_string()),
            ResolvedValue::Bundle(b) => ConfigValue::BundleRef(b.id().to_string()),
            ResolvedValue::Missing { object_type, id } => {
                ConfigValue::reference_to(*object_type, id.clone())
            }
            ResolvedValue::Deferred(expr) => ConfigValue::Deferred(expr.clone()),
            ResolvedValue::Nested(m) => ConfigValue::Nested(m.clone()),
            ResolvedValue::List(items) => {
                ConfigValue::List(items.iter().map(ResolvedValue::to_config_value).collect())
            }
            ResolvedValue::Map(map) => ConfigValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_config_value()))
                    .collect(),
            ),
        }
    }
}

pub(crate) fn config_to_memento(config: &ResolvedConfig) -> BTreeMap<String, ConfigValue> {
    config
        .iter()
        .map(|(k, v)| (k.clone(), v.to_config_value()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_proxy_binds_once() {
        let proxy = AdjunctProxy::new(BrooklynObjectType::Policy, "p1");
        assert!(!proxy.is_bound());
        assert!(proxy.get().is_none());

        let a = Adjunct::new("p1", BrooklynObjectType::Policy, "BasicPolicy", Arc::new(BasicRebindSupport), None);
        let b = Adjunct::new("p1", BrooklynObjectType::Policy, "BasicPolicy", Arc::new(BasicRebindSupport), None);
        assert!(proxy.bind(&a));
        assert!(!proxy.bind(&b));
        assert!(Arc::ptr_eq(&proxy.get().unwrap(), &a));
    }

    #[test]
    fn test_object_ref_is_weak() {
        let entity = Entity::placeholder("e1");
        let r = ObjectRef::new("e1", &entity);
        assert!(r.get().is_some());
        drop(entity);
        assert!(r.get().is_none());
        assert_eq!(r.id(), "e1");
    }

    #[test]
    fn test_to_config_value_restores_ids() {
        let entity = Entity::placeholder("app");
        let value = ResolvedValue::Map(
            [
                ("target".to_string(), ResolvedValue::Entity(ObjectRef::new("app", &entity))),
                (
                    "gone".to_string(),
                    ResolvedValue::Missing {
                        object_type: BrooklynObjectType::Location,
                        id: "l9".into(),
                    },
                ),
                ("n".to_string(), ResolvedValue::Literal(json!(3))),
            ]
            .into_iter()
            .collect(),
        );

        let ConfigValue::Map(map) = value.to_config_value() else {
            panic!("expected map");
        };
        assert_eq!(map["target"], ConfigValue::EntityRef("app".into()));
        assert_eq!(map["gone"], ConfigValue::LocationRef("l9".into()));
        assert_eq!(map["n"], ConfigValue::Literal(json!(3)));
    }
}
