// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persisted representation of the live object graph.
//!
//! A memento is an immutable, serializable record of one object. Mementos
//! refer to each other by id only; the live graph is rebuilt from them by
//! [`crate::iteration::RebindIteration`].
//!
//! Persisted data is kept per object type as `id -> JSON text`
//! ([`RawMementoData`]) so that one corrupt record never prevents the others
//! from loading.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of persisted object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrooklynObjectType {
    Entity,
    Location,
    Policy,
    Enricher,
    Feed,
    CatalogItem,
    ManagedBundle,
}

impl BrooklynObjectType {
    pub const ALL: [BrooklynObjectType; 7] = [
        BrooklynObjectType::Entity,
        BrooklynObjectType::Location,
        BrooklynObjectType::Policy,
        BrooklynObjectType::Enricher,
        BrooklynObjectType::Feed,
        BrooklynObjectType::CatalogItem,
        BrooklynObjectType::ManagedBundle,
    ];

    pub const ADJUNCTS: [BrooklynObjectType; 3] = [
        BrooklynObjectType::Policy,
        BrooklynObjectType::Enricher,
        BrooklynObjectType::Feed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrooklynObjectType::Entity => "entity",
            BrooklynObjectType::Location => "location",
            BrooklynObjectType::Policy => "policy",
            BrooklynObjectType::Enricher => "enricher",
            BrooklynObjectType::Feed => "feed",
            BrooklynObjectType::CatalogItem => "catalog_item",
            BrooklynObjectType::ManagedBundle => "managed_bundle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn is_adjunct(&self) -> bool {
        Self::ADJUNCTS.contains(self)
    }
}

impl fmt::Display for BrooklynObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted config value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    Literal(Value),
    EntityRef(String),
    LocationRef(String),
    PolicyRef(String),
    EnricherRef(String),
    FeedRef(String),
    CatalogItemRef(String),
    BundleRef(String),
    /// Unevaluated expression, resolved on first use after rebind.
    Deferred(String),
    Nested(Box<Memento>),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        ConfigValue::Literal(value.into())
    }

    /// The object this value references directly, if it is a reference.
    pub fn reference(&self) -> Option<(BrooklynObjectType, &str)> {
        let r = match self {
            ConfigValue::EntityRef(id) => (BrooklynObjectType::Entity, id),
            ConfigValue::LocationRef(id) => (BrooklynObjectType::Location, id),
            ConfigValue::PolicyRef(id) => (BrooklynObjectType::Policy, id),
            ConfigValue::EnricherRef(id) => (BrooklynObjectType::Enricher, id),
            ConfigValue::FeedRef(id) => (BrooklynObjectType::Feed, id),
            ConfigValue::CatalogItemRef(id) => (BrooklynObjectType::CatalogItem, id),
            ConfigValue::BundleRef(id) => (BrooklynObjectType::ManagedBundle, id),
            _ => return None,
        };
        Some((r.0, r.1.as_str()))
    }

    pub fn reference_to(object_type: BrooklynObjectType, id: impl Into<String>) -> Self {
        let id = id.into();
        match object_type {
            BrooklynObjectType::Entity => ConfigValue::EntityRef(id),
            BrooklynObjectType::Location => ConfigValue::LocationRef(id),
            BrooklynObjectType::Policy => ConfigValue::PolicyRef(id),
            BrooklynObjectType::Enricher => ConfigValue::EnricherRef(id),
            BrooklynObjectType::Feed => ConfigValue::FeedRef(id),
            BrooklynObjectType::CatalogItem => ConfigValue::CatalogItemRef(id),
            BrooklynObjectType::ManagedBundle => ConfigValue::BundleRef(id),
        }
    }
}

/// Fields shared by every memento except bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MementoCore {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_item_id: Option<String>,
    /// Catalog ids to try, in order, when `catalog_item_id` does not resolve.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalog_item_id_search_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, ConfigValue>,
}

impl MementoCore {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            catalog_item_id: None,
            catalog_item_id_search_path: Vec::new(),
            display_name: None,
            config: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMemento {
    #[serde(flatten)]
    pub core: MementoCore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrichers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feeds: Vec<String>,
    /// Sensor values at the time of the snapshot.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl EntityMemento {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            core: MementoCore::new(id, type_name),
            parent: None,
            children: Vec::new(),
            members: Vec::new(),
            locations: Vec::new(),
            policies: Vec::new(),
            enrichers: Vec::new(),
            feeds: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Ids of the adjuncts owned by this entity, with their kind.
    pub fn adjuncts(&self) -> impl Iterator<Item = (BrooklynObjectType, &str)> {
        self.policies
            .iter()
            .map(|id| (BrooklynObjectType::Policy, id.as_str()))
            .chain(self.enrichers.iter().map(|id| (BrooklynObjectType::Enricher, id.as_str())))
            .chain(self.feeds.iter().map(|id| (BrooklynObjectType::Feed, id.as_str())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMemento {
    #[serde(flatten)]
    pub core: MementoCore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl LocationMemento {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            core: MementoCore::new(id, type_name),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Memento for a policy, enricher or feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjunctMemento {
    #[serde(flatten)]
    pub core: MementoCore,
    /// Owning entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_tag: Option<String>,
}

impl AdjunctMemento {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            core: MementoCore::new(id, type_name),
            entity: None,
            unique_tag: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItemMemento {
    #[serde(flatten)]
    pub core: MementoCore,
    pub symbolic_name: String,
    pub version: String,
    pub item_type: BrooklynObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Bundle coordinates (`name:version`) providing the item's types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedBundleMemento {
    pub id: String,
    pub symbolic_name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Hex SHA-256 of the bundle contents when it was persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Any memento, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Memento {
    Entity(EntityMemento),
    Location(LocationMemento),
    Policy(AdjunctMemento),
    Enricher(AdjunctMemento),
    Feed(AdjunctMemento),
    CatalogItem(CatalogItemMemento),
    ManagedBundle(ManagedBundleMemento),
}

impl Memento {
    pub fn object_type(&self) -> BrooklynObjectType {
        match self {
            Memento::Entity(_) => BrooklynObjectType::Entity,
            Memento::Location(_) => BrooklynObjectType::Location,
            Memento::Policy(_) => BrooklynObjectType::Policy,
            Memento::Enricher(_) => BrooklynObjectType::Enricher,
            Memento::Feed(_) => BrooklynObjectType::Feed,
            Memento::CatalogItem(_) => BrooklynObjectType::CatalogItem,
            Memento::ManagedBundle(_) => BrooklynObjectType::ManagedBundle,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Memento::ManagedBundle(m) => &m.id,
            other => match other.core() {
                Some(core) => &core.id,
                None => "",
            },
        }
    }

    pub fn core(&self) -> Option<&MementoCore> {
        match self {
            Memento::Entity(m) => Some(&m.core),
            Memento::Location(m) => Some(&m.core),
            Memento::Policy(m) | Memento::Enricher(m) | Memento::Feed(m) => Some(&m.core),
            Memento::CatalogItem(m) => Some(&m.core),
            Memento::ManagedBundle(_) => None,
        }
    }
}

/// Persisted form: per object type, `id -> serialized memento`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMementoData {
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
    #[serde(default)]
    pub locations: BTreeMap<String, String>,
    #[serde(default)]
    pub policies: BTreeMap<String, String>,
    #[serde(default)]
    pub enrichers: BTreeMap<String, String>,
    #[serde(default)]
    pub feeds: BTreeMap<String, String>,
    #[serde(default)]
    pub catalog_items: BTreeMap<String, String>,
    #[serde(default)]
    pub bundles: BTreeMap<String, String>,
}

impl RawMementoData {
    pub fn get(&self, object_type: BrooklynObjectType) -> &BTreeMap<String, String> {
        match object_type {
            BrooklynObjectType::Entity => &self.entities,
            BrooklynObjectType::Location => &self.locations,
            BrooklynObjectType::Policy => &self.policies,
            BrooklynObjectType::Enricher => &self.enrichers,
            BrooklynObjectType::Feed => &self.feeds,
            BrooklynObjectType::CatalogItem => &self.catalog_items,
            BrooklynObjectType::ManagedBundle => &self.bundles,
        }
    }

    pub fn get_mut(&mut self, object_type: BrooklynObjectType) -> &mut BTreeMap<String, String> {
        match object_type {
            BrooklynObjectType::Entity => &mut self.entities,
            BrooklynObjectType::Location => &mut self.locations,
            BrooklynObjectType::Policy => &mut self.policies,
            BrooklynObjectType::Enricher => &mut self.enrichers,
            BrooklynObjectType::Feed => &mut self.feeds,
            BrooklynObjectType::CatalogItem => &mut self.catalog_items,
            BrooklynObjectType::ManagedBundle => &mut self.bundles,
        }
    }

    pub fn len(&self) -> usize {
        BrooklynObjectType::ALL.iter().map(|t| self.get(*t).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity and catalog context of one persisted object, read without
/// parsing the full memento.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectManifest {
    pub id: String,
    pub type_name: String,
    pub parent_id: Option<String>,
    pub catalog_item_id: Option<String>,
    pub search_path: Vec<String>,
}

/// Result of the manifest pass.
#[derive(Debug, Clone, Default)]
pub struct MementoManifest {
    pub entities: BTreeMap<String, ObjectManifest>,
    pub locations: BTreeMap<String, ObjectManifest>,
    pub policies: BTreeMap<String, ObjectManifest>,
    pub enrichers: BTreeMap<String, ObjectManifest>,
    pub feeds: BTreeMap<String, ObjectManifest>,
    pub catalog_items: BTreeMap<String, CatalogItemMemento>,
    pub bundles: BTreeMap<String, ManagedBundleMemento>,
}

impl MementoManifest {
    /// Manifests of the given entity, location or adjunct type.
    pub fn objects(&self, object_type: BrooklynObjectType) -> Option<&BTreeMap<String, ObjectManifest>> {
        match object_type {
            BrooklynObjectType::Entity => Some(&self.entities),
            BrooklynObjectType::Location => Some(&self.locations),
            BrooklynObjectType::Policy => Some(&self.policies),
            BrooklynObjectType::Enricher => Some(&self.enrichers),
            BrooklynObjectType::Feed => Some(&self.feeds),
            _ => None,
        }
    }

    pub(crate) fn objects_mut(
        &mut self,
        object_type: BrooklynObjectType,
    ) -> Option<&mut BTreeMap<String, ObjectManifest>> {
        match object_type {
            BrooklynObjectType::Entity => Some(&mut self.entities),
            BrooklynObjectType::Location => Some(&mut self.locations),
            BrooklynObjectType::Policy => Some(&mut self.policies),
            BrooklynObjectType::Enricher => Some(&mut self.enrichers),
            BrooklynObjectType::Feed => Some(&mut self.feeds),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_type_parse() {
        for t in BrooklynObjectType::ALL {
            assert_eq!(BrooklynObjectType::parse(t.as_str()), Some(t));
        }
        assert_eq!(BrooklynObjectType::parse("widget"), None);
        assert!(BrooklynObjectType::Feed.is_adjunct());
        assert!(!BrooklynObjectType::Entity.is_adjunct());
    }

    #[test]
    fn test_entity_memento_json_shape() {
        let mut m = EntityMemento::new("child1", "BasicEntity");
        m.parent = Some("app".into());
        m.policies = vec!["p1".into()];
        m.core
            .config
            .insert("target".into(), ConfigValue::EntityRef("app".into()));

        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["id"], "child1");
        assert_eq!(v["type"], "BasicEntity");
        assert_eq!(v["parent"], "app");
        assert_eq!(v["config"]["target"], json!({"type": "entity_ref", "value": "app"}));
        assert!(v.get("children").is_none());
    }

    #[test]
    fn test_minimal_entity_parses_with_defaults() {
        let m: EntityMemento = serde_json::from_str(r#"{"id": "e", "type": "T"}"#).unwrap();
        assert_eq!(m.core.id, "e");
        assert!(m.parent.is_none());
        assert!(m.core.config.is_empty());
    }

    #[test]
    fn test_nested_memento_in_config() {
        let nested = Memento::Location(LocationMemento::new("loc-spec", "BasicLocation"));
        let value = ConfigValue::Nested(Box::new(nested.clone()));
        let text = serde_json::to_string(&value).unwrap();
        let back: ConfigValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
        assert_eq!(nested.object_type(), BrooklynObjectType::Location);
        assert_eq!(nested.id(), "loc-spec");
    }

    #[test]
    fn test_adjunct_ids_in_order() {
        let mut m = EntityMemento::new("e", "T");
        m.enrichers = vec!["en".into()];
        m.policies = vec!["p".into()];
        m.feeds = vec!["f".into()];
        let ids: Vec<_> = m.adjuncts().collect();
        assert_eq!(
            ids,
            vec![
                (BrooklynObjectType::Policy, "p"),
                (BrooklynObjectType::Enricher, "en"),
                (BrooklynObjectType::Feed, "f"),
            ]
        );
    }

    #[test]
    fn test_raw_data_len() {
        let mut raw = RawMementoData::default();
        assert!(raw.is_empty());
        raw.get_mut(BrooklynObjectType::Policy).insert("p".into(), "{}".into());
        raw.get_mut(BrooklynObjectType::ManagedBundle).insert("b".into(), "{}".into());
        assert_eq!(raw.len(), 2);
    }
}
