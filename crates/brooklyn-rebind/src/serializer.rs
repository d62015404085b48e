// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversion between [`RawMementoData`] and mementos.
//!
//! Each record is parsed on its own. A record that fails to parse is
//! reported through the exception handler and skipped.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{RebindError, Result};
use crate::exception_handler::RebindExceptionHandler;
use crate::lookup::{LookupContext, resolve_config};
use crate::memento::{
    AdjunctMemento, BrooklynObjectType, CatalogItemMemento, EntityMemento, LocationMemento,
    ManagedBundleMemento, Memento, MementoManifest, ObjectManifest, RawMementoData,
};
use crate::objects::ResolvedConfig;

/// A memento together with its config resolved against the live graph.
#[derive(Debug, Clone)]
pub struct Loaded<M> {
    pub memento: M,
    pub config: ResolvedConfig,
}

/// Fully parsed persisted state.
#[derive(Debug, Clone, Default)]
pub struct BrooklynMemento {
    pub entities: BTreeMap<String, Loaded<EntityMemento>>,
    pub locations: BTreeMap<String, Loaded<LocationMemento>>,
    pub policies: BTreeMap<String, Loaded<AdjunctMemento>>,
    pub enrichers: BTreeMap<String, Loaded<AdjunctMemento>>,
    pub feeds: BTreeMap<String, Loaded<AdjunctMemento>>,
    pub catalog_items: BTreeMap<String, CatalogItemMemento>,
    pub bundles: BTreeMap<String, ManagedBundleMemento>,
}

impl BrooklynMemento {
    pub fn adjuncts(&self, kind: BrooklynObjectType) -> &BTreeMap<String, Loaded<AdjunctMemento>> {
        match kind {
            BrooklynObjectType::Enricher => &self.enrichers,
            BrooklynObjectType::Feed => &self.feeds,
            _ => &self.policies,
        }
    }
}

/// The fields the manifest pass reads. Everything else is ignored.
#[derive(Deserialize)]
struct ManifestRecord {
    id: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    catalog_item_id: Option<String>,
    #[serde(default)]
    catalog_item_id_search_path: Vec<String>,
}

fn parse<T: DeserializeOwned>(
    object_type: BrooklynObjectType,
    id: &str,
    text: &str,
    record_id: impl Fn(&T) -> &str,
) -> Result<T> {
    let corrupt = |reason: String| RebindError::CorruptMemento {
        object_type,
        id: id.to_string(),
        reason,
    };
    let parsed: T = serde_json::from_str(text).map_err(|e| corrupt(e.to_string()))?;
    let actual = record_id(&parsed);
    if actual != id {
        return Err(corrupt(format!("record has id {actual}")));
    }
    Ok(parsed)
}

/// Parse every record of `object_type`, reporting failures to the handler.
fn parse_all<T: DeserializeOwned>(
    raw: &RawMementoData,
    object_type: BrooklynObjectType,
    handler: &dyn RebindExceptionHandler,
    record_id: impl Fn(&T) -> &str + Copy,
) -> Result<Vec<(String, T)>> {
    let mut parsed = Vec::new();
    for (id, text) in raw.get(object_type) {
        match parse(object_type, id, text, record_id) {
            Ok(record) => parsed.push((id.clone(), record)),
            Err(e) => handler.on_load_memento_failed(object_type, id, &e)?,
        }
    }
    Ok(parsed)
}

/// Read ids, types, parents and catalog context without a full parse.
pub fn load_memento_manifest(
    raw: &RawMementoData,
    handler: &dyn RebindExceptionHandler,
) -> Result<MementoManifest> {
    let mut manifest = MementoManifest::default();

    for object_type in [
        BrooklynObjectType::Entity,
        BrooklynObjectType::Location,
        BrooklynObjectType::Policy,
        BrooklynObjectType::Enricher,
        BrooklynObjectType::Feed,
    ] {
        let records = parse_all::<ManifestRecord>(raw, object_type, handler, |r| r.id.as_str())?;
        if let Some(objects) = manifest.objects_mut(object_type) {
            for (id, record) in records {
                objects.insert(
                    id.clone(),
                    ObjectManifest {
                        id,
                        type_name: record.type_name,
                        parent_id: record.parent,
                        catalog_item_id: record.catalog_item_id,
                        search_path: record.catalog_item_id_search_path,
                    },
                );
            }
        }
    }

    manifest.catalog_items = parse_all::<CatalogItemMemento>(
        raw,
        BrooklynObjectType::CatalogItem,
        handler,
        |m| m.core.id.as_str(),
    )?
    .into_iter()
    .collect();
    manifest.bundles =
        parse_all::<ManagedBundleMemento>(raw, BrooklynObjectType::ManagedBundle, handler, |m| m.id.as_str())?
            .into_iter()
            .collect();

    debug!(
        entities = manifest.entities.len(),
        locations = manifest.locations.len(),
        policies = manifest.policies.len(),
        enrichers = manifest.enrichers.len(),
        feeds = manifest.feeds.len(),
        catalog_items = manifest.catalog_items.len(),
        bundles = manifest.bundles.len(),
        "Loaded memento manifest"
    );
    Ok(manifest)
}

/// Parse every memento and resolve its config through `lookup`.
pub fn load_memento(
    raw: &RawMementoData,
    lookup: &dyn LookupContext,
    handler: &dyn RebindExceptionHandler,
) -> Result<BrooklynMemento> {
    let mut memento = BrooklynMemento::default();

    for (id, m) in parse_all::<EntityMemento>(raw, BrooklynObjectType::Entity, handler, |m| m.core.id.as_str())? {
        let config = resolve_config(&m.core.config, lookup)?;
        memento.entities.insert(id, Loaded { memento: m, config });
    }
    for (id, m) in
        parse_all::<LocationMemento>(raw, BrooklynObjectType::Location, handler, |m| m.core.id.as_str())?
    {
        let config = resolve_config(&m.core.config, lookup)?;
        memento.locations.insert(id, Loaded { memento: m, config });
    }
    for kind in BrooklynObjectType::ADJUNCTS {
        let loaded = parse_all::<AdjunctMemento>(raw, kind, handler, |m| m.core.id.as_str())?
            .into_iter()
            .map(|(id, m)| {
                let config = resolve_config(&m.core.config, lookup)?;
                Ok((id, Loaded { memento: m, config }))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        match kind {
            BrooklynObjectType::Policy => memento.policies = loaded,
            BrooklynObjectType::Enricher => memento.enrichers = loaded,
            _ => memento.feeds = loaded,
        }
    }
    memento.catalog_items =
        parse_all::<CatalogItemMemento>(raw, BrooklynObjectType::CatalogItem, handler, |m| m.core.id.as_str())?
            .into_iter()
            .collect();
    memento.bundles =
        parse_all::<ManagedBundleMemento>(raw, BrooklynObjectType::ManagedBundle, handler, |m| m.id.as_str())?
            .into_iter()
            .collect();

    Ok(memento)
}

/// The subset of `raw` whose records made it into `manifest`.
pub fn restrict_to_manifest(raw: &RawMementoData, manifest: &MementoManifest) -> RawMementoData {
    let mut restricted = RawMementoData::default();
    for object_type in BrooklynObjectType::ALL {
        let keep = |id: &String| match object_type {
            BrooklynObjectType::CatalogItem => manifest.catalog_items.contains_key(id),
            BrooklynObjectType::ManagedBundle => manifest.bundles.contains_key(id),
            other => manifest
                .objects(other)
                .is_some_and(|objects| objects.contains_key(id)),
        };
        let target = restricted.get_mut(object_type);
        for (id, text) in raw.get(object_type) {
            if keep(id) {
                target.insert(id.clone(), text.clone());
            }
        }
    }
    restricted
}

/// Serialize one memento into its persisted text.
pub fn serialize_memento(memento: &Memento) -> Result<String> {
    let text = match memento {
        Memento::Entity(m) => serde_json::to_string(m)?,
        Memento::Location(m) => serde_json::to_string(m)?,
        Memento::Policy(m) | Memento::Enricher(m) | Memento::Feed(m) => serde_json::to_string(m)?,
        Memento::CatalogItem(m) => serde_json::to_string(m)?,
        Memento::ManagedBundle(m) => serde_json::to_string(m)?,
    };
    Ok(text)
}

/// Build the persisted form of a set of mementos.
pub fn to_raw(mementos: impl IntoIterator<Item = Memento>) -> Result<RawMementoData> {
    let mut raw = RawMementoData::default();
    for memento in mementos {
        let text = serialize_memento(&memento)?;
        raw.get_mut(memento.object_type())
            .insert(memento.id().to_string(), text);
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RebindContext;
    use crate::error::ProblemKind;
    use crate::exception_handler::DefaultRebindExceptionHandler;
    use crate::lookup::RebindContextLookup;
    use crate::objects::Entity;

    fn sample_raw() -> RawMementoData {
        let mut app = EntityMemento::new("app", "BasicApplication");
        app.children = vec!["child1".into()];
        let mut child = EntityMemento::new("child1", "BasicEntity");
        child.parent = Some("app".into());
        child.core.catalog_item_id = Some("mycat:2.0".into());
        child
            .core
            .config
            .insert("peer".into(), crate::memento::ConfigValue::EntityRef("app".into()));
        let mut policy = AdjunctMemento::new("p1", "BasicPolicy");
        policy.entity = Some("child1".into());
        to_raw([
            Memento::Entity(app),
            Memento::Entity(child),
            Memento::Policy(policy),
        ])
        .unwrap()
    }

    #[test]
    fn test_manifest_reads_identity() {
        let handler = DefaultRebindExceptionHandler::default();
        handler.on_start();
        let manifest = load_memento_manifest(&sample_raw(), &handler).unwrap();

        let child = &manifest.entities["child1"];
        assert_eq!(child.type_name, "BasicEntity");
        assert_eq!(child.parent_id.as_deref(), Some("app"));
        assert_eq!(child.catalog_item_id.as_deref(), Some("mycat:2.0"));
        assert!(manifest.policies.contains_key("p1"));
        assert!(handler.errors().is_empty());
    }

    #[test]
    fn test_corrupt_record_reported_and_skipped() {
        let mut raw = sample_raw();
        raw.entities.insert("bad".into(), "{not json".into());
        raw.entities
            .insert("wrong".into(), r#"{"id": "other", "type": "T"}"#.into());

        let handler = DefaultRebindExceptionHandler::default();
        handler.on_start();
        let manifest = load_memento_manifest(&raw, &handler).unwrap();

        assert_eq!(manifest.entities.len(), 2);
        let errors = handler.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|p| p.kind == ProblemKind::LoadMemento));

        let restricted = restrict_to_manifest(&raw, &manifest);
        assert_eq!(restricted.entities.len(), 2);
        assert_eq!(restricted.policies.len(), 1);
    }

    #[test]
    fn test_load_memento_resolves_config() {
        let raw = sample_raw();
        let context = RebindContext::new(false);
        let handler = DefaultRebindExceptionHandler::default();
        handler.on_start();
        let app = Entity::placeholder("app");
        context.register_entity(app.clone()).unwrap();

        let lookup = RebindContextLookup::new(&context, &handler);
        let memento = load_memento(&raw, &lookup, &handler).unwrap();

        let child = &memento.entities["child1"];
        assert!(std::sync::Arc::ptr_eq(&child.config["peer"].as_entity().unwrap(), &app));
        assert_eq!(memento.policies["p1"].memento.entity.as_deref(), Some("child1"));
        assert!(memento.adjuncts(BrooklynObjectType::Feed).is_empty());
    }
}
