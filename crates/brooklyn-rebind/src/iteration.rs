// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One rebind pass: persisted state to a managed object graph.
//!
//! The pass runs eight phases, each exactly once and in order:
//!
//! | # | Phase | Work |
//! |---|-------|------|
//! | 1 | load manifest | ids, types, parents, catalog context |
//! | 2 | install catalog | bundles and persisted catalog items |
//! | 3 | instantiate shells | locations, then entities |
//! | 4 | load mementos | full parse, references resolved by id |
//! | 5 | instantiate adjuncts | policies, enrichers, feeds; bind proxies |
//! | 6 | reconstruct | locations, adjuncts, then entities parent-first |
//! | 7 | attach adjuncts | per entity, in its execution context |
//! | 8 | manage | register roots, clean up orphans |
//!
//! Read-only passes stop at the next phase boundary once cancelled.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogInitialization, PersistedCatalogState};
use crate::context::RebindContext;
use crate::error::{RebindError, RebindFailure, RebindProblem, Result};
use crate::exception_handler::RebindExceptionHandler;
use crate::instantiator::BrooklynObjectInstantiator;
use crate::lookup::RebindContextLookup;
use crate::management::ManagementContext;
use crate::manager::RebindMode;
use crate::memento::{BrooklynObjectType, MementoManifest, RawMementoData};
use crate::objects::{CatalogItem, Entity, Location, ManagedBundle, ObjectLifecycle};
use crate::persistence::{Deletions, PersistenceStore};
use crate::serializer::{self, BrooklynMemento};

/// Phases of a rebind pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RebindPhase {
    NotStarted,
    LoadManifest,
    InstallCatalog,
    InstantiateShells,
    LoadMementos,
    InstantiateAdjuncts,
    Reconstruct,
    AttachAdjuncts,
    Manage,
}

impl RebindPhase {
    pub const ALL: [RebindPhase; 8] = [
        RebindPhase::LoadManifest,
        RebindPhase::InstallCatalog,
        RebindPhase::InstantiateShells,
        RebindPhase::LoadMementos,
        RebindPhase::InstantiateAdjuncts,
        RebindPhase::Reconstruct,
        RebindPhase::AttachAdjuncts,
        RebindPhase::Manage,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    fn name(&self) -> &'static str {
        match self {
            RebindPhase::NotStarted => "not started",
            RebindPhase::LoadManifest => "load manifest",
            RebindPhase::InstallCatalog => "install catalog",
            RebindPhase::InstantiateShells => "instantiate shells",
            RebindPhase::LoadMementos => "load mementos",
            RebindPhase::InstantiateAdjuncts => "instantiate adjuncts",
            RebindPhase::Reconstruct => "reconstruct",
            RebindPhase::AttachAdjuncts => "attach adjuncts",
            RebindPhase::Manage => "manage",
        }
    }
}

impl fmt::Display for RebindPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {} ({})", self.number(), self.name())
    }
}

/// Entry into a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTransition {
    pub phase: RebindPhase,
    pub read_only: bool,
    pub at: DateTime<Utc>,
}

/// Summary of a completed pass.
#[derive(Debug, Clone)]
pub struct RebindReport {
    pub mode: RebindMode,
    pub transitions: Vec<PhaseTransition>,
    pub entities: usize,
    pub locations: usize,
    pub adjuncts: usize,
    pub catalog_items: usize,
    pub bundles: usize,
    /// Entities and locations of the previous generation no longer persisted.
    pub orphans: Vec<String>,
    pub warnings: Vec<String>,
    /// Problems recorded but tolerated by the failure modes.
    pub errors: Vec<RebindProblem>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RebindReport {
    /// Whether every phase ran.
    pub fn is_complete(&self) -> bool {
        self.transitions.len() == RebindPhase::ALL.len()
            && self
                .transitions
                .iter()
                .zip(RebindPhase::ALL)
                .all(|(t, p)| t.phase == p)
    }
}

/// Order ids so that every parent precedes its children. Returns each id
/// with its depth. A parent outside the set makes the id a root; a parent
/// cycle is broken at the first id visited.
pub fn order_parent_first(parents: &BTreeMap<String, Option<String>>) -> Vec<(usize, String)> {
    fn depth_of(
        id: &str,
        parents: &BTreeMap<String, Option<String>>,
        depths: &mut BTreeMap<String, usize>,
        visiting: &mut HashSet<String>,
    ) -> usize {
        if let Some(d) = depths.get(id) {
            return *d;
        }
        let parent = parents.get(id).cloned().flatten();
        let depth = match parent {
            Some(p) if parents.contains_key(&p) && visiting.insert(id.to_string()) => {
                let d = depth_of(&p, parents, depths, visiting) + 1;
                visiting.remove(id);
                d
            }
            Some(p) if parents.contains_key(&p) => {
                warn!(id = %id, "Parent cycle detected, treating as root");
                0
            }
            _ => 0,
        };
        depths.insert(id.to_string(), depth);
        depth
    }

    let mut depths = BTreeMap::new();
    let mut visiting = HashSet::new();
    let mut ordered: Vec<(usize, String)> = parents
        .keys()
        .map(|id| (depth_of(id, parents, &mut depths, &mut visiting), id.clone()))
        .collect();
    ordered.sort();
    ordered
}

/// State and collaborators of one pass.
pub struct RebindIteration {
    mode: RebindMode,
    management: Arc<ManagementContext>,
    store: Arc<dyn PersistenceStore>,
    handler: Arc<dyn RebindExceptionHandler>,
    catalog_init: Arc<dyn CatalogInitialization>,
    instantiator: BrooklynObjectInstantiator,
    cancel: CancellationToken,
    context: RebindContext,
    phase: RebindPhase,
    transitions: Vec<PhaseTransition>,
    /// Entity and location ids present in the store when the pass began.
    persisted_entities: HashSet<String>,
    persisted_locations: HashSet<String>,
    orphans: Vec<String>,
    /// Orphan records removed from the store once the pass has succeeded.
    pending_deletes: Deletions,
}

impl RebindIteration {
    pub fn new(
        mode: RebindMode,
        management: Arc<ManagementContext>,
        store: Arc<dyn PersistenceStore>,
        handler: Arc<dyn RebindExceptionHandler>,
        catalog_init: Arc<dyn CatalogInitialization>,
        legacy_catalog_scan: bool,
    ) -> Self {
        let instantiator = BrooklynObjectInstantiator::new(
            management.types().clone(),
            management.upgrades().clone(),
            management.constructors().clone(),
            management.bundle_registry().clone(),
        )
        .with_legacy_catalog_scan(legacy_catalog_scan);

        Self {
            mode,
            management,
            store,
            handler,
            catalog_init,
            instantiator,
            cancel: CancellationToken::new(),
            context: RebindContext::new(mode.is_read_only()),
            phase: RebindPhase::NotStarted,
            transitions: Vec::new(),
            persisted_entities: HashSet::new(),
            persisted_locations: HashSet::new(),
            orphans: Vec::new(),
            pending_deletes: Deletions::new(),
        }
    }

    /// Token checked between phases of a read-only pass.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn phase(&self) -> RebindPhase {
        self.phase
    }

    fn read_only(&self) -> bool {
        self.mode.is_read_only()
    }

    /// Enter the next phase.
    fn advance(&mut self, to: RebindPhase) -> Result<()> {
        if to.number() != self.phase.number() + 1 {
            return Err(RebindError::IllegalPhaseTransition {
                from: self.phase,
                to,
            });
        }
        if self.read_only() && self.cancel.is_cancelled() {
            return Err(RebindError::Interrupted(to));
        }
        self.phase = to;
        self.transitions.push(PhaseTransition {
            phase: to,
            read_only: self.read_only(),
            at: Utc::now(),
        });
        debug!(phase = %to, read_only = self.read_only(), "Entering rebind phase");
        Ok(())
    }

    /// Run the pass. Problems tolerated by the failure modes are listed in
    /// the report; anything else fails the pass.
    pub async fn run(mut self) -> std::result::Result<RebindReport, RebindFailure> {
        let started_at = Utc::now();
        self.handler.on_start();
        info!(mode = %self.mode, "Starting rebind");

        if let Err(e) = self.run_phases().await {
            if let RebindError::Interrupted(phase) = &e {
                info!(phase = %phase, "Read-only rebind interrupted");
                return Err(RebindFailure {
                    cause: Some(e.to_string()),
                    errors: self.handler.errors(),
                    warnings: self.handler.warnings(),
                });
            }
            let failure = self.handler.on_failed(&e);
            tracing::error!(error = %e, "Rebind failed");
            return Err(failure);
        }
        if let Err(failure) = self.handler.on_done() {
            tracing::error!(errors = failure.errors.len(), "Rebind completed with errors");
            return Err(failure);
        }
        if let Err(e) = self.delete_orphan_records().await {
            let failure = self.handler.on_failed(&e);
            tracing::error!(error = %e, "Failed to delete orphan records");
            return Err(failure);
        }

        let report = RebindReport {
            mode: self.mode,
            transitions: self.transitions,
            entities: self.context.entities().len(),
            locations: self.context.locations().len(),
            adjuncts: BrooklynObjectType::ADJUNCTS
                .iter()
                .map(|k| self.context.adjuncts(*k).len())
                .sum(),
            catalog_items: self.context.catalog_items().len(),
            bundles: self.context.bundles().len(),
            orphans: self.orphans,
            warnings: self.handler.warnings(),
            errors: self.handler.errors(),
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            mode = %report.mode,
            entities = report.entities,
            locations = report.locations,
            adjuncts = report.adjuncts,
            warnings = report.warnings.len(),
            "Rebind completed"
        );
        Ok(report)
    }

    async fn run_phases(&mut self) -> Result<()> {
        self.advance(RebindPhase::LoadManifest)?;
        let raw = self.store.load_raw().await?;
        self.persisted_entities = raw.get(BrooklynObjectType::Entity).keys().cloned().collect();
        self.persisted_locations = raw.get(BrooklynObjectType::Location).keys().cloned().collect();
        let manifest = serializer::load_memento_manifest(&raw, self.handler.as_ref())?;
        let raw = serializer::restrict_to_manifest(&raw, &manifest);

        self.advance(RebindPhase::InstallCatalog)?;
        self.install_catalog(&manifest)?;

        self.advance(RebindPhase::InstantiateShells)?;
        self.instantiate_shells(&manifest)?;

        self.advance(RebindPhase::LoadMementos)?;
        let memento = self.load_mementos(&raw)?;

        self.advance(RebindPhase::InstantiateAdjuncts)?;
        self.instantiate_adjuncts(&manifest)?;

        self.advance(RebindPhase::Reconstruct)?;
        self.reconstruct(&memento)?;

        self.advance(RebindPhase::AttachAdjuncts)?;
        self.attach_adjuncts().await?;

        self.advance(RebindPhase::Manage)?;
        self.manage().await
    }

    /// Phase 2.
    fn install_catalog(&mut self, manifest: &MementoManifest) -> Result<()> {
        let handler = self.handler.as_ref();
        let mut persisted = PersistedCatalogState::default();

        for bundle in manifest.bundles.values() {
            let bundle = ManagedBundle::from_memento(bundle);
            if let Err(e) = self.context.register_bundle(bundle.clone()) {
                handler.on_create_failed(BrooklynObjectType::ManagedBundle, bundle.id(), &e)?;
                continue;
            }
            persisted.bundles.push(bundle);
        }
        for item in manifest.catalog_items.values() {
            let item = CatalogItem::from_memento(item);
            if let Err(e) = self.context.register_catalog_item(item.clone()) {
                handler.on_create_failed(BrooklynObjectType::CatalogItem, item.id(), &e)?;
                continue;
            }
            persisted.items.push(item);
        }

        self.catalog_init.populate_initial_and_persisted(
            &persisted,
            self.management.types().as_ref(),
            self.management.bundle_registry(),
            handler,
        )
    }

    /// Phase 3.
    fn instantiate_shells(&mut self, manifest: &MementoManifest) -> Result<()> {
        let handler = self.handler.as_ref();

        for m in manifest.locations.values() {
            let created = self
                .instantiator
                .new_location(m, handler)
                .and_then(|location| self.context.register_location(location));
            if let Err(e) = created {
                handler.on_create_failed(BrooklynObjectType::Location, &m.id, &e)?;
            }
        }
        for m in manifest.entities.values() {
            let created = self
                .instantiator
                .new_entity(m, handler)
                .and_then(|entity| self.context.register_entity(entity));
            if let Err(e) = created {
                handler.on_create_failed(BrooklynObjectType::Entity, &m.id, &e)?;
            }
        }
        debug!(
            locations = self.context.locations().len(),
            entities = self.context.entities().len(),
            "Instantiated shells"
        );
        Ok(())
    }

    /// Phase 4.
    fn load_mementos(&self, raw: &RawMementoData) -> Result<BrooklynMemento> {
        let lookup = RebindContextLookup::new(&self.context, self.handler.as_ref());
        serializer::load_memento(raw, &lookup, self.handler.as_ref())
    }

    /// Phase 5.
    fn instantiate_adjuncts(&mut self, manifest: &MementoManifest) -> Result<()> {
        let handler = self.handler.as_ref();

        for kind in BrooklynObjectType::ADJUNCTS {
            let Some(manifests) = manifest.objects(kind) else {
                continue;
            };
            for m in manifests.values() {
                let created = self
                    .instantiator
                    .new_adjunct(kind, m, handler)
                    .and_then(|adjunct| self.context.register_adjunct(adjunct));
                if let Err(e) = created {
                    handler.on_create_failed(kind, &m.id, &e)?;
                }
            }
        }

        for proxy in self.context.proxies() {
            match self.context.adjunct_or_dangling(proxy.kind(), proxy.id(), handler)? {
                Some(adjunct) => {
                    proxy.bind(&adjunct);
                }
                None => debug!(kind = %proxy.kind(), id = %proxy.id(), "Adjunct reference left unbound"),
            }
        }
        Ok(())
    }

    /// Phase 6. No object starts activity here.
    fn reconstruct(&mut self, memento: &BrooklynMemento) -> Result<()> {
        let handler = self.handler.as_ref();
        let context = &self.context;

        let location_parents = memento
            .locations
            .iter()
            .map(|(id, l)| (id.clone(), l.memento.parent.clone()))
            .collect();
        for (_, id) in order_parent_first(&location_parents) {
            let loaded = &memento.locations[&id];
            let Some(location) = context.location(&id) else {
                handler.on_not_found(BrooklynObjectType::Location, &id)?;
                continue;
            };
            let children = loaded
                .memento
                .children
                .iter()
                .filter(|c| context.location(c).is_some())
                .cloned()
                .collect();
            if let Err(e) = location.reconstruct(&loaded.memento, loaded.config.clone(), children) {
                location.set_lifecycle(ObjectLifecycle::Failed);
                handler.on_rebind_failed(
                    BrooklynObjectType::Location,
                    &id,
                    &reconstruct_error(BrooklynObjectType::Location, &id, &e),
                )?;
            }
        }

        for kind in BrooklynObjectType::ADJUNCTS {
            for (id, loaded) in memento.adjuncts(kind) {
                let Some(adjunct) = context.adjunct(kind, id) else {
                    handler.on_not_found(kind, id)?;
                    continue;
                };
                if let Err(e) = adjunct.reconstruct(&loaded.memento, loaded.config.clone()) {
                    adjunct.set_lifecycle(ObjectLifecycle::Failed);
                    handler.on_rebind_failed(kind, id, &reconstruct_error(kind, id, &e))?;
                }
            }
        }

        let entity_parents = memento
            .entities
            .iter()
            .map(|(id, e)| (id.clone(), e.memento.parent.clone()))
            .collect();
        for (_, id) in order_parent_first(&entity_parents) {
            let loaded = &memento.entities[&id];
            let Some(entity) = context.entity(&id) else {
                handler.on_not_found(BrooklynObjectType::Entity, &id)?;
                continue;
            };
            let children = loaded
                .memento
                .children
                .iter()
                .filter(|c| context.entity(c).is_some())
                .cloned()
                .collect();
            let adjuncts = loaded
                .memento
                .adjuncts()
                .filter_map(|(kind, adjunct_id)| context.adjunct(kind, adjunct_id))
                .filter(|a| a.lifecycle() == ObjectLifecycle::Reconstructed)
                .collect();
            if let Err(e) = entity.reconstruct(&loaded.memento, loaded.config.clone(), children, adjuncts) {
                entity.set_lifecycle(ObjectLifecycle::Failed);
                handler.on_rebind_failed(
                    BrooklynObjectType::Entity,
                    &id,
                    &reconstruct_error(BrooklynObjectType::Entity, &id, &e),
                )?;
            }
        }
        Ok(())
    }

    /// Reconstructed entities grouped by depth, parents first.
    fn entity_levels(&self) -> Vec<Vec<Arc<Entity>>> {
        let entities: BTreeMap<String, Arc<Entity>> = self
            .context
            .entities()
            .into_iter()
            .filter(|e| e.lifecycle() == ObjectLifecycle::Reconstructed)
            .map(|e| (e.id().to_string(), e))
            .collect();
        let parents = entities
            .iter()
            .map(|(id, e)| (id.clone(), e.parent_id()))
            .collect();

        let mut levels: Vec<Vec<Arc<Entity>>> = Vec::new();
        for (depth, id) in order_parent_first(&parents) {
            if levels.len() <= depth {
                levels.resize_with(depth + 1, Vec::new);
            }
            if let Some(entity) = entities.get(&id) {
                levels[depth].push(entity.clone());
            }
        }
        levels
    }

    /// Phase 7. Entities of one depth run concurrently, each in its own
    /// serialized execution context.
    async fn attach_adjuncts(&mut self) -> Result<()> {
        let read_only = self.read_only();
        let handler = self.handler.as_ref();
        let management = &self.management;

        for level in self.entity_levels() {
            let work = level.into_iter().map(|entity| async move {
                let context = management.execution_context(entity.id());
                context
                    .run("Rebind: attach adjuncts", async {
                        for adjunct in entity.adjuncts() {
                            if read_only {
                                adjunct.associate(&entity);
                                continue;
                            }
                            if let Err(e) = adjunct.attach(&entity) {
                                adjunct.set_lifecycle(ObjectLifecycle::Failed);
                                entity.remove_adjunct(adjunct.id());
                                let error = RebindError::Manage {
                                    object_type: adjunct.kind(),
                                    id: adjunct.id().to_string(),
                                    reason: format!("{e:#}"),
                                };
                                handler.on_add_adjunct_failed(entity.id(), &adjunct, &error)?;
                            }
                        }
                        Ok::<_, RebindError>(())
                    })
                    .await
            });
            for result in join_all(work).await {
                result?;
            }
        }
        Ok(())
    }

    /// Phase 8.
    async fn manage(&mut self) -> Result<()> {
        let read_only = self.read_only();
        let handler = self.handler.as_ref();
        let management = self.management.clone();
        let previous_entities = management.entity_ids();
        let previous_locations = management.location_ids();

        for bundle in self.context.bundles() {
            management.register_bundle(bundle);
        }
        for item in self.context.catalog_items() {
            management.register_catalog_item(item);
        }

        let locations: BTreeMap<String, Arc<Location>> = self
            .context
            .locations()
            .into_iter()
            .map(|l| (l.id().to_string(), l))
            .collect();
        let location_parents = locations
            .iter()
            .map(|(id, l)| (id.clone(), l.parent_id()))
            .collect();
        // Parent-first order visits each tree from its root.
        let mut failed: HashSet<String> = HashSet::new();
        for (_, id) in order_parent_first(&location_parents) {
            let location = &locations[&id];
            let parent_failed = location.parent_id().is_some_and(|p| failed.contains(&p));
            if parent_failed || location.lifecycle() != ObjectLifecycle::Reconstructed {
                failed.insert(id);
                continue;
            }
            if let Err(e) = management.manage_location(location, read_only) {
                location.set_lifecycle(ObjectLifecycle::Failed);
                failed.insert(id.clone());
                handler.on_manage_failed(
                    BrooklynObjectType::Location,
                    &id,
                    &manage_error(BrooklynObjectType::Location, &id, &e),
                )?;
                continue;
            }
        }

        let entities: BTreeMap<String, Arc<Entity>> = self
            .context
            .entities()
            .into_iter()
            .map(|e| (e.id().to_string(), e))
            .collect();
        let entity_parents = entities
            .iter()
            .map(|(id, e)| (id.clone(), e.parent_id()))
            .collect();
        for (_, id) in order_parent_first(&entity_parents) {
            let entity = &entities[&id];
            let parent_failed = entity.parent_id().is_some_and(|p| failed.contains(&p));
            if parent_failed || entity.lifecycle() != ObjectLifecycle::Reconstructed {
                if parent_failed {
                    warn!(entity_id = %id, "Not managing entity under a failed parent");
                }
                failed.insert(id);
                continue;
            }
            if let Err(e) = management.manage_entity(entity, read_only) {
                entity.set_lifecycle(ObjectLifecycle::Failed);
                failed.insert(id.clone());
                handler.on_manage_failed(
                    BrooklynObjectType::Entity,
                    &id,
                    &manage_error(BrooklynObjectType::Entity, &id, &e),
                )?;
                continue;
            }
        }

        self.remove_orphans(&previous_entities, &previous_locations)
            .await
    }

    /// Objects managed before this pass whose records are no longer in the
    /// store. Objects still persisted are never orphans, even when this pass
    /// failed to rebuild them.
    async fn remove_orphans(
        &mut self,
        previous_entities: &[String],
        previous_locations: &[String],
    ) -> Result<()> {
        let management = self.management.clone();
        let orphan_entities: Vec<String> = previous_entities
            .iter()
            .filter(|id| !self.persisted_entities.contains(*id))
            .cloned()
            .collect();
        let orphan_locations: Vec<String> = previous_locations
            .iter()
            .filter(|id| !self.persisted_locations.contains(*id))
            .cloned()
            .collect();

        if self.read_only() {
            for id in &orphan_entities {
                management.drop_entity(id);
            }
            for id in &orphan_locations {
                management.drop_location(id);
            }
        } else {
            let mut deletes = Deletions::new();
            for id in &orphan_entities {
                if management.entity(id).is_none() {
                    continue;
                }
                // Descendants that are still persisted keep their records.
                for member in management.subtree(id) {
                    if self.persisted_entities.contains(&member) {
                        continue;
                    }
                    let Some(entity) = management.entity(&member) else {
                        continue;
                    };
                    for adjunct in entity.adjuncts() {
                        deletes
                            .entry(adjunct.kind())
                            .or_default()
                            .push(adjunct.id().to_string());
                    }
                }
                let unmanaged = management.unmanage_entity(id).await?;
                deletes
                    .entry(BrooklynObjectType::Entity)
                    .or_default()
                    .extend(
                        unmanaged
                            .into_iter()
                            .filter(|e| !self.persisted_entities.contains(e)),
                    );
            }
            for id in &orphan_locations {
                management.unmanage_location(id);
            }
            if !orphan_locations.is_empty() {
                deletes
                    .entry(BrooklynObjectType::Location)
                    .or_default()
                    .extend(orphan_locations.iter().cloned());
            }
            self.pending_deletes = deletes;
        }

        if !orphan_entities.is_empty() || !orphan_locations.is_empty() {
            info!(
                entities = orphan_entities.len(),
                locations = orphan_locations.len(),
                read_only = self.read_only(),
                "Removed objects no longer persisted"
            );
        }
        self.orphans = orphan_entities.into_iter().chain(orphan_locations).collect();
        Ok(())
    }

    /// Remove the records of unmanaged orphans in one store call.
    async fn delete_orphan_records(&mut self) -> Result<()> {
        let deletes = std::mem::take(&mut self.pending_deletes);
        if deletes.is_empty() {
            return Ok(());
        }
        self.store.delete_many(&deletes).await?;
        debug!(
            records = deletes.values().map(Vec::len).sum::<usize>(),
            "Deleted orphan records"
        );
        Ok(())
    }
}

fn reconstruct_error(object_type: BrooklynObjectType, id: &str, e: &anyhow::Error) -> RebindError {
    RebindError::Reconstruct {
        object_type,
        id: id.to_string(),
        reason: format!("{e:#}"),
    }
}

fn manage_error(object_type: BrooklynObjectType, id: &str, e: &anyhow::Error) -> RebindError {
    RebindError::Manage {
        object_type,
        id: id.to_string(),
        reason: format!("{e:#}"),
    }
}
