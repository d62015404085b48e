// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Creation of object shells from their persisted type information.
//!
//! Resolution order for an object's type:
//!
//! 1. the catalog item id, looked up in the type registry
//! 2. the same id redirected through the upgrade table
//! 3. each catalog id of the search path, tried as 1 and 2
//! 4. the declared type name in the base constructor table
//! 5. with the legacy scan enabled, every registered type's libraries
//!
//! A type found through the catalog is loaded from the libraries of its
//! registered type (installed bundles only) and then from the base table.

use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::{
    BundleCoordinates, BundleRegistry, Constructor, ConstructorRegistry, RegisteredType,
    TypeRegistry, TypeUpgrades,
};
use crate::error::{RebindError, Result};
use crate::exception_handler::RebindExceptionHandler;
use crate::memento::{BrooklynObjectType, ObjectManifest};
use crate::objects::{Adjunct, Entity, Location};

/// Outcome of type resolution.
#[derive(Clone)]
pub struct ResolvedType {
    pub constructor: Constructor,
    /// Catalog item the type was found through, after any upgrade.
    pub catalog_item_id: Option<String>,
    /// Fallbacks taken on the way.
    pub warnings: Vec<String>,
}

impl std::fmt::Debug for ResolvedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedType")
            .field("catalog_item_id", &self.catalog_item_id)
            .field("warnings", &self.warnings)
            .finish()
    }
}

/// Builds entity, location and adjunct shells.
pub struct BrooklynObjectInstantiator {
    types: Arc<dyn TypeRegistry>,
    upgrades: Arc<TypeUpgrades>,
    constructors: Arc<ConstructorRegistry>,
    bundles: Arc<BundleRegistry>,
    legacy_catalog_scan: bool,
}

impl BrooklynObjectInstantiator {
    pub fn new(
        types: Arc<dyn TypeRegistry>,
        upgrades: Arc<TypeUpgrades>,
        constructors: Arc<ConstructorRegistry>,
        bundles: Arc<BundleRegistry>,
    ) -> Self {
        Self {
            types,
            upgrades,
            constructors,
            bundles,
            legacy_catalog_scan: true,
        }
    }

    pub fn with_legacy_catalog_scan(mut self, enabled: bool) -> Self {
        self.legacy_catalog_scan = enabled;
        self
    }

    /// Resolve the constructor for one persisted object.
    pub fn resolve(
        &self,
        object_type: BrooklynObjectType,
        id: &str,
        type_name: &str,
        catalog_item_id: Option<&str>,
        search_path: &[String],
    ) -> Result<ResolvedType> {
        let mut attempts = Vec::new();
        let mut warnings = Vec::new();

        if let Some(catalog_id) = catalog_item_id
            && let Some(resolved) = self.resolve_catalog_id(object_type, catalog_id, type_name, &mut attempts)
        {
            return Ok(resolved);
        }

        for entry in search_path {
            match self.resolve_catalog_id(object_type, entry, type_name, &mut attempts) {
                Some(mut resolved) => {
                    warnings.append(&mut resolved.warnings);
                    resolved.warnings = warnings;
                    return Ok(resolved);
                }
                None => warnings.push(format!(
                    "{object_type} {id}: search path entry {entry} could not be resolved"
                )),
            }
        }

        if let Some(constructor) = self.constructors.load(type_name) {
            debug!(object_type = %object_type, id = %id, type_name = %type_name, "Resolved type from base constructors");
            if let Some(catalog_id) = catalog_item_id {
                warnings.push(format!(
                    "{object_type} {id}: catalog item {catalog_id} unresolved, using base type {type_name}"
                ));
            }
            return Ok(ResolvedType {
                constructor,
                catalog_item_id: catalog_item_id.map(str::to_string),
                warnings,
            });
        }
        attempts.push(format!("type {type_name} not in base constructors"));

        if self.legacy_catalog_scan {
            for registered in self.types.all() {
                if let Some(constructor) = self.load_from_libraries(&registered, type_name) {
                    warnings.push(format!(
                        "{object_type} {id}: type {type_name} found by scanning libraries of {}",
                        registered.id()
                    ));
                    return Ok(ResolvedType {
                        constructor,
                        catalog_item_id: catalog_item_id.map(str::to_string),
                        warnings,
                    });
                }
            }
            attempts.push(format!("type {type_name} not in any registered type's libraries"));
        }

        Err(RebindError::TypeResolution {
            object_type,
            id: id.to_string(),
            type_name: type_name.to_string(),
            attempts,
        })
    }

    /// Registry lookup of `catalog_id`, then of its upgrade target.
    fn resolve_catalog_id(
        &self,
        object_type: BrooklynObjectType,
        catalog_id: &str,
        type_name: &str,
        attempts: &mut Vec<String>,
    ) -> Option<ResolvedType> {
        let mut notes = Vec::new();
        let registered = match self.types.get_maybe(catalog_id, Some(object_type)) {
            Some(found) => found,
            None => {
                let upgraded = BundleCoordinates::parse(catalog_id)
                    .and_then(|coords| self.upgrades.upgrade_for(&coords));
                let Some(target) = upgraded else {
                    attempts.push(format!("catalog item {catalog_id} not registered"));
                    return None;
                };
                match self.types.get_maybe(&target.to_string(), Some(object_type)) {
                    Some(found) => {
                        info!(from = %catalog_id, to = %target, "Upgrading catalog item reference");
                        notes.push(format!("catalog item {catalog_id} upgraded to {target}"));
                        found
                    }
                    None => {
                        attempts.push(format!(
                            "catalog item {catalog_id} upgraded to {target}, which is not registered"
                        ));
                        return None;
                    }
                }
            }
        };

        if registered.disabled {
            debug!(item = %registered.id(), "Resolving persisted object through disabled catalog item");
        }

        // The catalog item names the type to build; fall back to the declared
        // type for items that predate that.
        let constructor = self
            .load_from_registered(&registered, &registered.type_name)
            .or_else(|| self.load_from_registered(&registered, type_name));
        match constructor {
            Some(constructor) => Some(ResolvedType {
                constructor,
                catalog_item_id: Some(registered.id()),
                warnings: notes,
            }),
            None => {
                attempts.push(format!(
                    "catalog item {} found but type {} not loadable from its libraries",
                    registered.id(),
                    registered.type_name
                ));
                None
            }
        }
    }

    fn load_from_registered(&self, registered: &RegisteredType, type_name: &str) -> Option<Constructor> {
        self.load_from_libraries(registered, type_name)
            .or_else(|| self.constructors.load(type_name))
    }

    /// Search the installed bundles among `registered`'s libraries, honouring
    /// upgraded bundle coordinates.
    fn load_from_libraries(&self, registered: &RegisteredType, type_name: &str) -> Option<Constructor> {
        registered.libraries.iter().find_map(|library| {
            let coords = self.upgrades.upgrade_for(library).unwrap_or_else(|| library.clone());
            self.bundles
                .loader_for(&coords)
                .and_then(|loader| loader.load(type_name))
        })
    }

    fn resolve_manifest(
        &self,
        object_type: BrooklynObjectType,
        manifest: &ObjectManifest,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<ResolvedType> {
        let resolved = self.resolve(
            object_type,
            &manifest.id,
            &manifest.type_name,
            manifest.catalog_item_id.as_deref(),
            &manifest.search_path,
        )?;
        for warning in &resolved.warnings {
            handler.on_warning(warning);
        }
        Ok(resolved)
    }

    pub fn new_entity(
        &self,
        manifest: &ObjectManifest,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<Arc<Entity>> {
        let resolved = self.resolve_manifest(BrooklynObjectType::Entity, manifest, handler)?;
        Ok(Entity::new(
            manifest.id.clone(),
            manifest.type_name.clone(),
            (resolved.constructor)(),
            resolved.catalog_item_id,
        ))
    }

    pub fn new_location(
        &self,
        manifest: &ObjectManifest,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<Arc<Location>> {
        let resolved = self.resolve_manifest(BrooklynObjectType::Location, manifest, handler)?;
        Ok(Location::new(
            manifest.id.clone(),
            manifest.type_name.clone(),
            (resolved.constructor)(),
            resolved.catalog_item_id,
        ))
    }

    pub fn new_adjunct(
        &self,
        kind: BrooklynObjectType,
        manifest: &ObjectManifest,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<Arc<Adjunct>> {
        let resolved = self.resolve_manifest(kind, manifest, handler)?;
        Ok(Adjunct::new(
            manifest.id.clone(),
            kind,
            manifest.type_name.clone(),
            (resolved.constructor)(),
            resolved.catalog_item_id,
        ))
    }
}
