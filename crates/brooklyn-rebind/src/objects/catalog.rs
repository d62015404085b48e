// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::catalog::BundleCoordinates;
use crate::memento::{BrooklynObjectType, CatalogItemMemento, ManagedBundleMemento, MementoCore};

/// A catalog entry describing a deployable type.
#[derive(Debug, Clone)]
pub struct CatalogItem {
    id: String,
    type_name: String,
    symbolic_name: String,
    version: String,
    item_type: BrooklynObjectType,
    plan: Option<String>,
    libraries: Vec<String>,
    deprecated: bool,
    disabled: bool,
    catalog_item_id: Option<String>,
}

impl CatalogItem {
    pub fn from_memento(memento: &CatalogItemMemento) -> Arc<Self> {
        Arc::new(Self {
            id: memento.core.id.clone(),
            type_name: memento.core.type_name.clone(),
            symbolic_name: memento.symbolic_name.clone(),
            version: memento.version.clone(),
            item_type: memento.item_type,
            plan: memento.plan.clone(),
            libraries: memento.libraries.clone(),
            deprecated: memento.deprecated,
            disabled: memento.disabled,
            catalog_item_id: memento.core.catalog_item_id.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the type instances of this item are built from.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn item_type(&self) -> BrooklynObjectType {
        self.item_type
    }

    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// `symbolic_name:version`.
    pub fn coordinates(&self) -> BundleCoordinates {
        BundleCoordinates::new(self.symbolic_name.clone(), self.version.clone())
    }

    pub fn to_memento(&self) -> CatalogItemMemento {
        let mut core = MementoCore::new(self.id.clone(), self.type_name.clone());
        core.catalog_item_id = self.catalog_item_id.clone();
        CatalogItemMemento {
            core,
            symbolic_name: self.symbolic_name.clone(),
            version: self.version.clone(),
            item_type: self.item_type,
            plan: self.plan.clone(),
            libraries: self.libraries.clone(),
            deprecated: self.deprecated,
            disabled: self.disabled,
        }
    }
}

/// A bundle the management plane installed and persists.
#[derive(Debug)]
pub struct ManagedBundle {
    id: String,
    symbolic_name: String,
    version: String,
    url: Option<String>,
    checksum: Option<String>,
    installed: AtomicBool,
}

impl ManagedBundle {
    pub fn from_memento(memento: &ManagedBundleMemento) -> Arc<Self> {
        Arc::new(Self {
            id: memento.id.clone(),
            symbolic_name: memento.symbolic_name.clone(),
            version: memento.version.clone(),
            url: memento.url.clone(),
            checksum: memento.checksum.clone(),
            installed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn coordinates(&self) -> BundleCoordinates {
        BundleCoordinates::new(self.symbolic_name.clone(), self.version.clone())
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_installed(&self) {
        self.installed.store(true, Ordering::Release);
    }

    pub fn to_memento(&self) -> ManagedBundleMemento {
        ManagedBundleMemento {
            id: self.id.clone(),
            symbolic_name: self.symbolic_name.clone(),
            version: self.version.clone(),
            url: self.url.clone(),
            checksum: self.checksum.clone(),
        }
    }
}
