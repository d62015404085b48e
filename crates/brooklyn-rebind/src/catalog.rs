// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Type registry, upgrade table, constructor tables and installed bundles.
//!
//! A type name is turned into a live object by a [`Constructor`]. The base
//! [`ConstructorRegistry`] holds the types every node knows; each installed
//! bundle contributes its own registry. Catalog items ([`RegisteredType`])
//! name the bundles ("libraries") their type is loaded from.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{RebindError, Result};
use crate::exception_handler::RebindExceptionHandler;
use crate::memento::BrooklynObjectType;
use crate::objects::{BasicRebindSupport, CatalogItem, ManagedBundle, RebindSupport};

/// `symbolic_name:version` of a catalog item or bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleCoordinates {
    pub symbolic_name: String,
    pub version: String,
}

impl BundleCoordinates {
    pub fn new(symbolic_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version: version.into(),
        }
    }

    /// Parse `name:version`. The version is everything after the last colon.
    pub fn parse(s: &str) -> Option<Self> {
        let (name, version) = s.rsplit_once(':')?;
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(name, version))
    }
}

impl fmt::Display for BundleCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbolic_name, self.version)
    }
}

/// A catalog entry known to the type registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredType {
    pub symbolic_name: String,
    pub version: String,
    pub kind: BrooklynObjectType,
    /// Name of the type instances are built from.
    pub type_name: String,
    /// Bundles the type is loaded from, searched in order.
    pub libraries: Vec<BundleCoordinates>,
    pub deprecated: bool,
    pub disabled: bool,
}

impl RegisteredType {
    pub fn new(
        symbolic_name: impl Into<String>,
        version: impl Into<String>,
        kind: BrooklynObjectType,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version: version.into(),
            kind,
            type_name: type_name.into(),
            libraries: Vec::new(),
            deprecated: false,
            disabled: false,
        }
    }

    pub fn with_library(mut self, library: BundleCoordinates) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn id(&self) -> String {
        format!("{}:{}", self.symbolic_name, self.version)
    }

    pub fn coordinates(&self) -> BundleCoordinates {
        BundleCoordinates::new(self.symbolic_name.clone(), self.version.clone())
    }

    pub fn from_catalog_item(item: &CatalogItem) -> Self {
        Self {
            symbolic_name: item.symbolic_name().to_string(),
            version: item.version().to_string(),
            kind: item.item_type(),
            type_name: item.type_name().to_string(),
            libraries: item
                .libraries()
                .iter()
                .filter_map(|l| BundleCoordinates::parse(l))
                .collect(),
            deprecated: item.is_deprecated(),
            disabled: item.is_disabled(),
        }
    }
}

/// Catalog of registered types.
pub trait TypeRegistry: Send + Sync {
    /// Look up `name:version`, or the latest version when only `name` is given.
    fn get(&self, id: &str) -> Option<RegisteredType>;

    /// Like [`get`](Self::get), restricted to the given kind.
    fn get_maybe(&self, id: &str, kind: Option<BrooklynObjectType>) -> Option<RegisteredType> {
        self.get(id).filter(|t| kind.is_none_or(|k| t.kind == k))
    }

    fn all(&self) -> Vec<RegisteredType>;

    fn add(&self, registered: RegisteredType);
}

/// In-memory type registry.
#[derive(Debug, Default)]
pub struct BasicTypeRegistry {
    types: RwLock<BTreeMap<String, BTreeMap<String, RegisteredType>>>,
}

impl BasicTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TypeRegistry for BasicTypeRegistry {
    fn get(&self, id: &str) -> Option<RegisteredType> {
        let types = self.types.read();
        match BundleCoordinates::parse(id) {
            Some(coords) => {
                if let Some(found) = types
                    .get(&coords.symbolic_name)
                    .and_then(|versions| versions.get(&coords.version))
                {
                    return Some(found.clone());
                }
                // Names may themselves contain a colon.
                types.get(id).and_then(latest).cloned()
            }
            None => types.get(id).and_then(latest).cloned(),
        }
    }

    fn all(&self) -> Vec<RegisteredType> {
        self.types
            .read()
            .values()
            .flat_map(|versions| versions.values().cloned())
            .collect()
    }

    fn add(&self, registered: RegisteredType) {
        self.types
            .write()
            .entry(registered.symbolic_name.clone())
            .or_default()
            .insert(registered.version.clone(), registered);
    }
}

/// Highest version, by semver when both sides parse, lexically otherwise.
fn latest(versions: &BTreeMap<String, RegisteredType>) -> Option<&RegisteredType> {
    versions.values().max_by(|a, b| compare_versions(&a.version, &b.version))
}

pub(crate) fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (lenient_semver(a), lenient_semver(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// Parse `1`, `1.2` or `1.2.3[-pre]` as semver, padding missing parts.
fn lenient_semver(v: &str) -> Option<semver::Version> {
    if let Ok(parsed) = semver::Version::parse(v) {
        return Some(parsed);
    }
    let dots = v.matches('.').count();
    let padded = match dots {
        0 => format!("{v}.0.0"),
        1 => format!("{v}.0"),
        _ => return None,
    };
    semver::Version::parse(&padded).ok()
}

/// Redirects from retired catalog coordinates to their replacements.
#[derive(Debug, Default)]
pub struct TypeUpgrades {
    upgrades: RwLock<HashMap<BundleCoordinates, BundleCoordinates>>,
}

impl TypeUpgrades {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_upgrade(&self, from: BundleCoordinates, to: BundleCoordinates) {
        self.upgrades.write().insert(from, to);
    }

    pub fn upgrade_for(&self, coords: &BundleCoordinates) -> Option<BundleCoordinates> {
        self.upgrades.read().get(coords).cloned()
    }
}

/// Creates the type-specific behaviour of a new object.
pub type Constructor = Arc<dyn Fn() -> Arc<dyn RebindSupport> + Send + Sync>;

/// Type name to constructor table.
#[derive(Default)]
pub struct ConstructorRegistry {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl fmt::Debug for ConstructorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorRegistry")
            .field("types", &self.names())
            .finish()
    }
}

/// Types every node can construct without a bundle.
pub const BASIC_TYPES: [&str; 6] = [
    "BasicApplication",
    "BasicEntity",
    "BasicLocation",
    "BasicPolicy",
    "BasicEnricher",
    "BasicFeed",
];

impl ConstructorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the basic application, entity, location and
    /// adjunct types.
    pub fn with_basic_types() -> Self {
        let registry = Self::new();
        for name in BASIC_TYPES {
            registry.register(name, || Arc::new(BasicRebindSupport));
        }
        registry
    }

    pub fn register<F>(&self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn RebindSupport> + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .insert(type_name.into(), Arc::new(constructor));
    }

    pub fn load(&self, type_name: &str) -> Option<Constructor> {
        self.constructors.read().get(type_name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.constructors.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Hex SHA-256 of bundle contents.
pub fn bundle_checksum(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    format!("{:x}", hasher.finalize())
}

struct AvailableBundle {
    checksum: String,
    loader: Arc<ConstructorRegistry>,
}

/// Bundles this node can install, and the ones it has installed.
#[derive(Default)]
pub struct BundleRegistry {
    available: RwLock<HashMap<BundleCoordinates, AvailableBundle>>,
    installed: RwLock<HashMap<BundleCoordinates, Arc<ConstructorRegistry>>>,
}

impl fmt::Debug for BundleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed: Vec<_> = self.installed.read().keys().map(|c| c.to_string()).collect();
        f.debug_struct("BundleRegistry")
            .field("installed", &installed)
            .finish()
    }
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a bundle for installation. `contents` is the archive whose
    /// checksum persisted bundles are verified against.
    pub fn make_available(
        &self,
        coords: BundleCoordinates,
        contents: &[u8],
        loader: ConstructorRegistry,
    ) -> String {
        let checksum = bundle_checksum(contents);
        self.available.write().insert(
            coords,
            AvailableBundle {
                checksum: checksum.clone(),
                loader: Arc::new(loader),
            },
        );
        checksum
    }

    /// Install a persisted bundle from the available set, verifying its
    /// checksum when one was recorded.
    pub fn install(&self, bundle: &ManagedBundle) -> Result<()> {
        let coords = bundle.coordinates();
        if self.is_installed(&coords) {
            bundle.mark_installed();
            return Ok(());
        }

        let loader = {
            let available = self.available.read();
            let Some(candidate) = available.get(&coords) else {
                return Err(RebindError::Bundle(
                    coords.to_string(),
                    "not available on this node".to_string(),
                ));
            };
            if let Some(expected) = bundle.checksum()
                && !expected.eq_ignore_ascii_case(&candidate.checksum)
            {
                return Err(RebindError::Bundle(
                    coords.to_string(),
                    format!(
                        "checksum mismatch: persisted {expected}, available {}",
                        candidate.checksum
                    ),
                ));
            }
            candidate.loader.clone()
        };

        self.installed.write().insert(coords.clone(), loader);
        bundle.mark_installed();
        info!(bundle = %coords, "Installed bundle");
        Ok(())
    }

    pub fn is_installed(&self, coords: &BundleCoordinates) -> bool {
        self.installed.read().contains_key(coords)
    }

    pub fn loader_for(&self, coords: &BundleCoordinates) -> Option<Arc<ConstructorRegistry>> {
        self.installed.read().get(coords).cloned()
    }

    pub fn installed(&self) -> Vec<BundleCoordinates> {
        let mut installed: Vec<_> = self.installed.read().keys().cloned().collect();
        installed.sort();
        installed
    }
}

/// Catalog state read back from persistence.
#[derive(Debug, Clone, Default)]
pub struct PersistedCatalogState {
    pub bundles: Vec<Arc<ManagedBundle>>,
    pub items: Vec<Arc<CatalogItem>>,
}

/// Installs persisted bundles and catalog items at the start of a rebind.
pub trait CatalogInitialization: Send + Sync {
    fn populate_initial_and_persisted(
        &self,
        persisted: &PersistedCatalogState,
        types: &dyn TypeRegistry,
        bundles: &BundleRegistry,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<()>;
}

/// Installs every available bundle, then adds persisted items the registry
/// does not already know.
#[derive(Debug, Default)]
pub struct BasicCatalogInitialization;

impl CatalogInitialization for BasicCatalogInitialization {
    fn populate_initial_and_persisted(
        &self,
        persisted: &PersistedCatalogState,
        types: &dyn TypeRegistry,
        bundles: &BundleRegistry,
        handler: &dyn RebindExceptionHandler,
    ) -> Result<()> {
        for bundle in &persisted.bundles {
            if let Err(e) = bundles.install(bundle) {
                warn!(bundle = %bundle.coordinates(), error = %e, "Failed to install persisted bundle");
                handler.on_create_failed(BrooklynObjectType::ManagedBundle, bundle.id(), &e)?;
            }
        }

        for item in &persisted.items {
            let registered = RegisteredType::from_catalog_item(item);
            if types.get(&registered.id()).is_some() {
                debug!(item = %registered.id(), "Catalog item already registered");
                continue;
            }
            debug!(item = %registered.id(), "Adding persisted catalog item");
            types.add(registered);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memento::ManagedBundleMemento;

    fn bundle_memento(checksum: Option<String>) -> ManagedBundleMemento {
        ManagedBundleMemento {
            id: "b1".into(),
            symbolic_name: "acme-types".into(),
            version: "1.0".into(),
            url: None,
            checksum,
        }
    }

    #[test]
    fn test_coordinates_parse() {
        let c = BundleCoordinates::parse("mycat:2.0").unwrap();
        assert_eq!(c.symbolic_name, "mycat");
        assert_eq!(c.version, "2.0");
        assert_eq!(c.to_string(), "mycat:2.0");
        assert!(BundleCoordinates::parse("mycat").is_none());
        assert!(BundleCoordinates::parse(":1").is_none());
    }

    #[test]
    fn test_registry_latest_version() {
        let registry = BasicTypeRegistry::new();
        for v in ["1.9", "1.10", "1.2.3"] {
            registry.add(RegisteredType::new("web", v, BrooklynObjectType::Entity, "BasicEntity"));
        }
        assert_eq!(registry.get("web").unwrap().version, "1.10");
        assert_eq!(registry.get("web:1.9").unwrap().version, "1.9");
        assert!(registry.get("web:3.0").is_none());
        assert!(
            registry
                .get_maybe("web:1.9", Some(BrooklynObjectType::Location))
                .is_none()
        );
        assert_eq!(registry.all().len(), 3);
    }

    #[test]
    fn test_upgrades() {
        let upgrades = TypeUpgrades::new();
        let from = BundleCoordinates::new("mycat", "2.0");
        let to = BundleCoordinates::new("mycat", "3.0");
        upgrades.add_upgrade(from.clone(), to.clone());
        assert_eq!(upgrades.upgrade_for(&from), Some(to));
        assert!(upgrades.upgrade_for(&BundleCoordinates::new("mycat", "1.0")).is_none());
    }

    #[test]
    fn test_install_verifies_checksum() {
        let registry = BundleRegistry::new();
        let coords = BundleCoordinates::new("acme-types", "1.0");
        let checksum = registry.make_available(coords.clone(), b"archive", ConstructorRegistry::new());
        assert_eq!(checksum, bundle_checksum(b"archive"));

        let bad = ManagedBundle::from_memento(&bundle_memento(Some("00".into())));
        assert!(matches!(registry.install(&bad), Err(RebindError::Bundle(_, _))));
        assert!(!bad.is_installed());

        let good = ManagedBundle::from_memento(&bundle_memento(Some(checksum)));
        registry.install(&good).unwrap();
        assert!(good.is_installed());
        assert!(registry.loader_for(&coords).is_some());
    }

    #[test]
    fn test_install_unavailable_bundle_fails() {
        let registry = BundleRegistry::new();
        let bundle = ManagedBundle::from_memento(&bundle_memento(None));
        assert!(registry.install(&bundle).is_err());
        assert!(registry.installed().is_empty());
    }

    #[test]
    fn test_basic_types_construct() {
        let registry = ConstructorRegistry::with_basic_types();
        assert!(registry.load("BasicEntity").is_some());
        assert!(registry.load("acme.Widget").is_none());
        assert_eq!(registry.names().len(), BASIC_TYPES.len());
    }
}
