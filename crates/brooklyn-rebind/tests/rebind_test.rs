// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end rebind passes over an in-memory store.

mod common;

use std::sync::Arc;

use brooklyn_rebind::catalog::{BundleCoordinates, ConstructorRegistry, RegisteredType, TypeRegistry};
use brooklyn_rebind::error::ProblemKind;
use brooklyn_rebind::memento::{ConfigValue, ManagedBundleMemento};
use brooklyn_rebind::objects::{BasicRebindSupport, ObjectLifecycle, RebindSupport};
use brooklyn_rebind::persistence::PersistenceStore;
use brooklyn_rebind::{
    BrooklynObjectType, FailureMode, Memento, RebindConfig, RebindFailureModes, RebindMode,
    RebindPhase,
};
use common::*;

fn config_with(modes: RebindFailureModes) -> RebindConfig {
    RebindConfig {
        failure_modes: modes,
        ..RebindConfig::default()
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_phases_run_once_in_order() {
    let fixture = Fixture::new(app_child_policy());
    let report = fixture.manager(RebindMode::Master).rebind().await.unwrap();

    let phases: Vec<RebindPhase> = report.transitions.iter().map(|t| t.phase).collect();
    assert_eq!(phases, RebindPhase::ALL.to_vec());
    assert!(report.transitions.windows(2).all(|w| w[0].at <= w[1].at));
    assert!(report.transitions.iter().all(|t| !t.read_only));
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_reconstruct_parent_before_child() {
    // Ids sort leaf-first so map order cannot produce the right answer.
    let fixture = Fixture::new(vec![
        Memento::Entity(entity("a-leaf", RECORDING, Some("b-mid"), &[])),
        Memento::Entity(entity("b-mid", RECORDING, Some("c-root"), &["a-leaf"])),
        Memento::Entity(entity("c-root", RECORDING, None, &["b-mid"])),
    ]);
    fixture.manager(RebindMode::Master).rebind().await.unwrap();

    assert!(fixture.position("reconstruct:c-root") < fixture.position("reconstruct:b-mid"));
    assert!(fixture.position("reconstruct:b-mid") < fixture.position("reconstruct:a-leaf"));
    // Nothing is managed before every object is reconstructed.
    assert!(fixture.position("reconstruct:a-leaf") < fixture.position("managed:c-root"));
    assert!(fixture.position("managed:c-root") < fixture.position("managed:a-leaf"));

    let root = fixture.management.entity("c-root").unwrap();
    assert_eq!(root.children(), vec!["b-mid".to_string()]);
    assert_eq!(fixture.management.applications().len(), 1);
}

#[tokio::test]
async fn test_locations_rebuilt_as_tree() {
    let fixture = Fixture::new(vec![
        Memento::Location(location("region", None, &["zone"])),
        Memento::Location(location("zone", Some("region"), &[])),
    ]);
    let report = fixture.manager(RebindMode::Master).rebind().await.unwrap();

    assert_eq!(report.locations, 2);
    assert!(fixture.position("reconstruct:region") < fixture.position("reconstruct:zone"));
    let zone = fixture.management.location("zone").unwrap();
    assert_eq!(zone.parent_id().as_deref(), Some("region"));
    assert_eq!(zone.lifecycle(), ObjectLifecycle::Managed);
}

// ============================================================================
// Object graph
// ============================================================================

#[tokio::test]
async fn test_app_child_policy_scenario() {
    let fixture = Fixture::new(app_child_policy());
    let report = fixture.manager(RebindMode::Master).rebind().await.unwrap();
    assert_eq!(report.entities, 2);
    assert_eq!(report.adjuncts, 1);
    assert!(report.errors.is_empty());

    let apps = fixture.management.applications();
    assert_eq!(apps.len(), 1);
    let app = &apps[0];
    assert_eq!(app.id(), "app");

    let child = fixture.management.entity("child1").unwrap();
    assert_eq!(child.parent_id().as_deref(), Some("app"));
    let owner = child.config("owner").and_then(|v| v.as_entity()).unwrap();
    assert!(Arc::ptr_eq(&owner, app));

    let policies = child.policies();
    assert_eq!(policies.len(), 1);
    let p1 = &policies[0];
    assert!(p1.is_running());
    assert_eq!(p1.lifecycle(), ObjectLifecycle::Attached);
    assert_eq!(p1.entity_id().as_deref(), Some("child1"));
    assert!(Arc::ptr_eq(&p1.entity().unwrap(), &child));

    let target = p1.config("target").and_then(|v| v.as_entity()).unwrap();
    assert!(Arc::ptr_eq(&target, app));

    assert!(fixture.position("attached:p1@child1") < fixture.position("managed:child1"));
}

#[tokio::test]
async fn test_forward_adjunct_reference_bound() {
    let mut mementos = app_child_policy();
    // The app refers to a policy that is instantiated after the entities.
    if let Memento::Entity(app) = &mut mementos[0] {
        app.core
            .config
            .insert("guard".to_string(), ConfigValue::PolicyRef("p1".to_string()));
    }
    let fixture = Fixture::new(mementos);
    let report = fixture.manager(RebindMode::Master).rebind().await.unwrap();
    assert!(report.warnings.is_empty());

    let app = fixture.management.entity("app").unwrap();
    let guard = app.config("guard").and_then(|v| v.as_adjunct()).unwrap();
    assert_eq!(guard.id(), "p1");
    assert!(guard.is_running());
}

#[tokio::test]
async fn test_catalog_upgrade_scenario() {
    let bundle = ManagedBundleMemento {
        id: "bundle-acme".to_string(),
        symbolic_name: "acme-types".to_string(),
        version: "1.0".to_string(),
        url: None,
        checksum: None,
    };
    let mut widget = entity("w1", "acme.Widget", None, &[]);
    widget.core.catalog_item_id = Some("mycat:2.0".to_string());
    let fixture = Fixture::new(vec![Memento::ManagedBundle(bundle), Memento::Entity(widget)]);

    let mgmt = &fixture.management;
    let loader = ConstructorRegistry::new();
    loader.register("acme.Widget", || Arc::new(BasicRebindSupport) as Arc<dyn RebindSupport>);
    loader.register("acme.OldWidget", || Arc::new(BasicRebindSupport) as Arc<dyn RebindSupport>);
    mgmt.bundle_registry()
        .make_available(BundleCoordinates::new("acme-types", "1.0"), b"acme", loader);
    // Both an older and the upgraded item are installed; 2.0 is gone.
    mgmt.types().add(
        RegisteredType::new("mycat", "1.0", BrooklynObjectType::Entity, "acme.OldWidget")
            .with_library(BundleCoordinates::new("acme-types", "1.0")),
    );
    mgmt.types().add(
        RegisteredType::new("mycat", "3.0", BrooklynObjectType::Entity, "acme.Widget")
            .with_library(BundleCoordinates::new("acme-types", "1.0")),
    );
    mgmt.upgrades()
        .add_upgrade(BundleCoordinates::new("mycat", "2.0"), BundleCoordinates::new("mycat", "3.0"));

    let report = fixture.manager(RebindMode::Master).rebind().await.unwrap();
    assert_eq!(report.bundles, 1);

    let w1 = mgmt.entity("w1").unwrap();
    assert_eq!(w1.catalog_item_id().as_deref(), Some("mycat:3.0"));
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("mycat:2.0 upgraded to mycat:3.0")));
    assert!(mgmt.bundle_registry().is_installed(&BundleCoordinates::new("acme-types", "1.0")));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_single_failing_entity_fails_at_end() {
    let fixture = Fixture::with_failures(
        vec![
            Memento::Entity(entity("app", RECORDING, None, &["good", "bad"])),
            Memento::Entity(entity("good", RECORDING, Some("app"), &[])),
            Memento::Entity(entity("bad", RECORDING, Some("app"), &[])),
        ],
        &["bad"],
        &[],
    );

    let failure = fixture.manager(RebindMode::Master).rebind().await.unwrap_err();
    assert_eq!(failure.failed_ids(), vec!["bad"]);
    assert_eq!(failure.errors[0].kind, ProblemKind::Rebind);
    assert!(failure.errors[0].message.contains("reconstruct hook rejected bad"));
    // The rest of the pass still ran.
    assert!(fixture.events().contains(&"reconstruct:good".to_string()));
}

#[tokio::test]
async fn test_single_failing_entity_continue() {
    let fixture = Fixture::with_failures(
        vec![
            Memento::Entity(entity("app", RECORDING, None, &["good", "bad"])),
            Memento::Entity(entity("good", RECORDING, Some("app"), &[])),
            Memento::Entity(entity("bad", RECORDING, Some("app"), &["bad-child"])),
            Memento::Entity(entity("bad-child", RECORDING, Some("bad"), &[])),
        ],
        &["bad"],
        &[],
    );
    let modes = RebindFailureModes {
        rebind: FailureMode::Continue,
        ..RebindFailureModes::default()
    };

    let report = fixture
        .manager_with(RebindMode::Master, config_with(modes))
        .rebind()
        .await
        .unwrap();
    assert_eq!(report.errors.len(), 1);

    let mgmt = &fixture.management;
    assert!(mgmt.entity("app").is_some());
    assert!(mgmt.entity("good").is_some());
    assert!(mgmt.entity("bad").is_none());
    // Descendants of a failed entity are left unmanaged.
    assert!(mgmt.entity("bad-child").is_none());
}

#[tokio::test]
async fn test_fail_fast_aborts_pass() {
    let fixture = Fixture::with_failures(
        vec![
            Memento::Entity(entity("bad", RECORDING, None, &[])),
            Memento::Entity(entity("zz-later", RECORDING, None, &[])),
        ],
        &["bad"],
        &[],
    );
    let modes = RebindFailureModes {
        rebind: FailureMode::FailFast,
        ..RebindFailureModes::default()
    };

    let failure = fixture
        .manager_with(RebindMode::Master, config_with(modes))
        .rebind()
        .await
        .unwrap_err();
    assert!(failure.cause.is_some());
    assert!(fixture.management.entities().is_empty());
    assert!(!fixture.events().contains(&"reconstruct:zz-later".to_string()));
}

#[tokio::test]
async fn test_corrupt_memento_skipped_in_continue_mode() {
    let mut raw = raw(app_child_policy());
    raw.entities
        .insert("broken".to_string(), "{not json".to_string());
    let fixture = Fixture::new(Vec::new());
    fixture.store.checkpoint(&raw).await.unwrap();

    let failure = fixture.manager(RebindMode::Master).rebind().await.unwrap_err();
    assert_eq!(failure.errors[0].kind, ProblemKind::LoadMemento);

    let modes = RebindFailureModes {
        load: FailureMode::Continue,
        ..RebindFailureModes::default()
    };
    let report = fixture
        .manager_with(RebindMode::Master, config_with(modes))
        .rebind()
        .await
        .unwrap();
    assert_eq!(report.entities, 2);
    assert!(fixture.management.entity("broken").is_none());
}

#[tokio::test]
async fn test_unknown_type_reports_create_failure() {
    let fixture = Fixture::new(vec![Memento::Entity(entity("e1", "acme.Unknown", None, &[]))]);

    let failure = fixture.manager(RebindMode::Master).rebind().await.unwrap_err();
    let kinds: Vec<ProblemKind> = failure.errors.iter().map(|p| p.kind).collect();
    // The missing shell is reported again when its memento is reconstructed.
    assert_eq!(kinds, vec![ProblemKind::Create, ProblemKind::NotFound]);
    assert!(failure.errors[0].message.contains("acme.Unknown"));
    assert!(fixture.management.entity("e1").is_none());
}

#[tokio::test]
async fn test_failed_attach_removes_adjunct() {
    let fixture = Fixture::with_failures(app_child_policy(), &[], &["p1"]);
    let report = fixture.manager(RebindMode::Master).rebind().await.unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ProblemKind::AddAdjunct);
    let child = fixture.management.entity("child1").unwrap();
    assert!(child.policies().is_empty());
}

// ============================================================================
// Dangling references
// ============================================================================

#[tokio::test]
async fn test_dangling_reference_substituted_once() {
    let mut e1 = entity("e1", RECORDING, None, &[]);
    e1.core
        .config
        .insert("a".to_string(), ConfigValue::EntityRef("ghost".to_string()));
    e1.core
        .config
        .insert("b".to_string(), ConfigValue::EntityRef("ghost".to_string()));
    let fixture = Fixture::new(vec![Memento::Entity(e1)]);

    let report = fixture.manager(RebindMode::Master).rebind().await.unwrap();
    let dangling: Vec<&String> = report
        .warnings
        .iter()
        .filter(|w| w.contains("ghost"))
        .collect();
    assert_eq!(dangling.len(), 1);
    assert!(fixture.management.entity("ghost").is_none());
}

#[tokio::test]
async fn test_dangling_reference_fail_at_end() {
    let mut e1 = entity("e1", RECORDING, None, &[]);
    e1.core
        .config
        .insert("a".to_string(), ConfigValue::EntityRef("ghost".to_string()));
    e1.core
        .config
        .insert("b".to_string(), ConfigValue::EntityRef("ghost".to_string()));
    let fixture = Fixture::new(vec![Memento::Entity(e1)]);
    let modes = RebindFailureModes {
        dangling_ref: FailureMode::FailAtEnd,
        ..RebindFailureModes::default()
    };

    let failure = fixture
        .manager_with(RebindMode::Master, config_with(modes))
        .rebind()
        .await
        .unwrap_err();
    assert_eq!(failure.errors.len(), 1);
    assert_eq!(failure.errors[0].kind, ProblemKind::DanglingReference);
    assert_eq!(failure.failed_ids(), vec!["ghost"]);
}
