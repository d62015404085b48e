// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Standby rebinds, promotion, orphan cleanup and checkpoints.

mod common;

use std::sync::Arc;
use std::time::Duration;

use brooklyn_rebind::objects::ObjectLifecycle;
use brooklyn_rebind::persistence::{PersistenceStore, SqlitePersistenceStore};
use brooklyn_rebind::runtime::ManagementRuntime;
use brooklyn_rebind::serializer;
use brooklyn_rebind::{BrooklynObjectType, Memento, RebindError, RebindMode};
use brooklyn_tasks::{ExecutionManager, GcConfig, TaskTag};
use common::*;
use tokio::sync::Notify;

// ============================================================================
// Read-only and promotion
// ============================================================================

#[tokio::test]
async fn test_read_only_rebind_does_not_activate() {
    let fixture = Fixture::new(app_child_policy());
    let before = fixture.store.snapshot();

    let report = fixture.manager(RebindMode::HotStandby).rebind().await.unwrap();
    assert!(report.transitions.iter().all(|t| t.read_only));

    let child = fixture.management.entity("child1").unwrap();
    assert_eq!(child.lifecycle(), ObjectLifecycle::Managed);
    let p1 = &child.policies()[0];
    assert!(!p1.is_running());
    assert_eq!(p1.entity_id().as_deref(), Some("child1"));

    let events = fixture.events();
    assert!(events.iter().all(|e| !e.starts_with("attached:") && !e.starts_with("managed:")));
    assert_eq!(fixture.store.snapshot(), before);
}

#[tokio::test]
async fn test_promotion_activates_objects() {
    let fixture = Fixture::new(app_child_policy());
    let manager = fixture.manager(RebindMode::HotStandby);
    manager.rebind().await.unwrap();
    let standby_child = fixture.management.entity("child1").unwrap();

    let report = manager.promote_to_master().await.unwrap();
    assert_eq!(report.mode, RebindMode::Master);
    assert!(report.orphans.is_empty());

    let child = fixture.management.entity("child1").unwrap();
    assert!(!Arc::ptr_eq(&child, &standby_child));
    assert!(child.policies()[0].is_running());
    assert!(fixture.events().contains(&"attached:p1@child1".to_string()));
}

#[tokio::test]
async fn test_standby_loop_follows_store() {
    let fixture = Fixture::new(app_child_policy());
    let manager = Arc::new(fixture.manager(RebindMode::ReadOnly));
    let shutdown = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn({
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        async move { manager.run_read_only(Duration::from_millis(10), shutdown).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fixture.management.entity("child1").is_some());

    // The master removed child1; the standby drops it on a later pass.
    fixture
        .store
        .checkpoint(&raw(vec![Memento::Entity(entity(
            "app",
            "BasicApplication",
            None,
            &[],
        ))]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(fixture.management.entity("child1").is_none());
    assert!(fixture.management.entity("app").is_some());
    // Read-only nodes never write.
    assert_eq!(fixture.store.snapshot().entities.len(), 1);
}

// ============================================================================
// Orphans
// ============================================================================

#[tokio::test]
async fn test_master_unmanages_and_deletes_orphans() {
    let fixture = Fixture::new(app_child_policy());
    let manager = fixture.manager(RebindMode::Master);
    manager.rebind().await.unwrap();
    let old_policy = fixture.management.entity("child1").unwrap().policies()[0].clone();

    // A pass whose persisted state no longer lists child1 as an entity.
    let mut remaining = fixture.store.snapshot();
    remaining.entities.remove("child1");
    fixture.store.checkpoint(&remaining).await.unwrap();

    let report = manager.rebind().await.unwrap();
    assert_eq!(report.orphans, vec!["child1".to_string()]);
    assert!(fixture.management.entity("child1").is_none());
    assert!(!old_policy.is_running());
    // The orphan's adjuncts are deleted from the store too.
    assert!(fixture.store.snapshot().policies.is_empty());
}

#[tokio::test]
async fn test_failed_promotion_keeps_persisted_records() {
    let fixture = Fixture::new(app_child_policy());
    let manager = fixture.manager(RebindMode::HotStandby);
    manager.rebind().await.unwrap();

    // The master has since written a child this node cannot instantiate.
    let mut persisted = fixture.store.snapshot();
    let mut child = entity("child1", "acme.Missing", Some("app"), &[]);
    child.policies = vec!["p1".to_string()];
    persisted.entities.insert(
        "child1".to_string(),
        serializer::serialize_memento(&Memento::Entity(child)).unwrap(),
    );
    fixture.store.checkpoint(&persisted).await.unwrap();

    let failure = manager.promote_to_master().await.unwrap_err();
    assert!(failure.failed_ids().contains(&"child1"));

    // Still persisted, so neither unmanaged nor deleted.
    assert_eq!(fixture.store.snapshot(), persisted);
    assert!(fixture.management.entity("child1").is_some());
}

#[tokio::test]
async fn test_failed_pass_defers_orphan_deletes() {
    let fixture = Fixture::with_failures(app_child_policy(), &["bad"], &[]);
    let manager = fixture.manager(RebindMode::Master);
    manager.rebind().await.unwrap();

    // child1 disappears while a new entity that fails to rebind appears.
    let mut persisted = fixture.store.snapshot();
    persisted.entities.remove("child1");
    persisted.entities.insert(
        "bad".to_string(),
        serializer::serialize_memento(&Memento::Entity(entity("bad", RECORDING, None, &[]))).unwrap(),
    );
    fixture.store.checkpoint(&persisted).await.unwrap();

    let failure = manager.rebind().await.unwrap_err();
    assert_eq!(failure.failed_ids(), vec!["bad"]);
    assert!(fixture.management.entity("child1").is_none());
    // The orphan's policy record survives the failed pass.
    assert_eq!(fixture.store.snapshot(), persisted);
    assert!(fixture.store.snapshot().policies.contains_key("p1"));
}

// ============================================================================
// Checkpoints
// ============================================================================

#[tokio::test]
async fn test_failed_master_pass_leaves_store_untouched() {
    let fixture = Fixture::with_failures(app_child_policy(), &["child1"], &[]);
    let before = fixture.store.snapshot();
    let manager = Arc::new(fixture.manager(RebindMode::Master));

    assert!(manager.rebind().await.is_err());
    // app was managed; a checkpoint now would drop child1 and p1.
    assert!(fixture.management.entity("app").is_some());
    assert!(!manager.can_persist());

    let shutdown = Arc::new(Notify::new());
    let persister = tokio::spawn({
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        async move { manager.run_persister(Duration::from_millis(10), shutdown).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.notify_one();
    persister.await.unwrap();

    assert_eq!(fixture.store.snapshot(), before);
}

#[tokio::test]
async fn test_persist_refused_after_failed_promotion() {
    let fixture = Fixture::with_failures(app_child_policy(), &["child1"], &[]);
    let manager = fixture.manager(RebindMode::HotStandby);
    let _ = manager.rebind().await;
    let before = fixture.store.snapshot();

    assert!(manager.promote_to_master().await.is_err());
    assert_eq!(manager.mode(), RebindMode::Master);
    let err = manager.persist().await.unwrap_err();
    assert!(matches!(err, RebindError::StateNotRestored));
    assert_eq!(fixture.store.snapshot(), before);

    // Once the failing entity is gone a later pass restores checkpointing.
    let mut fixed = fixture.store.snapshot();
    fixed.entities.remove("child1");
    fixed.policies.clear();
    fixture.store.checkpoint(&fixed).await.unwrap();
    manager.promote_to_master().await.unwrap();
    manager.persist().await.unwrap();
}

#[tokio::test]
async fn test_persist_and_rebind_round_trip() {
    let fixture = Fixture::new(app_child_policy());
    let manager = fixture.manager(RebindMode::Master);
    manager.rebind().await.unwrap();
    fixture.store.checkpoint(&Default::default()).await.unwrap();

    manager.persist().await.unwrap();
    let persisted = fixture.store.snapshot();
    assert_eq!(persisted.entities.len(), 2);
    assert_eq!(persisted.policies.len(), 1);

    // A fresh node over the same data sees the same graph.
    let restored = Fixture::new(Vec::new());
    restored.store.checkpoint(&persisted).await.unwrap();
    restored.manager(RebindMode::Master).rebind().await.unwrap();

    let app = restored.management.entity("app").unwrap();
    let child = restored.management.entity("child1").unwrap();
    assert_eq!(app.children(), vec!["child1".to_string()]);
    let target = child.policies()[0]
        .config("target")
        .and_then(|v| v.as_entity())
        .unwrap();
    assert!(Arc::ptr_eq(&target, &app));
}

#[tokio::test]
async fn test_sqlite_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brooklyn.db");

    let store = SqlitePersistenceStore::from_path(&path).await.unwrap();
    store.checkpoint(&raw(app_child_policy())).await.unwrap();
    store
        .delete(BrooklynObjectType::Policy, &["p1".to_string()])
        .await
        .unwrap();

    let runtime = ManagementRuntime::builder()
        .store(Arc::new(store))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let report = runtime.manager().last_report().unwrap();
    assert_eq!(report.entities, 2);
    assert_eq!(report.adjuncts, 0);
    runtime.shutdown().await.unwrap();

    // Shutdown wrote a final checkpoint.
    let reopened = SqlitePersistenceStore::from_path(&path).await.unwrap();
    let raw = reopened.load_raw().await.unwrap();
    assert_eq!(raw.entities.len(), 2);
    assert!(raw.policies.is_empty());
}

// ============================================================================
// Runtime and garbage collection
// ============================================================================

#[tokio::test]
async fn test_runtime_collects_tasks_of_orphans() {
    let fixture = Fixture::new(app_child_policy());
    let runtime = ManagementRuntime::builder()
        .store(fixture.store.clone())
        .management(fixture.management.clone())
        .gc_config(GcConfig {
            period: Duration::from_secs(3600),
            ..GcConfig::default()
        })
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let em = fixture.management.execution_manager().clone();
    let child_tag = TaskTag::ContextEntity("child1".to_string());
    assert!(em.tasks_with_tag_live_or_null(&child_tag).is_some());

    let mut remaining = fixture.store.snapshot();
    remaining.entities.remove("child1");
    fixture.store.checkpoint(&remaining).await.unwrap();
    runtime.manager().rebind().await.unwrap();

    let outcome = runtime.garbage_collector().gc_tasks();
    assert!(outcome.unmanaged_entities > 0);
    assert!(em.tasks_with_tag_live_or_null(&child_tag).is_none());

    runtime.abort();
}
