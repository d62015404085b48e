// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the task garbage collector passes.

mod common;

use brooklyn_tasks::{
    EntityExecutionContext, ExecutionManager, GcConfig, TaskSpec, TaskStatus, TaskTag,
};
use common::Fixture;

fn entity(id: &str) -> TaskTag {
    TaskTag::ContextEntity(id.to_string())
}

fn named(tag: &str) -> TaskTag {
    TaskTag::Named(tag.to_string())
}

// =============================================================================
// Capacity passes
// =============================================================================

#[test]
fn test_entity_cap_deletes_oldest_five_of_ten() {
    let fx = Fixture::new(GcConfig {
        max_tasks_per_entity: 5,
        ..GcConfig::default()
    });
    fx.entities.manage("e1");

    let tasks: Vec<_> = (0..10)
        .map(|i| fx.done_task(TaskSpec::new(format!("task-{i}")).tag(entity("e1"))))
        .collect();

    let outcome = fx.gc.gc_tasks();

    assert_eq!(outcome.over_capacity, 5);
    assert_eq!(outcome.total(), 5);
    for old in &tasks[..5] {
        assert!(!fx.exists(old), "{} should be deleted", old.display_name());
    }
    for recent in &tasks[5..] {
        assert!(fx.exists(recent), "{} should be kept", recent.display_name());
    }
}

#[test]
fn test_under_capacity_tag_gives_grace() {
    let fx = Fixture::new(GcConfig {
        max_tasks_per_tag: 2,
        ..GcConfig::default()
    });

    let only_a: Vec<_> = (0..3)
        .map(|_| fx.done_task(TaskSpec::new("work").tag(named("a"))))
        .collect();
    let shared = fx.done_task(TaskSpec::new("work").tag(named("a")).tag(named("b")));

    // "a" is two over; the shared task is sheltered by "b" and credits one
    let outcome = fx.gc.gc_tasks();

    assert_eq!(outcome.over_capacity, 1);
    assert!(fx.exists(&shared));
    assert!(!fx.exists(&only_a[0]));
    assert!(fx.exists(&only_a[1]));
    assert!(fx.exists(&only_a[2]));

    // a second collection reaches the same fixed point
    assert_eq!(fx.gc.gc_tasks().total(), 0);
}

#[test]
fn test_per_name_cap_keeps_newest() {
    let fx = Fixture::new(GcConfig {
        max_tasks_per_name: 10,
        ..GcConfig::default()
    });

    let polls: Vec<_> = (0..15)
        .map(|_| fx.done_task(TaskSpec::new("poll").tag(named("feed"))))
        .collect();
    let other = fx.done_task(TaskSpec::new("other").tag(named("feed")));

    let outcome = fx.gc.gc_tasks();

    assert_eq!(outcome.per_name, 5);
    assert!(polls[..5].iter().all(|t| !fx.exists(t)));
    assert!(polls[5..].iter().all(|t| fx.exists(t)));
    assert!(fx.exists(&other));
}

#[test]
fn test_global_cap_then_expired_submitter_cascade() {
    let fx = Fixture::new(GcConfig {
        max_tasks_global: 1,
        ..GcConfig::default()
    });

    let parent = fx.running_task(TaskSpec::new("parent"));
    let child = fx.running_task(TaskSpec::new("child").child_of(parent.id()));
    fx.finish(&parent);
    fx.finish(&child);

    // its submitter is alive and owns it
    assert!(fx.exists(&child));

    let outcome = fx.gc.gc_tasks();

    // the global pass removes the oldest completion, the parent; the next
    // round sees the child's submitter expired
    assert_eq!(outcome.global, 1);
    assert_eq!(outcome.immediate, 1);
    assert!(!fx.exists(&parent));
    assert!(!fx.exists(&child));
    assert_eq!(outcome.total(), 2);
    assert!(outcome.rounds >= 2);
}

// =============================================================================
// Immediate deletion
// =============================================================================

#[test]
fn test_transient_deleted_on_completion() {
    let fx = Fixture::new(GcConfig::default());
    let transient = fx.done_task(TaskSpec::new("probe").tag(TaskTag::Transient));
    let effector = fx.done_task(TaskSpec::new("start").tag(TaskTag::Effector));

    assert!(!fx.exists(&transient));
    assert!(fx.exists(&effector));
}

#[test]
fn test_background_task_of_managed_entity_kept() {
    let fx = Fixture::new(GcConfig::default());
    fx.entities.manage("e1");

    let submitter = fx.done_task(TaskSpec::new("submitter"));
    let bg = fx.done_task(
        TaskSpec::new("bg")
            .submitted_by(submitter.id())
            .tag(entity("e1")),
    );
    let orphan = fx.done_task(TaskSpec::new("orphan").submitted_by(submitter.id()));
    assert!(fx.em.delete_task(&submitter));

    let outcome = fx.gc.gc_tasks();

    assert_eq!(outcome.immediate, 1);
    assert!(fx.exists(&bg));
    assert!(!fx.exists(&orphan));
}

#[test]
fn test_submitter_check_disabled_in_sweep() {
    let fx = Fixture::new(GcConfig {
        check_subtask_submitters: false,
        ..GcConfig::default()
    });
    let submitter = fx.done_task(TaskSpec::new("submitter"));
    let detached = fx.done_task(TaskSpec::new("detached").submitted_by(submitter.id()));
    assert!(fx.em.delete_task(&submitter));

    assert_eq!(fx.gc.gc_tasks().total(), 0);
    assert!(fx.exists(&detached));

    fx.gc.update_config(GcConfig::default());
    assert_eq!(fx.gc.gc_tasks().immediate, 1);
    assert!(!fx.exists(&detached));
}

// =============================================================================
// Tasks with unfinished children
// =============================================================================

#[test]
fn test_task_with_running_child_never_deleted() {
    let fx = Fixture::new(GcConfig {
        max_tasks_global: 0,
        max_tasks_per_tag: 0,
        max_task_age: std::time::Duration::from_secs(1),
        ..GcConfig::default()
    });

    let parent = fx.running_task(TaskSpec::new("parent").tag(named("t")));
    let child = fx.running_task(TaskSpec::new("child").submitted_by(parent.id()));
    fx.finish(&parent);
    fx.clock.advance(chrono::Duration::days(2));

    fx.gc.gc_tasks();
    assert!(fx.exists(&parent));
    assert!(fx.exists(&child));

    fx.finish(&child);
    fx.gc.gc_tasks();
    assert!(!fx.exists(&parent));
    assert!(!fx.exists(&child));
}

// =============================================================================
// Age and unmanaged entities
// =============================================================================

#[test]
fn test_aged_root_tasks_deleted() {
    let fx = Fixture::new(GcConfig::default());
    let old = fx.done_task(TaskSpec::new("old"));
    let old_sub = fx.done_task(TaskSpec::new("old-sub").tag(TaskTag::SubTask));
    fx.clock.advance(chrono::Duration::days(31));
    let recent = fx.done_task(TaskSpec::new("recent"));

    let outcome = fx.gc.gc_tasks();

    assert_eq!(outcome.aged, 1);
    assert!(!fx.exists(&old));
    assert!(fx.exists(&old_sub));
    assert!(fx.exists(&recent));
}

#[tokio::test]
async fn test_unmanaged_entity_tasks_deleted_after_unmanage_finishes() {
    let fx = Fixture::new(GcConfig::default());
    fx.entities.manage("e1");
    let history: Vec<_> = (0..3)
        .map(|i| fx.done_task(TaskSpec::new(format!("h{i}")).tag(entity("e1"))))
        .collect();
    let unrelated = fx.done_task(TaskSpec::new("u").tag(entity("e2")));

    let ctx = EntityExecutionContext::new("e1", fx.em.clone());
    let entities = fx.entities.clone();
    let gc = fx.gc.clone();
    let during = ctx
        .run("unmanage", async {
            entities.unmanage("e1");
            gc.on_unmanaged("e1");
            Ok::<_, String>(gc.gc_tasks().unmanaged_entities)
        })
        .await
        .unwrap();
    assert_eq!(during, 0);
    assert!(history.iter().all(|t| fx.exists(t)));

    let after = fx.gc.gc_tasks();
    // the three history tasks plus the unmanage task itself
    assert_eq!(after.unmanaged_entities, 4);
    assert!(history.iter().all(|t| !fx.exists(t)));
    assert!(fx.exists(&unrelated));
    assert!(fx.em.tasks_with_tag_live_or_null(&entity("e1")).is_none());
}

#[tokio::test]
async fn test_concurrent_completion_and_collection() {
    let fx = Fixture::new(GcConfig {
        max_tasks_global: 50,
        ..GcConfig::default()
    });

    let mut handles = Vec::new();
    for i in 0..200 {
        let (_, handle) = fx.em.submit(TaskSpec::new(format!("w{i}")), async move {
            tokio::task::yield_now().await;
            Ok::<_, String>(i)
        });
        handles.push(handle);
        if i % 50 == 0 {
            let gc = fx.gc.clone();
            tokio::task::spawn_blocking(move || gc.gc_tasks()).await.unwrap();
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    fx.gc.gc_tasks();
    assert_eq!(fx.em.len(), 50);
    assert!(fx.em.all_tasks_live().iter().all(|t| t.status() == TaskStatus::Succeeded));
}
