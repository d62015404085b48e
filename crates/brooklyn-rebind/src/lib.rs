// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Brooklyn Rebind - Persistence Recovery for a Management Node
//!
//! A management node persists every entity, location, policy, enricher,
//! feed, catalog item and bundle it manages as a memento. After a restart or
//! a failover, "rebind" turns those mementos back into a live, managed object
//! graph without re-running business logic (no redeployments).
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────────────┐   load_raw    ┌──────────────────────────────────┐
//!  │  PersistenceStore  │──────────────►│         RebindIteration          │
//!  │  sqlite / memory   │◄──────────────│  1 manifest    5 adjuncts/proxies│
//!  └────────────────────┘  checkpoint   │  2 catalog     6 reconstruct     │
//!            ▲             delete       │  3 shells      7 attach adjuncts │
//!            │                          │  4 mementos    8 manage          │
//!            │                          └───┬──────────────┬───────────────┘
//!   ┌────────┴────────┐                     │              │ problems
//!   │  RebindManager  │ one pass at a time  │              ▼
//!   │  HA mode        │─────────────────────┘   ┌──────────────────────────┐
//!   └────────┬────────┘                         │ RebindExceptionHandler   │
//!            │                                  │ fail fast / at end /     │
//!            ▼                                  │ continue                 │
//!   ┌─────────────────────┐    on_unmanaged     └──────────────────────────┘
//!   │  ManagementContext  │──────────────────► brooklyn_tasks::GarbageCollector
//!   └─────────────────────┘
//! ```
//!
//! # Modes
//!
//! | Mode | Rebind | Adjuncts | Orphans | Checkpoints |
//! |------|--------|----------|---------|-------------|
//! | `master` | once at start, on promotion | attached and started | unmanaged and deleted | periodic |
//! | `hot_standby` | periodic, interruptible | associated only | dropped | none |
//! | `read_only` | periodic, interruptible | associated only | dropped | none |
//!
//! # Failure handling
//!
//! A problem with one object (corrupt memento, unknown type, failed
//! reconstruct hook) is reported to the [`exception_handler`], which decides
//! per problem class whether to abort at once, fail when the pass ends, or
//! carry on. Dangling references are substituted with placeholders by
//! default.
//!
//! # Configuration
//!
//! Environment variables, see [`config::Config::from_env`]:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BROOKLYN_PERSISTENCE_PATH` | `.data/brooklyn.db` |
//! | `BROOKLYN_HA_MODE` | `master` |
//! | `BROOKLYN_REBIND_FAILURE_MODE_*` | per problem class |
//! | `BROOKLYN_REBIND_LEGACY_CATALOG_SCAN` | `true` |
//! | `BROOKLYN_READ_ONLY_REBIND_PERIOD_SECS` | `5` |
//! | `BROOKLYN_PERSIST_PERIOD_SECS` | `1` |
//! | `BROOKLYN_GC_*` | see [`brooklyn_tasks::GcConfig`] |

/// Type registry, upgrades, constructors and bundles.
pub mod catalog;
/// Configuration from the environment.
pub mod config;
/// Per-pass object registry.
pub mod context;
/// Error types.
pub mod error;
/// Problem routing and failure modes.
pub mod exception_handler;
/// Type resolution and shell creation.
pub mod instantiator;
/// The eight-phase rebind pass.
pub mod iteration;
/// Reference resolution while loading mementos.
pub mod lookup;
/// Live object registries.
pub mod management;
/// HA modes and serialized rebind.
pub mod manager;
/// Persisted object records.
pub mod memento;
/// Live object model.
pub mod objects;
/// Memento stores.
pub mod persistence;
/// Embeddable node runtime.
pub mod runtime;
/// Memento parsing and serialization.
pub mod serializer;

pub use config::{Config, ConfigError, RebindConfig};
pub use context::RebindContext;
pub use error::{RebindError, RebindFailure, RebindProblem, Result};
pub use exception_handler::{
    DefaultRebindExceptionHandler, FailureMode, RebindExceptionHandler, RebindFailureModes,
};
pub use instantiator::BrooklynObjectInstantiator;
pub use iteration::{PhaseTransition, RebindIteration, RebindPhase, RebindReport};
pub use management::ManagementContext;
pub use manager::{RebindManager, RebindMode};
pub use memento::{BrooklynObjectType, Memento, RawMementoData};
pub use persistence::{InMemoryPersistenceStore, PersistenceStore, SqlitePersistenceStore};
pub use runtime::ManagementRuntime;
