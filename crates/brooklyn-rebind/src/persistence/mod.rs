// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable storage of mementos.
//!
//! Stores hold [`RawMementoData`]: per object type, `id -> serialized text`.
//! Parsing is left to [`crate::serializer`] so a corrupt record only affects
//! its own object.

pub mod memory;
pub mod sqlite;

pub use self::memory::InMemoryPersistenceStore;
pub use self::sqlite::SqlitePersistenceStore;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::memento::{BrooklynObjectType, RawMementoData};

/// Record ids to remove, per object type.
pub type Deletions = BTreeMap<BrooklynObjectType, Vec<String>>;

/// Backing store for persisted mementos.
#[async_trait::async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Read everything persisted.
    async fn load_raw(&self) -> Result<RawMementoData>;

    /// Replace the persisted state with `raw`, atomically.
    async fn checkpoint(&self, raw: &RawMementoData) -> Result<()>;

    /// Remove the given objects.
    async fn delete(&self, object_type: BrooklynObjectType, ids: &[String]) -> Result<()> {
        self.delete_many(&Deletions::from([(object_type, ids.to_vec())])).await
    }

    /// Remove objects of several types, atomically.
    async fn delete_many(&self, deletions: &Deletions) -> Result<()>;
}
