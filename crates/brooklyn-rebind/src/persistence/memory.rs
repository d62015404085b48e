// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store, for tests and nodes that do not persist.

use parking_lot::RwLock;

use super::{Deletions, PersistenceStore};
use crate::error::Result;
use crate::memento::RawMementoData;

#[derive(Debug, Default)]
pub struct InMemoryPersistenceStore {
    data: RwLock<RawMementoData>,
}

impl InMemoryPersistenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(raw: RawMementoData) -> Self {
        Self {
            data: RwLock::new(raw),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> RawMementoData {
        self.data.read().clone()
    }
}

#[async_trait::async_trait]
impl PersistenceStore for InMemoryPersistenceStore {
    async fn load_raw(&self) -> Result<RawMementoData> {
        Ok(self.snapshot())
    }

    async fn checkpoint(&self, raw: &RawMementoData) -> Result<()> {
        *self.data.write() = raw.clone();
        Ok(())
    }

    async fn delete_many(&self, deletions: &Deletions) -> Result<()> {
        let mut data = self.data.write();
        for (object_type, ids) in deletions {
            let records = data.get_mut(*object_type);
            for id in ids {
                records.remove(id);
            }
        }
        Ok(())
    }
}
