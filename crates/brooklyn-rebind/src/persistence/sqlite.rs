// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed memento store.

use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::debug;

use super::{Deletions, PersistenceStore};
use crate::error::Result;
use crate::memento::{BrooklynObjectType, RawMementoData};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Memento store in a single `mementos` table.
#[derive(Clone)]
pub struct SqlitePersistenceStore {
    pool: SqlitePool,
}

impl SqlitePersistenceStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// ```ignore
    /// let store = SqlitePersistenceStore::from_path(".data/brooklyn.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    /// Run the store's migrations on `pool`.
    pub async fn migrate(pool: &SqlitePool) -> Result<()> {
        MIGRATOR.run(pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl PersistenceStore for SqlitePersistenceStore {
    async fn load_raw(&self) -> Result<RawMementoData> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT object_type, id, data FROM mementos ORDER BY object_type, id")
                .fetch_all(&self.pool)
                .await?;

        let mut raw = RawMementoData::default();
        for (object_type, id, data) in rows {
            match BrooklynObjectType::parse(&object_type) {
                Some(t) => {
                    raw.get_mut(t).insert(id, data);
                }
                None => debug!(object_type = %object_type, id = %id, "Skipping row of unknown type"),
            }
        }
        Ok(raw)
    }

    async fn checkpoint(&self, raw: &RawMementoData) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM mementos").execute(&mut *tx).await?;
        for object_type in BrooklynObjectType::ALL {
            for (id, data) in raw.get(object_type) {
                sqlx::query(
                    r#"
                    INSERT INTO mementos (object_type, id, data, updated_at)
                    VALUES (?, ?, ?, CURRENT_TIMESTAMP)
                    "#,
                )
                .bind(object_type.as_str())
                .bind(id)
                .bind(data)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!(records = raw.len(), "Checkpointed mementos");
        Ok(())
    }

    async fn delete_many(&self, deletions: &Deletions) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (object_type, ids) in deletions {
            for id in ids {
                sqlx::query("DELETE FROM mementos WHERE object_type = ? AND id = ?")
                    .bind(object_type.as_str())
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
