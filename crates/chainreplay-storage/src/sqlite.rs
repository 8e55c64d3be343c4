//! SQLite entity store.
//!
//! Entities, their index entries and the checkpoint live in one SQLite file;
//! each flush is a single transaction. Uses `sqlx` with WAL mode so scans
//! read a consistent snapshot while the writer commits.
//!
//! # Usage
//! ```rust,no_run
//! use chainreplay_storage::sqlite::SqliteEntityStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteEntityStore::open("./entities.db").await?;
//!
//! // Scratch database, deleted on drop (tests / ephemeral)
//! let store = SqliteEntityStore::temporary().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::RwLock;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use chainreplay_core::{
    BlockIdentifier, EntityDefinitions, EntityStore, EntityWithMetadata, IndexKey, IndexScanArgs,
    IndexedValue, IndexerError, Reader,
};

const CHECKPOINT_KEY: &str = "latest";

const SCAN_SQL: &str = "SELECT i.index_key, i.id, e.value
     FROM entity_indexes i
     JOIN entities e ON e.entity = i.entity AND e.id = i.id
     WHERE i.entity = ? AND i.index_name = ? AND i.index_key >= ?
     ORDER BY i.index_key, i.id";

const SCAN_AFTER_SQL: &str = "SELECT i.index_key, i.id, e.value
     FROM entity_indexes i
     JOIN entities e ON e.entity = i.entity AND e.id = i.id
     WHERE i.entity = ? AND i.index_name = ? AND i.index_key >= ?
       AND (i.index_key, i.id) > (?, ?)
     ORDER BY i.index_key, i.id";

fn storage(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

fn parse_value(raw: &str) -> Result<Value, IndexerError> {
    serde_json::from_str(raw).map_err(|e| IndexerError::Storage(format!("corrupt stored value: {e}")))
}

/// SQLite-backed [`EntityStore`].
pub struct SqliteEntityStore {
    pool: SqlitePool,
    /// Serializes flushes.
    writer: Mutex<()>,
    /// Last committed checkpoint, for the synchronous accessor.
    latest: RwLock<Option<BlockIdentifier>>,
    /// Backing directory of a [`temporary`](Self::temporary) store.
    _scratch: Option<tempfile::TempDir>,
}

impl SqliteEntityStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./entities.db"`) or a full
    /// SQLite URL (`"sqlite:./entities.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage)?;
        Self::from_pool(pool).await
    }

    /// Open a private database in a fresh temporary directory.
    ///
    /// Behaves like a file-backed store (WAL, pooled connections) and is
    /// deleted when the store is dropped.
    pub async fn temporary() -> Result<Self, IndexerError> {
        let dir = tempfile::tempdir().map_err(|e| IndexerError::Storage(e.to_string()))?;
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("entities.db").display());
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .map_err(storage)?;
        let mut store = Self::from_pool(pool).await?;
        store._scratch = Some(dir);
        Ok(store)
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, IndexerError> {
        let store = Self {
            pool,
            writer: Mutex::new(()),
            latest: RwLock::new(None),
            _scratch: None,
        };
        store.init_schema().await?;
        let checkpoint = store.load_checkpoint().await?;
        store.set_latest(checkpoint);
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (
                entity TEXT NOT NULL,
                id     TEXT NOT NULL,
                value  TEXT NOT NULL,
                PRIMARY KEY (entity, id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entity_indexes (
                entity     TEXT NOT NULL,
                index_name TEXT NOT NULL,
                index_key  BLOB NOT NULL,
                id         TEXT NOT NULL,
                PRIMARY KEY (entity, index_name, index_key, id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        // Lookup of an entity's own entries when it is overwritten.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entity_indexes_owner ON entity_indexes (entity, id);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoint (
                key          TEXT    PRIMARY KEY,
                block_number INTEGER NOT NULL,
                block_hash   TEXT    NOT NULL,
                updated_at   INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn load_checkpoint(&self) -> Result<Option<BlockIdentifier>, IndexerError> {
        let row = sqlx::query("SELECT block_number, block_hash FROM checkpoint WHERE key = ?")
            .bind(CHECKPOINT_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| {
            BlockIdentifier::new(
                r.get::<String, _>("block_hash"),
                r.get::<i64, _>("block_number") as u64,
            )
        }))
    }

    fn set_latest(&self, block: Option<BlockIdentifier>) {
        match self.latest.write() {
            Ok(mut latest) => *latest = block,
            Err(poisoned) => *poisoned.into_inner() = block,
        }
    }

    /// Number of stored entities.
    pub async fn entity_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM entities")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }
}

fn indexed_value(row: SqliteRow) -> Result<IndexedValue, IndexerError> {
    let key: Vec<u8> = row.try_get("index_key").map_err(storage)?;
    let id: String = row.try_get("id").map_err(storage)?;
    let raw: String = row.try_get("value").map_err(storage)?;
    Ok(IndexedValue {
        index_key: IndexKey::from_bytes(key),
        id,
        value: parse_value(&raw)?,
    })
}

fn entity_row(row: SqliteRow) -> Result<EntityWithMetadata, IndexerError> {
    let raw: String = row.try_get("value").map_err(storage)?;
    Ok(EntityWithMetadata {
        entity: row.try_get("entity").map_err(storage)?,
        id: row.try_get("id").map_err(storage)?,
        value: parse_value(&raw)?,
    })
}

// ─── Reader ──────────────────────────────────────────────────────────────────

#[async_trait]
impl Reader for SqliteEntityStore {
    async fn get_finalized_block(&self) -> Result<Option<BlockIdentifier>, IndexerError> {
        self.load_checkpoint().await
    }

    fn get_latest_block(&self) -> Option<BlockIdentifier> {
        match self.latest.read() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn get_entity(&self, entity: &str, id: &str) -> Result<Option<Value>, IndexerError> {
        let row = sqlx::query("SELECT value FROM entities WHERE entity = ? AND id = ?")
            .bind(entity)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(|r| parse_value(&r.get::<String, _>("value")))
            .transpose()
    }

    fn get_entities_by_index(
        &self,
        entity: &str,
        index: &str,
        args: IndexScanArgs,
    ) -> BoxStream<'_, Result<IndexedValue, IndexerError>> {
        let from_key = args.index_key.map(IndexKey::into_bytes).unwrap_or_default();
        let query = match args.after {
            Some(after) => sqlx::query(SCAN_AFTER_SQL)
                .bind(entity.to_string())
                .bind(index.to_string())
                .bind(from_key)
                .bind(after.index_key.into_bytes())
                .bind(after.id),
            None => sqlx::query(SCAN_SQL)
                .bind(entity.to_string())
                .bind(index.to_string())
                .bind(from_key),
        };
        query
            .fetch(&self.pool)
            .map(|row| indexed_value(row.map_err(storage)?))
            .boxed()
    }

    fn get_entities(&self) -> BoxStream<'_, Result<EntityWithMetadata, IndexerError>> {
        sqlx::query("SELECT entity, id, value FROM entities ORDER BY entity, id")
            .fetch(&self.pool)
            .map(|row| entity_row(row.map_err(storage)?))
            .boxed()
    }
}

// ─── EntityStore ─────────────────────────────────────────────────────────────

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn flush_updates(
        &self,
        block: &BlockIdentifier,
        definitions: &EntityDefinitions,
        updates: Vec<EntityWithMetadata>,
    ) -> Result<(), IndexerError> {
        let _writer = self.writer.lock().await;
        // Dropping `tx` without commit rolls every statement back.
        let mut tx = self.pool.begin().await.map_err(storage)?;

        for update in &updates {
            let prepared = definitions.prepare(update)?;
            let value = serde_json::to_string(&prepared.value)
                .map_err(|e| IndexerError::Storage(e.to_string()))?;

            sqlx::query("DELETE FROM entity_indexes WHERE entity = ? AND id = ?")
                .bind(&prepared.entity)
                .bind(&prepared.id)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;

            sqlx::query("INSERT OR REPLACE INTO entities (entity, id, value) VALUES (?, ?, ?)")
                .bind(&prepared.entity)
                .bind(&prepared.id)
                .bind(&value)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;

            for entry in &prepared.index_entries {
                sqlx::query(
                    "INSERT OR IGNORE INTO entity_indexes (entity, index_name, index_key, id)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&prepared.entity)
                .bind(entry.index)
                .bind(entry.key.as_bytes())
                .bind(&prepared.id)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            }
        }

        sqlx::query(
            "INSERT OR REPLACE INTO checkpoint (key, block_number, block_hash, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(CHECKPOINT_KEY)
        .bind(block.block_number as i64)
        .bind(&block.hash)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        self.set_latest(Some(block.clone()));

        debug!(block = %block, updates = updates.len(), "sqlite store flushed");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
