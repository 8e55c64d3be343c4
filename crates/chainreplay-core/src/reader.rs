//! Read and write contracts for entity stores.
//!
//! [`Reader`] is the object-safe, untyped surface every backend implements;
//! [`ReaderExt`] layers typed access on top through [`Entity`] codecs.
//! [`EntityStore`] adds the single-writer, atomic `flush_updates`.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use crate::codec::Codec;
use crate::cursor::Cursor;
use crate::entity::{Entity, EntityDefinitions, EntityWithMetadata};
use crate::error::IndexerError;
use crate::index_key::IndexKey;
use crate::types::BlockIdentifier;

// ─── Scan arguments & results ─────────────────────────────────────────────────

/// Where an index scan starts.
///
/// With `index_key` set the scan starts at the first entry whose key is
/// `>=` that key. With `after` set it starts strictly after that position.
/// When both are set, both constraints apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexScanArgs {
    pub index_key: Option<IndexKey>,
    pub after: Option<Cursor>,
}

impl IndexScanArgs {
    /// Scan the whole index.
    pub fn all() -> Self {
        Self::default()
    }

    /// Start at `key`.
    pub fn from_key(key: IndexKey) -> Self {
        Self {
            index_key: Some(key),
            after: None,
        }
    }

    /// Resume strictly after `cursor`.
    pub fn after(mut self, cursor: Cursor) -> Self {
        self.after = Some(cursor);
        self
    }
}

/// Start a scan at an exact key value.
///
/// The scan is not bounded: entries with larger keys follow, so callers
/// stop with [`take_while_prefix`] once the key no longer matches.
pub fn exact_index_value(key: IndexKey) -> IndexScanArgs {
    IndexScanArgs::from_key(key)
}

/// One index entry joined with its entity's stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedValue {
    pub index_key: IndexKey,
    pub id: String,
    pub value: Value,
}

/// A decoded index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Indexed<E> {
    pub index_key: IndexKey,
    pub id: String,
    pub value: E,
}

/// Anything positioned in an index.
pub trait IndexPosition {
    fn index_key(&self) -> &IndexKey;
    fn entity_id(&self) -> &str;

    fn cursor(&self) -> Cursor {
        Cursor::new(self.index_key().clone(), self.entity_id())
    }
}

impl IndexPosition for IndexedValue {
    fn index_key(&self) -> &IndexKey {
        &self.index_key
    }

    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl<E> IndexPosition for Indexed<E> {
    fn index_key(&self) -> &IndexKey {
        &self.index_key
    }

    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// End `stream` at the first entry whose key does not start with `prefix`.
///
/// Errors pass through unchanged.
pub fn take_while_prefix<'a, T>(
    stream: BoxStream<'a, Result<T, IndexerError>>,
    prefix: IndexKey,
) -> BoxStream<'a, Result<T, IndexerError>>
where
    T: IndexPosition + Send + 'a,
{
    stream
        .take_while(move |item| {
            let keep = match item {
                Ok(entry) => entry.index_key().starts_with(&prefix),
                Err(_) => true,
            };
            futures::future::ready(keep)
        })
        .boxed()
}

// ─── Reader ───────────────────────────────────────────────────────────────────

/// Read access to a snapshot of stored entities.
///
/// Implementations must be safe to share across tasks; an index scan observes
/// a single flushed state for its whole lifetime.
#[async_trait]
pub trait Reader: Send + Sync {
    /// The block of the last completed flush, or `None` for an empty store.
    async fn get_finalized_block(&self) -> Result<Option<BlockIdentifier>, IndexerError>;

    /// Cached view of the latest committed block; never blocks.
    fn get_latest_block(&self) -> Option<BlockIdentifier>;

    /// Stored value of one entity, or `None` if absent.
    async fn get_entity(&self, entity: &str, id: &str) -> Result<Option<Value>, IndexerError>;

    /// Stream an index in `(index key, id)` order.
    fn get_entities_by_index(
        &self,
        entity: &str,
        index: &str,
        args: IndexScanArgs,
    ) -> BoxStream<'_, Result<IndexedValue, IndexerError>>;

    /// Stream every stored entity, ordered by entity type then id.
    fn get_entities(&self) -> BoxStream<'_, Result<EntityWithMetadata, IndexerError>>;
}

/// Write access: the single writer applying one block's updates at a time.
#[async_trait]
pub trait EntityStore: Reader {
    /// Apply `updates` and advance the checkpoint to `block`, atomically.
    ///
    /// Later updates to the same `(entity, id)` replace earlier ones. On error
    /// no part of the batch and no checkpoint change becomes visible.
    async fn flush_updates(
        &self,
        block: &BlockIdentifier,
        definitions: &EntityDefinitions,
        updates: Vec<EntityWithMetadata>,
    ) -> Result<(), IndexerError>;
}

// ─── Typed access ─────────────────────────────────────────────────────────────

/// Typed helpers over any [`Reader`].
#[async_trait]
pub trait ReaderExt: Reader {
    /// Load and decode one entity.
    async fn entity<E: Entity>(&self, id: &str) -> Result<Option<E>, IndexerError> {
        match self.get_entity(E::NAME, id).await? {
            Some(value) => Ok(Some(E::codec().deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Stream a declared index of `E`, decoding each value.
    ///
    /// An index `E` does not declare yields a single `UnknownIndex` error.
    fn entities_by_index<E: Entity>(
        &self,
        index: &str,
        args: IndexScanArgs,
    ) -> BoxStream<'_, Result<Indexed<E>, IndexerError>> {
        if !E::indexes().iter().any(|def| def.name() == index) {
            let err = IndexerError::UnknownIndex {
                entity: E::NAME.to_string(),
                index: index.to_string(),
            };
            return stream::once(futures::future::ready(Err(err))).boxed();
        }

        let codec = E::codec();
        self.get_entities_by_index(E::NAME, index, args)
            .map(move |item| {
                let entry = item?;
                let value = codec.deserialize(&entry.value)?;
                Ok(Indexed {
                    index_key: entry.index_key,
                    id: entry.id,
                    value,
                })
            })
            .boxed()
    }
}

impl<R: Reader + ?Sized> ReaderExt for R {}

// ─── Tests ────────────────────────────────────────────────────────────────────
