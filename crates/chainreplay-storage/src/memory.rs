//! In-memory entity store.
//!
//! State lives behind an `Arc` that readers clone as a snapshot; a flush
//! validates the whole batch first and then applies it copy-on-write, so a
//! scan that is already running keeps seeing the state it started on.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use chainreplay_core::{
    BlockIdentifier, EntityDefinitions, EntityStore, EntityWithMetadata, IndexEntry, IndexKey,
    IndexScanArgs, IndexedValue, IndexerError, PreparedUpdate, Reader,
};

type EntityKey = (String, String);
type IndexName = (String, String);
type IndexPos = (IndexKey, String);

#[derive(Debug, Clone)]
struct StoredEntity {
    value: Value,
    index_entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Default)]
struct State {
    entities: BTreeMap<EntityKey, StoredEntity>,
    indexes: BTreeMap<IndexName, BTreeSet<IndexPos>>,
    checkpoint: Option<BlockIdentifier>,
}

impl State {
    fn apply(&mut self, update: PreparedUpdate) {
        let key = (update.entity, update.id);
        if let Some(old) = self.entities.remove(&key) {
            for entry in old.index_entries {
                let slot = (key.0.clone(), entry.index.to_string());
                if let Some(set) = self.indexes.get_mut(&slot) {
                    set.remove(&(entry.key, key.1.clone()));
                }
            }
        }
        for entry in &update.index_entries {
            self.indexes
                .entry((key.0.clone(), entry.index.to_string()))
                .or_default()
                .insert((entry.key.clone(), key.1.clone()));
        }
        self.entities.insert(
            key,
            StoredEntity {
                value: update.value,
                index_entries: update.index_entries,
            },
        );
    }
}

/// In-memory [`EntityStore`]; nothing survives the process.
#[derive(Default)]
pub struct MemoryEntityStore {
    state: RwLock<Arc<State>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Result<Arc<State>, IndexerError> {
        self.state
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.snapshot().map(|s| s.entities.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where the next scan step starts.
fn scan_start(args: &IndexScanArgs) -> Bound<IndexPos> {
    let from_key = args
        .index_key
        .clone()
        .map(|key| Bound::Included((key, String::new())));
    match (&args.after, from_key) {
        (Some(after), Some(Bound::Included((key, _)))) if after.index_key < key => {
            Bound::Included((key, String::new()))
        }
        (Some(after), _) => Bound::Excluded((after.index_key.clone(), after.id.clone())),
        (None, Some(bound)) => bound,
        (None, None) => Bound::Unbounded,
    }
}

#[async_trait]
impl Reader for MemoryEntityStore {
    async fn get_finalized_block(&self) -> Result<Option<BlockIdentifier>, IndexerError> {
        Ok(self.snapshot()?.checkpoint.clone())
    }

    fn get_latest_block(&self) -> Option<BlockIdentifier> {
        self.snapshot().ok().and_then(|s| s.checkpoint.clone())
    }

    async fn get_entity(&self, entity: &str, id: &str) -> Result<Option<Value>, IndexerError> {
        let state = self.snapshot()?;
        Ok(state
            .entities
            .get(&(entity.to_string(), id.to_string()))
            .map(|stored| stored.value.clone()))
    }

    fn get_entities_by_index(
        &self,
        entity: &str,
        index: &str,
        args: IndexScanArgs,
    ) -> BoxStream<'_, Result<IndexedValue, IndexerError>> {
        let state = match self.snapshot() {
            Ok(state) => state,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let slot = (entity.to_string(), index.to_string());
        let start = scan_start(&args);

        stream::unfold(Some(start), move |bound| {
            let state = Arc::clone(&state);
            let slot = slot.clone();
            async move {
                let bound = bound?;
                let positions = state.indexes.get(&slot)?;
                let (key, id) = positions.range((bound, Bound::Unbounded)).next()?.clone();
                let value = match state.entities.get(&(slot.0.clone(), id.clone())) {
                    Some(stored) => stored.value.clone(),
                    None => {
                        let err = IndexerError::Storage(format!(
                            "index {}.{} points at missing entity {id}",
                            slot.0, slot.1
                        ));
                        return Some((Err(err), None));
                    }
                };
                let next = Bound::Excluded((key.clone(), id.clone()));
                Some((
                    Ok(IndexedValue {
                        index_key: key,
                        id,
                        value,
                    }),
                    Some(next),
                ))
            }
        })
        .boxed()
    }

    fn get_entities(&self) -> BoxStream<'_, Result<EntityWithMetadata, IndexerError>> {
        let state = match self.snapshot() {
            Ok(state) => state,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        stream::unfold(Bound::Unbounded, move |bound: Bound<EntityKey>| {
            let state = Arc::clone(&state);
            async move {
                let ((entity, id), stored) = state.entities.range((bound, Bound::Unbounded)).next()?;
                let next = Bound::Excluded((entity.clone(), id.clone()));
                Some((
                    Ok(EntityWithMetadata {
                        entity: entity.clone(),
                        id: id.clone(),
                        value: stored.value.clone(),
                    }),
                    next,
                ))
            }
        })
        .boxed()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn flush_updates(
        &self,
        block: &BlockIdentifier,
        definitions: &EntityDefinitions,
        updates: Vec<EntityWithMetadata>,
    ) -> Result<(), IndexerError> {
        // Validate everything before touching shared state.
        let prepared = updates
            .iter()
            .map(|update| definitions.prepare(update))
            .collect::<Result<Vec<_>, _>>()?;

        let mut guard = self
            .state
            .write()
            .map_err(|_| IndexerError::Storage("memory store lock poisoned".into()))?;
        let state = Arc::make_mut(&mut guard);
        let count = prepared.len();
        for update in prepared {
            state.apply(update);
        }
        state.checkpoint = Some(block.clone());

        tracing::debug!(block = %block, updates = count, "memory store flushed");
        Ok(())
    }
}
