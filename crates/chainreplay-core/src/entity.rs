//! Entity definitions: codec + index definitions per entity type.
//!
//! Each stored entity type is a Rust type implementing [`Entity`]. The
//! [`EntityDefinitions`] registry erases those types so storage backends can
//! validate values and derive index entries from the stored JSON form.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Codec;
use crate::error::{EncodingError, IndexerError};
use crate::index_key::IndexKey;

/// A stored entity type.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Entity type tag (e.g. `"Vote"`); primary-key namespace in the store.
    const NAME: &'static str;

    type Codec: Codec<Value = Self> + Default + 'static;

    /// Secondary indexes maintained for this entity.
    fn indexes() -> Vec<IndexDefinition<Self>> {
        Vec::new()
    }

    fn codec() -> Self::Codec {
        Self::Codec::default()
    }
}

type KeyFn<E> = dyn Fn(&E) -> Result<Vec<IndexKey>, EncodingError> + Send + Sync;

/// Derives zero or more index keys from an entity value.
pub struct IndexDefinition<E> {
    name: &'static str,
    keys: Arc<KeyFn<E>>,
}

impl<E: 'static> IndexDefinition<E> {
    /// An index with exactly one key per entity.
    pub fn new<F>(name: &'static str, key: F) -> Self
    where
        F: Fn(&E) -> Result<IndexKey, EncodingError> + Send + Sync + 'static,
    {
        let keys: Arc<KeyFn<E>> = Arc::new(move |e: &E| key(e).map(|k| vec![k]));
        Self { name, keys }
    }

    /// An index that may place one entity under several keys (or none).
    pub fn multi<F>(name: &'static str, keys: F) -> Self
    where
        F: Fn(&E) -> Result<Vec<IndexKey>, EncodingError> + Send + Sync + 'static,
    {
        Self {
            name,
            keys: Arc::new(keys),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn keys(&self, entity: &E) -> Result<Vec<IndexKey>, EncodingError> {
        (self.keys)(entity)
    }
}

impl<E> Clone for IndexDefinition<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            keys: Arc::clone(&self.keys),
        }
    }
}

// ─── Stored form ──────────────────────────────────────────────────────────────

/// An entity value in stored (serialized) form, tagged with its type and id.
///
/// Also the line format of bulk exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityWithMetadata {
    #[serde(rename = "entityType")]
    pub entity: String,
    pub id: String,
    pub value: Value,
}

impl EntityWithMetadata {
    /// Serialize a typed entity with its codec.
    pub fn new<E: Entity>(id: impl Into<String>, value: &E) -> Result<Self, EncodingError> {
        Ok(Self {
            entity: E::NAME.to_string(),
            id: id.into(),
            value: E::codec().serialize(value)?,
        })
    }

    /// Decode the stored value as `E`.
    pub fn decode<E: Entity>(&self) -> Result<E, EncodingError> {
        E::codec().deserialize(&self.value)
    }
}

/// One entry an entity contributes to a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub index: &'static str,
    pub key: IndexKey,
}

/// An update that passed codec validation, with its derived index entries.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedUpdate {
    pub entity: String,
    pub id: String,
    pub value: Value,
    pub index_entries: Vec<IndexEntry>,
}

// ─── Type-erased definition ──────────────────────────────────────────────────

type PrepareFn = dyn Fn(&Value) -> Result<(Value, Vec<IndexEntry>), EncodingError> + Send + Sync;

/// Type-erased codec + index bundle for one entity type.
#[derive(Clone)]
pub struct EntityDefinition {
    name: &'static str,
    type_name: &'static str,
    index_names: Vec<&'static str>,
    prepare: Arc<PrepareFn>,
}

impl EntityDefinition {
    pub fn of<E: Entity>() -> Self {
        let indexes = E::indexes();
        let index_names = indexes.iter().map(IndexDefinition::name).collect();
        let prepare = move |serialized: &Value| -> Result<(Value, Vec<IndexEntry>), EncodingError> {
            let codec = E::codec();
            let value = codec.deserialize(serialized)?;
            let mut entries = Vec::new();
            for index in &indexes {
                let keys = index
                    .keys(&value)
                    .map_err(|e| e.in_field(&format!("index {}", index.name())))?;
                entries.extend(keys.into_iter().map(|key| IndexEntry {
                    index: index.name(),
                    key,
                }));
            }
            Ok((codec.serialize(&value)?, entries))
        };
        Self {
            name: E::NAME,
            type_name: std::any::type_name::<E>(),
            index_names,
            prepare: Arc::new(prepare),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn index_names(&self) -> &[&'static str] {
        &self.index_names
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.index_names.iter().any(|n| *n == index)
    }

    /// Round-trip a stored value through the codec and derive its index entries.
    ///
    /// The returned value is the codec's canonical form of the input.
    pub fn prepare(&self, serialized: &Value) -> Result<(Value, Vec<IndexEntry>), EncodingError> {
        (self.prepare)(serialized)
    }
}

impl std::fmt::Debug for EntityDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDefinition")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("indexes", &self.index_names)
            .finish()
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────

/// The closed set of entity types a pipeline stores.
#[derive(Debug, Clone, Default)]
pub struct EntityDefinitions {
    by_name: BTreeMap<&'static str, EntityDefinition>,
}

impl EntityDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `E` (builder style).
    pub fn with<E: Entity>(mut self) -> Self {
        self.register::<E>();
        self
    }

    pub fn register<E: Entity>(&mut self) {
        self.by_name.insert(E::NAME, EntityDefinition::of::<E>());
    }

    pub fn get(&self, entity: &str) -> Option<&EntityDefinition> {
        self.by_name.get(entity)
    }

    pub fn require(&self, entity: &str) -> Result<&EntityDefinition, IndexerError> {
        self.get(entity)
            .ok_or_else(|| IndexerError::UnknownEntity(entity.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_name.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Merge `other` into `self`.
    ///
    /// The same tag registered by two different Rust types is rejected.
    pub fn merge(&mut self, other: &EntityDefinitions) -> Result<(), IndexerError> {
        for (name, def) in &other.by_name {
            if let Some(existing) = self.by_name.get(name) {
                if existing.type_name != def.type_name {
                    return Err(IndexerError::Other(format!(
                        "entity '{name}' defined twice: {} and {}",
                        existing.type_name, def.type_name
                    )));
                }
                continue;
            }
            self.by_name.insert(name, def.clone());
        }
        Ok(())
    }

    /// Validate an update against its definition and derive its index entries.
    pub fn prepare(&self, update: &EntityWithMetadata) -> Result<PreparedUpdate, IndexerError> {
        let definition = self.require(&update.entity)?;
        let (value, index_entries) = definition.prepare(&update.value)?;
        Ok(PreparedUpdate {
            entity: update.entity.clone(),
            id: update.id.clone(),
            value,
            index_entries,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
