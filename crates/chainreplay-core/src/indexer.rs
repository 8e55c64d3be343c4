//! Indexer definitions and entity-registry composition.

use crate::entity::EntityDefinitions;
use crate::error::IndexerError;

/// A named reducer and the entity types it writes.
///
/// The name doubles as the reducer's log file name in the log store.
#[derive(Debug, Clone)]
pub struct IndexerDefinition {
    pub name: String,
    pub entities: EntityDefinitions,
}

impl IndexerDefinition {
    pub fn new(name: impl Into<String>, entities: EntityDefinitions) -> Self {
        Self {
            name: name.into(),
            entities,
        }
    }
}

/// Merge the entity definitions of several indexers into one registry.
///
/// Two indexers may share an entity type; two different types claiming the
/// same entity name are rejected.
pub fn combine_entities(indexers: &[IndexerDefinition]) -> Result<EntityDefinitions, IndexerError> {
    let mut combined = EntityDefinitions::new();
    for indexer in indexers {
        combined.merge(&indexer.entities).map_err(|e| {
            IndexerError::Other(format!("combining indexer '{}': {e}", indexer.name))
        })?;
    }
    tracing::debug!(
        indexers = indexers.len(),
        entities = combined.len(),
        "combined entity definitions"
    );
    Ok(combined)
}
