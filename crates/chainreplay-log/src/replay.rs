//! Replay merged reducer logs into an entity store.
//!
//! ```text
//! LogStore::read_forward(r₁..rₙ) ─► merge_ordered ─► group_by(block)
//!     ─► Reducer::reduce (per log, against PendingUpdates + store)
//!     ─► EntityStore::flush_updates every `flush_interval` blocks
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde_json::Value;

use chainreplay_core::{
    BlockIdentifier, Codec, Entity, EntityDefinitions, EntityStore, EntityWithMetadata,
    IndexerError, LogRecord, Reader,
};

use crate::merge::merge_ordered;
use crate::store::LogStore;
use crate::stream_utils::group_by;

/// Replay tuning.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Flush accumulated updates after this many blocks.
    pub flush_interval: u64,
    /// Skip records whose reducer returns a non-halting error
    /// (see [`IndexerError::halts_ingestion`]) instead of stopping.
    pub skip_bad_records: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            flush_interval: 1_000,
            skip_bad_records: true,
        }
    }
}

impl ReplayConfig {
    pub fn with_flush_interval(mut self, blocks: u64) -> Self {
        self.flush_interval = blocks.max(1);
        self
    }
}

// ─── Pending updates ─────────────────────────────────────────────────────────

/// Updates produced since the last flush, readable before they are flushed.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    entries: BTreeMap<(String, String), Value>,
}

impl PendingUpdates {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, key: &(String, String)) -> Option<&Value> {
        self.entries.get(key)
    }

    fn absorb(&mut self, staged: PendingUpdates) {
        self.entries.extend(staged.entries);
    }

    fn take(&mut self) -> Vec<EntityWithMetadata> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|((entity, id), value)| EntityWithMetadata { entity, id, value })
            .collect()
    }
}

/// What a reducer sees while handling one log.
///
/// Writes are staged per log and only join the pending batch once the
/// reducer returns `Ok`.
pub struct ReplayContext<'a> {
    reader: &'a dyn Reader,
    pending: &'a PendingUpdates,
    staged: PendingUpdates,
    block: BlockIdentifier,
}

impl<'a> ReplayContext<'a> {
    pub fn block(&self) -> &BlockIdentifier {
        &self.block
    }

    /// Read an entity, preferring unflushed updates over the store.
    pub async fn get<E: Entity>(&self, id: &str) -> Result<Option<E>, IndexerError> {
        let key = (E::NAME.to_string(), id.to_string());
        if let Some(value) = self.staged.get(&key).or_else(|| self.pending.get(&key)) {
            return Ok(Some(E::codec().deserialize(value)?));
        }
        match self.reader.get_entity(E::NAME, id).await? {
            Some(value) => Ok(Some(E::codec().deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Stage a write; the last write per `(entity, id)` wins at flush time.
    pub fn put<E: Entity>(&mut self, id: impl Into<String>, value: &E) -> Result<(), IndexerError> {
        let serialized = E::codec().serialize(value)?;
        self.staged
            .entries
            .insert((E::NAME.to_string(), id.into()), serialized);
        Ok(())
    }
}

/// Applies one reducer's logs to entity state.
#[async_trait]
pub trait Reducer: Send + Sync {
    /// Log file name in the [`LogStore`].
    fn name(&self) -> &str;

    async fn reduce(&self, log: &LogRecord, ctx: &mut ReplayContext<'_>) -> Result<(), IndexerError>;
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Totals for one replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub blocks: u64,
    pub logs: u64,
    pub skipped_logs: u64,
    pub flushes: u64,
    pub last_block: Option<BlockIdentifier>,
}

pub struct ReplayDriver<'a, S> {
    logs: &'a LogStore,
    store: &'a S,
    definitions: EntityDefinitions,
    reducers: Vec<Box<dyn Reducer>>,
    config: ReplayConfig,
}

impl<'a, S: EntityStore> ReplayDriver<'a, S> {
    pub fn new(logs: &'a LogStore, store: &'a S, definitions: EntityDefinitions) -> Self {
        Self {
            logs,
            store,
            definitions,
            reducers: Vec::new(),
            config: ReplayConfig::default(),
        }
    }

    pub fn with_reducer(mut self, reducer: impl Reducer + 'static) -> Self {
        self.reducers.push(Box::new(reducer));
        self
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    /// Replay every reducer log from the store's finalized block onward.
    pub async fn run(&self) -> Result<ReplaySummary, IndexerError> {
        let finalized = self.store.get_finalized_block().await?;
        let resume_after = finalized.as_ref().map(|b| b.block_number);
        tracing::info!(
            reducers = self.reducers.len(),
            resume_after = ?resume_after,
            "starting replay"
        );

        let sources = self
            .reducers
            .iter()
            .enumerate()
            .map(|(i, reducer)| {
                self.logs
                    .read_forward(reducer.name())
                    .map_ok(move |log| (i, log))
                    .boxed()
            })
            .collect();
        let merged = merge_ordered(sources, |a: &(usize, LogRecord), b: &(usize, LogRecord)| {
            LogRecord::compare_position(&a.1, &b.1)
        })
        .try_filter(move |(_, log)| {
            futures::future::ready(resume_after.map_or(true, |n| log.block_number > n))
        })
        .boxed();
        let mut blocks = group_by(merged, |(_, log): &(usize, LogRecord)| log.block_number);

        let mut summary = ReplaySummary::default();
        let mut pending = PendingUpdates::default();
        let mut unflushed_blocks = 0u64;
        let mut last_block: Option<BlockIdentifier> = None;

        while let Some(group) = blocks.next().await {
            let group = group?;
            let block = block_of(&group)?;

            for (source, log) in &group {
                let reducer = &self.reducers[*source];
                let mut ctx = ReplayContext {
                    reader: self.store,
                    pending: &pending,
                    staged: PendingUpdates::default(),
                    block: block.clone(),
                };
                let outcome = reducer.reduce(log, &mut ctx).await;
                let staged = ctx.staged;
                match outcome {
                    Ok(()) => {
                        pending.absorb(staged);
                        summary.logs += 1;
                    }
                    Err(e) if self.config.skip_bad_records && !e.halts_ingestion() => {
                        tracing::warn!(
                            reducer = reducer.name(),
                            position = %log.position(),
                            error = %e,
                            "skipping log"
                        );
                        summary.skipped_logs += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            summary.blocks += 1;
            unflushed_blocks += 1;
            if unflushed_blocks >= self.config.flush_interval {
                self.flush(&block, &mut pending).await?;
                summary.flushes += 1;
                unflushed_blocks = 0;
            }
            last_block = Some(block);
        }

        if unflushed_blocks > 0 {
            if let Some(block) = &last_block {
                self.flush(block, &mut pending).await?;
                summary.flushes += 1;
            }
        }

        summary.last_block = last_block;
        tracing::info!(
            blocks = summary.blocks,
            logs = summary.logs,
            skipped = summary.skipped_logs,
            flushes = summary.flushes,
            "replay finished"
        );
        Ok(summary)
    }

    async fn flush(&self, block: &BlockIdentifier, pending: &mut PendingUpdates) -> Result<(), IndexerError> {
        let updates = pending.take();
        tracing::debug!(block = %block, updates = updates.len(), "flushing");
        self.store
            .flush_updates(block, &self.definitions, updates)
            .await
    }
}

/// The block shared by one group of logs; all must agree on its hash.
fn block_of(group: &[(usize, LogRecord)]) -> Result<BlockIdentifier, IndexerError> {
    let Some((_, first)) = group.first() else {
        return Err(IndexerError::Other("empty block group".into()));
    };
    if let Some((_, other)) = group.iter().find(|(_, l)| l.block_hash != first.block_hash) {
        return Err(IndexerError::ChainInconsistency {
            block_number: first.block_number,
            expected: first.block_hash.clone(),
            actual: other.block_hash.clone(),
        });
    }
    Ok(first.block_identifier())
}
