//! JSON-lines export and import of stored entities.
//!
//! One line per entity: `{"entityType": .., "id": .., "value": ..}`, in
//! `get_entities` order (entity type, then id).

use futures::TryStreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use chainreplay_core::{
    BlockIdentifier, EncodingError, EntityDefinitions, EntityStore, EntityWithMetadata,
    IndexerError, Reader,
};

/// Default number of entities per flush when importing.
pub const DEFAULT_IMPORT_BATCH: usize = 1_000;

fn io_error(e: std::io::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// Write every entity in `reader` to `out`. Returns the number of lines written.
pub async fn export_entities<R, W>(reader: &R, out: &mut W) -> Result<u64, IndexerError>
where
    R: Reader + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    let mut entities = reader.get_entities();
    let mut count = 0u64;
    while let Some(entity) = entities.try_next().await? {
        let mut line =
            serde_json::to_vec(&entity).map_err(|e| IndexerError::Storage(e.to_string()))?;
        line.push(b'\n');
        out.write_all(&line).await.map_err(io_error)?;
        count += 1;
    }
    out.flush().await.map_err(io_error)?;
    debug!(entities = count, "entities exported");
    Ok(count)
}

/// Load an export into `store`, flushing every `batch_size` entities at `block`.
///
/// Each line is validated against `definitions` before anything from its
/// batch is written; codec failures stay `IndexerError::Encoding`, scoped to
/// the offending line. Blank lines are skipped. Returns the number of entities imported.
pub async fn import_entities<S, I>(
    store: &S,
    definitions: &EntityDefinitions,
    block: &BlockIdentifier,
    input: I,
    batch_size: usize,
) -> Result<u64, IndexerError>
where
    S: EntityStore + ?Sized,
    I: AsyncBufRead + Unpin + Send,
{
    let batch_size = batch_size.max(1);
    let mut lines = input.lines();
    let mut batch = Vec::with_capacity(batch_size);
    let mut line_no = 0u64;
    let mut count = 0u64;

    while let Some(line) = lines.next_line().await.map_err(io_error)? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let at_line = |e: EncodingError| e.in_field(&format!("line {line_no}"));
        let entity: EntityWithMetadata = serde_json::from_str(&line)
            .map_err(|e| at_line(EncodingError::from(e)))?;
        definitions.prepare(&entity).map_err(|e| match e {
            IndexerError::Encoding(e) => IndexerError::Encoding(at_line(e)),
            other => other,
        })?;
        batch.push(entity);

        if batch.len() == batch_size {
            count += batch.len() as u64;
            store
                .flush_updates(block, definitions, std::mem::take(&mut batch))
                .await?;
        }
    }

    // Always flush once so the checkpoint lands even for an empty export.
    count += batch.len() as u64;
    store.flush_updates(block, definitions, batch).await?;

    info!(entities = count, block = %block, "entities imported");
    Ok(count)
}
