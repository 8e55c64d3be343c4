//! chainreplay-log: durable reducer logs and their ordered replay.
//!
//! # Architecture
//!
//! ```text
//! ingestion ─► LogStore::append(reducer)        logs/<reducer>.json
//!                                               logs/<reducer>.index.json
//! replay    ─► load_merged_logs / ReplayDriver
//!                ├── merge_ordered (OrderedHeap, one buffered log per file)
//!                ├── group_by block
//!                └── EntityStore::flush_updates
//! ```

pub mod heap;
pub mod merge;
pub mod replay;
pub mod store;
pub mod stream_utils;

use futures::stream::BoxStream;

use chainreplay_core::{IndexerError, LogRecord};

pub use heap::OrderedHeap;
pub use merge::merge_ordered;
pub use replay::{PendingUpdates, Reducer, ReplayConfig, ReplayContext, ReplayDriver, ReplaySummary};
pub use store::LogStore;

/// All reducers' logs as one stream ordered by
/// `(block_number, transaction_index, log_index)`.
pub fn load_merged_logs<S: AsRef<str>>(
    store: &LogStore,
    reducers: &[S],
) -> BoxStream<'static, Result<LogRecord, IndexerError>> {
    let sources = reducers
        .iter()
        .map(|reducer| store.read_forward(reducer.as_ref()))
        .collect();
    merge_ordered(sources, LogRecord::compare_position)
}
