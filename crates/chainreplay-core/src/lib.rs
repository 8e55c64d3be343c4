//! chainreplay-core: data model and contracts for the replay pipeline.
//!
//! # Architecture
//!
//! ```text
//! LogRecord stream ─► reducers ─► EntityWithMetadata updates
//!                                      │
//!                                      ▼
//!                      EntityStore::flush_updates (atomic + checkpoint)
//!                                      │
//!                 Reader ◄─────────────┘
//!                   ├── get_entity
//!                   ├── get_entities_by_index ─► drive_reader_by_index (pages)
//!                   └── get_finalized_block / get_latest_block
//! ```
//!
//! Index keys are built from order-preserving [`encoding`]s, so byte order of
//! keys is the order of the tuples they encode.

pub mod codec;
pub mod cursor;
pub mod encoding;
pub mod entity;
pub mod error;
pub mod index_key;
pub mod indexer;
pub mod pagination;
pub mod reader;
pub mod types;

pub use codec::Codec;
pub use cursor::Cursor;
pub use entity::{
    Entity, EntityDefinition, EntityDefinitions, EntityWithMetadata, IndexDefinition, IndexEntry,
    PreparedUpdate,
};
pub use error::{EncodingError, IndexerError};
pub use index_key::{make_compound_key, IndexKey};
pub use indexer::{combine_entities, IndexerDefinition};
pub use pagination::{drive_reader_by_index, Connection, Edge, PageInfo, PageRequest};
pub use reader::{
    exact_index_value, take_while_prefix, EntityStore, IndexPosition, IndexScanArgs, Indexed,
    IndexedValue, Reader, ReaderExt,
};
pub use types::{BlockIdentifier, LogPosition, LogRecord};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
