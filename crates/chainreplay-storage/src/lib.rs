//! chainreplay-storage: entity store backends.
//!
//! # Backends
//!
//! | Backend | Feature | Persistence |
//! |---------|---------|-------------|
//! | [`MemoryEntityStore`] | `memory` (default) | none |
//! | [`sqlite::SqliteEntityStore`] | `sqlite` | file or in-memory SQLite |
//!
//! Both implement [`chainreplay_core::EntityStore`]: a flush is atomic, index
//! scans run in `(index key, id)` order over a single committed state, and the
//! checkpoint records the block of the last flush.
//!
//! [`export`] moves a store's contents to and from JSON lines.

pub mod export;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use export::{export_entities, import_entities, DEFAULT_IMPORT_BATCH};
pub use memory::MemoryEntityStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEntityStore;
