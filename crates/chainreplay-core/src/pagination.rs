//! Cursor-based page assembly over index scans.

use futures::StreamExt;
use serde::Serialize;

use crate::cursor::Cursor;
use crate::entity::Entity;
use crate::error::IndexerError;
use crate::index_key::IndexKey;
use crate::reader::{take_while_prefix, IndexPosition, IndexScanArgs, Reader, ReaderExt};

/// A page request: `first` items, optionally resuming after a cursor string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub first: usize,
    pub after: Option<String>,
    pub index_key: Option<IndexKey>,
    /// Stop once entries no longer start with this key.
    pub prefix: Option<IndexKey>,
}

impl PageRequest {
    pub fn new(first: usize) -> Self {
        Self {
            first,
            ..Self::default()
        }
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    /// Start at `key` and stop when keys leave it.
    pub fn within_prefix(mut self, key: IndexKey) -> Self {
        self.index_key = Some(key.clone());
        self.prefix = Some(key);
        self
    }

    /// Start at `key` without bounding the scan.
    pub fn starting_at(mut self, key: IndexKey) -> Self {
        self.index_key = Some(key);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

/// One page of results in relay-connection shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|edge| &edge.node)
    }
}

/// Read one page of an entity index.
///
/// Fetches `first + 1` entries to learn whether another page exists. The
/// returned `end_cursor` resumes strictly after the last edge.
pub async fn drive_reader_by_index<E, R>(
    reader: &R,
    index: &str,
    request: PageRequest,
) -> Result<Connection<E>, IndexerError>
where
    E: Entity,
    R: Reader + ?Sized,
{
    let after = request
        .after
        .as_deref()
        .map(Cursor::decode)
        .transpose()?;
    let args = IndexScanArgs {
        index_key: request.index_key,
        after,
    };

    let mut scan = reader.entities_by_index::<E>(index, args);
    if let Some(prefix) = request.prefix {
        scan = take_while_prefix(scan, prefix);
    }

    let mut edges = Vec::with_capacity(request.first);
    let mut has_next_page = false;
    while let Some(item) = scan.next().await {
        let entry = item?;
        if edges.len() == request.first {
            has_next_page = true;
            break;
        }
        edges.push(Edge {
            cursor: entry.cursor().encode(),
            node: entry.value,
        });
    }

    let end_cursor = edges.last().map(|edge| edge.cursor.clone());
    tracing::trace!(
        entity = E::NAME,
        index,
        returned = edges.len(),
        has_next_page,
        "page assembled"
    );
    Ok(Connection {
        edges,
        page_info: PageInfo {
            has_next_page,
            end_cursor,
        },
    })
}
