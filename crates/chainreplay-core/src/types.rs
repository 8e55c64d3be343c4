//! Shared chain types for the replay pipeline.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ─── BlockIdentifier ──────────────────────────────────────────────────────────

/// Identifies a block; used as the ingestion checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockIdentifier {
    /// Block hash (`0x…`).
    pub hash: String,
    /// Block number.
    pub block_number: u64,
}

impl BlockIdentifier {
    pub fn new(hash: impl Into<String>, block_number: u64) -> Self {
        Self {
            hash: hash.into(),
            block_number,
        }
    }

    /// Check that `self` identifies the block a child at `child_number`
    /// names as its parent through `child_parent_hash`.
    pub fn ensure_parent_of(
        &self,
        child_number: u64,
        child_parent_hash: &str,
    ) -> Result<(), IndexerError> {
        if self.block_number + 1 != child_number {
            return Err(IndexerError::ChainInconsistency {
                block_number: child_number,
                expected: format!("parent #{}", child_number.saturating_sub(1)),
                actual: format!("#{}", self.block_number),
            });
        }
        if !self.hash.eq_ignore_ascii_case(child_parent_hash) {
            return Err(IndexerError::ChainInconsistency {
                block_number: child_number,
                expected: self.hash.clone(),
                actual: child_parent_hash.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for BlockIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.block_number, self.hash)
    }
}

// ─── LogPosition ──────────────────────────────────────────────────────────────

/// Canonical total-order key of a log: `(block_number, transaction_index, log_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    pub block_number: u64,
    pub transaction_index: u32,
    pub log_index: u32,
}

impl LogPosition {
    pub fn new(block_number: u64, transaction_index: u32, log_index: u32) -> Self {
        Self {
            block_number,
            transaction_index,
            log_index,
        }
    }
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.block_number, self.transaction_index, self.log_index
        )
    }
}

// ─── LogRecord ────────────────────────────────────────────────────────────────

/// One raw chain event, as persisted in a reducer's log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub block_number: u64,
    pub block_hash: String,
    pub transaction_index: u32,
    pub transaction_hash: String,
    pub log_index: u32,
    /// Contract address that emitted the event.
    #[serde(default)]
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
}

impl LogRecord {
    pub fn position(&self) -> LogPosition {
        LogPosition::new(self.block_number, self.transaction_index, self.log_index)
    }

    /// The block this record was emitted in.
    pub fn block_identifier(&self) -> BlockIdentifier {
        BlockIdentifier::new(self.block_hash.clone(), self.block_number)
    }

    /// Comparator used by the log merger.
    pub fn compare_position(lhs: &LogRecord, rhs: &LogRecord) -> Ordering {
        lhs.position().cmp(&rhs.position())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(block: u64, tx: u32, log: u32) -> LogRecord {
        LogRecord {
            block_number: block,
            block_hash: format!("0x{block:x}"),
            transaction_index: tx,
            transaction_hash: "0x0".into(),
            log_index: log,
            address: "0x0".into(),
            topics: vec![],
            data: "0x".into(),
            removed: false,
        }
    }

    #[test]
    fn positions_order_by_tuple() {
        assert!(record(1, 5, 9).position() < record(2, 0, 0).position());
        assert!(record(2, 0, 9).position() < record(2, 1, 0).position());
        assert!(record(2, 1, 0).position() < record(2, 1, 1).position());
        assert_eq!(
            LogRecord::compare_position(&record(3, 1, 1), &record(3, 1, 1)),
            Ordering::Equal
        );
    }

    #[test]
    fn log_record_json_uses_camel_case() {
        let json = serde_json::to_value(record(10, 2, 3)).unwrap();
        assert_eq!(json["blockNumber"], 10);
        assert_eq!(json["transactionIndex"], 2);
        assert_eq!(json["logIndex"], 3);
        assert!(json.get("removed").is_none());

        let back: LogRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record(10, 2, 3));
    }

    #[test]
    fn block_identifier_json() {
        let id = BlockIdentifier::new("0x1", 10);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#"{"hash":"0x1","blockNumber":10}"#);
    }

    #[test]
    fn parent_check() {
        let parent = BlockIdentifier::new("0xaaa", 100);
        assert!(parent.ensure_parent_of(101, "0xAAA").is_ok());
        assert!(matches!(
            parent.ensure_parent_of(101, "0xbbb"),
            Err(IndexerError::ChainInconsistency { block_number: 101, .. })
        ));
        assert!(parent.ensure_parent_of(102, "0xaaa").is_err());
    }
}
