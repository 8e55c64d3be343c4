//! Error types for the replay pipeline and the entity store.

use thiserror::Error;

/// Malformed or out-of-domain input to an ordered encoding or entity codec.
///
/// Fatal to the single record being processed; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("cannot encode negative number {0}")]
    NegativeNumber(String),

    #[error("truncated input: expected {expected} more byte(s)")]
    Truncated { expected: usize },

    #[error("field '{field}': {reason}")]
    Field { field: String, reason: String },

    #[error("expected {expected}, got {actual}")]
    UnexpectedType { expected: &'static str, actual: String },

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("{0}")]
    Malformed(String),
}

impl EncodingError {
    /// Scope an error to the named object field.
    pub fn in_field(self, field: &str) -> Self {
        match self {
            // Keep the innermost path readable: `outer.inner`.
            Self::Field { field: inner, reason } => Self::Field {
                field: format!("{field}.{inner}"),
                reason,
            },
            other => Self::Field {
                field: field.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Errors that can occur during ingestion, replay, and entity-store access.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Network or RPC hiccup that survived the provider's retry policy.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("chain inconsistency at block {block_number}: expected {expected}, got {actual}")]
    ChainInconsistency {
        block_number: u64,
        expected: String,
        actual: String,
    },

    #[error("unknown entity type '{0}'")]
    UnknownEntity(String),

    #[error("unknown index '{index}' on entity '{entity}'")]
    UnknownIndex { entity: String, index: String },

    #[error("reducer '{reducer}' failed: {reason}")]
    Reducer { reducer: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for an explicit "no such thing" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if ingestion must stop rather than skip the record.
    ///
    /// Storage and chain-consistency failures affect the checkpoint; an
    /// encoding failure or a missing auxiliary lookup only affects one record.
    pub fn halts_ingestion(&self) -> bool {
        !matches!(self, Self::Encoding(_) | Self::NotFound(_))
    }
}

impl From<serde_json::Error> for EncodingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_nest() {
        let err = EncodingError::Malformed("bad digit".into())
            .in_field("weight")
            .in_field("aggregates");
        assert_eq!(
            err,
            EncodingError::Field {
                field: "aggregates.weight".into(),
                reason: "bad digit".into()
            }
        );
    }

    #[test]
    fn classification() {
        assert!(IndexerError::Storage("disk".into()).halts_ingestion());
        assert!(!IndexerError::NotFound("0xabc".into()).halts_ingestion());
        assert!(!IndexerError::from(EncodingError::Malformed("x".into())).halts_ingestion());
        assert!(IndexerError::NotFound("x".into()).is_not_found());
    }
}
