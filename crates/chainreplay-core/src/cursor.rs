//! Opaque pagination cursors over index positions.

use std::fmt;

use crate::encoding;
use crate::error::EncodingError;
use crate::index_key::IndexKey;

/// A position in one index: `(index key, entity id)`.
///
/// Orders the same way index scans do. The string form is hex and carries
/// no meaning for clients beyond "resume after here".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    pub index_key: IndexKey,
    pub id: String,
}

impl Cursor {
    pub fn new(index_key: IndexKey, id: impl Into<String>) -> Self {
        Self {
            index_key,
            id: id.into(),
        }
    }

    pub fn encode(&self) -> String {
        let key = self.index_key.as_bytes();
        let mut bytes = encoding::encode_u64(key.len() as u64);
        bytes.extend_from_slice(key);
        bytes.extend_from_slice(self.id.as_bytes());
        hex::encode(bytes)
    }

    pub fn decode(raw: &str) -> Result<Self, EncodingError> {
        let invalid = |reason: String| EncodingError::InvalidCursor(format!("'{raw}': {reason}"));

        let bytes = hex::decode(raw).map_err(|e| invalid(e.to_string()))?;
        let (len, rest) = encoding::decode_natural(&bytes).map_err(|e| invalid(e.to_string()))?;
        let len = usize::try_from(&len).map_err(|_| invalid("key length overflow".into()))?;
        if rest.len() < len {
            return Err(invalid(format!("key needs {len} bytes, {} left", rest.len())));
        }
        let (key, id) = rest.split_at(len);
        let id = std::str::from_utf8(id).map_err(|e| invalid(e.to_string()))?;
        Ok(Self::new(IndexKey::from_bytes(key.to_vec()), id))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for Cursor {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
