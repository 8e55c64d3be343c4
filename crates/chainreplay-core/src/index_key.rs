//! Compound index keys built from ordered encodings.

use num_bigint::BigUint;

use crate::encoding;

/// An index key: a concatenation of self-delimiting, order-preserving components.
///
/// Scanning an index in byte order yields entries in component-tuple order,
/// so a key built from the leading components only is a valid scan prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(Vec<u8>);

impl IndexKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap bytes previously produced by an `IndexKey`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Append a natural number (ascending).
    pub fn natural(mut self, n: &BigUint) -> Self {
        encoding::write_natural(n, &mut self.0);
        self
    }

    /// Append a natural number that sorts largest-first.
    pub fn natural_descending(mut self, n: &BigUint) -> Self {
        self.0.extend(encoding::encode_natural_descending(n));
        self
    }

    pub fn u64(mut self, n: u64) -> Self {
        encoding::write_u64(n, &mut self.0);
        self
    }

    pub fn text(mut self, s: &str) -> Self {
        encoding::write_text(s, &mut self.0);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `prefix` is a component-wise prefix of this key.
    pub fn starts_with(&self, prefix: &IndexKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<Vec<u8>> for IndexKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Build a compound key from text components.
pub fn make_compound_key<S: AsRef<str>>(parts: &[S]) -> IndexKey {
    parts
        .iter()
        .fold(IndexKey::new(), |key, part| key.text(part.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_prefix_matches_only_whole_components() {
        let prefix = make_compound_key(&["7"]);
        let vote = make_compound_key(&["7"]).u64(5);
        let other = make_compound_key(&["70"]).u64(5);
        assert!(vote.starts_with(&prefix));
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn tuple_order_is_byte_order() {
        let a = IndexKey::new().text("7").u64(300);
        let b = IndexKey::new().text("7").u64(1_000);
        let c = IndexKey::new().text("8").u64(0);
        assert!(a < b && b < c);
    }

    #[test]
    fn descending_component() {
        let big = IndexKey::new().natural_descending(&BigUint::from(900u32));
        let small = IndexKey::new().natural_descending(&BigUint::from(10u32));
        assert!(big < small);
    }
}
