//! Order-preserving binary encodings for index keys.
//!
//! Every encoding here has two properties:
//!
//! - **monotone**: byte-wise lexicographic order of the encodings equals the
//!   natural order of the encoded values;
//! - **self-delimiting**: no encoding is a prefix of another, so encodings can
//!   be concatenated into compound keys without separators.
//!
//! # Natural numbers
//!
//! ```text
//! | length header | magnitude (big-endian, no leading zero bytes) |
//! ```
//!
//! The header is the magnitude's byte length `L`. When `L < 0xFF` it is the
//! single byte `L`; otherwise it is `0xFF` followed by the natural-number
//! encoding of `L` itself. Numbers with fewer magnitude bytes therefore sort
//! first, and numbers of equal length compare by their big-endian bytes.
//! Zero has an empty magnitude and encodes to `[0x00]`.
//!
//! # Text
//!
//! UTF-8 bytes with `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x00`.
//! The terminator sorts below any continuation, so `"a" < "ab"`.

use num_bigint::{BigInt, BigUint, Sign};

use crate::error::EncodingError;

const LONG_LENGTH_MARKER: u8 = 0xFF;
const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x00;

// ─── Natural numbers ──────────────────────────────────────────────────────────

/// Encode a natural number.
pub fn encode_natural(n: &BigUint) -> Vec<u8> {
    let mut out = Vec::new();
    write_natural(n, &mut out);
    out
}

/// Encode a natural number onto the end of `out`.
pub fn write_natural(n: &BigUint, out: &mut Vec<u8>) {
    let magnitude = if n.bits() == 0 {
        Vec::new()
    } else {
        n.to_bytes_be()
    };
    write_magnitude(&magnitude, out);
}

/// Encode a `u64`; identical to `encode_natural` of the same value.
pub fn encode_u64(n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_u64(n, &mut out);
    out
}

/// Encode a `u64` onto the end of `out`.
pub fn write_u64(n: u64, out: &mut Vec<u8>) {
    let bytes = n.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    write_magnitude(&bytes[first..], out);
}

/// Encode a signed integer, rejecting negative values.
pub fn encode_integer(n: &BigInt) -> Result<Vec<u8>, EncodingError> {
    if n.sign() == Sign::Minus {
        return Err(EncodingError::NegativeNumber(n.to_string()));
    }
    Ok(encode_natural(n.magnitude()))
}

/// Encode a natural number so that larger values sort first.
pub fn encode_natural_descending(n: &BigUint) -> Vec<u8> {
    let mut out = encode_natural(n);
    invert(&mut out);
    out
}

fn write_magnitude(magnitude: &[u8], out: &mut Vec<u8>) {
    write_length(magnitude.len(), out);
    out.extend_from_slice(magnitude);
}

fn write_length(len: usize, out: &mut Vec<u8>) {
    if len < LONG_LENGTH_MARKER as usize {
        out.push(len as u8);
    } else {
        out.push(LONG_LENGTH_MARKER);
        write_u64(len as u64, out);
    }
}

/// Decode one natural number from the front of `bytes`, returning the rest.
pub fn decode_natural(bytes: &[u8]) -> Result<(BigUint, &[u8]), EncodingError> {
    let (len, rest) = read_length(bytes)?;
    if rest.len() < len {
        return Err(EncodingError::Truncated {
            expected: len - rest.len(),
        });
    }
    let (magnitude, rest) = rest.split_at(len);
    if magnitude.first() == Some(&0) {
        return Err(EncodingError::Malformed(
            "non-canonical number: leading zero byte".into(),
        ));
    }
    Ok((BigUint::from_bytes_be(magnitude), rest))
}

/// Decode one descending-encoded natural number from the front of `bytes`.
pub fn decode_natural_descending(bytes: &[u8]) -> Result<(BigUint, &[u8]), EncodingError> {
    let mut restored = bytes.to_vec();
    invert(&mut restored);
    let (value, rest) = decode_natural(&restored)?;
    let consumed = restored.len() - rest.len();
    Ok((value, &bytes[consumed..]))
}

fn read_length(bytes: &[u8]) -> Result<(usize, &[u8]), EncodingError> {
    match bytes.split_first() {
        None => Err(EncodingError::Truncated { expected: 1 }),
        Some((&LONG_LENGTH_MARKER, rest)) => {
            // A long length is itself a short-form natural: one header byte, then its magnitude.
            let (&width, rest) = rest
                .split_first()
                .ok_or(EncodingError::Truncated { expected: 1 })?;
            if width == LONG_LENGTH_MARKER {
                return Err(EncodingError::Malformed("nested long length header".into()));
            }
            let width = width as usize;
            if rest.len() < width {
                return Err(EncodingError::Truncated {
                    expected: width - rest.len(),
                });
            }
            let (magnitude, rest) = rest.split_at(width);
            let len = BigUint::from_bytes_be(magnitude);
            let len = usize::try_from(&len)
                .map_err(|_| EncodingError::Malformed(format!("length {len} too large")))?;
            if len < LONG_LENGTH_MARKER as usize {
                return Err(EncodingError::Malformed(format!(
                    "non-canonical long length {len}"
                )));
            }
            Ok((len, rest))
        }
        Some((&len, rest)) => Ok((len as usize, rest)),
    }
}

fn invert(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = !*b;
    }
}

// ─── Text ─────────────────────────────────────────────────────────────────────

/// Encode a string as an escaped, terminated key component.
pub fn encode_text(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 2);
    write_text(s, &mut out);
    out
}

/// Encode a string onto the end of `out`.
pub fn write_text(s: &str, out: &mut Vec<u8>) {
    for &b in s.as_bytes() {
        if b == ESCAPE {
            out.extend_from_slice(&[ESCAPE, ESCAPED_ZERO]);
        } else {
            out.push(b);
        }
    }
    out.extend_from_slice(&[ESCAPE, TERMINATOR]);
}

/// Decode one text component from the front of `bytes`, returning the rest.
pub fn decode_text(bytes: &[u8]) -> Result<(String, &[u8]), EncodingError> {
    let mut raw = Vec::new();
    let mut i = 0;
    loop {
        match bytes.get(i) {
            None => return Err(EncodingError::Truncated { expected: 2 }),
            Some(&ESCAPE) => match bytes.get(i + 1) {
                Some(&TERMINATOR) => break,
                Some(&ESCAPED_ZERO) => {
                    raw.push(0);
                    i += 2;
                }
                Some(other) => {
                    return Err(EncodingError::Malformed(format!(
                        "invalid escape sequence 0x00 0x{other:02x}"
                    )))
                }
                None => return Err(EncodingError::Truncated { expected: 1 }),
            },
            Some(&b) => {
                raw.push(b);
                i += 1;
            }
        }
    }
    let text = String::from_utf8(raw).map_err(|e| EncodingError::Malformed(e.to_string()))?;
    Ok((text, &bytes[i + 2..]))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
