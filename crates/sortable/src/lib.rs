//! Sortable vectors: a per-document tuple of typed values extracted from
//! sortable fields, compared across shards to produce a single cross-shard
//! sort order. Strings are stored Unicode-folded so comparison never
//! depends on locale.

use caseless::Caseless;

/// `RS_SORTABLES_MAX`: the largest number of sortable fields one document
/// may carry.
pub const SORTABLES_MAX: usize = 1024;

const TAG_NIL: u32 = 0;
const TAG_NUMBER: u32 = 1;
const TAG_STRING: u32 = 3;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SortableError {
    #[error("sorting vector length {0} exceeds the maximum of {}", SORTABLES_MAX)]
    TooLong(usize),
    #[error("index {index} out of bounds for a vector of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("truncated sorting vector buffer")]
    Truncated,
    #[error("unrecognized value tag {0}")]
    UnknownTag(u32),
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
}

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum SortableValue {
    Null,
    Number(f64),
    String(String),
}

/// Folds a string to its case-insensitive, locale-independent form for
/// storage: every codepoint is replaced by its Unicode default case fold
/// mapping, or copied through unchanged when no mapping exists.
pub fn fold(s: &str) -> String {
    s.chars().default_case_fold().collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortingVector(Vec<SortableValue>);

impl SortingVector {
    /// A vector of `len` `Null` entries, the shape a fresh document starts
    /// with before any sortable field is populated.
    pub fn new(len: usize) -> Result<Self, SortableError> {
        if len > SORTABLES_MAX {
            return Err(SortableError::TooLong(len));
        }
        Ok(SortingVector(vec![SortableValue::Null; len]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&SortableValue> {
        self.0.get(idx)
    }

    /// Stores a number at `idx`, overwriting whatever was there.
    pub fn put_number(&mut self, idx: usize, value: f64) -> Result<(), SortableError> {
        self.put(idx, SortableValue::Number(value))
    }

    /// Stores a string at `idx`. `already_folded` skips the fold pass for
    /// callers that already normalized the input (mirrors the `unf` flag
    /// on the source vector's put operation).
    pub fn put_string(&mut self, idx: usize, value: &str, already_folded: bool) -> Result<(), SortableError> {
        let stored = if already_folded { value.to_string() } else { fold(value) };
        self.put(idx, SortableValue::String(stored))
    }

    pub fn put(&mut self, idx: usize, value: SortableValue) -> Result<(), SortableError> {
        let len = self.0.len();
        let slot = self
            .0
            .get_mut(idx)
            .ok_or(SortableError::IndexOutOfBounds { index: idx, len })?;
        *slot = value;
        Ok(())
    }

    /// Serializes as `[len:u32][tag:u32][payload]...`, matching the
    /// on-disk layout: a number's payload is its 8 little-endian bytes, a
    /// string's payload is a length-prefixed buffer (the stored length
    /// includes a trailing NUL, dropped on load), and `Nil` carries no
    /// payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.0.len() as u32).to_le_bytes());
        for value in &self.0 {
            match value {
                SortableValue::Null => buf.extend_from_slice(&TAG_NIL.to_le_bytes()),
                SortableValue::Number(n) => {
                    buf.extend_from_slice(&TAG_NUMBER.to_le_bytes());
                    buf.extend_from_slice(&n.to_le_bytes());
                }
                SortableValue::String(s) => {
                    buf.extend_from_slice(&TAG_STRING.to_le_bytes());
                    let with_nul_len = s.len() as u32 + 1;
                    buf.extend_from_slice(&with_nul_len.to_le_bytes());
                    buf.extend_from_slice(s.as_bytes());
                    buf.push(0);
                }
            }
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SortableError> {
        let mut cursor = Cursor::new(bytes);
        let len = cursor.read_u32()? as usize;
        if len > SORTABLES_MAX {
            return Err(SortableError::TooLong(len));
        }
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            let tag = cursor.read_u32()?;
            let value = match tag {
                TAG_NIL => SortableValue::Null,
                TAG_NUMBER => SortableValue::Number(cursor.read_f64()?),
                TAG_STRING => {
                    let with_nul_len = cursor.read_u32()? as usize;
                    let mut raw = cursor.read_bytes(with_nul_len)?.to_vec();
                    // Defensive: force the last byte to NUL regardless of
                    // what was actually stored, then trim it off.
                    if let Some(last) = raw.last_mut() {
                        *last = 0;
                    }
                    raw.pop();
                    SortableValue::String(String::from_utf8(raw).map_err(|_| SortableError::InvalidUtf8)?)
                }
                other => return Err(SortableError::UnknownTag(other)),
            };
            values.push(value);
        }
        Ok(SortingVector(values))
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], SortableError> {
        let end = self.pos.checked_add(n).ok_or(SortableError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(SortableError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, SortableError> {
        let slice = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(slice.try_into().unwrap()))
    }

    fn read_f64(&mut self) -> Result<f64, SortableError> {
        let slice = self.read_bytes(8)?;
        Ok(f64::from_le_bytes(slice.try_into().unwrap()))
    }
}

/// Orders two sortable values the way a cross-shard merge sort needs to:
/// numbers compare numerically, strings compare by their folded bytes,
/// `Null` sorts before everything, and mismatched types fall back to a
/// stable (but arbitrary) type-rank ordering rather than panicking.
pub fn compare(a: &SortableValue, b: &SortableValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    use SortableValue::*;
    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (Number(x), Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (String(x), String(y)) => x.cmp(y),
        (Number(_), String(_)) => Ordering::Less,
        (String(_), Number(_)) => Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_every_value_kind() {
        let mut v = SortingVector::new(3).unwrap();
        v.put_number(0, 3.25).unwrap();
        v.put_string(1, "Straße", false).unwrap();
        // index 2 left Null

        let encoded = v.encode();
        let decoded = SortingVector::decode(&encoded).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn fold_is_case_and_locale_independent() {
        assert_eq!(fold("STRASSE"), "strasse");
        assert_eq!(fold("Straße"), "strasse");
    }

    #[test]
    fn new_rejects_vectors_over_the_max() {
        assert_eq!(
            SortingVector::new(SORTABLES_MAX + 1),
            Err(SortableError::TooLong(SORTABLES_MAX + 1))
        );
    }

    #[test]
    fn put_rejects_out_of_bounds_index() {
        let mut v = SortingVector::new(1).unwrap();
        assert_eq!(
            v.put_number(5, 1.0),
            Err(SortableError::IndexOutOfBounds { index: 5, len: 1 })
        );
    }

    #[test]
    fn decode_rejects_truncated_buffers() {
        assert_eq!(SortingVector::decode(&[1, 0]), Err(SortableError::Truncated));
    }

    #[test]
    fn null_sorts_before_numbers_and_strings() {
        assert_eq!(
            compare(&SortableValue::Null, &SortableValue::Number(0.0)),
            std::cmp::Ordering::Less
        );
    }
}
