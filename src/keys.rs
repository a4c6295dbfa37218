//! Key and entry primitives shared by the WAL-independent paged tree.
//!
//! A `Key` compares by length first, then lexicographically; an `Entry` is
//! a tagged byte string distinguishing literal data from an overflow-chain
//! pointer. Both are thin wrappers over `Vec<u8>`/`&[u8]` — the tag is
//! invisible above the tree API.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::io::Cursor;

use crate::config::MAX_KEY_SIZE;

const ENTRY_TAG_DATA: u8 = 1;
const ENTRY_TAG_OVERFLOW: u8 = 2;

/// A byte-string key with length-then-lexicographic ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(pub Vec<u8>);

impl Key {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn valid(&self) -> bool {
        self.0.len() <= MAX_KEY_SIZE
    }

    pub fn compare(&self, other: &Key) -> Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

/// A tagged leaf value: either literal data or a pointer to an overflow chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Data(Vec<u8>),
    Overflow { head_page_id: u64 },
}

impl Entry {
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Entry::Data(bytes.into())
    }

    pub fn overflow(head_page_id: u64) -> Self {
        Entry::Overflow { head_page_id }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Entry::Data(_))
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, Entry::Overflow { .. })
    }

    /// Returns the literal bytes. Panics if this entry is an overflow pointer.
    pub fn as_data(&self) -> &[u8] {
        match self {
            Entry::Data(b) => b,
            Entry::Overflow { .. } => panic!("entry is an overflow pointer, not data"),
        }
    }

    /// Returns the head page id of the overflow chain. Panics if this entry is literal data.
    pub fn as_overflow_head(&self) -> u64 {
        match self {
            Entry::Overflow { head_page_id } => *head_page_id,
            Entry::Data(_) => panic!("entry is literal data, not an overflow pointer"),
        }
    }

    /// Serializes the tag plus payload, as stored in a leaf's entry area.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Entry::Data(bytes) => {
                let mut out = Vec::with_capacity(1 + bytes.len());
                out.push(ENTRY_TAG_DATA);
                out.extend_from_slice(bytes);
                out
            }
            Entry::Overflow { head_page_id } => {
                let mut out = Vec::with_capacity(9);
                out.push(ENTRY_TAG_OVERFLOW);
                out.write_u64::<BigEndian>(*head_page_id).expect("write to Vec cannot fail");
                out
            }
        }
    }

    /// Parses a tagged entry as stored on a leaf page.
    pub fn from_bytes(buf: &[u8]) -> Self {
        let tag = buf[0];
        match tag {
            ENTRY_TAG_DATA => Entry::Data(buf[1..].to_vec()),
            ENTRY_TAG_OVERFLOW => {
                let mut cursor = Cursor::new(&buf[1..9]);
                let head_page_id = cursor.read_u64::<BigEndian>().expect("entry buffer too short");
                Entry::Overflow { head_page_id }
            }
            other => panic!("unknown entry tag: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_compares_by_length_then_bytes() {
        assert_eq!(Key::from("a").compare(&Key::from("ab")), Ordering::Less);
        assert_eq!(Key::from("ab").compare(&Key::from("aa")), Ordering::Greater);
        assert_eq!(Key::from("key").compare(&Key::from("key")), Ordering::Equal);
    }

    #[test]
    fn key_validity_respects_max_key_size() {
        assert!(Key::new(vec![0u8; MAX_KEY_SIZE]).valid());
        assert!(!Key::new(vec![0u8; MAX_KEY_SIZE + 1]).valid());
    }

    #[test]
    fn entry_roundtrips_data() {
        let e = Entry::data(b"hello".to_vec());
        let bytes = e.to_bytes();
        let parsed = Entry::from_bytes(&bytes);
        assert_eq!(parsed, e);
        assert!(parsed.is_data());
        assert_eq!(parsed.as_data(), b"hello");
    }

    #[test]
    fn entry_roundtrips_overflow() {
        let e = Entry::overflow(42);
        let bytes = e.to_bytes();
        let parsed = Entry::from_bytes(&bytes);
        assert_eq!(parsed, e);
        assert!(parsed.is_overflow());
        assert_eq!(parsed.as_overflow_head(), 42);
    }

    #[test]
    #[should_panic]
    fn as_data_panics_on_overflow_entry() {
        Entry::overflow(1).as_data();
    }
}
