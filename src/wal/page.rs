//! A single fixed-size WAL page: a CRC32-protected header plus a sequence
//! of self-describing segments.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::errors::WalError;

pub const PAGE_SIZE: usize = 8192;
const HEADER_SIZE: usize = 64;
const PAYLOAD_SIZE: usize = PAGE_SIZE - HEADER_SIZE;
const SEGMENT_META_SIZE: usize = 1 + 4 + 4;

/// Kind of a record fragment stored in one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Full = 1,
    End = 2,
    Middle = 3,
}

impl SegmentKind {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(SegmentKind::Full),
            2 => Some(SegmentKind::End),
            3 => Some(SegmentKind::Middle),
            _ => None,
        }
    }
}

/// How much of the record remains to be written after this segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// The entire record fit in this segment.
    Full,
    /// This is the final fragment of a multi-segment record.
    End,
    /// `n` more bytes of the record follow in later segments.
    Middle(u32),
}

impl Remaining {
    fn kind(self) -> SegmentKind {
        match self {
            Remaining::Full => SegmentKind::Full,
            Remaining::End => SegmentKind::End,
            Remaining::Middle(_) => SegmentKind::Middle,
        }
    }

    fn wire_value(self) -> u32 {
        match self {
            Remaining::Full | Remaining::End => 0,
            Remaining::Middle(n) => n,
        }
    }
}

/// A borrowed view over one segment's framing and payload.
#[derive(Debug, Clone, Copy)]
pub struct SegmentView<'a> {
    pub kind: SegmentKind,
    pub remaining: u32,
    pub bytes: &'a [u8],
}

/// One 8192-byte WAL page: header plus appended segments.
pub struct Page {
    buf: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Creates a fresh, empty page of the given type/version.
    pub fn new(page_type: u16, version: u16) -> Self {
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        {
            let mut w = Cursor::new(&mut buf[4..HEADER_SIZE]);
            w.write_u16::<BigEndian>(page_type).unwrap();
            w.write_u16::<BigEndian>(version).unwrap();
            w.write_u32::<BigEndian>(0).unwrap(); // head
        }
        let mut page = Page { buf };
        page.recompute_checksum();
        page
    }

    pub fn head(&self) -> u32 {
        (&self.buf[8..12]).read_u32::<BigEndian>().unwrap()
    }

    fn set_head(&mut self, head: u32) {
        (&mut self.buf[8..12]).write_u32::<BigEndian>(head).unwrap();
    }

    pub fn page_type(&self) -> u16 {
        (&self.buf[4..6]).read_u16::<BigEndian>().unwrap()
    }

    pub fn version(&self) -> u16 {
        (&self.buf[6..8]).read_u16::<BigEndian>().unwrap()
    }

    pub fn checksum(&self) -> u32 {
        (&self.buf[0..4]).read_u32::<BigEndian>().unwrap()
    }

    /// True iff a segment framing `n` payload bytes would still fit.
    pub fn has_space(&self, n: usize) -> bool {
        self.head() as usize + SEGMENT_META_SIZE + n <= PAYLOAD_SIZE
    }

    /// Payload bytes available for the next segment's data, after its framing.
    pub fn available(&self) -> usize {
        PAYLOAD_SIZE.saturating_sub(self.head() as usize).saturating_sub(SEGMENT_META_SIZE)
    }

    /// Appends one segment. Returns the number of payload bytes written,
    /// which is always `bytes.len()` unless that would overflow the page
    /// (checked via `has_space` by the caller; an oversized write is a
    /// logic error in the caller, hence the panic rather than a partial
    /// write).
    pub fn write(&mut self, bytes: &[u8], remaining: Remaining) -> Result<usize, WalError> {
        if !self.has_space(bytes.len()) {
            return Err(WalError::TooLarge(bytes.len()));
        }
        let head = self.head() as usize;
        let offset = HEADER_SIZE + head;
        {
            let mut w = Cursor::new(&mut self.buf[offset..offset + SEGMENT_META_SIZE]);
            w.write_u8(remaining.kind() as u8).unwrap();
            w.write_u32::<BigEndian>(bytes.len() as u32).unwrap();
            w.write_u32::<BigEndian>(remaining.wire_value()).unwrap();
        }
        let data_off = offset + SEGMENT_META_SIZE;
        self.buf[data_off..data_off + bytes.len()].copy_from_slice(bytes);
        self.set_head((head + SEGMENT_META_SIZE + bytes.len()) as u32);
        self.recompute_checksum();
        Ok(bytes.len())
    }

    fn recompute_checksum(&mut self) {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.buf[4..PAGE_SIZE]);
        let crc = hasher.finalize();
        (&mut self.buf[0..4]).write_u32::<BigEndian>(crc).unwrap();
    }

    /// Parses and validates a page read from disk.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, WalError> {
        if buf.len() != PAGE_SIZE {
            return Err(WalError::BufferTooSmall { expected: PAGE_SIZE, actual: buf.len() });
        }
        let mut owned = Box::new([0u8; PAGE_SIZE]);
        owned.copy_from_slice(buf);
        let page = Page { buf: owned };
        let expected = page.checksum();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&page.buf[4..PAGE_SIZE]);
        if hasher.finalize() != expected {
            return Err(WalError::ChecksumMismatch);
        }
        Ok(page)
    }

    /// Returns the 8192-byte on-disk image.
    pub fn pack(&self) -> &[u8; PAGE_SIZE] {
        &self.buf
    }

    /// Iterates the segments stored so far, in order.
    pub fn segments(&self) -> SegmentIter<'_> {
        SegmentIter { page: self, offset: 0, head: self.head() as usize }
    }
}

pub struct SegmentIter<'a> {
    page: &'a Page,
    offset: usize,
    head: usize,
}

impl<'a> Iterator for SegmentIter<'a> {
    type Item = SegmentView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.head {
            return None;
        }
        if self.offset + SEGMENT_META_SIZE > PAYLOAD_SIZE {
            return None;
        }
        let base = HEADER_SIZE + self.offset;
        let kind = SegmentKind::from_u8(self.page.buf[base])?;
        let len = (&self.page.buf[base + 1..base + 5]).read_u32::<BigEndian>().ok()? as usize;
        let remaining = (&self.page.buf[base + 5..base + 9]).read_u32::<BigEndian>().ok()?;
        let data_off = base + SEGMENT_META_SIZE;
        if data_off + len > HEADER_SIZE + PAYLOAD_SIZE {
            return None;
        }
        let bytes = &self.page.buf[data_off..data_off + len];
        self.offset += SEGMENT_META_SIZE + len;
        Some(SegmentView { kind, remaining, bytes })
    }
}

pub fn payload_size() -> usize {
    PAYLOAD_SIZE
}

pub fn segment_meta_size() -> usize {
    SEGMENT_META_SIZE
}
