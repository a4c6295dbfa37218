//! Overflow page: one link in the singly-linked chain storing a value too
//! large for a leaf slot.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{Page, PageType, PAYLOAD_SIZE};

const NEXT_OFF: usize = 0;
const LEN_OFF: usize = 8;
const PREFIX_SIZE: usize = 12;
pub const DATA_SIZE: usize = PAYLOAD_SIZE - PREFIX_SIZE;

pub(super) fn init(page: &mut Page) {
    set_next(page, 0);
    set_len(page, 0);
}

fn check(page: &Page) {
    page.expect_type(PageType::Overflow);
}

pub fn next(page: &Page) -> u64 {
    check(page);
    (&page.payload()[NEXT_OFF..NEXT_OFF + 8]).read_u64::<BigEndian>().unwrap()
}

pub fn set_next(page: &mut Page, v: u64) {
    page.expect_type(PageType::Overflow);
    (&mut page.payload_mut()[NEXT_OFF..NEXT_OFF + 8]).write_u64::<BigEndian>(v).unwrap();
}

pub fn len(page: &Page) -> u32 {
    check(page);
    (&page.payload()[LEN_OFF..LEN_OFF + 4]).read_u32::<BigEndian>().unwrap()
}

fn set_len(page: &mut Page, v: u32) {
    page.expect_type(PageType::Overflow);
    (&mut page.payload_mut()[LEN_OFF..LEN_OFF + 4]).write_u32::<BigEndian>(v).unwrap();
}

/// Writes up to `DATA_SIZE` bytes into this page's data area. Panics if
/// `bytes` is larger (the chain-builder never calls this with an
/// oversized chunk).
pub fn write(page: &mut Page, bytes: &[u8]) {
    check(page);
    assert!(bytes.len() <= DATA_SIZE, "overflow chunk exceeds page capacity");
    let prefix = PREFIX_SIZE;
    page.payload_mut()[prefix..prefix + bytes.len()].copy_from_slice(bytes);
    set_len(page, bytes.len() as u32);
}

/// Returns this page's `data[0..len]`.
pub fn data(page: &Page) -> &[u8] {
    check(page);
    let prefix = PREFIX_SIZE;
    let len = len(page) as usize;
    &page.payload()[prefix..prefix + len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_read_back_chunk() {
        let mut page = Page::new(1, 0, PageType::Overflow);
        write(&mut page, b"chunk-of-data");
        assert_eq!(data(&page), b"chunk-of-data");
        assert_eq!(next(&page), 0);
    }

    #[test]
    fn next_pointer_roundtrips() {
        let mut page = Page::new(1, 0, PageType::Overflow);
        set_next(&mut page, 42);
        assert_eq!(next(&page), 42);
    }
}
