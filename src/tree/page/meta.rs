//! Meta page (always page id 0): version, root pointer, free-map pointer.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{Page, PageType};

const VERSION_OFF: usize = 0;
const ROOT_OFF: usize = 8;
const FREE_MAP_OFF: usize = 16;

pub(super) fn init(page: &mut Page) {
    set_version(page, 1);
    set_root(page, 0);
    set_free_map(page, 0);
}

fn field(page: &Page, off: usize) -> u64 {
    page.expect_type(PageType::Meta);
    (&page.payload()[off..off + 8]).read_u64::<BigEndian>().unwrap()
}

fn set_field(page: &mut Page, off: usize, v: u64) {
    page.expect_type(PageType::Meta);
    (&mut page.payload_mut()[off..off + 8]).write_u64::<BigEndian>(v).unwrap();
}

pub fn version(page: &Page) -> u64 {
    field(page, VERSION_OFF)
}

pub fn set_version(page: &mut Page, v: u64) {
    set_field(page, VERSION_OFF, v)
}

pub fn root(page: &Page) -> u64 {
    field(page, ROOT_OFF)
}

pub fn set_root(page: &mut Page, v: u64) {
    set_field(page, ROOT_OFF, v)
}

pub fn free_map(page: &Page) -> u64 {
    field(page, FREE_MAP_OFF)
}

pub fn set_free_map(page: &mut Page, v: u64) {
    set_field(page, FREE_MAP_OFF, v)
}
