//! Leaf page: slotted key/value store with insert-fused split
//! (`move_and_place`). Ordering within a leaf is insertion order, not
//! sorted; `find` is therefore a linear scan (bounded by `max_degree`).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{Page, PageType, PAYLOAD_SIZE};
use crate::config::MAX_DEGREE;
use crate::errors::PageError;
use crate::keys::{Entry, Key};

const LEFT_OFF: usize = 0;
const RIGHT_OFF: usize = 8;
const COUNT_OFF: usize = 16;
const PREFIX_SIZE: usize = 24;
pub const DATA_SIZE: usize = PAYLOAD_SIZE - PREFIX_SIZE;

pub(super) fn init(page: &mut Page) {
    set_left(page, 0);
    set_right(page, 0);
    set_count(page, 0);
    page.set_head(0);
    page.set_tail(0);
}

fn check(page: &Page) {
    page.expect_type(PageType::Leaf);
}

pub fn left(page: &Page) -> u64 {
    check(page);
    (&page.payload()[LEFT_OFF..LEFT_OFF + 8]).read_u64::<BigEndian>().unwrap()
}

pub fn set_left(page: &mut Page, v: u64) {
    page.expect_type(PageType::Leaf);
    (&mut page.payload_mut()[LEFT_OFF..LEFT_OFF + 8]).write_u64::<BigEndian>(v).unwrap();
}

pub fn right(page: &Page) -> u64 {
    check(page);
    (&page.payload()[RIGHT_OFF..RIGHT_OFF + 8]).read_u64::<BigEndian>().unwrap()
}

pub fn set_right(page: &mut Page, v: u64) {
    page.expect_type(PageType::Leaf);
    (&mut page.payload_mut()[RIGHT_OFF..RIGHT_OFF + 8]).write_u64::<BigEndian>(v).unwrap();
}

pub fn count(page: &Page) -> u64 {
    check(page);
    (&page.payload()[COUNT_OFF..COUNT_OFF + 8]).read_u64::<BigEndian>().unwrap()
}

fn set_count(page: &mut Page, v: u64) {
    page.expect_type(PageType::Leaf);
    (&mut page.payload_mut()[COUNT_OFF..COUNT_OFF + 8]).write_u64::<BigEndian>(v).unwrap();
}

fn data(page: &Page) -> &[u8] {
    &page.payload()[PREFIX_SIZE..]
}

fn data_mut(page: &mut Page) -> &mut [u8] {
    &mut page.payload_mut()[PREFIX_SIZE..]
}

/// All (key, raw tagged-entry bytes) pairs, in insertion order.
pub fn slots(page: &Page) -> Vec<(Vec<u8>, Vec<u8>)> {
    check(page);
    let data = data(page);
    let head = page.head() as usize;
    let tail = page.tail() as usize;

    let mut keys = Vec::new();
    let mut off = 0;
    while off < head {
        let klen = (&data[off..off + 2]).read_u16::<BigEndian>().unwrap() as usize;
        let kstart = off + 2;
        keys.push(data[kstart..kstart + klen].to_vec());
        off = kstart + klen;
    }

    let mut entries = Vec::new();
    let mut pos = DATA_SIZE;
    let floor = DATA_SIZE - tail;
    while pos > floor {
        let len = (&data[pos - 4..pos]).read_u32::<BigEndian>().unwrap() as usize;
        let start = pos - 4 - len;
        entries.push(data[start..pos - 4].to_vec());
        pos = start;
    }

    keys.into_iter().zip(entries).collect()
}

fn slot_space(klen: usize, elen: usize) -> usize {
    (2 + klen) + (elen + 4)
}

fn fits(page: &Page, klen: usize, elen: usize) -> bool {
    let used = page.head() as usize + page.tail() as usize;
    count(page) < MAX_DEGREE as u64 && used + slot_space(klen, elen) <= DATA_SIZE
}

/// Appends one (key, entry) pair without checking for an existing key.
fn append(page: &mut Page, k: &[u8], e: &[u8]) -> Result<(), PageError> {
    if !fits(page, k.len(), e.len()) {
        return Err(PageError::NotEnoughSpace);
    }
    let head = page.head() as usize;
    let tail = page.tail() as usize;
    {
        let data = data_mut(page);
        (&mut data[head..head + 2]).write_u16::<BigEndian>(k.len() as u16).unwrap();
        data[head + 2..head + 2 + k.len()].copy_from_slice(k);

        let new_tail = tail + e.len() + 4;
        let start = DATA_SIZE - new_tail;
        data[start..start + e.len()].copy_from_slice(e);
        (&mut data[start + e.len()..start + e.len() + 4]).write_u32::<BigEndian>(e.len() as u32).unwrap();
    }
    page.set_head((head + 2 + k.len()) as u32);
    page.set_tail((tail + e.len() + 4) as u32);
    set_count(page, count(page) + 1);
    Ok(())
}

/// Clears the page and rewrites it from `pairs`, in the given order.
fn rewrite(page: &mut Page, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<(), PageError> {
    page.set_head(0);
    page.set_tail(0);
    set_count(page, 0);
    for (k, e) in pairs {
        append(page, k, e)?;
    }
    Ok(())
}

/// Inserts a new key/entry. Fails with `NotEnoughSpace` if the page (or
/// `max_degree`) would be exceeded.
pub fn insert(page: &mut Page, k: &Key, e: &Entry) -> Result<(), PageError> {
    check(page);
    assert!(k.valid(), "key exceeds max_key_size ({} bytes)", crate::config::MAX_KEY_SIZE);
    append(page, k.as_bytes(), &e.to_bytes())
}

/// Linear scan for `k`. O(n), n <= max_degree: slots are kept in insertion
/// order, not sorted, by design.
pub fn find(page: &Page, k: &Key) -> Option<Entry> {
    check(page);
    slots(page).into_iter().find(|(kk, _)| kk == k.as_bytes()).map(|(_, e)| Entry::from_bytes(&e))
}

/// Replaces the entry for an existing key.
pub fn update(page: &mut Page, k: &Key, e: &Entry) -> Result<(), PageError> {
    check(page);
    let mut pairs = slots(page);
    let idx = pairs.iter().position(|(kk, _)| kk == k.as_bytes());
    match idx {
        Some(i) => {
            let last = pairs.len() - 1;
            pairs.swap(i, last);
            pairs.pop();
        }
        None => return Err(PageError::NotEnoughSpace), // caller should have checked presence
    }
    let mut new_pairs = Vec::with_capacity(pairs.len() + 1);
    new_pairs.push((k.as_bytes().to_vec(), e.to_bytes()));
    new_pairs.extend(pairs);
    rewrite(page, &new_pairs)
}

/// Removes a key. No-op (returns `Ok`) treatment of absence is the
/// caller's responsibility (the tree checks presence beforehand).
pub fn delete(page: &mut Page, k: &Key) -> Result<(), PageError> {
    check(page);
    let mut pairs = slots(page);
    if let Some(i) = pairs.iter().position(|(kk, _)| kk == k.as_bytes()) {
        pairs.remove(i);
    }
    rewrite(page, &pairs)
}

/// Splits `src` into `src`/`dst` and fuses the insert of `(k, e)` into
/// whichever side it belongs on. `dst` must be a freshly initialized
/// empty leaf. Returns the pivot key, owned by `dst`.
pub fn move_and_place(src: &mut Page, dst: &mut Page, k: &Key, e: &Entry) -> Key {
    check(src);
    check(dst);
    let mut sorted = slots(src);
    sorted.sort_by(|a, b| Key::new(a.0.clone()).compare(&Key::new(b.0.clone())));
    let n = sorted.len();
    let mid = (n + 1) / 2;

    let mid_key = sorted[mid].0.clone();
    let (mut left_pairs, mut right_pairs): (Vec<_>, Vec<_>) = {
        let right = sorted.split_off(mid);
        (sorted, right)
    };

    match k.compare(&Key::new(mid_key.clone())) {
        std::cmp::Ordering::Equal => {
            right_pairs[0].1 = e.to_bytes();
        }
        std::cmp::Ordering::Greater => {
            right_pairs.push((k.as_bytes().to_vec(), e.to_bytes()));
        }
        std::cmp::Ordering::Less => {
            left_pairs.push((k.as_bytes().to_vec(), e.to_bytes()));
        }
    }

    rewrite(dst, &right_pairs).expect("split halves must fit");
    rewrite(src, &left_pairs).expect("split halves must fit");

    let dst_id = dst.id();
    let src_id = src.id();
    let src_right = right(src);
    set_right(dst, src_right);
    set_right(src, dst_id);
    set_left(dst, src_id);

    Key::new(mid_key)
}
