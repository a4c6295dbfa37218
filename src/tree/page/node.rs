//! Node (internal) page: slotted key/child-id store with insert-fused
//! split (`move_and_place`) and a `less` pointer for keys below the
//! smallest separator.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{Page, PageType, PAYLOAD_SIZE};
use crate::config::MAX_DEGREE;
use crate::errors::PageError;
use crate::keys::Key;

const COUNT_OFF: usize = 0;
const LESS_OFF: usize = 8;
const PREFIX_SIZE: usize = 16;
pub const DATA_SIZE: usize = PAYLOAD_SIZE - PREFIX_SIZE;
const CHILD_SIZE: usize = 8;

pub(super) fn init(page: &mut Page) {
    set_count(page, 0);
    set_less(page, 0);
    page.set_head(0);
    page.set_tail(0);
}

fn check(page: &Page) {
    page.expect_type(PageType::Node);
}

pub fn count(page: &Page) -> u64 {
    check(page);
    (&page.payload()[COUNT_OFF..COUNT_OFF + 8]).read_u64::<BigEndian>().unwrap()
}

fn set_count(page: &mut Page, v: u64) {
    page.expect_type(PageType::Node);
    (&mut page.payload_mut()[COUNT_OFF..COUNT_OFF + 8]).write_u64::<BigEndian>(v).unwrap();
}

pub fn less(page: &Page) -> u64 {
    check(page);
    (&page.payload()[LESS_OFF..LESS_OFF + 8]).read_u64::<BigEndian>().unwrap()
}

pub fn set_less(page: &mut Page, v: u64) {
    page.expect_type(PageType::Node);
    (&mut page.payload_mut()[LESS_OFF..LESS_OFF + 8]).write_u64::<BigEndian>(v).unwrap();
}

fn data(page: &Page) -> &[u8] {
    &page.payload()[PREFIX_SIZE..]
}

fn data_mut(page: &mut Page) -> &mut [u8] {
    &mut page.payload_mut()[PREFIX_SIZE..]
}

/// All (key, child page id) pairs, in insertion order.
pub fn slots(page: &Page) -> Vec<(Vec<u8>, u64)> {
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

    let n_children = tail / CHILD_SIZE;
    let mut children = Vec::with_capacity(n_children);
    for i in 0..n_children {
        let off = DATA_SIZE - (i + 1) * CHILD_SIZE;
        children.push((&data[off..off + CHILD_SIZE]).read_u64::<BigEndian>().unwrap());
    }

    keys.into_iter().zip(children).collect()
}

fn fits(page: &Page, klen: usize) -> bool {
    let used = page.head() as usize + page.tail() as usize;
    count(page) < MAX_DEGREE as u64 && used + (2 + klen) + CHILD_SIZE <= DATA_SIZE
}

fn append(page: &mut Page, k: &[u8], child: u64) -> Result<(), PageError> {
    if !fits(page, k.len()) {
        return Err(PageError::NotEnoughSpace);
    }
    let head = page.head() as usize;
    let tail = page.tail() as usize;
    {
        let data = data_mut(page);
        (&mut data[head..head + 2]).write_u16::<BigEndian>(k.len() as u16).unwrap();
        data[head + 2..head + 2 + k.len()].copy_from_slice(k);

        let new_tail = tail + CHILD_SIZE;
        let off = DATA_SIZE - new_tail;
        (&mut data[off..off + CHILD_SIZE]).write_u64::<BigEndian>(child).unwrap();
    }
    page.set_head((head + 2 + k.len()) as u32);
    page.set_tail((tail + CHILD_SIZE) as u32);
    set_count(page, count(page) + 1);
    Ok(())
}

fn rewrite(page: &mut Page, pairs: &[(Vec<u8>, u64)]) -> Result<(), PageError> {
    page.set_head(0);
    page.set_tail(0);
    set_count(page, 0);
    for (k, child) in pairs {
        append(page, k, *child)?;
    }
    Ok(())
}

pub fn insert(page: &mut Page, k: &Key, child: u64) -> Result<(), PageError> {
    check(page);
    append(page, k.as_bytes(), child)
}

/// Finds the child to descend into for `k`: the previous child before the
/// first separator strictly greater than `k`, or `less` if `k` is smaller
/// than every separator.
pub fn find(page: &Page, k: &Key) -> u64 {
    check(page);
    let mut sorted = slots(page);
    sorted.sort_by(|a, b| Key::new(a.0.clone()).compare(&Key::new(b.0.clone())));
    let mut candidate = less(page);
    for (key, child) in &sorted {
        if Key::new(key.clone()).compare(k) == std::cmp::Ordering::Greater {
            return candidate;
        }
        candidate = *child;
    }
    candidate
}

pub fn update(page: &mut Page, k: &Key, new_child: u64) -> Result<(), PageError> {
    check(page);
    let slots = slots(page);
    let idx = slots.iter().position(|(kk, _)| kk.as_slice() == k.as_bytes());
    match idx {
        Some(i) => {
            let off = DATA_SIZE - (i + 1) * CHILD_SIZE;
            (&mut data_mut(page)[off..off + CHILD_SIZE]).write_u64::<BigEndian>(new_child).unwrap();
            Ok(())
        }
        None => Err(PageError::NotEnoughSpace),
    }
}

pub fn delete_by_child_id(page: &mut Page, id: u64) -> Result<(), PageError> {
    check(page);
    let mut pairs = slots(page);
    if let Some(i) = pairs.iter().position(|(_, c)| *c == id) {
        pairs.remove(i);
    }
    rewrite(page, &pairs)
}

pub fn is_full(page: &Page) -> bool {
    check(page);
    count(page) >= MAX_DEGREE as u64 || (page.head() as usize + page.tail() as usize) >= DATA_SIZE / 2
}

/// Splits `src` and fuses the insert of `(k, child)`. `dst` must be a
/// freshly initialized empty node. Returns the pivot key.
pub fn move_and_place(src: &mut Page, dst: &mut Page, k: &Key, child: u64) -> Key {
    check(src);
    check(dst);
    let mut sorted = slots(src);
    sorted.sort_by(|a, b| Key::new(a.0.clone()).compare(&Key::new(b.0.clone())));
    let n = sorted.len();
    let mid = (n + 1) / 2;

    let (mid_key, mid_child) = sorted[mid].clone();
    let mut left_pairs = sorted[..mid].to_vec();
    let mut right_pairs = sorted[mid + 1..].to_vec();

    if k.compare(&Key::new(mid_key.clone())) != std::cmp::Ordering::Less {
        right_pairs.push((k.as_bytes().to_vec(), child));
    } else {
        left_pairs.push((k.as_bytes().to_vec(), child));
    }

    set_less(dst, mid_child);
    rewrite(dst, &right_pairs).expect("split halves must fit");
    rewrite(src, &left_pairs).expect("split halves must fit");

    Key::new(mid_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::page::Page;

    fn new_node(id: u64) -> Page {
        Page::new(id, 0, PageType::Node)
    }

    #[test]
    fn find_returns_previous_child_or_less() {
        let mut page = new_node(1);
        set_less(&mut page, 100);
        insert(&mut page, &Key::from("m"), 200).unwrap();
        insert(&mut page, &Key::from("t"), 300).unwrap();

        assert_eq!(find(&page, &Key::from("a")), 100);
        assert_eq!(find(&page, &Key::from("n")), 200);
        assert_eq!(find(&page, &Key::from("z")), 300);
    }

    #[test]
    fn update_rewrites_child_in_place() {
        let mut page = new_node(1);
        set_less(&mut page, 1);
        insert(&mut page, &Key::from("m"), 200).unwrap();
        update(&mut page, &Key::from("m"), 999).unwrap();
        assert_eq!(find(&page, &Key::from("z")), 999);
    }

    #[test]
    fn move_and_place_splits_and_places_new_key() {
        let mut src = new_node(1);
        set_less(&mut src, 1);
        insert(&mut src, &Key::from("b"), 2).unwrap();
        insert(&mut src, &Key::from("d"), 3).unwrap();
        insert(&mut src, &Key::from("f"), 4).unwrap();

        let mut dst = new_node(2);
        let pivot = move_and_place(&mut src, &mut dst, &Key::from("e"), 99);

        assert_eq!(pivot.as_bytes(), b"d");
        assert_eq!(less(&dst), 3);
        let dst_keys: Vec<_> = slots(&dst).into_iter().map(|(k, _)| k).collect();
        assert!(dst_keys.contains(&b"e".to_vec()));
        assert!(dst_keys.contains(&b"f".to_vec()));
    }

    #[test]
    fn ordering_is_length_then_lexicographic_not_raw_bytes() {
        // "z" < "aa" < "bbb" by length-then-lexicographic order, even
        // though plain byte order would put "aa" < "bbb" < "z".
        let mut page = new_node(1);
        set_less(&mut page, 100);
        insert(&mut page, &Key::from("z"), 200).unwrap();
        insert(&mut page, &Key::from("aa"), 300).unwrap();
        insert(&mut page, &Key::from("bbb"), 400).unwrap();

        assert_eq!(find(&page, &Key::from("0")), 100);
        assert_eq!(find(&page, &Key::from("00")), 200);
        assert_eq!(find(&page, &Key::from("zz")), 300);
        assert_eq!(find(&page, &Key::from("ccc")), 400);
    }

    #[test]
    fn delete_by_child_id_removes_matching_slot() {
        let mut page = new_node(1);
        set_less(&mut page, 1);
        insert(&mut page, &Key::from("m"), 200).unwrap();
        delete_by_child_id(&mut page, 200).unwrap();
        assert_eq!(slots(&page).len(), 0);
    }
}
