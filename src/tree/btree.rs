//! Classic B+ tree over slotted leaf/node pages, with bottom-up split
//! propagation and large-value overflow chaining.

use std::io::{Read, Seek, Write};

use super::page::{leaf, node, overflow, Page, PageType};
use super::pager::Pager;
use crate::errors::{PageError, StorageError, TreeError};
use crate::keys::{Entry, Key};

/// `((leaf_data_size - 2*4) / 2) - (max_key_size + 2)`: values larger than
/// this become an overflow chain instead of a literal leaf entry.
pub const MAX_ENTRY_SIZE: usize = ((leaf::DATA_SIZE - 8) / 2) - (crate::config::MAX_KEY_SIZE + 2);

pub struct Tree<F> {
    pager: Pager<F>,
}

impl<F: Read + Write + Seek> Tree<F> {
    pub fn new(file: F) -> Result<Self, PageError> {
        Ok(Tree { pager: Pager::new(file)? })
    }

    pub fn find(&mut self, key: &Key) -> Result<Option<Vec<u8>>, StorageError> {
        if self.pager.root_id() == 0 {
            return Ok(None);
        }
        let mut page = self.pager.read(self.pager.root_id())?;
        loop {
            match page.page_type() {
                PageType::Node => {
                    let child = node::find(&page, key);
                    page = self.pager.read(child)?;
                }
                PageType::Leaf => break,
                other => unreachable!("unexpected page flavor in tree walk: {other:?}"),
            }
        }
        match leaf::find(&page, key) {
            None => Ok(None),
            Some(Entry::Data(bytes)) => Ok(Some(bytes)),
            Some(Entry::Overflow { head_page_id }) => Ok(Some(self.read_overflow_chain(head_page_id)?)),
        }
    }

    pub fn insert(&mut self, key: &Key, value: &[u8]) -> Result<(), StorageError> {
        self.insert_or_upsert(key, value, false)
    }

    pub fn upsert(&mut self, key: &Key, value: &[u8]) -> Result<(), StorageError> {
        self.insert_or_upsert(key, value, true)
    }

    fn insert_or_upsert(&mut self, key: &Key, value: &[u8], upsert: bool) -> Result<(), StorageError> {
        let (path, mut target_leaf) = self.walk_to_leaf(key)?;

        let entry = if value.len() + 1 > MAX_ENTRY_SIZE {
            self.write_overflow_chain(value)?
        } else {
            Entry::data(value.to_vec())
        };

        let present = leaf::find(&target_leaf, key).is_some();
        let probe = if present {
            if !upsert {
                return Err(TreeError::AlreadyExists.into());
            }
            leaf::update(&mut target_leaf, key, &entry)
        } else {
            leaf::insert(&mut target_leaf, key, &entry)
        };

        match probe {
            Ok(()) => {
                if path.is_empty() {
                    self.pager.write_root(&target_leaf)?;
                } else {
                    self.pager.write(&target_leaf)?;
                }
                Ok(())
            }
            Err(PageError::NotEnoughSpace) => {
                let mut extra = self.pager.alloc(0, PageType::Leaf);
                let pivot = leaf::move_and_place(&mut target_leaf, &mut extra, key, &entry);
                self.pager.write(&target_leaf)?;
                self.pager.write(&extra)?;
                tracing::debug!(left = target_leaf.id(), right = extra.id(), "tree: leaf split");
                self.propagate_split(path, pivot, extra.id(), target_leaf.id())?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete(&mut self, key: &Key) -> Result<(), StorageError> {
        let (mut path, mut target_leaf) = self.walk_to_leaf(key)?;
        if leaf::find(&target_leaf, key).is_none() {
            return Err(TreeError::NotFound.into());
        }
        leaf::delete(&mut target_leaf, key)?;

        if leaf::count(&target_leaf) > 0 {
            if path.is_empty() {
                self.pager.write_root(&target_leaf)?;
            } else {
                self.pager.write(&target_leaf)?;
            }
            return Ok(());
        }

        self.pager.free(&mut target_leaf)?;
        let mut freed_child_id = target_leaf.id();
        while let Some(mut parent) = path.pop() {
            node::delete_by_child_id(&mut parent, freed_child_id)?;
            if node::count(&parent) > 0 {
                if path.is_empty() {
                    self.pager.write_root(&parent)?;
                } else {
                    self.pager.write(&parent)?;
                }
                return Ok(());
            }
            self.pager.free(&mut parent)?;
            freed_child_id = parent.id();
        }

        let new_root = self.pager.alloc(0, PageType::Leaf);
        self.pager.write_root(&new_root)?;
        Ok(())
    }

    fn walk_to_leaf(&mut self, key: &Key) -> Result<(Vec<Page>, Page), PageError> {
        let mut path = Vec::new();
        let mut page = self.pager.read_root()?;
        loop {
            match page.page_type() {
                PageType::Node => {
                    let child_id = node::find(&page, key);
                    path.push(page);
                    page = self.pager.read(child_id)?;
                }
                PageType::Leaf => return Ok((path, page)),
                other => unreachable!("unexpected page flavor in tree walk: {other:?}"),
            }
        }
    }

    /// Ascends `path`, trying to insert `(pivot, right_id)` into each
    /// ancestor; splits that ancestor (tracking its new left id) when it
    /// does not fit, and finally allocates a new root if the path is
    /// exhausted with a pivot still pending.
    fn propagate_split(
        &mut self,
        mut path: Vec<Page>,
        mut pivot: Key,
        mut right_id: u64,
        mut left_id: u64,
    ) -> Result<(), PageError> {
        while let Some(mut parent) = path.pop() {
            match node::insert(&mut parent, &pivot, right_id) {
                Ok(()) => {
                    if path.is_empty() {
                        self.pager.write_root(&parent)?;
                    } else {
                        self.pager.write(&parent)?;
                    }
                    return Ok(());
                }
                Err(PageError::NotEnoughSpace) => {
                    let mut new_extra = self.pager.alloc(0, PageType::Node);
                    let new_pivot = node::move_and_place(&mut parent, &mut new_extra, &pivot, right_id);
                    self.pager.write(&parent)?;
                    self.pager.write(&new_extra)?;
                    tracing::debug!(left = parent.id(), right = new_extra.id(), "tree: node split");
                    pivot = new_pivot;
                    right_id = new_extra.id();
                    left_id = parent.id();
                }
                Err(e) => return Err(e),
            }
        }
        let mut new_root = self.pager.alloc(0, PageType::Node);
        node::set_less(&mut new_root, left_id);
        node::insert(&mut new_root, &pivot, right_id).expect("fresh node always has room for one entry");
        tracing::debug!(root = new_root.id(), "tree: new root allocated");
        self.pager.write_root(&new_root)
    }

    fn write_overflow_chain(&mut self, value: &[u8]) -> Result<Entry, PageError> {
        let chunks: Vec<&[u8]> = if value.is_empty() {
            vec![&[][..]]
        } else {
            value.chunks(overflow::DATA_SIZE).collect()
        };
        let mut pages: Vec<Page> = chunks.iter().map(|_| self.pager.alloc(0, PageType::Overflow)).collect();
        tracing::debug!(pages = pages.len(), bytes = value.len(), "tree: writing overflow chain");
        for i in (0..pages.len()).rev() {
            overflow::write(&mut pages[i], chunks[i]);
            let next = if i + 1 < pages.len() { pages[i + 1].id() } else { 0 };
            overflow::set_next(&mut pages[i], next);
        }
        for page in &pages {
            self.pager.write(page)?;
        }
        Ok(Entry::overflow(pages[0].id()))
    }

    fn read_overflow_chain(&mut self, head_page_id: u64) -> Result<Vec<u8>, PageError> {
        let mut out = Vec::new();
        let mut id = head_page_id;
        loop {
            let page = self.pager.read(id)?;
            out.extend_from_slice(overflow::data(&page));
            let next = overflow::next(&page);
            if next == 0 {
                break;
            }
            id = next;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fresh_tree() -> Tree<Cursor<Vec<u8>>> {
        Tree::new(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn insert_then_find_returns_identical_bytes() {
        let mut tree = fresh_tree();
        let value: Vec<u8> = (0..256).map(|i| (i % 26) as u8 + b'a').collect();
        tree.insert(&Key::from("the_key"), &value).unwrap();
        assert_eq!(tree.find(&Key::from("the_key")).unwrap(), Some(value));
    }

    #[test]
    fn inserting_many_keys_triggers_splits_and_all_remain_findable() {
        let mut tree = fresh_tree();
        tree.insert(&Key::from("the_key"), b"root value").unwrap();
        for i in 0..16 {
            let k = format!("the_key{i}");
            tree.insert(&Key::new(k.as_bytes().to_vec()), k.as_bytes()).unwrap();
        }
        for i in 0..16 {
            let k = format!("the_key{i}");
            let found = tree.find(&Key::new(k.as_bytes().to_vec())).unwrap();
            assert_eq!(found.as_deref(), Some(k.as_bytes()));
        }
        assert_eq!(tree.find(&Key::from("the_key")).unwrap().as_deref(), Some(&b"root value"[..]));
    }

    #[test]
    fn insert_without_upsert_fails_on_duplicate() {
        let mut tree = fresh_tree();
        tree.insert(&Key::from("a"), b"1").unwrap();
        let err = tree.insert(&Key::from("a"), b"2").unwrap_err();
        assert!(matches!(err, StorageError::Tree(TreeError::AlreadyExists)));
    }

    #[test]
    fn upsert_replaces_existing_value() {
        let mut tree = fresh_tree();
        tree.insert(&Key::from("a"), b"1").unwrap();
        tree.upsert(&Key::from("a"), b"2").unwrap();
        assert_eq!(tree.find(&Key::from("a")).unwrap().as_deref(), Some(&b"2"[..]));
    }

    #[test]
    fn delete_removes_key_others_remain_findable() {
        let mut tree = fresh_tree();
        tree.insert(&Key::from("a"), b"1").unwrap();
        tree.insert(&Key::from("b"), b"2").unwrap();
        tree.delete(&Key::from("a")).unwrap();
        assert_eq!(tree.find(&Key::from("a")).unwrap(), None);
        assert_eq!(tree.find(&Key::from("b")).unwrap().as_deref(), Some(&b"2"[..]));
    }

    #[test]
    fn delete_missing_key_is_an_error() {
        let mut tree = fresh_tree();
        let err = tree.delete(&Key::from("missing")).unwrap_err();
        assert!(matches!(err, StorageError::Tree(TreeError::NotFound)));
    }

    #[test]
    fn large_value_is_stored_as_overflow_chain_and_reassembled() {
        let mut tree = fresh_tree();
        let value: Vec<u8> = (0..(4 * 1024 * 1024)).map(|i| (i % 251) as u8).collect();
        tree.insert(&Key::from("the_key"), &value).unwrap();
        let found = tree.find(&Key::from("the_key")).unwrap().unwrap();
        assert_eq!(found.len(), value.len());
        assert_eq!(found, value);
    }
}
