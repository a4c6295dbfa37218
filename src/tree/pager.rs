//! Owns the seekable byte-sink backing the paged tree file: page
//! allocation, 8 KiB page I/O, and meta/root persistence. Page id 0 is
//! always the meta page.

use std::io::{Read, Seek, SeekFrom, Write};

use super::page::{meta, Page, PageType, PAGE_SIZE};
use crate::errors::PageError;

pub struct Pager<F> {
    file: F,
    free_page_id: u64,
    meta_version: u64,
    meta_root: u64,
    meta_free_map: u64,
}

impl<F: Read + Write + Seek> Pager<F> {
    pub fn new(mut file: F) -> Result<Self, PageError> {
        let size = file.seek(SeekFrom::End(0))?;
        let (meta_version, meta_root, meta_free_map, size) = if size == 0 {
            let mut meta_page = Page::new(0, 0, PageType::Meta);
            meta::set_version(&mut meta_page, 1);
            meta::set_root(&mut meta_page, 0);
            meta::set_free_map(&mut meta_page, 0);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(meta_page.pack())?;
            (1, 0, 0, PAGE_SIZE as u64)
        } else {
            file.seek(SeekFrom::Start(0))?;
            let mut buf = vec![0u8; PAGE_SIZE];
            file.read_exact(&mut buf)?;
            let meta_page = Page::from_bytes(&buf)?;
            if meta_page.page_type() != PageType::Meta {
                return Err(PageError::WrongType { expected: PageType::Meta as u16, actual: meta_page.page_type() as u16 });
            }
            (meta::version(&meta_page), meta::root(&meta_page), meta::free_map(&meta_page), size)
        };
        let free_page_id = std::cmp::max(1, size / PAGE_SIZE as u64);
        Ok(Pager { file, free_page_id, meta_version, meta_root, meta_free_map })
    }

    /// Mints a new page id. The page is not yet written to disk.
    pub fn alloc(&mut self, lsn: u64, page_type: PageType) -> Page {
        let id = self.free_page_id;
        self.free_page_id += 1;
        tracing::debug!(id, ?page_type, "pager: alloc");
        Page::new(id, lsn, page_type)
    }

    /// Marks a page unused and writes it back. `used` bits are never
    /// reclaimed by a free list (see design notes); the id is simply
    /// abandoned.
    pub fn free(&mut self, page: &mut Page) -> Result<(), PageError> {
        tracing::debug!(id = page.id(), "pager: free");
        page.set_used(false);
        self.write(page)
    }

    pub fn read(&mut self, id: u64) -> Result<Page, PageError> {
        self.file.seek(SeekFrom::Start(id * PAGE_SIZE as u64))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        self.file.read_exact(&mut buf)?;
        let page = Page::from_bytes(&buf)?;
        if page.id() != id {
            return Err(PageError::IdMismatch { expected: id, actual: page.id() });
        }
        if !page.used() {
            return Err(PageError::NotUsed(id));
        }
        Ok(page)
    }

    pub fn write(&mut self, page: &Page) -> Result<(), PageError> {
        self.file.seek(SeekFrom::Start(page.id() * PAGE_SIZE as u64))?;
        self.file.write_all(page.pack())?;
        Ok(())
    }

    /// Returns a fresh, unwritten leaf page when there is no root yet,
    /// otherwise reads the current root from disk.
    pub fn read_root(&mut self) -> Result<Page, PageError> {
        if self.meta_root == 0 {
            Ok(self.alloc(0, PageType::Leaf))
        } else {
            self.read(self.meta_root)
        }
    }

    pub fn write_root(&mut self, page: &Page) -> Result<(), PageError> {
        self.write(page)?;
        self.meta_root = page.id();
        self.write_meta()
    }

    pub fn root_id(&self) -> u64 {
        self.meta_root
    }

    fn write_meta(&mut self) -> Result<(), PageError> {
        let mut meta_page = Page::new(0, 0, PageType::Meta);
        meta::set_version(&mut meta_page, self.meta_version);
        meta::set_root(&mut meta_page, self.meta_root);
        meta::set_free_map(&mut meta_page, self.meta_free_map);
        self.write(&meta_page)
    }

    pub fn sync(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fresh_pager() -> Pager<Cursor<Vec<u8>>> {
        Pager::new(Cursor::new(Vec::new())).unwrap()
    }

    #[test]
    fn root_survives_reopening_the_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");

        let id = {
            let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(&path).unwrap();
            let mut pager = Pager::new(file).unwrap();
            let root = pager.alloc(0, PageType::Leaf);
            pager.write_root(&root).unwrap();
            root.id()
        };

        let file = std::fs::OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let mut reopened = Pager::new(file).unwrap();
        assert_eq!(reopened.root_id(), id);
        let root = reopened.read_root().unwrap();
        assert_eq!(root.id(), id);
        assert_eq!(root.page_type(), PageType::Leaf);
    }

    #[test]
    fn fresh_file_gets_a_meta_page_and_no_root() {
        let mut pager = fresh_pager();
        assert_eq!(pager.root_id(), 0);
        let root = pager.read_root().unwrap();
        assert_eq!(root.page_type(), PageType::Leaf);
    }

    #[test]
    fn alloc_read_write_roundtrip() {
        let mut pager = fresh_pager();
        let page = pager.alloc(0, PageType::Leaf);
        let id = page.id();
        pager.write(&page).unwrap();
        let reread = pager.read(id).unwrap();
        assert_eq!(reread.id(), id);
        assert_eq!(reread.page_type(), PageType::Leaf);
    }

    #[test]
    fn write_root_persists_across_reopen() {
        let mut pager = fresh_pager();
        let root = pager.alloc(0, PageType::Leaf);
        pager.write_root(&root).unwrap();
        assert_eq!(pager.root_id(), root.id());
        let reread = pager.read_root().unwrap();
        assert_eq!(reread.id(), root.id());
    }

    #[test]
    fn reading_unused_page_fails() {
        let mut pager = fresh_pager();
        let mut page = pager.alloc(0, PageType::Leaf);
        pager.write(&page).unwrap();
        pager.free(&mut page).unwrap();
        let err = pager.read(page.id()).unwrap_err();
        assert!(matches!(err, PageError::NotUsed(_)));
    }
}
