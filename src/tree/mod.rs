//! Paged B+ tree: slotted leaf/node pages, overflow value chaining, and
//! the pager that backs them onto a seekable file.

pub mod btree;
pub mod page;
pub mod pager;

pub use btree::Tree;
pub use pager::Pager;
