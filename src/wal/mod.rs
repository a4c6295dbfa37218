//! Write-ahead log: fixed-size checksummed pages, a ring-buffered writer
//! with a background sync loop, and multi-file replay.

pub mod buffer;
pub mod page;
pub mod replay;

pub use buffer::{LogWriter, PageBuffer, WriterFactory};
pub use page::Page;
pub use replay::{read_file_pages, PageSource, Replay};
