//! A write-ahead-logged, paged B+ tree storage substrate: fixed-size
//! checksummed WAL pages, a slotted-page tree with overflow value chaining,
//! and an entry-level lock manager with deadlock detection.

pub mod codec;
pub mod config;
pub mod errors;
pub mod keys;
pub mod tree;
pub mod txn;
pub mod wal;

pub use config::Config;
pub use errors::StorageError;
pub use keys::{Entry, Key};
pub use tree::Tree;
pub use txn::{EntryId, LockManager, Tx, TxId};
pub use wal::{PageBuffer, Replay};
