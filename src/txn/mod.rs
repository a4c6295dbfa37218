//! Entry-level lock manager and deadlock detection for concurrent
//! transactions over the tree.

pub mod lock;

pub use lock::{EntryId, LockManager, Tx, TxId};
