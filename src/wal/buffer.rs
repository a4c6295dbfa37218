//! In-memory ring of WAL pages with concurrent append and a background
//! sync loop, following the teacher's pattern of an explicit owning
//! container guarded by a single `parking_lot::Mutex` plus one
//! cooperatively-cancelled `tokio` task per buffer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::page::{self, Page, Remaining};
use crate::errors::WalError;

const WAL_PAGE_TYPE: u16 = 1;
const WAL_VERSION: u16 = 1;
/// Consecutive missed try-locks after which the sync loop falls back to an
/// unconditional blocking acquire, to bound liveness under write pressure.
const MAX_MISSED_TICKS: u32 = 3;

/// The abstract append-only byte sink a `PageBuffer` flushes pages into.
/// The concrete file/network implementation is an external collaborator;
/// tests may substitute an in-memory mock.
pub trait LogWriter: Send {
    fn write_page(&mut self, bytes: &[u8; page::PAGE_SIZE]) -> std::io::Result<()>;
    fn sync(&mut self) -> std::io::Result<()>;
    fn close(&mut self) -> std::io::Result<()>;
}

/// Produces a fresh writer each time the ring wraps and rolls over to a new file.
pub type WriterFactory = Box<dyn Fn() -> std::io::Result<Box<dyn LogWriter>> + Send + Sync>;

struct Inner {
    pages: Vec<Page>,
    dirty: Vec<bool>,
    cur: usize,
    writer: Box<dyn LogWriter>,
}

impl Inner {
    fn sync(&mut self) -> Result<(), WalError> {
        let last = self.pages.len().saturating_sub(2).min(self.cur);
        for i in 0..=last {
            if !self.dirty[i] {
                continue;
            }
            if self.pages[i].head() == 0 {
                break;
            }
            self.dirty[i] = false;
            self.writer.write_page(self.pages[i].pack())?;
        }
        self.writer.sync()?;
        Ok(())
    }

    fn reset(&mut self, factory: &WriterFactory) -> Result<(), WalError> {
        self.writer.close()?;
        self.writer = factory()?;
        for page in self.pages.iter_mut() {
            *page = Page::new(WAL_PAGE_TYPE, WAL_VERSION);
        }
        self.dirty.iter_mut().for_each(|d| *d = false);
        self.cur = 0;
        Ok(())
    }

    /// Advances to the next ring slot, or syncs and rolls the file over if
    /// the ring is exhausted.
    fn advance(&mut self, factory: &WriterFactory) -> Result<(), WalError> {
        if self.cur + 1 >= self.pages.len() {
            self.sync()?;
            self.reset(factory)?;
        } else {
            self.cur += 1;
        }
        Ok(())
    }
}

/// A ring of exactly `ring_pages` WAL pages (128 by default, 1 MiB) with a
/// background sync task.
pub struct PageBuffer {
    inner: Arc<Mutex<Inner>>,
    factory: Arc<WriterFactory>,
    cancel: Arc<Notify>,
    sync_task: Option<JoinHandle<()>>,
}

impl PageBuffer {
    pub fn new(ring_pages: usize, factory: WriterFactory) -> Result<Self, WalError> {
        let writer = factory()?;
        let pages = (0..ring_pages).map(|_| Page::new(WAL_PAGE_TYPE, WAL_VERSION)).collect();
        let dirty = vec![false; ring_pages];
        let inner = Arc::new(Mutex::new(Inner { pages, dirty, cur: 0, writer }));
        Ok(PageBuffer { inner, factory: Arc::new(factory), cancel: Arc::new(Notify::new()), sync_task: None })
    }

    /// Appends `record`, splitting it into as many segments as needed.
    pub fn write(&self, record: &[u8]) -> Result<(), WalError> {
        let mut inner = self.inner.lock();
        let mut remaining = record;
        loop {
            let avail = inner.pages[inner.cur].available();
            if remaining.len() <= avail {
                let kind = if remaining.len() == record.len() { Remaining::Full } else { Remaining::End };
                inner.pages[inner.cur].write(remaining, kind)?;
                inner.dirty[inner.cur] = true;
                return Ok(());
            }
            if avail == 0 {
                inner.advance(&self.factory)?;
                continue;
            }
            let (chunk, rest) = remaining.split_at(avail);
            inner.pages[inner.cur].write(chunk, Remaining::Middle(rest.len() as u32))?;
            inner.dirty[inner.cur] = true;
            remaining = rest;
            inner.advance(&self.factory)?;
        }
    }

    /// Flushes all dirty pages to the writer and calls its `sync`.
    pub fn sync(&self) -> Result<(), WalError> {
        self.inner.lock().sync()
    }

    /// Spawns the background sync loop. Call once per buffer.
    pub fn spawn_sync_loop(&mut self, sync_interval: Duration) {
        let inner = Arc::clone(&self.inner);
        let cancel = Arc::clone(&self.cancel);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut missed: u32 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match inner.try_lock() {
                            Some(mut guard) => {
                                if let Err(e) = guard.sync() {
                                    tracing::error!(error = %e, "wal sync loop: fatal writer error");
                                    return;
                                }
                                missed = 0;
                            }
                            None => {
                                missed += 1;
                                if missed >= MAX_MISSED_TICKS {
                                    tracing::warn!(missed, "wal sync loop: forcing blocking lock");
                                    let mut guard = inner.lock();
                                    if let Err(e) = guard.sync() {
                                        tracing::error!(error = %e, "wal sync loop: fatal writer error");
                                        return;
                                    }
                                    missed = 0;
                                }
                            }
                        }
                    }
                    _ = cancel.notified() => {
                        let mut guard = inner.lock();
                        let _ = guard.writer.close();
                        tracing::info!("wal sync loop: cancelled, writer closed");
                        return;
                    }
                }
            }
        });
        self.sync_task = Some(handle);
    }

    /// Cancels the background sync loop, closing the writer.
    pub async fn shutdown(&mut self) {
        self.cancel.notify_one();
        if let Some(handle) = self.sync_task.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// An in-memory writer that appends written pages to a shared buffer,
    /// standing in for the abstract append-only file in tests.
    pub struct MemWriter {
        pub pages: Arc<StdMutex<Vec<u8>>>,
        pub synced: Arc<StdMutex<bool>>,
    }

    impl LogWriter for MemWriter {
        fn write_page(&mut self, bytes: &[u8; page::PAGE_SIZE]) -> std::io::Result<()> {
            self.pages.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
        fn sync(&mut self) -> std::io::Result<()> {
            *self.synced.lock().unwrap() = true;
            Ok(())
        }
        fn close(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    pub fn mem_factory(pages: Arc<StdMutex<Vec<u8>>>) -> WriterFactory {
        Box::new(move || {
            Ok(Box::new(MemWriter { pages: Arc::clone(&pages), synced: Arc::new(StdMutex::new(false)) })
                as Box<dyn LogWriter>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn write_small_record_fits_one_page() {
        let pages = Arc::new(StdMutex::new(Vec::new()));
        let buffer = PageBuffer::new(128, mem_factory(Arc::clone(&pages))).unwrap();
        buffer.write(b"Hello, World!").unwrap();
        buffer.sync().unwrap();
        assert!(!pages.lock().unwrap().is_empty());
    }

    #[test]
    fn writing_a_large_record_spans_multiple_pages() {
        let pages = Arc::new(StdMutex::new(Vec::new()));
        let buffer = PageBuffer::new(128, mem_factory(Arc::clone(&pages))).unwrap();
        let mut record = Vec::with_capacity(1024 * 1024);
        for i in 0..record.capacity() {
            record.push((b'a' + (i % 26) as u8) as u8);
        }
        buffer.write(&record).unwrap();
        buffer.sync().unwrap();
        let flushed = pages.lock().unwrap();
        assert_eq!(flushed.len() % page::PAGE_SIZE, 0);
        assert!(flushed.len() / page::PAGE_SIZE >= 1);
    }
}
