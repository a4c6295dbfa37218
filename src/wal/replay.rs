//! Multi-file WAL scan and segment reassembly.
//!
//! Given an ordered list of page sources (one per WAL file, in replay
//! order), reconstructs the original records by concatenating segments
//! according to their `kind`, then truncates the result to start at the
//! last checkpoint record.

use super::page::{Page, SegmentKind};
use crate::errors::WalError;

/// A pending, not-yet-complete record fragment straddling segment/page/file
/// boundaries.
struct Pending {
    bytes: Vec<u8>,
}

/// Reads all pages of one WAL file, in page order, stopping at the first
/// unreadable (short/absent) page.
pub trait PageSource {
    /// Reads the next 8192-byte page, or `Ok(None)` at end of file.
    fn next_page(&mut self) -> std::io::Result<Option<[u8; super::page::PAGE_SIZE]>>;
}

/// Reads one WAL file's pages (up to `max_pages`) and resolves them into
/// validated `Page`s, truncating at the first checksum failure.
pub fn read_file_pages(
    source: &mut dyn PageSource,
    max_pages: usize,
) -> Result<Vec<Page>, WalError> {
    let mut pages = Vec::new();
    for _ in 0..max_pages {
        match source.next_page()? {
            None => break,
            Some(bytes) => match Page::from_bytes(&bytes) {
                Ok(page) => pages.push(page),
                Err(WalError::ChecksumMismatch) => break,
                Err(e) => return Err(e),
            },
        }
    }
    Ok(pages)
}

/// Replays an ordered sequence of WAL files into the record stream,
/// truncated to start at the last record for which `is_checkpoint` returns
/// true.
pub struct Replay {
    pending: Option<Pending>,
    records: Vec<Vec<u8>>,
}

impl Replay {
    pub fn new() -> Self {
        Replay { pending: None, records: Vec::new() }
    }

    /// Feeds one file's already-validated pages into the reassembler, in order.
    pub fn feed_file(&mut self, pages: &[Page]) -> Result<(), WalError> {
        for page in pages {
            for seg in page.segments() {
                match seg.kind {
                    SegmentKind::Full => {
                        self.records.push(seg.bytes.to_vec());
                    }
                    SegmentKind::End => match self.pending.take() {
                        Some(mut pending) => {
                            pending.bytes.extend_from_slice(seg.bytes);
                            self.records.push(pending.bytes);
                        }
                        None => {
                            // A bare End with nothing pending is itself a
                            // headless fragment at file start; treat the
                            // same as Middle-then-immediately-closed.
                            self.records.push(seg.bytes.to_vec());
                        }
                    },
                    SegmentKind::Middle => match &mut self.pending {
                        Some(pending) => pending.bytes.extend_from_slice(seg.bytes),
                        None => {
                            self.pending = Some(Pending { bytes: seg.bytes.to_vec() });
                        }
                    },
                }
            }
        }
        Ok(())
    }

    /// Finalizes the scan: fails if a fragment was left dangling at the end
    /// of the last file (a torn write at the tail), then truncates the
    /// result to `[last_checkpoint..]`.
    pub fn finish(self, is_checkpoint: impl Fn(&[u8]) -> bool) -> Result<Vec<Vec<u8>>, WalError> {
        if self.pending.is_some() {
            return Err(WalError::TornTail);
        }
        let mut records = self.records;
        if let Some(idx) = records.iter().rposition(|r| is_checkpoint(r)) {
            records.drain(..idx);
        }
        Ok(records)
    }
}

impl Default for Replay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::page::Remaining;

    #[test]
    fn replay_reassembles_full_segments() {
        let mut page = Page::new(1, 1);
        page.write(b"one", Remaining::Full).unwrap();
        page.write(b"two", Remaining::Full).unwrap();
        let mut replay = Replay::new();
        replay.feed_file(&[page]).unwrap();
        let records = replay.finish(|_| false).unwrap();
        assert_eq!(records, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn replay_reassembles_split_record_across_pages() {
        let mut p1 = Page::new(1, 1);
        p1.write(b"hello-", Remaining::Middle(5)).unwrap();
        let mut p2 = Page::new(1, 1);
        p2.write(b"world", Remaining::End).unwrap();
        let mut replay = Replay::new();
        replay.feed_file(&[p1, p2]).unwrap();
        let records = replay.finish(|_| false).unwrap();
        assert_eq!(records, vec![b"hello-world".to_vec()]);
    }

    #[test]
    fn pending_fragment_carries_across_files() {
        let mut p1 = Page::new(1, 1);
        p1.write(b"alpha-", Remaining::Middle(4)).unwrap();
        let mut p2 = Page::new(1, 1);
        p2.write(b"beta", Remaining::End).unwrap();
        let mut replay = Replay::new();
        replay.feed_file(&[p1]).unwrap();
        replay.feed_file(&[p2]).unwrap();
        let records = replay.finish(|_| false).unwrap();
        assert_eq!(records, vec![b"alpha-beta".to_vec()]);
    }

    #[test]
    fn dangling_fragment_at_tail_is_an_error() {
        let mut p1 = Page::new(1, 1);
        p1.write(b"unterminated", Remaining::Middle(3)).unwrap();
        let mut replay = Replay::new();
        replay.feed_file(&[p1]).unwrap();
        let err = replay.finish(|_| false).unwrap_err();
        assert!(matches!(err, WalError::TornTail));
    }

    #[test]
    fn truncates_to_last_checkpoint() {
        let mut page = Page::new(1, 1);
        page.write(b"write-1", Remaining::Full).unwrap();
        page.write(b"checkpoint", Remaining::Full).unwrap();
        page.write(b"write-2", Remaining::Full).unwrap();
        let mut replay = Replay::new();
        replay.feed_file(&[page]).unwrap();
        let records = replay.finish(|r| r == b"checkpoint").unwrap();
        assert_eq!(records, vec![b"checkpoint".to_vec(), b"write-2".to_vec()]);
    }
}
