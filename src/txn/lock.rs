//! Entry-level read/write lock manager with wait-for cycle detection.
//!
//! Mirrors a classic two-phase lock manager: a shared `Mutex`-guarded table
//! of per-entry lock state, a wait-for graph for deadlock detection, and a
//! broadcast-on-release wakeup for blocked waiters. Unlike the page/WAL
//! layers this is synchronous — transactions block the calling thread while
//! waiting, rather than yielding to an async runtime.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::errors::LockError;

pub type TxId = u64;
pub type EntryId = [u8; 12];

/// Broadcast-once wakeup, analogous to closing a channel: every waiter
/// blocked on `wait` unblocks once `done` is set.
type DoneSignal = Arc<(Mutex<bool>, Condvar)>;

fn new_signal() -> DoneSignal {
    Arc::new((Mutex::new(false), Condvar::new()))
}

fn fire(signal: &DoneSignal) {
    let (flag, cvar) = &**signal;
    *flag.lock() = true;
    cvar.notify_all();
}

fn park_on(signal: &DoneSignal) {
    let (flag, cvar) = &**signal;
    let mut guard = flag.lock();
    while !*guard {
        cvar.wait(&mut guard);
    }
}

struct LockEntry {
    readers: u32,
    exclusive: bool,
    owners: HashSet<TxId>,
    done: DoneSignal,
}

impl LockEntry {
    fn new_shared(owner: TxId) -> Self {
        LockEntry { readers: 1, exclusive: false, owners: HashSet::from([owner]), done: new_signal() }
    }

    fn new_exclusive(owner: TxId) -> Self {
        LockEntry { readers: 0, exclusive: true, owners: HashSet::from([owner]), done: new_signal() }
    }
}

/// Wait-for graph: `adj[a]` is the set of transactions `a` waits for;
/// `inc` is the reverse index, kept in lockstep so `remove` is O(edges of id)
/// instead of a full scan.
struct DeadlockDetector {
    adj: HashMap<TxId, HashSet<TxId>>,
    inc: HashMap<TxId, HashSet<TxId>>,
}

impl DeadlockDetector {
    fn new() -> Self {
        DeadlockDetector { adj: HashMap::new(), inc: HashMap::new() }
    }

    /// Records that `id` waits for `wait_for`. Returns `false` (and rolls
    /// the edge back) if that would close a cycle.
    fn add(&mut self, id: TxId, wait_for: TxId) -> bool {
        if id == wait_for {
            return true;
        }
        self.adj.entry(id).or_default().insert(wait_for);
        self.inc.entry(wait_for).or_default().insert(id);

        let mut seen = HashSet::new();
        if self.has_path(wait_for, id, &mut seen) {
            self.remove(id);
            false
        } else {
            true
        }
    }

    fn has_path(&self, from: TxId, to: TxId, seen: &mut HashSet<TxId>) -> bool {
        if from == to {
            return true;
        }
        if !seen.insert(from) {
            return false;
        }
        if let Some(next) = self.adj.get(&from) {
            for &n in next {
                if self.has_path(n, to, seen) {
                    return true;
                }
            }
        }
        false
    }

    /// Drops every edge touching `id`, in or out.
    fn remove(&mut self, id: TxId) {
        if let Some(outs) = self.adj.remove(&id) {
            for out in outs {
                if let Some(incs) = self.inc.get_mut(&out) {
                    incs.remove(&id);
                    if incs.is_empty() {
                        self.inc.remove(&out);
                    }
                }
            }
        }
        if let Some(ins) = self.inc.remove(&id) {
            for inn in ins {
                if let Some(outs) = self.adj.get_mut(&inn) {
                    outs.remove(&id);
                    if outs.is_empty() {
                        self.adj.remove(&inn);
                    }
                }
            }
        }
    }
}

struct Inner {
    next_id: TxId,
    active: HashSet<TxId>,
    locks: HashMap<EntryId, LockEntry>,
    detector: DeadlockDetector,
}

pub struct LockManager {
    inner: Mutex<Inner>,
}

impl LockManager {
    pub fn new() -> Arc<Self> {
        Arc::new(LockManager {
            inner: Mutex::new(Inner {
                next_id: 0,
                active: HashSet::new(),
                locks: HashMap::new(),
                detector: DeadlockDetector::new(),
            }),
        })
    }

    pub fn begin(self: &Arc<Self>) -> Tx {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.active.insert(id);
        Tx { manager: Arc::clone(self), id, locks: Vec::new(), finished: false }
    }
}

enum Step {
    Acquired,
    Wait(DoneSignal),
}

pub struct Tx {
    manager: Arc<LockManager>,
    id: TxId,
    locks: Vec<EntryId>,
    finished: bool,
}

impl Tx {
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Acquires a shared lock on `entry`, blocking while it is held
    /// exclusively elsewhere.
    pub fn read(&mut self, entry: EntryId) -> Result<(), LockError> {
        loop {
            let step = {
                let mut inner = self.manager.inner.lock();
                let is_exclusive = inner.locks.get(&entry).map(|e| e.exclusive);
                match is_exclusive {
                    None => {
                        inner.locks.insert(entry, LockEntry::new_shared(self.id));
                        self.locks.push(entry);
                        Step::Acquired
                    }
                    Some(false) => {
                        let e = inner.locks.get_mut(&entry).unwrap();
                        e.readers += 1;
                        e.owners.insert(self.id);
                        self.locks.push(entry);
                        Step::Acquired
                    }
                    Some(true) => {
                        let owners: Vec<TxId> = inner.locks[&entry].owners.iter().copied().collect();
                        for owner in owners {
                            if !inner.detector.add(self.id, owner) {
                                return Err(LockError::Deadlock);
                            }
                        }
                        Step::Wait(Arc::clone(&inner.locks[&entry].done))
                    }
                }
            };
            match step {
                Step::Acquired => return Ok(()),
                Step::Wait(done) => park_on(&done),
            }
        }
    }

    /// Acquires an exclusive lock on `entry`, blocking while it is held by
    /// any other transaction, shared or exclusive.
    pub fn write(&mut self, entry: EntryId) -> Result<(), LockError> {
        loop {
            let step = {
                let mut inner = self.manager.inner.lock();
                let owners: Option<Vec<TxId>> = inner.locks.get(&entry).map(|e| e.owners.iter().copied().collect());
                match owners {
                    None => {
                        inner.locks.insert(entry, LockEntry::new_exclusive(self.id));
                        self.locks.push(entry);
                        Step::Acquired
                    }
                    Some(owners) => {
                        for owner in owners {
                            if !inner.detector.add(self.id, owner) {
                                return Err(LockError::Deadlock);
                            }
                        }
                        Step::Wait(Arc::clone(&inner.locks[&entry].done))
                    }
                }
            };
            match step {
                Step::Acquired => return Ok(()),
                Step::Wait(done) => park_on(&done),
            }
        }
    }

    /// Tries once to upgrade a held shared lock to exclusive. `Ok(true)` on
    /// success, `Ok(false)` if other readers remain (caller should retry),
    /// `Err(Deadlock)` if waiting for them would cycle. Panics if `entry`
    /// is not currently read-locked by this transaction, or is already
    /// exclusive — both are caller bugs.
    pub fn upgrade(&mut self, entry: EntryId) -> Result<bool, LockError> {
        let mut inner = self.manager.inner.lock();
        let readers = {
            let e = inner.locks.get(&entry).expect("upgrade on an entry with no held lock");
            assert!(!e.exclusive, "upgrade on an already-exclusive lock");
            e.readers
        };
        if readers == 1 {
            let e = inner.locks.get_mut(&entry).unwrap();
            e.readers = 0;
            e.exclusive = true;
            return Ok(true);
        }
        let owners: Vec<TxId> = inner.locks[&entry].owners.iter().copied().collect();
        for owner in owners {
            if !inner.detector.add(self.id, owner) {
                return Err(LockError::Deadlock);
            }
        }
        Ok(false)
    }

    /// Retries `upgrade` on a fixed interval up to `max_attempts` times.
    pub fn upgrade_blocking(&mut self, entry: EntryId, retry_interval: Duration, max_attempts: u32) -> Result<bool, LockError> {
        let mut ok = self.upgrade(entry)?;
        let mut attempts = 0;
        while !ok && attempts < max_attempts {
            std::thread::sleep(retry_interval);
            ok = self.upgrade(entry)?;
            attempts += 1;
        }
        Ok(ok)
    }

    /// Releases every lock held by this transaction and marks it inactive.
    pub fn commit(mut self) -> bool {
        self.finish()
    }

    /// Equivalent to `commit` for this lock manager: both simply release.
    pub fn abort(mut self) {
        self.finish();
    }

    fn finish(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        let mut inner = self.manager.inner.lock();
        for entry in self.locks.drain(..) {
            Self::release_one(&mut inner, self.id, entry);
        }
        inner.active.remove(&self.id);
        true
    }

    fn release_one(inner: &mut Inner, tx_id: TxId, entry: EntryId) {
        let Some(mut lock) = inner.locks.remove(&entry) else { return };
        lock.owners.remove(&tx_id);

        if lock.exclusive {
            fire(&lock.done);
            return;
        }

        assert!(lock.readers > 0, "inconsistent lock state: shared lock with zero readers");
        lock.readers -= 1;
        if lock.readers == 0 {
            fire(&lock.done);
        } else {
            inner.locks.insert(entry, lock);
        }
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn entry(tag: u8) -> EntryId {
        let mut id = [0u8; 12];
        id[0] = tag;
        id
    }

    #[test]
    fn two_readers_both_proceed_without_blocking() {
        let mgr = LockManager::new();
        let mut tx1 = mgr.begin();
        let mut tx2 = mgr.begin();
        tx1.read(entry(1)).unwrap();
        tx2.read(entry(1)).unwrap();
        tx1.commit();
        tx2.commit();
    }

    #[test]
    fn writer_blocks_reader_until_commit() {
        let mgr = LockManager::new();
        let mut writer = mgr.begin();
        writer.write(entry(1)).unwrap();

        let (tx, rx) = mpsc::channel();
        let mgr2 = Arc::clone(&mgr);
        let handle = thread::spawn(move || {
            let mut reader = mgr2.begin();
            tx.send(()).unwrap();
            reader.read(entry(1)).unwrap();
            reader.commit();
        });

        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        writer.commit();
        handle.join().unwrap();
    }

    #[test]
    fn upgrade_succeeds_when_sole_reader() {
        let mgr = LockManager::new();
        let mut tx = mgr.begin();
        tx.read(entry(1)).unwrap();
        assert!(tx.upgrade(entry(1)).unwrap());
        tx.commit();
    }

    #[test]
    #[should_panic]
    fn upgrade_without_holding_a_lock_panics() {
        let mgr = LockManager::new();
        let mut tx = mgr.begin();
        let _ = tx.upgrade(entry(1));
    }

    #[test]
    fn mutual_wait_is_detected_as_deadlock() {
        let mgr = LockManager::new();
        let mut tx1 = mgr.begin();
        let mut tx2 = mgr.begin();
        tx1.write(entry(1)).unwrap();
        tx2.write(entry(2)).unwrap();

        let (ready_tx, ready_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            // tx1 now waits on entry(2), held by tx2.
            ready_tx.send(()).unwrap();
            let r = tx1.write(entry(2));
            result_tx.send(r.is_ok()).unwrap();
            if r.is_ok() {
                tx1.commit();
            } else {
                tx1.abort();
            }
        });

        ready_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        // tx2 waiting on entry(1), held by tx1: closes the cycle.
        let err = tx2.write(entry(1)).unwrap_err();
        assert!(matches!(err, LockError::Deadlock));
        tx2.abort();

        handle.join().unwrap();
        let _ = result_rx.recv().unwrap();
    }

    #[test]
    fn dropping_a_tx_without_commit_releases_its_locks() {
        let mgr = LockManager::new();
        {
            let mut tx = mgr.begin();
            tx.write(entry(1)).unwrap();
        }
        let mut tx2 = mgr.begin();
        tx2.write(entry(1)).unwrap();
        tx2.commit();
    }
}
