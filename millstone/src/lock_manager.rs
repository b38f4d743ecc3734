//! Manages page-level locks for two-phase locking.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::page::HeapPageId;
use crate::transaction::TransactionId;

/// The permission a transaction requests on a page. `ReadWrite` corresponds
/// to an exclusive lock, `ReadOnly` to a shared one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Perm {
    ReadOnly,
    ReadWrite,
}

/// A page-granularity lock table. Every operation is serialized by one mutex;
/// critical sections are proportional to the number of holders of the page in
/// question, so contention on the mutex itself stays short.
///
/// `acquire_lock` never blocks. Waiting, backoff, and timeout are the
/// caller's concern (see `BufferPool::get_page`).
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<HashMap<HeapPageId, HashMap<TransactionId, Perm>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to take the lock, returning true iff `tid` now holds the page
    /// at `perm` or stronger.
    ///
    /// A read is granted unless another transaction holds the page
    /// exclusively. A write is granted if `tid` already holds it exclusively,
    /// or if nobody does and `tid` is the only shared holder (upgrade) or
    /// there are no shared holders at all. A grant never downgrades an
    /// existing exclusive entry.
    pub fn acquire_lock(&self, pid: HeapPageId, tid: TransactionId, perm: Perm) -> bool {
        let mut table = self.table.lock();
        let holders = table.entry(pid).or_default();

        let mut exclusive: Option<TransactionId> = None;
        let mut shared_count = 0;
        let mut shared_by_us = false;
        for (&holder, &held) in holders.iter() {
            match held {
                Perm::ReadOnly => {
                    shared_count += 1;
                    if holder == tid {
                        shared_by_us = true;
                    }
                }
                Perm::ReadWrite => exclusive = Some(holder),
            }
        }

        let granted = match perm {
            Perm::ReadOnly => exclusive.is_none() || exclusive == Some(tid),
            Perm::ReadWrite => {
                exclusive == Some(tid)
                    || (exclusive.is_none()
                        && (shared_count == 0 || (shared_count == 1 && shared_by_us)))
            }
        };

        if granted && exclusive.is_none() {
            holders.insert(tid, perm);
        }
        granted
    }

    /// Removes `tid` from every page's holder set.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();
        table.retain(|_, holders| {
            holders.remove(&tid);
            !holders.is_empty()
        });
    }

    /// Removes a single holder entry. This abandons the two-phase-locking
    /// guarantee for `tid`; callers accept the resulting isolation anomalies.
    pub fn unsafe_release_page(&self, pid: HeapPageId, tid: TransactionId) {
        let mut table = self.table.lock();
        if let Some(holders) = table.get_mut(&pid) {
            holders.remove(&tid);
            if holders.is_empty() {
                table.remove(&pid);
            }
        }
    }

    pub fn holds_lock(&self, pid: HeapPageId, tid: TransactionId) -> bool {
        self.table
            .lock()
            .get(&pid)
            .map_or(false, |holders| holders.contains_key(&tid))
    }

    /// Every page `tid` currently holds a lock on, in no particular order.
    pub fn pages_held_by(&self, tid: TransactionId) -> Vec<HeapPageId> {
        self.table
            .lock()
            .iter()
            .filter(|(_, holders)| holders.contains_key(&tid))
            .map(|(&pid, _)| pid)
            .collect()
    }
}
