//! Manages the shared page cache: the only legal path to a page for any
//! transaction.
//!
//! The pool enforces strict two-phase locking at page granularity, NO-STEAL
//! eviction (a dirty page is never written out or dropped before its
//! transaction commits), and FORCE at commit (every page a committing
//! transaction holds is written through to its heap file).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;

use crate::catalog::Catalog;
use crate::error::{Result, StorageError};
use crate::lock_manager::{LockManager, Perm};
use crate::millstone_debug_log;
use crate::page::{HeapPage, HeapPageId};
use crate::transaction::TransactionId;
use crate::tuple::Tuple;
use crate::TableId;

/// A cached page, shared between every transaction that holds a lock on it.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Default number of pages a pool caches when the caller has no opinion.
pub const DEFAULT_CAPACITY: usize = 50;

const LOCK_RETRY_BASE: Duration = Duration::from_millis(500);
const LOCK_RETRY_JITTER_MS: u64 = 50;
const LOCK_WAIT_LIMIT: Duration = Duration::from_secs(5);

pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    cache: RwLock<HashMap<HeapPageId, PageRef>>,
    locks: LockManager,
}

impl BufferPool {
    /// A pool caching up to `capacity` pages, resolving table ids through
    /// `catalog`.
    pub fn new(capacity: usize, catalog: Arc<Catalog>) -> Self {
        BufferPool {
            capacity,
            catalog,
            cache: RwLock::new(HashMap::new()),
            locks: LockManager::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.cache.read().len()
    }

    /// Retrieves the page with the requested permission.
    ///
    /// Blocks (sleeping with jittered backoff) until the lock manager grants
    /// the lock; a transaction that waits beyond the limit fails with
    /// `TransactionAborted` and is expected to unwind to its caller, who
    /// aborts it. On a cache hit the shared in-memory version is returned;
    /// on a miss the page is read through the owning heap file, a clean page
    /// is evicted if the cache is at capacity, and the new page is installed.
    pub fn get_page(&self, tid: TransactionId, pid: HeapPageId, perm: Perm) -> Result<PageRef> {
        let mut waited = Duration::ZERO;
        while !self.locks.acquire_lock(pid, tid, perm) {
            let jitter = rand::thread_rng().gen_range(0..LOCK_RETRY_JITTER_MS);
            let backoff = LOCK_RETRY_BASE + Duration::from_millis(jitter);
            std::thread::sleep(backoff);
            waited += backoff;
            if waited > LOCK_WAIT_LIMIT {
                millstone_debug_log!(
                    "[BufferPool::get_page] {tid} timed out waiting for {pid}, aborting"
                );
                return Err(StorageError::TransactionAborted);
            }
        }

        if let Some(page) = self.cache.read().get(&pid).cloned() {
            return Ok(page);
        }

        millstone_debug_log!("[BufferPool::get_page] miss for {pid}, reading through heap file");
        let file = self
            .catalog
            .file(pid.table_id)
            .ok_or_else(|| StorageError::Db(format!("no table registered for {pid}")))?;
        let page = file.read_page(pid)?;

        let mut cache = self.cache.write();
        if let Some(existing) = cache.get(&pid).cloned() {
            // Another transaction installed it while we were reading.
            return Ok(existing);
        }
        Self::evict_if_full(self.capacity, &mut cache)?;
        let page = Arc::new(RwLock::new(page));
        cache.insert(pid, page.clone());
        Ok(page)
    }

    /// Releases one lock early. This abandons strict two-phase locking for
    /// `tid`: another transaction may observe or overwrite state this one
    /// depended on. Think hard about who needs to call this and why they can
    /// run that risk.
    pub fn unsafe_release_page(&self, tid: TransactionId, pid: HeapPageId) {
        self.locks.unsafe_release_page(pid, tid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: HeapPageId) -> bool {
        self.locks.holds_lock(pid, tid)
    }

    /// Commits or aborts the transaction and releases all of its locks.
    ///
    /// Commit writes every page associated with `tid` through its heap file
    /// and clears the dirty tag (FORCE). Abort drops every associated page
    /// from the cache; the next access re-reads the pre-transaction image
    /// from disk, which NO-STEAL guarantees is still there.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        for pid in self.pages_associated_with(tid) {
            if commit {
                self.flush_page(pid)?;
            } else {
                millstone_debug_log!("[BufferPool::abort] {tid} discarding {pid}");
                self.discard_page(pid);
            }
        }
        self.locks.release_all(tid);
        Ok(())
    }

    /// The pages a completing transaction must settle: everything it locks,
    /// plus cached pages it dirtied. The union matters because a freshly
    /// allocated page is dirtied by its creator without ever being locked.
    fn pages_associated_with(&self, tid: TransactionId) -> Vec<HeapPageId> {
        let mut pids = self.locks.pages_held_by(tid);
        for (&pid, page) in self.cache.read().iter() {
            if page.read().is_dirty() == Some(tid) && !pids.contains(&pid) {
                pids.push(pid);
            }
        }
        pids
    }

    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        self.transaction_complete(tid, true)
    }

    pub fn abort(&self, tid: TransactionId) -> Result<()> {
        self.transaction_complete(tid, false)
    }

    /// Adds a tuple to the named table, marking every dirtied page and
    /// installing it in the cache so future requests see the new version.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<()> {
        let file = self
            .catalog
            .file(table_id)
            .ok_or_else(|| StorageError::Db(format!("no table registered for id {table_id}")))?;
        let dirtied = file.insert_tuple(self, tid, tuple)?;
        self.install_dirty(tid, dirtied)
    }

    /// Removes the tuple from the page its record id names.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| StorageError::Db("tuple has no record id".to_string()))?;
        let file = self.catalog.file(rid.page_id.table_id).ok_or_else(|| {
            StorageError::Db(format!("no table registered for {}", rid.page_id))
        })?;
        let dirtied = file.delete_tuple(self, tid, tuple)?;
        self.install_dirty(tid, dirtied)
    }

    fn install_dirty(&self, tid: TransactionId, pages: Vec<PageRef>) -> Result<()> {
        for page in pages {
            let pid = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.id()
            };
            let mut cache = self.cache.write();
            if !cache.contains_key(&pid) {
                Self::evict_if_full(self.capacity, &mut cache)?;
            }
            cache.insert(pid, page.clone());
        }
        Ok(())
    }

    /// Writes every dirty page in the cache through its heap file.
    pub fn flush_all_pages(&self) -> Result<()> {
        let dirty: Vec<HeapPageId> = self
            .cache
            .read()
            .iter()
            .filter(|(_, page)| page.read().is_dirty().is_some())
            .map(|(&pid, _)| pid)
            .collect();
        for pid in dirty {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Writes one cached page through its heap file and clears the dirty
    /// tag. Does not evict. A page that is not cached is ignored.
    fn flush_page(&self, pid: HeapPageId) -> Result<()> {
        let Some(page) = self.cache.read().get(&pid).cloned() else {
            return Ok(());
        };
        let file = self
            .catalog
            .file(pid.table_id)
            .ok_or_else(|| StorageError::Db(format!("no table registered for {pid}")))?;
        let mut guard = page.write();
        millstone_debug_log!("[BufferPool::flush_page] writing {pid} through its heap file");
        file.write_page(&guard)?;
        guard.mark_dirty(None);
        Ok(())
    }

    /// Drops the page from the cache without flushing it. Used by abort, and
    /// by callers that recycle page slots.
    pub fn discard_page(&self, pid: HeapPageId) {
        self.cache.write().remove(&pid);
    }

    /// NO-STEAL eviction: discards one clean page when the cache is at
    /// capacity. Pages whose latch is currently write-held are not
    /// candidates. Fails when every cached page is dirty.
    fn evict_if_full(capacity: usize, cache: &mut HashMap<HeapPageId, PageRef>) -> Result<()> {
        if cache.len() < capacity {
            return Ok(());
        }
        let victim = cache.iter().find_map(|(&pid, page)| match page.try_read() {
            Some(guard) if guard.is_dirty().is_none() => Some(pid),
            _ => None,
        });
        match victim {
            Some(pid) => {
                millstone_debug_log!("[BufferPool::evict] discarding clean page {pid}");
                cache.remove(&pid);
                Ok(())
            }
            None => Err(StorageError::Db(
                "unable to evict: all buffered pages are dirty".to_string(),
            )),
        }
    }
}
