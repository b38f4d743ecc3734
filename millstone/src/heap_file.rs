use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::vec;

use parking_lot::RwLock;

use crate::buffer_pool::{BufferPool, PageRef};
use crate::error::{Result, StorageError};
use crate::lock_manager::Perm;
use crate::millstone_debug_log;
use crate::page::{HeapPage, HeapPageId};
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::{page_size, TableId};

/// An unordered table: a file that is nothing but a sequence of fixed-size
/// slotted pages. Page N lives at byte offset `N * page_size`.
///
/// The file never holds a long-lived handle; every read and write opens one,
/// uses it, and drops it. All tuple-level operations go through the buffer
/// pool passed in by the caller, which is where locking happens.
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    desc: TupleDesc,
    table_id: TableId,
}

impl HeapFile {
    /// Opens (creating if missing) the backing file. The table id is the
    /// stable hash of the canonical path, so reopening the same file yields
    /// the same id.
    pub fn open<P: AsRef<Path>>(path: P, desc: TupleDesc) -> Result<Self> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        let path = path.as_ref().canonicalize()?;

        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let table_id = hasher.finish();

        Ok(HeapFile {
            path,
            desc,
            table_id,
        })
    }

    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `ceil(file length / page size)`.
    pub fn num_pages(&self) -> Result<u32> {
        let len = std::fs::metadata(&self.path)?.len();
        let page = page_size() as u64;
        Ok(((len + page - 1) / page) as u32)
    }

    /// Reads one page image from disk. Fails with an i/o error if the page
    /// is not fully present. Does no caching and takes no locks.
    pub fn read_page(&self, pid: HeapPageId) -> Result<HeapPage> {
        let page_size = page_size();
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(pid.page_no as u64 * page_size as u64))?;
        let mut data = vec![0u8; page_size];
        file.read_exact(&mut data)?;
        HeapPage::from_bytes(pid, self.desc.clone(), &data)
    }

    /// Writes one page image at its offset. Writing at index `num_pages`
    /// extends the file by one page.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_size = page_size();
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(
            page.id().page_no as u64 * page_size as u64,
        ))?;
        file.write_all(&page.page_data())?;
        file.flush()?;
        Ok(())
    }

    /// Finds a page with a free slot (or appends a fresh one), inserts the
    /// tuple, and returns the dirtied page.
    ///
    /// Existing pages are probed with a read lock first; only the page that
    /// actually receives the tuple is upgraded to a write lock. A fresh page
    /// is written straight to disk so that the file length (and thus
    /// `num_pages`) accounts for it immediately.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        for page_no in 0..self.num_pages()? {
            let pid = HeapPageId::new(self.table_id, page_no);
            let page = pool.get_page(tid, pid, Perm::ReadOnly)?;
            let has_room = page.read().num_empty_slots() > 0;
            if has_room {
                let page = pool.get_page(tid, pid, Perm::ReadWrite)?;
                page.write().insert_tuple(tuple)?;
                return Ok(vec![page]);
            }
        }

        let pid = HeapPageId::new(self.table_id, self.num_pages()?);
        millstone_debug_log!("[HeapFile::insert_tuple] extending table {} with {pid}", self.table_id);
        let mut page = HeapPage::empty(pid, self.desc.clone());
        page.insert_tuple(tuple)?;
        self.write_page(&page)?;
        Ok(vec![Arc::new(RwLock::new(page))])
    }

    /// Deletes the tuple from the page its record id names, returning the
    /// dirtied page. The tuple must have been placed (scanned or inserted)
    /// before.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| StorageError::Db("tuple has no record id".to_string()))?;
        let page = pool.get_page(tid, rid.page_id, Perm::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(vec![page])
    }

    /// A page-sequential scan over the file on behalf of `tid`. The scan
    /// fetches every page through the buffer pool, so it sees pages the
    /// transaction itself has dirtied. The page count is captured here;
    /// pages appended after this call are picked up by the next `scan`.
    pub fn scan(&self, pool: Arc<BufferPool>, tid: TransactionId) -> Result<HeapScan> {
        Ok(HeapScan {
            pool,
            tid,
            table_id: self.table_id,
            page_count: self.num_pages()?,
            next_page_no: None,
            tuples: None,
            is_open: false,
        })
    }
}

/// A page-by-page cursor over one heap file.
///
/// Starts closed: `has_next` reports false and `next` fails until `open` is
/// called. While open, pages are fetched lazily with read permission as the
/// cursor crosses page boundaries.
pub struct HeapScan {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    table_id: TableId,
    page_count: u32,
    next_page_no: Option<u32>,
    tuples: Option<Peekable<vec::IntoIter<Tuple>>>,
    is_open: bool,
}

impl HeapScan {
    pub fn open(&mut self) {
        self.is_open = true;
    }

    pub fn has_next(&mut self) -> Result<bool> {
        if !self.is_open {
            return Ok(false);
        }
        loop {
            if let Some(tuples) = self.tuples.as_mut() {
                if tuples.peek().is_some() {
                    return Ok(true);
                }
            }
            let next = match self.next_page_no {
                None => 0,
                Some(n) => n + 1,
            };
            if next >= self.page_count {
                return Ok(false);
            }
            self.next_page_no = Some(next);

            let pid = HeapPageId::new(self.table_id, next);
            let page = self.pool.get_page(self.tid, pid, Perm::ReadOnly)?;
            let tuples: Vec<Tuple> = page.read().iter().cloned().collect();
            self.tuples = Some(tuples.into_iter().peekable());
        }
    }

    pub fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(StorageError::NoSuchElement);
        }
        self.tuples
            .as_mut()
            .and_then(|tuples| tuples.next())
            .ok_or(StorageError::NoSuchElement)
    }

    pub fn rewind(&mut self) {
        self.close();
        self.open();
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.next_page_no = None;
        self.tuples = None;
    }
}
