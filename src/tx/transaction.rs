use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ::log::debug;
use anyhow::{anyhow, Result};

use crate::buffer::BufferMgr;
use crate::file::{BlockId, FileMgr, Page};
use crate::log::LogMgr;
use crate::TxNum;

use super::bufferlist::BufferList;
use super::concurrency::{ConcurrencyMgr, LockTable};
use super::recovery::RecoveryMgr;

const TXN_SEQ_FILE: &str = "txn_seq";

/// Serializes the read-modify-write of `txn_seq` across threads of this
/// process; `FileMgr`'s own lock only covers one I/O call at a time, not
/// the whole increment.
static TXN_SEQ_LOCK: Mutex<()> = Mutex::new(());

/// Mints a durable, strictly increasing transaction id. Stored as a
/// single `i32` at offset 0 of block 0 of `txn_seq`, so a fresh process
/// resumes numbering after the highest id any prior process committed —
/// an in-process counter reseeded at zero would violate that on restart.
fn next_txnum(file_mgr: &FileMgr) -> Result<TxNum> {
    let _guard = TXN_SEQ_LOCK.lock().unwrap();
    let block = BlockId::new(TXN_SEQ_FILE, 0);
    let mut page = Page::new(file_mgr.block_size());

    if file_mgr.length(TXN_SEQ_FILE)? == 0 {
        file_mgr.append(TXN_SEQ_FILE)?;
        page.set_int(0, 0)?;
    } else {
        file_mgr.read(&block, &mut page)?;
    }

    let txnum = page.get_int(0)? + 1;
    page.set_int(0, txnum)?;
    file_mgr.write(&block, &mut page)?;
    Ok(txnum)
}

/// Coordinates recovery, concurrency control, and buffer pinning for one
/// client transaction, providing the ACID surface the storage layer
/// exposes upward: reads and writes go through here, never directly
/// through `BufferMgr`.
pub struct Transaction {
    recovery_mgr: RecoveryMgr,
    concurrency_mgr: ConcurrencyMgr,
    buffer_mgr: Arc<BufferMgr>,
    file_mgr: Arc<FileMgr>,
    buffers: BufferList,
    txnum: TxNum,
    /// Files this transaction has appended to, mapped to their length
    /// before the first append — rolled back by truncation if this
    /// transaction aborts.
    appended: HashMap<String, i64>,
}

impl Transaction {
    pub fn new(
        file_mgr: Arc<FileMgr>,
        log_mgr: Arc<LogMgr>,
        buffer_mgr: Arc<BufferMgr>,
        lock_table: Arc<LockTable>,
    ) -> Result<Self> {
        let txnum = next_txnum(&file_mgr)?;
        let recovery_mgr = RecoveryMgr::new(Arc::clone(&log_mgr), Arc::clone(&buffer_mgr), txnum)?;
        let concurrency_mgr = ConcurrencyMgr::new(lock_table);
        let buffers = BufferList::new(Arc::clone(&buffer_mgr));

        debug!("started transaction {}", txnum);
        Ok(Self {
            recovery_mgr,
            concurrency_mgr,
            buffer_mgr,
            file_mgr,
            buffers,
            txnum,
            appended: HashMap::new(),
        })
    }

    pub fn commit(&mut self) -> Result<()> {
        self.recovery_mgr.commit()?;
        self.concurrency_mgr.release();
        self.buffers.unpin_all();
        self.appended.clear();
        debug!("committed transaction {}", self.txnum);
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        let recovery_mgr = self.recovery_mgr.clone();
        recovery_mgr.rollback(self)?;
        self.concurrency_mgr.release();
        self.buffers.unpin_all();
        for (filename, original_len) in self.appended.drain() {
            self.file_mgr.truncate(&filename, original_len)?;
        }
        debug!("rolled back transaction {}", self.txnum);
        Ok(())
    }

    /// Undoes every uncompleted transaction in the log and writes a
    /// quiescent checkpoint. Called once, by a bootstrap transaction, at
    /// engine startup before any client transaction begins.
    pub fn recover(&mut self) -> Result<()> {
        self.buffer_mgr.flush_all(self.txnum)?;
        let recovery_mgr = self.recovery_mgr.clone();
        recovery_mgr.recover(self)?;
        Ok(())
    }

    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        self.buffers.pin(block)
    }

    pub fn unpin(&mut self, block: &BlockId) -> Result<()> {
        self.buffers.unpin(block);
        Ok(())
    }

    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> Result<i32> {
        self.concurrency_mgr.slock(block)?;
        let idx = self.pinned_idx(block)?;
        self.buffer_mgr
            .with_buffer(idx, |buf| buf.contents().get_int(offset))
    }

    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> Result<String> {
        self.concurrency_mgr.slock(block)?;
        let idx = self.pinned_idx(block)?;
        self.buffer_mgr
            .with_buffer(idx, |buf| buf.contents().get_string(offset))
    }

    pub fn set_int(
        &mut self,
        block: &BlockId,
        offset: usize,
        val: i32,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency_mgr.xlock(block)?;
        let idx = self.pinned_idx(block)?;
        let recovery_mgr = &self.recovery_mgr;
        let txnum = self.txnum;
        self.buffer_mgr.with_buffer(idx, |buf| {
            let lsn = if ok_to_log {
                Some(recovery_mgr.log_set_int(buf, offset)?)
            } else {
                None
            };
            buf.contents().set_int(offset, val)?;
            buf.set_modified(txnum, lsn);
            Ok(())
        })
    }

    pub fn set_string(
        &mut self,
        block: &BlockId,
        offset: usize,
        val: &str,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency_mgr.xlock(block)?;
        let idx = self.pinned_idx(block)?;
        let recovery_mgr = &self.recovery_mgr;
        let txnum = self.txnum;
        self.buffer_mgr.with_buffer(idx, |buf| {
            let lsn = if ok_to_log {
                Some(recovery_mgr.log_set_string(buf, offset)?)
            } else {
                None
            };
            buf.contents().set_string(offset, val)?;
            buf.set_modified(txnum, lsn);
            Ok(())
        })
    }

    /// Number of blocks currently in `filename`. Takes an S-lock on the
    /// file's end-of-file sentinel block first, so concurrent appends
    /// can't race a reader mid-count.
    pub fn size(&mut self, filename: &str) -> Result<i64> {
        let dummy = BlockId::end_of_file(filename);
        self.concurrency_mgr.slock(&dummy)?;
        self.file_mgr.length(filename)
    }

    /// Appends a new block to `filename` and returns its `BlockId`.
    /// Takes an X-lock on the end-of-file sentinel first. Records the
    /// file's pre-append length the first time this transaction appends
    /// to it, so `rollback` can truncate the extension away.
    pub fn append(&mut self, filename: &str) -> Result<BlockId> {
        let dummy = BlockId::end_of_file(filename);
        self.concurrency_mgr.xlock(&dummy)?;
        if !self.appended.contains_key(filename) {
            let original_len = self.file_mgr.length(filename)?;
            self.appended.insert(filename.to_string(), original_len);
        }
        self.file_mgr.append(filename)
    }

    pub fn block_size(&self) -> usize {
        self.file_mgr.block_size()
    }

    pub fn available_buffers(&self) -> usize {
        self.buffer_mgr.available()
    }

    fn pinned_idx(&self, block: &BlockId) -> Result<usize> {
        self.buffers
            .buffer_idx(block)
            .ok_or_else(|| anyhow!("block {} is not pinned by this transaction", block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (Arc<FileMgr>, Arc<LogMgr>, Arc<BufferMgr>, Arc<LockTable>) {
        let dir = tempdir().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "simpledb.log").unwrap());
        let bm = Arc::new(BufferMgr::new(Arc::clone(&fm), Arc::clone(&lm), 8));
        let lt = Arc::new(LockTable::new());
        (fm, lm, bm, lt)
    }

    #[test]
    fn commit_then_read_back_in_a_new_transaction() {
        let (fm, lm, bm, lt) = setup();
        let block = BlockId::new("testfile", 1);

        let mut tx1 = Transaction::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            Arc::clone(&bm),
            Arc::clone(&lt),
        )
        .unwrap();
        tx1.pin(&block).unwrap();
        tx1.set_int(&block, 80, 1, false).unwrap();
        tx1.set_string(&block, 40, "one", false).unwrap();
        tx1.commit().unwrap();

        let mut tx2 = Transaction::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            Arc::clone(&bm),
            Arc::clone(&lt),
        )
        .unwrap();
        tx2.pin(&block).unwrap();
        assert_eq!(tx2.get_int(&block, 80).unwrap(), 1);
        assert_eq!(tx2.get_string(&block, 40).unwrap(), "one");
        tx2.commit().unwrap();
    }

    #[test]
    fn rollback_restores_value_written_before_it() {
        let (fm, lm, bm, lt) = setup();
        let block = BlockId::new("testfile", 1);

        let mut tx1 = Transaction::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            Arc::clone(&bm),
            Arc::clone(&lt),
        )
        .unwrap();
        tx1.pin(&block).unwrap();
        tx1.set_int(&block, 80, 1, false).unwrap();
        tx1.commit().unwrap();

        let mut tx2 = Transaction::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            Arc::clone(&bm),
            Arc::clone(&lt),
        )
        .unwrap();
        tx2.pin(&block).unwrap();
        tx2.set_int(&block, 80, 9999, true).unwrap();
        assert_eq!(tx2.get_int(&block, 80).unwrap(), 9999);
        tx2.rollback().unwrap();

        let mut tx3 = Transaction::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            Arc::clone(&bm),
            Arc::clone(&lt),
        )
        .unwrap();
        tx3.pin(&block).unwrap();
        assert_eq!(tx3.get_int(&block, 80).unwrap(), 1);
        tx3.commit().unwrap();
    }

    #[test]
    fn rollback_truncates_blocks_appended_by_this_transaction() {
        let (fm, lm, bm, lt) = setup();

        let mut tx1 =
            Transaction::new(Arc::clone(&fm), Arc::clone(&lm), Arc::clone(&bm), Arc::clone(&lt))
                .unwrap();
        assert_eq!(tx1.size("growable.tbl").unwrap(), 0);
        tx1.append("growable.tbl").unwrap();
        tx1.append("growable.tbl").unwrap();
        assert_eq!(tx1.size("growable.tbl").unwrap(), 2);
        tx1.rollback().unwrap();

        let mut tx2 =
            Transaction::new(Arc::clone(&fm), Arc::clone(&lm), Arc::clone(&bm), Arc::clone(&lt))
                .unwrap();
        assert_eq!(tx2.size("growable.tbl").unwrap(), 0);
        tx2.commit().unwrap();
    }

    #[test]
    fn txnums_survive_a_fresh_filemgr_over_the_same_directory() {
        let dir = tempdir().unwrap();
        let fm1 = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let first = next_txnum(&fm1).unwrap();
        let second = next_txnum(&fm1).unwrap();
        assert!(second > first);

        let fm2 = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let third = next_txnum(&fm2).unwrap();
        assert!(third > second);
    }
}
