use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::file::{BlockId, FileMgr, Page};
use crate::Lsn;

use super::iterator::LogIterator;

/// The database's single append-only log file. Records are laid down
/// right-to-left within each block (see `append`), so a forward scan of
/// the block's occupied region reads them newest-first — exactly what
/// recovery needs.
pub struct LogMgr {
    file_mgr: Arc<FileMgr>,
    logfile: String,
    inner: Mutex<Inner>,
}

struct Inner {
    logpage: Page,
    current_block: BlockId,
    latest_lsn: Lsn,
    last_saved_lsn: Lsn,
}

impl LogMgr {
    pub fn new(file_mgr: Arc<FileMgr>, logfile: &str) -> Result<Self> {
        let block_size = file_mgr.block_size();
        let mut logpage = Page::new(block_size);
        let log_size = file_mgr.length(logfile)?;

        let current_block = if log_size == 0 {
            Self::append_new_block(&file_mgr, logfile, &mut logpage)?
        } else {
            let block = BlockId::new(logfile, log_size - 1);
            file_mgr.read(&block, &mut logpage)?;
            block
        };

        Ok(Self {
            file_mgr,
            logfile: logfile.to_string(),
            inner: Mutex::new(Inner {
                logpage,
                current_block,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Appends a record, growing into a fresh block if it would not fit
    /// before the boundary header. Returns the new record's LSN.
    pub fn append(&self, logrec: &[u8]) -> Result<Lsn> {
        let mut inner = self.inner.lock().unwrap();
        let int_bytes = std::mem::size_of::<i32>() as i32;
        let recsize = logrec.len() as i32;
        let bytes_needed = recsize + int_bytes;

        let mut boundary = inner.logpage.get_int(0)?;
        if boundary - bytes_needed < int_bytes {
            Self::do_flush(&self.file_mgr, &mut inner)?;
            inner.current_block =
                Self::append_new_block(&self.file_mgr, &self.logfile, &mut inner.logpage)?;
            boundary = inner.logpage.get_int(0)?;
        }

        let recpos = (boundary - bytes_needed) as usize;
        inner.logpage.set_bytes(recpos, logrec)?;
        inner.logpage.set_int(0, recpos as i32)?;
        inner.latest_lsn += 1;
        ::log::trace!("appended log record, lsn={}", inner.latest_lsn);
        Ok(inner.latest_lsn)
    }

    /// Ensures the record at `lsn` (and every record before it) is on
    /// disk.
    pub fn flush(&self, lsn: Lsn) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if lsn >= inner.last_saved_lsn {
            Self::do_flush(&self.file_mgr, &mut inner)?;
        }
        Ok(())
    }

    /// Flushes, then returns an iterator over every record currently on
    /// disk, newest-first.
    pub fn iterator(&self) -> Result<LogIterator> {
        let current_block = {
            let mut inner = self.inner.lock().unwrap();
            Self::do_flush(&self.file_mgr, &mut inner)?;
            inner.current_block.clone()
        };
        LogIterator::new(Arc::clone(&self.file_mgr), current_block)
    }

    fn do_flush(file_mgr: &FileMgr, inner: &mut Inner) -> Result<()> {
        file_mgr.write(&inner.current_block, &mut inner.logpage)?;
        inner.last_saved_lsn = inner.latest_lsn;
        ::log::debug!("flushed log through lsn={}", inner.last_saved_lsn);
        Ok(())
    }

    fn append_new_block(file_mgr: &FileMgr, logfile: &str, logpage: &mut Page) -> Result<BlockId> {
        let block = file_mgr.append(logfile)?;
        logpage.set_int(0, file_mgr.block_size() as i32)?;
        file_mgr.write(&block, logpage)?;
        Ok(block)
    }
}
