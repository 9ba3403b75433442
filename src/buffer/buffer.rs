use anyhow::Result;
use std::sync::Arc;

use crate::file::{BlockId, FileMgr, Page};
use crate::log::LogMgr;
use crate::{Lsn, TxNum};

/// Wraps a page-sized buffer and tracks the block currently assigned to
/// it, its pin count, and — if dirty — which transaction last modified
/// it and the LSN that justifies that modification.
pub struct Buffer {
    file_mgr: Arc<FileMgr>,
    log_mgr: Arc<LogMgr>,
    contents: Page,
    block: Option<BlockId>,
    pins: u32,
    modifying_txnum: Option<TxNum>,
    modified_lsn: Option<Lsn>,
}

impl Buffer {
    pub fn new(file_mgr: Arc<FileMgr>, log_mgr: Arc<LogMgr>) -> Self {
        let block_size = file_mgr.block_size();
        Self {
            file_mgr,
            log_mgr,
            contents: Page::new(block_size),
            block: None,
            pins: 0,
            modifying_txnum: None,
            modified_lsn: None,
        }
    }

    pub fn contents(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    pub fn modifying_txnum(&self) -> Option<TxNum> {
        self.modifying_txnum
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    pub fn pin(&mut self) {
        self.pins += 1;
    }

    pub fn unpin(&mut self) {
        self.pins = self.pins.saturating_sub(1);
    }

    /// Records that `txnum` modified this buffer's page via the log
    /// record at `lsn`. A `lsn` of `None` means the write was not
    /// logged (e.g. the very first write to a never-before-seen block).
    pub fn set_modified(&mut self, txnum: TxNum, lsn: Option<Lsn>) {
        self.modifying_txnum = Some(txnum);
        if lsn.is_some() {
            self.modified_lsn = lsn;
        }
    }

    /// Write-ahead logging: if dirty, flush the log up through this
    /// buffer's recorded LSN *before* writing the page to disk. Never
    /// recurses into another buffer's flush.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(_txnum) = self.modifying_txnum {
            if let Some(lsn) = self.modified_lsn {
                self.log_mgr.flush(lsn)?;
            }
            if let Some(block) = &self.block {
                self.file_mgr.write(block, &mut self.contents)?;
            }
            self.modifying_txnum = None;
        }
        Ok(())
    }

    /// Flushes any pending modification, then reassigns this buffer to
    /// `block`, reading its current contents from disk.
    pub fn assign_to_block(&mut self, block: BlockId) -> Result<()> {
        self.flush()?;
        self.file_mgr.read(&block, &mut self.contents)?;
        self.block = Some(block);
        self.pins = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileMgr;
    use crate::log::LogMgr;
    use tempfile::tempdir;

    fn setup() -> (Arc<FileMgr>, Arc<LogMgr>) {
        let dir = tempdir().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "simpledb.log").unwrap());
        (fm, lm)
    }

    #[test]
    fn unmodified_buffer_flush_is_noop() {
        let (fm, lm) = setup();
        let mut buf = Buffer::new(fm, lm);
        buf.assign_to_block(BlockId::new("t.tbl", 0)).unwrap();
        buf.flush().unwrap(); // should not panic or write spuriously
    }

    #[test]
    fn modified_buffer_flush_clears_dirty_flag() {
        let (fm, lm) = setup();
        let mut buf = Buffer::new(fm, lm);
        buf.assign_to_block(BlockId::new("t.tbl", 0)).unwrap();
        buf.contents().set_int(0, 7).unwrap();
        buf.set_modified(1, None);
        assert_eq!(buf.modifying_txnum(), Some(1));
        buf.flush().unwrap();
        assert_eq!(buf.modifying_txnum(), None);
    }

    #[test]
    fn pin_unpin_tracks_count() {
        let (fm, lm) = setup();
        let mut buf = Buffer::new(fm, lm);
        assert!(!buf.is_pinned());
        buf.pin();
        buf.pin();
        assert!(buf.is_pinned());
        buf.unpin();
        assert!(buf.is_pinned());
        buf.unpin();
        assert!(!buf.is_pinned());
    }
}
