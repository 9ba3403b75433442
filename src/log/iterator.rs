use anyhow::Result;
use std::sync::Arc;

use crate::file::{BlockId, FileMgr, Page};

/// Walks the log newest-first. Records were laid down right-to-left
/// within each block, so a forward scan of the occupied region of a
/// block yields that block's records newest-first; once a block is
/// exhausted the iterator steps to the previous block number.
pub struct LogIterator {
    file_mgr: Arc<FileMgr>,
    block: BlockId,
    page: Page,
    current_pos: usize,
    exhausted: bool,
}

impl LogIterator {
    pub(super) fn new(file_mgr: Arc<FileMgr>, block: BlockId) -> Result<Self> {
        let block_size = file_mgr.block_size();
        let mut iter = Self {
            file_mgr,
            block,
            page: Page::new(block_size),
            current_pos: 0,
            exhausted: false,
        };
        iter.move_to_block(iter.block.clone())?;
        Ok(iter)
    }

    fn move_to_block(&mut self, block: BlockId) -> Result<()> {
        self.file_mgr.read(&block, &mut self.page)?;
        self.block = block;
        self.current_pos = self.page.get_int(0)? as usize;
        Ok(())
    }
}

impl Iterator for LogIterator {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        if self.current_pos == self.file_mgr.block_size() {
            if self.block.block_number() == 0 {
                self.exhausted = true;
                return None;
            }
            let prev = BlockId::new(self.block.filename(), self.block.block_number() - 1);
            self.move_to_block(prev).ok()?;
        }

        let rec = self.page.get_bytes(self.current_pos).ok()?;
        self.current_pos += std::mem::size_of::<i32>() + rec.len();
        Some(rec)
    }
}
