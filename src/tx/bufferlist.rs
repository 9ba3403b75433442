use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::buffer::BufferMgr;
use crate::file::BlockId;

/// Tracks which buffers this transaction currently has pinned, so
/// `unpin_all` can release them all at commit or rollback without the
/// caller having to remember every block it touched.
pub struct BufferList {
    buffer_mgr: Arc<BufferMgr>,
    buffers: HashMap<BlockId, usize>,
    pins: Vec<BlockId>,
}

impl BufferList {
    pub fn new(buffer_mgr: Arc<BufferMgr>) -> Self {
        Self {
            buffer_mgr,
            buffers: HashMap::new(),
            pins: Vec::new(),
        }
    }

    pub fn buffer_idx(&self, block: &BlockId) -> Option<usize> {
        self.buffers.get(block).copied()
    }

    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        let idx = self.buffer_mgr.pin(block)?;
        self.buffers.insert(block.clone(), idx);
        self.pins.push(block.clone());
        Ok(())
    }

    pub fn unpin(&mut self, block: &BlockId) {
        if let Some(&idx) = self.buffers.get(block) {
            self.buffer_mgr.unpin(idx);
            self.pins.retain(|b| b != block);
            if !self.pins.contains(block) {
                self.buffers.remove(block);
            }
        }
    }

    pub fn unpin_all(&mut self) {
        for block in &self.pins {
            if let Some(&idx) = self.buffers.get(block) {
                self.buffer_mgr.unpin(idx);
            }
        }
        self.buffers.clear();
        self.pins.clear();
    }
}
