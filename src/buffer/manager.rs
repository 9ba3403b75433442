use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::DbError;
use crate::file::{BlockId, FileMgr};
use crate::log::LogMgr;
use crate::TxNum;

use super::buffer::Buffer;

const MAX_WAIT: Duration = Duration::from_secs(10);

struct Pool {
    buffers: Vec<Buffer>,
    num_available: usize,
    clock_hand: usize,
}

/// A fixed-size cache of pages. Pins blocks into buffers and evicts
/// unpinned buffers via a one-handed clock sweep. Enforces WAL on
/// flush through `Buffer::flush`.
pub struct BufferMgr {
    state: Mutex<Pool>,
    cond: Condvar,
}

impl BufferMgr {
    pub fn new(file_mgr: Arc<FileMgr>, log_mgr: Arc<LogMgr>, num_buffers: usize) -> Self {
        let buffers = (0..num_buffers)
            .map(|_| Buffer::new(Arc::clone(&file_mgr), Arc::clone(&log_mgr)))
            .collect();

        Self {
            state: Mutex::new(Pool {
                buffers,
                num_available: num_buffers,
                clock_hand: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn available(&self) -> usize {
        self.state.lock().unwrap().num_available
    }

    /// Pins `block`, blocking up to 10 seconds for a free buffer.
    pub fn pin(&self, block: &BlockId) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let deadline = Instant::now() + MAX_WAIT;

        loop {
            if let Some(idx) = self.try_to_pin(block, &mut state) {
                return Ok(idx);
            }

            let now = Instant::now();
            if now >= deadline {
                ::log::warn!("buffer pin timed out waiting for a free buffer for {}", block);
                return Err(DbError::BufferAbort.into());
            }

            let (new_state, _) = self
                .cond
                .wait_timeout(state, deadline - now)
                .map_err(|_| DbError::BufferAbort)?;
            state = new_state;
        }
    }

    pub fn unpin(&self, idx: usize) {
        let mut state = self.state.lock().unwrap();
        state.buffers[idx].unpin();
        if !state.buffers[idx].is_pinned() {
            state.num_available += 1;
            self.cond.notify_all();
        }
    }

    pub fn flush_all(&self, txnum: TxNum) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for buf in state.buffers.iter_mut() {
            if buf.modifying_txnum() == Some(txnum) {
                buf.flush()?;
            }
        }
        Ok(())
    }

    /// Runs `f` against the buffer currently at `idx`, under the pool
    /// lock. Higher layers (`Transaction`) use this to read/write a
    /// pinned buffer's page without exposing the pool's internals.
    pub fn with_buffer<T>(&self, idx: usize, f: impl FnOnce(&mut Buffer) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state.buffers[idx])
    }

    fn try_to_pin(&self, block: &BlockId, state: &mut Pool) -> Option<usize> {
        if let Some(idx) = Self::find_existing_buffer(block, state) {
            if !state.buffers[idx].is_pinned() {
                state.num_available -= 1;
            }
            state.buffers[idx].pin();
            return Some(idx);
        }

        let idx = self.choose_victim(state)?;
        state.buffers[idx].assign_to_block(block.clone()).ok()?;
        state.num_available -= 1;
        state.buffers[idx].pin();
        Some(idx)
    }

    fn find_existing_buffer(block: &BlockId, state: &Pool) -> Option<usize> {
        state
            .buffers
            .iter()
            .position(|buf| buf.block() == Some(block))
    }

    /// One-handed clock sweep: starting at the hand, inspect at most
    /// `len` buffers circularly and return the first unpinned one,
    /// advancing the hand to just past the chosen victim. Returns
    /// `None` if a full sweep finds nothing unpinned.
    fn choose_victim(&self, state: &mut Pool) -> Option<usize> {
        let len = state.buffers.len();
        if len == 0 {
            return None;
        }

        for step in 0..len {
            let idx = (state.clock_hand + step) % len;
            if !state.buffers[idx].is_pinned() {
                state.clock_hand = (idx + 1) % len;
                return Some(idx);
            }
        }
        None
    }
}
