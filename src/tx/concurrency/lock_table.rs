use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::DbError;
use crate::file::BlockId;

const MAX_WAIT: Duration = Duration::from_secs(10);

struct State {
    /// `val == 0` unlocked, `val > 0` shared-holder count, `val == -1`
    /// exclusively held. Entries are removed once unlocked rather than
    /// left at 0, so the map only holds currently-contended blocks.
    vals: HashMap<BlockId, i32>,
}

/// Process-global, block-granular lock table. Every block shares one
/// `(Mutex<State>, Condvar)` pair rather than one monitor per block, so
/// a single `Mutex` briefly guards lookup/insert; the `val` counter and
/// the wait itself are what callers actually contend on, and a timeout
/// on one block never blocks progress on another.
pub struct LockTable {
    state: Mutex<State>,
    cond: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                vals: HashMap::new(),
            }),
            cond: Condvar::new(),
        }
    }

    pub fn slock(&self, block: &BlockId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let deadline = Instant::now() + MAX_WAIT;

        while *state.vals.get(block).unwrap_or(&0) < 0 {
            let now = Instant::now();
            if now >= deadline {
                return Err(DbError::LockAbort.into());
            }
            let (new_state, _) = self
                .cond
                .wait_timeout(state, deadline - now)
                .map_err(|_| DbError::LockAbort)?;
            state = new_state;
        }

        *state.vals.entry(block.clone()).or_insert(0) += 1;
        Ok(())
    }

    /// Precondition: the caller already holds an S-lock on `block`
    /// (`val == 1`, meaning "shared by myself only") — this is how
    /// upgrade works.
    pub fn xlock(&self, block: &BlockId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let deadline = Instant::now() + MAX_WAIT;

        while {
            let val = *state.vals.get(block).unwrap_or(&0);
            val > 1 || val < 0
        } {
            let now = Instant::now();
            if now >= deadline {
                return Err(DbError::LockAbort.into());
            }
            let (new_state, _) = self
                .cond
                .wait_timeout(state, deadline - now)
                .map_err(|_| DbError::LockAbort)?;
            state = new_state;
        }

        state.vals.insert(block.clone(), -1);
        Ok(())
    }

    pub fn unlock(&self, block: &BlockId) {
        let mut state = self.state.lock().unwrap();
        let val = *state.vals.get(block).unwrap_or(&0);
        if val > 1 {
            state.vals.insert(block.clone(), val - 1);
        } else {
            state.vals.remove(block);
            self.cond.notify_all();
        }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
