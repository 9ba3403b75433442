use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::file::BlockId;

use super::lock_table::LockTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeldLock {
    Shared,
    Exclusive,
}

/// Per-transaction cache over the global `LockTable`, enforcing strict
/// two-phase locking: a lock acquired here is never released until
/// `release()` is called, at commit or rollback.
pub struct ConcurrencyMgr {
    lock_table: Arc<LockTable>,
    locks: HashMap<BlockId, HeldLock>,
}

impl ConcurrencyMgr {
    pub fn new(lock_table: Arc<LockTable>) -> Self {
        Self {
            lock_table,
            locks: HashMap::new(),
        }
    }

    pub fn slock(&mut self, block: &BlockId) -> Result<()> {
        if self.locks.contains_key(block) {
            return Ok(());
        }
        self.lock_table.slock(block)?;
        self.locks.insert(block.clone(), HeldLock::Shared);
        Ok(())
    }

    pub fn xlock(&mut self, block: &BlockId) -> Result<()> {
        if self.locks.get(block) == Some(&HeldLock::Exclusive) {
            return Ok(());
        }
        self.slock(block)?;
        self.lock_table.xlock(block)?;
        self.locks.insert(block.clone(), HeldLock::Exclusive);
        Ok(())
    }

    /// Unlocks every block this transaction holds. Called exactly once,
    /// at commit or rollback.
    pub fn release(&mut self) {
        for block in self.locks.keys() {
            self.lock_table.unlock(block);
        }
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slock_is_idempotent() {
        let lt = Arc::new(LockTable::new());
        let mut cm = ConcurrencyMgr::new(lt);
        let b = BlockId::new("t.tbl", 0);

        cm.slock(&b).unwrap();
        cm.slock(&b).unwrap();
        assert_eq!(cm.locks.get(&b), Some(&HeldLock::Shared));
    }

    #[test]
    fn xlock_upgrades_from_shared() {
        let lt = Arc::new(LockTable::new());
        let mut cm = ConcurrencyMgr::new(lt);
        let b = BlockId::new("t.tbl", 0);

        cm.slock(&b).unwrap();
        cm.xlock(&b).unwrap();
        assert_eq!(cm.locks.get(&b), Some(&HeldLock::Exclusive));
    }

    #[test]
    fn second_transaction_blocked_by_first_xlock() {
        let lt = Arc::new(LockTable::new());
        let mut cm1 = ConcurrencyMgr::new(Arc::clone(&lt));
        let mut cm2 = ConcurrencyMgr::new(Arc::clone(&lt));
        let b = BlockId::new("t.tbl", 0);

        cm1.xlock(&b).unwrap();
        assert!(cm2.slock(&b).is_err());
    }

    #[test]
    fn release_allows_others_to_proceed() {
        let lt = Arc::new(LockTable::new());
        let mut cm1 = ConcurrencyMgr::new(Arc::clone(&lt));
        let mut cm2 = ConcurrencyMgr::new(Arc::clone(&lt));
        let b = BlockId::new("t.tbl", 0);

        cm1.xlock(&b).unwrap();
        cm1.release();
        assert!(cm2.xlock(&b).is_ok());
    }
}
