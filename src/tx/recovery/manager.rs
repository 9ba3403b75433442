use std::sync::Arc;

use anyhow::{bail, Result};

use crate::buffer::{Buffer, BufferMgr};
use crate::log::LogMgr;
use crate::tx::transaction::Transaction;
use crate::{Lsn, TxNum};

use super::log_record::{
    create_log_record, CheckpointRecord, CommitRecord, LogOperation, RollbackRecord, SetIntRecord,
    SetStringRecord, StartRecord,
};

/// Per-transaction recovery manager: logs before-images for undo, and
/// replays them on rollback or on startup recovery. No redo pass — every
/// committed write already reached disk via `Buffer::flush`'s WAL order.
#[derive(Clone)]
pub struct RecoveryMgr {
    log_mgr: Arc<LogMgr>,
    buffer_mgr: Arc<BufferMgr>,
    txnum: TxNum,
}

impl RecoveryMgr {
    pub fn new(log_mgr: Arc<LogMgr>, buffer_mgr: Arc<BufferMgr>, txnum: TxNum) -> Result<Self> {
        StartRecord::write_to_log(&log_mgr, txnum)?;
        Ok(Self {
            log_mgr,
            buffer_mgr,
            txnum,
        })
    }

    pub fn commit(&self) -> Result<()> {
        self.buffer_mgr.flush_all(self.txnum)?;
        let lsn = CommitRecord::write_to_log(&self.log_mgr, self.txnum)?;
        self.log_mgr.flush(lsn)?;
        Ok(())
    }

    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        self.do_rollback(tx)?;
        self.buffer_mgr.flush_all(self.txnum)?;
        let lsn = RollbackRecord::write_to_log(&self.log_mgr, self.txnum)?;
        self.log_mgr.flush(lsn)?;
        Ok(())
    }

    /// Undoes every uncompleted transaction found in the log, then writes
    /// a quiescent checkpoint. Called once, at engine startup.
    pub fn recover(&self, tx: &mut Transaction) -> Result<()> {
        self.do_recover(tx)?;
        self.buffer_mgr.flush_all(self.txnum)?;
        let lsn = CheckpointRecord::write_to_log(&self.log_mgr)?;
        self.log_mgr.flush(lsn)?;
        Ok(())
    }

    /// Logs the before-image of the int at `offset` in `buf` and returns
    /// the record's LSN, or `None` if `buf` is a block that has never
    /// itself been logged (the buffer's own caller judges whether that
    /// is safe, per `Transaction::set_int`'s `ok_to_log` flag).
    pub fn log_set_int(&self, buf: &mut Buffer, offset: usize) -> Result<Lsn> {
        let old_val = buf.contents().get_int(offset)?;
        match buf.block() {
            Some(block) => SetIntRecord::write_to_log(&self.log_mgr, self.txnum, block, offset, old_val),
            None => bail!("cannot log a write to an unassigned buffer"),
        }
    }

    pub fn log_set_string(&self, buf: &mut Buffer, offset: usize) -> Result<Lsn> {
        let old_val = buf.contents().get_string(offset)?;
        match buf.block() {
            Some(block) => {
                SetStringRecord::write_to_log(&self.log_mgr, self.txnum, block, offset, &old_val)
            }
            None => bail!("cannot log a write to an unassigned buffer"),
        }
    }

    /// Scans the log newest-first, undoing every record belonging to
    /// this transaction until its own START record is reached.
    fn do_rollback(&self, tx: &mut Transaction) -> Result<()> {
        for bytes in self.log_mgr.iterator()? {
            let rec = create_log_record(bytes)?;
            if rec.tx_number() == self.txnum {
                if rec.op() == LogOperation::Start {
                    return Ok(());
                }
                rec.undo(tx)?;
            }
        }
        Ok(())
    }

    /// Scans the log newest-first, undoing every record for a
    /// transaction not yet known to have committed or rolled back.
    /// Stops at the first CHECKPOINT record, or the end of the log.
    fn do_recover(&self, tx: &mut Transaction) -> Result<()> {
        let mut finished_txs = Vec::new();
        for bytes in self.log_mgr.iterator()? {
            let rec = create_log_record(bytes)?;
            match rec.op() {
                LogOperation::Checkpoint => return Ok(()),
                LogOperation::Commit | LogOperation::Rollback => finished_txs.push(rec.tx_number()),
                _ => {
                    if !finished_txs.contains(&rec.tx_number()) {
                        rec.undo(tx)?;
                    }
                }
            }
        }
        Ok(())
    }
}
