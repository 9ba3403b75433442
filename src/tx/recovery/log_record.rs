use core::fmt;
use std::mem;

use anyhow::Result;
use num_enum::TryFromPrimitive;
use thiserror::Error;

use crate::file::{BlockId, Page};
use crate::tx::transaction::Transaction;
use crate::{Lsn, TxNum};

use super::manager::LogMgr;

#[derive(Debug, Error)]
#[error("unknown log operation code: {0}")]
struct UnknownLogOperation(i32);

#[derive(Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(i32)]
pub enum LogOperation {
    Checkpoint = 0,
    Start = 1,
    Commit = 2,
    Rollback = 3,
    SetInt = 4,
    SetString = 5,
}

/// A logged operation, recoverable from its on-disk byte encoding.
/// `Checkpoint`, `Start`, `Commit` and `Rollback` carry nothing to undo;
/// `SetInt`/`SetString` restore the before-image they captured.
pub trait LogRecord: fmt::Display {
    fn op(&self) -> LogOperation;
    fn tx_number(&self) -> TxNum;
    fn undo(&self, tx: &mut Transaction) -> Result<()>;
}

pub fn create_log_record(bytes: Vec<u8>) -> Result<Box<dyn LogRecord>> {
    let mut p = Page::from_bytes(bytes);
    let value = p.get_int(0)?;
    let op = LogOperation::try_from(value).map_err(|e| UnknownLogOperation(e.number))?;
    Ok(match op {
        LogOperation::Checkpoint => Box::new(CheckpointRecord),
        LogOperation::Start => Box::new(StartRecord::new(&mut p)?),
        LogOperation::Commit => Box::new(CommitRecord::new(&mut p)?),
        LogOperation::Rollback => Box::new(RollbackRecord::new(&mut p)?),
        LogOperation::SetInt => Box::new(SetIntRecord::new(&mut p)?),
        LogOperation::SetString => Box::new(SetStringRecord::new(&mut p)?),
    })
}

pub struct CheckpointRecord;

impl CheckpointRecord {
    pub fn write_to_log(log_mgr: &LogMgr) -> Result<Lsn> {
        let mut p = Page::new(mem::size_of::<i32>());
        p.set_int(0, LogOperation::Checkpoint as i32)?;
        log_mgr.append(&record_bytes(&mut p))
    }
}

impl fmt::Display for CheckpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<CHECKPOINT>")
    }
}

impl LogRecord for CheckpointRecord {
    fn op(&self) -> LogOperation {
        LogOperation::Checkpoint
    }

    fn tx_number(&self) -> TxNum {
        -1
    }

    fn undo(&self, _tx: &mut Transaction) -> Result<()> {
        Ok(())
    }
}

pub struct StartRecord {
    txnum: TxNum,
}

impl StartRecord {
    fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        Ok(Self {
            txnum: p.get_int(tpos)?,
        })
    }

    pub fn write_to_log(log_mgr: &LogMgr, txnum: TxNum) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let mut p = Page::new(tpos + mem::size_of::<i32>());
        p.set_int(0, LogOperation::Start as i32)?;
        p.set_int(tpos, txnum)?;
        log_mgr.append(&record_bytes(&mut p))
    }
}

impl fmt::Display for StartRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<START {}>", self.txnum)
    }
}

impl LogRecord for StartRecord {
    fn op(&self) -> LogOperation {
        LogOperation::Start
    }

    fn tx_number(&self) -> TxNum {
        self.txnum
    }

    fn undo(&self, _tx: &mut Transaction) -> Result<()> {
        Ok(())
    }
}

pub struct CommitRecord {
    txnum: TxNum,
}

impl CommitRecord {
    fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        Ok(Self {
            txnum: p.get_int(tpos)?,
        })
    }

    pub fn write_to_log(log_mgr: &LogMgr, txnum: TxNum) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let mut p = Page::new(tpos + mem::size_of::<i32>());
        p.set_int(0, LogOperation::Commit as i32)?;
        p.set_int(tpos, txnum)?;
        log_mgr.append(&record_bytes(&mut p))
    }
}

impl fmt::Display for CommitRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<COMMIT {}>", self.txnum)
    }
}

impl LogRecord for CommitRecord {
    fn op(&self) -> LogOperation {
        LogOperation::Commit
    }

    fn tx_number(&self) -> TxNum {
        self.txnum
    }

    fn undo(&self, _tx: &mut Transaction) -> Result<()> {
        Ok(())
    }
}

pub struct RollbackRecord {
    txnum: TxNum,
}

impl RollbackRecord {
    fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        Ok(Self {
            txnum: p.get_int(tpos)?,
        })
    }

    pub fn write_to_log(log_mgr: &LogMgr, txnum: TxNum) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let mut p = Page::new(tpos + mem::size_of::<i32>());
        p.set_int(0, LogOperation::Rollback as i32)?;
        p.set_int(tpos, txnum)?;
        log_mgr.append(&record_bytes(&mut p))
    }
}

impl fmt::Display for RollbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<ROLLBACK {}>", self.txnum)
    }
}

impl LogRecord for RollbackRecord {
    fn op(&self) -> LogOperation {
        LogOperation::Rollback
    }

    fn tx_number(&self) -> TxNum {
        self.txnum
    }

    fn undo(&self, _tx: &mut Transaction) -> Result<()> {
        Ok(())
    }
}

pub struct SetIntRecord {
    txnum: TxNum,
    block: BlockId,
    offset: usize,
    val: i32,
}

impl SetIntRecord {
    fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        let txnum = p.get_int(tpos)?;
        let fpos = tpos + mem::size_of::<i32>();
        let filename = p.get_string(fpos)?;
        let bpos = fpos + Page::max_length(filename.len());
        let block_number = p.get_int(bpos)? as i64;
        let block = BlockId::new(filename, block_number);
        let opos = bpos + mem::size_of::<i32>();
        let offset = p.get_int(opos)? as usize;
        let vpos = opos + mem::size_of::<i32>();
        let val = p.get_int(vpos)?;

        Ok(Self {
            txnum,
            block,
            offset,
            val,
        })
    }

    /// Logs the SETINT operator followed by the transaction id, the
    /// modified block's filename/number/offset and the value *before*
    /// the write — undo restores exactly this value.
    pub fn write_to_log(
        log_mgr: &LogMgr,
        txnum: TxNum,
        block: &BlockId,
        offset: usize,
        old_val: i32,
    ) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let fpos = tpos + mem::size_of::<i32>();
        let bpos = fpos + Page::max_length(block.filename().len());
        let opos = bpos + mem::size_of::<i32>();
        let vpos = opos + mem::size_of::<i32>();
        let mut p = Page::new(vpos + mem::size_of::<i32>());
        p.set_int(0, LogOperation::SetInt as i32)?;
        p.set_int(tpos, txnum)?;
        p.set_string(fpos, block.filename())?;
        p.set_int(bpos, block.block_number() as i32)?;
        p.set_int(opos, offset as i32)?;
        p.set_int(vpos, old_val)?;
        log_mgr.append(&record_bytes(&mut p))
    }
}

impl fmt::Display for SetIntRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<SETINT {} {} {} {}>",
            self.txnum, self.block, self.offset, self.val
        )
    }
}

impl LogRecord for SetIntRecord {
    fn op(&self) -> LogOperation {
        LogOperation::SetInt
    }

    fn tx_number(&self) -> TxNum {
        self.txnum
    }

    fn undo(&self, tx: &mut Transaction) -> Result<()> {
        tx.pin(&self.block)?;
        tx.set_int(&self.block, self.offset, self.val, false)?;
        tx.unpin(&self.block)?;
        Ok(())
    }
}

pub struct SetStringRecord {
    txnum: TxNum,
    block: BlockId,
    offset: usize,
    val: String,
}

impl SetStringRecord {
    fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        let txnum = p.get_int(tpos)?;
        let fpos = tpos + mem::size_of::<i32>();
        let filename = p.get_string(fpos)?;
        let bpos = fpos + Page::max_length(filename.len());
        let block_number = p.get_int(bpos)? as i64;
        let block = BlockId::new(filename, block_number);
        let opos = bpos + mem::size_of::<i32>();
        let offset = p.get_int(opos)? as usize;
        let vpos = opos + mem::size_of::<i32>();
        let val = p.get_string(vpos)?;

        Ok(Self {
            txnum,
            block,
            offset,
            val,
        })
    }

    pub fn write_to_log(
        log_mgr: &LogMgr,
        txnum: TxNum,
        block: &BlockId,
        offset: usize,
        old_val: &str,
    ) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let fpos = tpos + mem::size_of::<i32>();
        let bpos = fpos + Page::max_length(block.filename().len());
        let opos = bpos + mem::size_of::<i32>();
        let vpos = opos + mem::size_of::<i32>();
        let mut p = Page::new(vpos + Page::max_length(old_val.len()));
        p.set_int(0, LogOperation::SetString as i32)?;
        p.set_int(tpos, txnum)?;
        p.set_string(fpos, block.filename())?;
        p.set_int(bpos, block.block_number() as i32)?;
        p.set_int(opos, offset as i32)?;
        p.set_string(vpos, old_val)?;
        log_mgr.append(&record_bytes(&mut p))
    }
}

impl fmt::Display for SetStringRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<SETSTRING {} {} {} {}>",
            self.txnum, self.block, self.offset, self.val
        )
    }
}

impl LogRecord for SetStringRecord {
    fn op(&self) -> LogOperation {
        LogOperation::SetString
    }

    fn tx_number(&self) -> TxNum {
        self.txnum
    }

    fn undo(&self, tx: &mut Transaction) -> Result<()> {
        tx.pin(&self.block)?;
        tx.set_string(&self.block, self.offset, &self.val, false)?;
        tx.unpin(&self.block)?;
        Ok(())
    }
}

fn record_bytes(p: &mut Page) -> Vec<u8> {
    p.contents().as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    use crate::file::FileMgr;
    use crate::log::LogMgr;

    fn setup() -> LogMgr {
        let dir = tempdir().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        LogMgr::new(fm, "simpledb.log").unwrap()
    }

    #[test]
    fn set_int_record_roundtrips_through_the_log() {
        let lm = setup();
        let block = BlockId::new("t.tbl", 3);
        SetIntRecord::write_to_log(&lm, 7, &block, 20, 99).unwrap();

        let mut iter = lm.iterator().unwrap();
        let bytes = iter.next().unwrap();
        let rec = create_log_record(bytes).unwrap();

        assert_eq!(rec.op(), LogOperation::SetInt);
        assert_eq!(rec.tx_number(), 7);
        assert_eq!(format!("{}", rec), format!("<SETINT 7 {} 20 99>", block));
    }

    #[test]
    fn checkpoint_record_has_no_owning_transaction() {
        let lm = setup();
        CheckpointRecord::write_to_log(&lm).unwrap();

        let mut iter = lm.iterator().unwrap();
        let rec = create_log_record(iter.next().unwrap()).unwrap();
        assert_eq!(rec.op(), LogOperation::Checkpoint);
        assert_eq!(rec.tx_number(), -1);
    }

    #[test]
    fn unknown_operation_code_is_rejected() {
        let mut p = Page::new(4);
        p.set_int(0, 99).unwrap();
        let bytes = p.contents().as_bytes().to_vec();
        assert!(create_log_record(bytes).is_err());
    }
}
