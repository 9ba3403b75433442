/// A SimpleDB Log Sequence Number.
pub type Lsn = i32;

/// A transaction identifier, durable across process restarts (see
/// `tx::transaction::next_txnum`).
pub type TxNum = i32;

pub mod buffer;
pub mod db;
pub mod error;
pub mod file;
pub mod log;
pub mod tx;

pub use db::{DbConfig, SimpleDb};
pub use error::DbError;
