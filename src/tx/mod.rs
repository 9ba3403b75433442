pub mod bufferlist;
pub mod concurrency;
pub mod recovery;
pub mod transaction;

pub use bufferlist::BufferList;
pub use transaction::Transaction;
