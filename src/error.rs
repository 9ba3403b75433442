use thiserror::Error;

/// The two abort kinds a higher layer is expected to catch and respond
/// to by rolling back the transaction. Everything else (I/O failure,
/// out-of-bounds page access) is fatal and unwinds the call.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("buffer abort: no buffer became available within the timeout")]
    BufferAbort,

    #[error("lock abort: lock request timed out or was interrupted")]
    LockAbort,
}

impl DbError {
    /// True for the two kinds a caller should respond to with rollback,
    /// as opposed to a fatal I/O or bounds failure further down the chain.
    pub fn is_abort(err: &anyhow::Error) -> bool {
        err.downcast_ref::<DbError>().is_some()
    }
}
