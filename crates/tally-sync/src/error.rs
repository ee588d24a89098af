use thiserror::Error;

use tally_ledger::LedgerError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not logged in to the sink")]
    NotLoggedIn,

    #[error("malformed remote note {note:?}: {reason}")]
    MalformedRemoteNote { note: String, reason: String },

    #[error("category group not found: {0}")]
    CategoryGroupMissing(String),

    #[error("account not tracked: {0}")]
    UnknownAccount(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl SyncError {
    /// True for errors that end the run rather than a single call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedRemoteNote { .. })
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
