use thiserror::Error;

/// Errors produced by ledger model operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid rate table: {0}")]
    InvalidRateTable(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
