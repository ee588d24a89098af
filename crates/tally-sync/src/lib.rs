//! Synchronization engine for tally.
//!
//! Moves transactions from a source ledger into a sink ledger without
//! duplicating them, keeping all linkage state in a note on each sink
//! transaction:
//! - [`SinkClient`]: the async boundary to the sink
//! - [`Reconciler`]: login, per-month hydration, merge, and push
//! - [`SourceLedger`]: turns raw source records into account trees
//! - [`InMemorySink`]: a complete sink held in memory, loadable from a
//!   [`SinkSnapshot`]

pub mod error;
pub mod memory;
pub mod notes;
pub mod reconciler;
pub mod sink;
pub mod source;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use memory::{CallCounts, InMemorySink, SinkSnapshot};
pub use notes::NoteFields;
pub use reconciler::Reconciler;
pub use sink::{Category, CategoryGroup, NewAccount, NewTransaction, SinkAccount, SinkClient, SinkTransaction};
pub use source::{RawTransaction, SourceExport, SourceLedger};
pub use types::{AccountKind, Credentials, PlannedAction, PushReport, SyncOptions, SyncState};
