// Client
//
// Writer and reader halves of the append protocol. Transport, signing and
// batching belong to the external ledger and sit behind the `Submitter` and
// `PageSource` traits.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod reader;
pub mod writer;

pub use reader::{LogReader, PageSource, ReadError, ReadOutcome, ReadStop};
pub use writer::{Envelope, LogWriter, Submitter, WriteError};

/// Ledger-assigned identifier of a submitted request.
///
/// Used as the causal dependency of the next append to the same log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure talking to the external ledger.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("submission rejected: {0}")]
    Rejected(String),
}
