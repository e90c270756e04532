// Log Writer
//
// Builds append requests for one log, chains each to the previous one
// through a declared dependency, and hands them to the ledger transport.
// Retries are left to the caller.

use sha2::{Digest, Sha512};
use tracing::debug;

use super::{TransactionId, TransportError};
use crate::address::LogId;
use crate::config::LedgerConfig;
use crate::log::{AppendRequest, RequestError};
use crate::page::{validate_record, RecordError};

/// A request ready for signing and batching by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub family_name: String,
    pub family_version: String,
    /// Addresses read and written; the scheduler serializes overlapping
    /// requests on these.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Requests that must commit before this one.
    pub dependencies: Vec<TransactionId>,
    pub payload_sha512: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn payload_digest(payload: &[u8]) -> String {
        hex::encode(Sha512::digest(payload))
    }
}

/// Transport into the external ledger.
pub trait Submitter {
    fn submit(&self, envelope: &Envelope) -> Result<TransactionId, TransportError>;
}

impl<T: Submitter + ?Sized> Submitter for &T {
    fn submit(&self, envelope: &Envelope) -> Result<TransactionId, TransportError> {
        (**self).submit(envelope)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("payload encoding failed: {0}")]
    Encoding(#[from] RequestError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Append handle for a single log.
///
/// Appends must go through one writer per log: two writers without a shared
/// dependency token may commit out of order.
pub struct LogWriter<S> {
    submitter: S,
    config: LedgerConfig,
    log_id: LogId,
    last_transaction: Option<TransactionId>,
}

impl<S: Submitter> LogWriter<S> {
    /// `last_transaction` resumes the dependency chain of a previous run.
    pub fn new(
        submitter: S,
        config: LedgerConfig,
        log_id: LogId,
        last_transaction: Option<TransactionId>,
    ) -> Self {
        Self {
            submitter,
            config,
            log_id,
            last_transaction,
        }
    }

    pub fn log_id(&self) -> &LogId {
        &self.log_id
    }

    /// Token to persist across restarts.
    pub fn last_transaction(&self) -> Option<&TransactionId> {
        self.last_transaction.as_ref()
    }

    pub fn build_envelope(&self, record: &str) -> Result<Envelope, WriteError> {
        validate_record(record.as_bytes())?;
        let payload = AppendRequest::append(&self.log_id, record).to_bytes()?;
        let scope = vec![self.log_id.to_string()];

        Ok(Envelope {
            family_name: self.config.family_name.clone(),
            family_version: self.config.family_version.clone(),
            inputs: scope.clone(),
            outputs: scope,
            dependencies: self.last_transaction.iter().cloned().collect(),
            payload_sha512: Envelope::payload_digest(&payload),
            payload,
        })
    }

    /// Submit one record. The dependency token only advances on success.
    pub fn append(&mut self, record: &str) -> Result<TransactionId, WriteError> {
        let envelope = self.build_envelope(record)?;
        let id = self.submitter.submit(&envelope)?;

        debug!(log_id = %self.log_id, transaction = %id, "submitted append");
        self.last_transaction = Some(id.clone());
        Ok(id)
    }
}
