// End-to-End Upload Simulation
//
// Runs the full pipeline against an in-memory ledger:
// hash lines → append → read pages back → verify

use serde::Serialize;

use crate::address::{derive_log_identifier, AddressError, LogId};
use crate::client::{LogReader, LogWriter, ReadError, ReadStop, TransactionId, WriteError};
use crate::config::LedgerConfig;
use crate::ledger::InMemoryLedger;
use crate::verify::{hash_lines, split_lines, verify_records, VerificationReport};

/// Result of a full simulation run.
#[derive(Debug, Serialize)]
pub struct SimulationResult {
    pub log_id: LogId,
    pub appended: usize,
    pub pages: u64,
    pub last_transaction: Option<TransactionId>,
    /// Set when the read stopped before the tail.
    pub incomplete_at: Option<u64>,
    pub report: VerificationReport,
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("address derivation failed: {0}")]
    Address(#[from] AddressError),

    #[error("append {line} failed: {source}")]
    Write { line: usize, source: WriteError },

    #[error("read failed: {0}")]
    Read(#[from] ReadError),
}

/// Upload the line digests of `text` to `owner`/`log_path` and verify them.
///
/// Appends continue an existing log if the ledger already holds one.
pub fn simulate_upload(
    ledger: &InMemoryLedger,
    config: &LedgerConfig,
    owner: &str,
    log_path: &str,
    text: &str,
) -> Result<SimulationResult, SimulationError> {
    let log_id = derive_log_identifier(&config.family_name, owner, log_path)?;

    // 1. Append one digest per line
    let mut writer = LogWriter::new(ledger, config.clone(), log_id.clone(), None);
    let digests = hash_lines(text);
    for (line, digest) in digests.iter().enumerate() {
        writer
            .append(digest)
            .map_err(|source| SimulationError::Write { line, source })?;
    }

    // 2. Read the whole log back
    let outcome = LogReader::new(ledger, log_id.clone()).read_all()?;
    let incomplete_at = outcome.stopped.as_ref().map(|stop| match stop {
        ReadStop::Missing { index } | ReadStop::Transport { index, .. } => *index,
    });

    // 3. Verify
    let report = verify_records(&split_lines(text), &outcome.records);

    Ok(SimulationResult {
        log_id,
        appended: digests.len(),
        pages: outcome.pages_read,
        last_transaction: writer.last_transaction().cloned(),
        incomplete_at,
        report,
    })
}
