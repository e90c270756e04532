// In-Memory Ledger
//
// Stand-in for the external ledger: checks an envelope the way a validator
// would, runs one append transition per envelope and serves page reads.
// Each submission commits atomically or not at all.

use std::collections::HashSet;
use std::sync::RwLock;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::address::PageAddress;
use crate::client::{Envelope, PageSource, Submitter, TransactionId, TransportError};
use crate::config::{ConfigError, LedgerConfig};
use crate::log::{
    AppendOutcome, AppendRequest, InMemoryStateStore, LogAppendEngine, StateStore,
};

#[derive(Default)]
struct LedgerState {
    store: InMemoryStateStore,
    committed: HashSet<TransactionId>,
}

pub struct InMemoryLedger {
    engine: LogAppendEngine,
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new(config: LedgerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: LogAppendEngine::new(config)?,
            state: RwLock::new(LedgerState::default()),
        })
    }

    pub fn engine(&self) -> &LogAppendEngine {
        &self.engine
    }

    /// Copy of the current state, for audits.
    pub fn snapshot(&self) -> InMemoryStateStore {
        self.state.read().expect("lock poisoned").store.clone()
    }

    pub fn is_committed(&self, id: &TransactionId) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .committed
            .contains(id)
    }

    /// Validate and execute one envelope.
    pub fn execute(
        &self,
        envelope: &Envelope,
    ) -> Result<(TransactionId, AppendOutcome), TransportError> {
        let config = self.engine.config();
        if envelope.family_name != config.family_name
            || envelope.family_version != config.family_version
        {
            return Err(TransportError::Rejected(format!(
                "no handler for family {} {}",
                envelope.family_name, envelope.family_version
            )));
        }
        if Envelope::payload_digest(&envelope.payload) != envelope.payload_sha512 {
            return Err(TransportError::Rejected("payload digest mismatch".into()));
        }

        let request = AppendRequest::from_bytes(&envelope.payload)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        let covered = |declared: &[String]| {
            declared
                .iter()
                .any(|prefix| request.log_identifier.starts_with(prefix.as_str()))
        };
        if !covered(&envelope.inputs) || !covered(&envelope.outputs) {
            return Err(TransportError::Rejected(format!(
                "log {} not covered by declared inputs/outputs",
                request.log_identifier
            )));
        }

        let mut state = self.state.write().expect("lock poisoned");
        if let Some(missing) = envelope
            .dependencies
            .iter()
            .find(|dep| !state.committed.contains(*dep))
        {
            return Err(TransportError::Rejected(format!(
                "dependency {missing} has not committed"
            )));
        }

        let outcome = self
            .engine
            .apply(&envelope.payload, &mut state.store)
            .map_err(|e| {
                if e.is_internal() {
                    warn!(error = %e, "append transition failed internally");
                }
                TransportError::Rejected(e.to_string())
            })?;

        let id = TransactionId(Uuid::new_v4().to_string());
        state.committed.insert(id.clone());
        debug!(transaction = %id, tail = %outcome.tail, "committed append");
        Ok((id, outcome))
    }
}

impl Submitter for InMemoryLedger {
    fn submit(&self, envelope: &Envelope) -> Result<TransactionId, TransportError> {
        self.execute(envelope).map(|(id, _)| id)
    }
}

impl PageSource for InMemoryLedger {
    fn fetch(&self, address: &PageAddress) -> Result<Option<Vec<u8>>, TransportError> {
        let state = self.state.read().expect("lock poisoned");
        let mut found = state
            .store
            .read(std::slice::from_ref(address))
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(found.remove(address))
    }
}
