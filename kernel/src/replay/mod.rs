// Log Replay & Audit
//
// Loads every page of one log straight from ledger state, checks the
// linked-page invariants and yields the ordered record sequence. Pages are
// read in bounded batches; the first gap ends the replay.

use tracing::debug;

use crate::address::{LogId, PageAddress};
use crate::invariants::{InvariantEngine, InvariantViolation, LogSnapshot};
use crate::log::{StateStore, StoreError};
use crate::page::{CodecError, Page};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("page {address} failed to decode: {source}")]
    Decode {
        address: PageAddress,
        source: CodecError,
    },

    #[error("head declares tail {0} outside this log")]
    ForeignTail(PageAddress),

    #[error("page {0} is missing")]
    MissingPage(PageAddress),

    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Pages requested per `read` call. `head.prev` is untrusted, so nothing is
/// sized from it up front.
const READ_BATCH: u64 = 256;

/// Replay one log from `state`.
///
/// Returns `None` when the log has never been appended to.
pub fn replay_log<S: StateStore + ?Sized>(
    state: &S,
    log_id: &LogId,
    invariants: &InvariantEngine,
) -> Result<Option<LogSnapshot>, ReplayError> {
    let head_addr = log_id.head();
    let mut found = state.read(std::slice::from_ref(&head_addr))?;
    let Some(head_bytes) = found.remove(&head_addr) else {
        return Ok(None);
    };
    let head = decode(&head_addr, &head_bytes)?;

    if head.prev_address.log_id() != log_id {
        return Err(ReplayError::ForeignTail(head.prev_address));
    }
    let tail_index = head.prev_address.index();

    let mut pages = vec![(head_addr, head)];
    let mut next = 1u64;
    while next <= tail_index {
        let last = tail_index.min(next.saturating_add(READ_BATCH - 1));
        let batch: Vec<PageAddress> = (next..=last).map(|i| log_id.page(i)).collect();
        let mut found = state.read(&batch)?;

        for address in batch {
            let bytes = found
                .remove(&address)
                .ok_or_else(|| ReplayError::MissingPage(address.clone()))?;
            let page = decode(&address, &bytes)?;
            pages.push((address, page));
        }

        match last.checked_add(1) {
            Some(i) => next = i,
            None => break,
        }
    }

    let snapshot = LogSnapshot {
        log_id: log_id.clone(),
        pages,
    };
    invariants.evaluate(&snapshot)?;

    debug!(
        log_id = %log_id,
        pages = snapshot.page_count(),
        records = snapshot.record_count(),
        "replayed log"
    );
    Ok(Some(snapshot))
}

fn decode(address: &PageAddress, bytes: &[u8]) -> Result<Page, ReplayError> {
    Page::decode(bytes).map_err(|source| ReplayError::Decode {
        address: address.clone(),
        source,
    })
}
