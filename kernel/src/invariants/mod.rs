// Invariant Framework
//
// Invariants are pure rules over a snapshot of every page of one log.
// They hold by construction after any sequence of appends; a violation
// means the ledger state was altered outside the append transition.

use crate::address::{LogId, PageAddress};
use crate::page::Page;

/// Every page of one log, in index order. `pages[0]` is the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSnapshot {
    pub log_id: LogId,
    pub pages: Vec<(PageAddress, Page)>,
}

impl LogSnapshot {
    pub fn head(&self) -> Option<&Page> {
        self.pages.first().map(|(_, p)| p)
    }

    pub fn tail_address(&self) -> Option<&PageAddress> {
        self.pages.last().map(|(a, _)| a)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn record_count(&self) -> usize {
        self.pages.iter().map(|(_, p)| p.data.len()).sum()
    }

    /// All records in append order.
    pub fn records(&self) -> impl Iterator<Item = &[u8]> {
        self.pages
            .iter()
            .flat_map(|(_, p)| p.data.iter().map(Vec::as_slice))
    }
}

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Trait implemented by all invariants.
///
/// Invariants must be pure and deterministic.
pub trait Invariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, snapshot: &LogSnapshot) -> InvariantResult;
}

#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantEngine {
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Engine with every linked-page invariant registered.
    pub fn with_page_chain(capacity: usize) -> Self {
        let mut engine = Self::new();
        engine.register(ContiguousIndices);
        engine.register(HeadTracksTail);
        engine.register(FullBeforeTail { capacity });
        engine.register(BackwardLinks);
        engine.register(ForwardLinks);
        engine.register(HeadNext);
        engine
    }

    pub fn register<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// Evaluate all invariants.
    ///
    /// Stops at the first failure.
    pub fn evaluate(&self, snapshot: &LogSnapshot) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            if let InvariantResult::Fail(reason) = invariant.validate(snapshot) {
                return Err(InvariantViolation {
                    invariant: invariant.name(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invariant `{invariant}` violated: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub reason: String,
}

/// Pages are exactly indices `0..=tail` of this log.
pub struct ContiguousIndices;

impl Invariant for ContiguousIndices {
    fn name(&self) -> &'static str {
        "contiguous-indices"
    }

    fn validate(&self, snapshot: &LogSnapshot) -> InvariantResult {
        for (expected, (addr, _)) in snapshot.pages.iter().enumerate() {
            if addr != &snapshot.log_id.page(expected as u64) {
                return InvariantResult::Fail(format!(
                    "position {expected} holds page {addr}"
                ));
            }
        }
        InvariantResult::Pass
    }
}

/// `head.prev` names the last page.
pub struct HeadTracksTail;

impl Invariant for HeadTracksTail {
    fn name(&self) -> &'static str {
        "head-tracks-tail"
    }

    fn validate(&self, snapshot: &LogSnapshot) -> InvariantResult {
        match (snapshot.head(), snapshot.tail_address()) {
            (Some(head), Some(tail)) if &head.prev_address != tail => InvariantResult::Fail(
                format!("head.prev is {}, tail is {tail}", head.prev_address),
            ),
            _ => InvariantResult::Pass,
        }
    }
}

/// Every page before the tail is full; the tail is within capacity.
pub struct FullBeforeTail {
    pub capacity: usize,
}

impl Invariant for FullBeforeTail {
    fn name(&self) -> &'static str {
        "full-before-tail"
    }

    fn validate(&self, snapshot: &LogSnapshot) -> InvariantResult {
        let last = snapshot.pages.len().saturating_sub(1);
        for (i, (addr, page)) in snapshot.pages.iter().enumerate() {
            if i < last && page.size != self.capacity {
                return InvariantResult::Fail(format!(
                    "page {addr} has size {} before the tail",
                    page.size
                ));
            }
            if page.size > self.capacity {
                return InvariantResult::Fail(format!(
                    "page {addr} exceeds capacity with {}",
                    page.size
                ));
            }
        }
        InvariantResult::Pass
    }
}

/// Page `k > 0` points back at page `k - 1`.
pub struct BackwardLinks;

impl Invariant for BackwardLinks {
    fn name(&self) -> &'static str {
        "backward-links"
    }

    fn validate(&self, snapshot: &LogSnapshot) -> InvariantResult {
        for pair in snapshot.pages.windows(2) {
            let (prev_addr, _) = &pair[0];
            let (addr, page) = &pair[1];
            if &page.prev_address != prev_addr {
                return InvariantResult::Fail(format!(
                    "page {addr} links back to {}",
                    page.prev_address
                ));
            }
        }
        InvariantResult::Pass
    }
}

/// Non-head pages point at their successor; the tail points at the head.
pub struct ForwardLinks;

impl Invariant for ForwardLinks {
    fn name(&self) -> &'static str {
        "forward-links"
    }

    fn validate(&self, snapshot: &LogSnapshot) -> InvariantResult {
        let head = snapshot.log_id.head();
        let last = snapshot.pages.len().saturating_sub(1);

        for (i, (addr, page)) in snapshot.pages.iter().enumerate().skip(1) {
            let expected = if i == last {
                head.clone()
            } else {
                snapshot.log_id.page(i as u64 + 1)
            };
            if page.next_address != expected {
                return InvariantResult::Fail(format!(
                    "page {addr} links forward to {}, expected {expected}",
                    page.next_address
                ));
            }
        }
        InvariantResult::Pass
    }
}

/// The head's `next` is itself until the first split, then page 1.
pub struct HeadNext;

impl Invariant for HeadNext {
    fn name(&self) -> &'static str {
        "head-next"
    }

    fn validate(&self, snapshot: &LogSnapshot) -> InvariantResult {
        let Some(head) = snapshot.head() else {
            return InvariantResult::Pass;
        };
        let expected = if snapshot.pages.len() > 1 {
            snapshot.log_id.page(1)
        } else {
            snapshot.log_id.head()
        };
        if head.next_address != expected {
            return InvariantResult::Fail(format!(
                "head.next is {}, expected {expected}",
                head.next_address
            ));
        }
        InvariantResult::Pass
    }
}
