// Log Append Engine
//
// The state transition executed by the ledger for every append request.
// Each invocation reads the head page, finds the tail through `head.prev`,
// splits when the tail is full, appends one record and commits every
// touched page in a single atomic write.
//
// The engine holds no state between invocations.

use std::collections::BTreeMap;

use tracing::{debug, error, info};

use crate::address::{LogId, NamespacePrefix, PageAddress};
use crate::config::{ConfigError, LedgerConfig};
use crate::page::{validate_record, CodecError, Page};

pub mod request;
pub mod store;

pub use request::{AppendRequest, RequestError, APPEND_ACTION};
pub use store::{InMemoryStateStore, StateStore, StoreError};

/// Ledger corruption or store failure. Never caused by the caller.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InternalError {
    #[error("dangling tail address {tail} declared by head {head}")]
    DanglingTail { head: PageAddress, tail: PageAddress },

    #[error("head {head} declares tail {tail} from another log")]
    ForeignTail { head: PageAddress, tail: PageAddress },

    #[error("corrupt page at {address}: {source}")]
    CorruptPage {
        address: PageAddress,
        source: CodecError,
    },

    #[error("page index overflow after {0}")]
    IndexOverflow(PageAddress),

    #[error("state store failure: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of a rejected transition.
///
/// The two classes are kept apart: `InvalidRequest` points at a bad caller,
/// `Internal` at a corrupted ledger.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl ApplyError {
    pub fn is_internal(&self) -> bool {
        matches!(self, ApplyError::Internal(_))
    }
}

impl From<StoreError> for ApplyError {
    fn from(err: StoreError) -> Self {
        ApplyError::Internal(InternalError::Store(err))
    }
}

/// Pages staged by one transition, keyed by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSet {
    pub pages: BTreeMap<PageAddress, Page>,
    /// Page that received the record.
    pub tail: PageAddress,
    pub created_log: bool,
    pub split: bool,
}

impl WriteSet {
    pub fn encode(&self) -> BTreeMap<PageAddress, Vec<u8>> {
        self.pages
            .iter()
            .map(|(addr, page)| (addr.clone(), page.encode()))
            .collect()
    }
}

/// Summary of a committed append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub tail: PageAddress,
    pub tail_size: usize,
    pub pages_written: usize,
    pub created_log: bool,
    pub split: bool,
}

#[derive(Debug, Clone)]
pub struct LogAppendEngine {
    config: LedgerConfig,
    namespace: NamespacePrefix,
}

impl LogAppendEngine {
    /// Create an engine for a validated configuration.
    pub fn new(config: LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let namespace = config.namespace_prefix();
        Ok(Self { config, namespace })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Address namespace this engine is allowed to touch.
    pub fn namespace(&self) -> &NamespacePrefix {
        &self.namespace
    }

    /// Decode a wire payload and apply it.
    pub fn apply<S: StateStore + ?Sized>(
        &self,
        payload: &[u8],
        state: &mut S,
    ) -> Result<AppendOutcome, ApplyError> {
        let request = AppendRequest::from_bytes(payload)?;
        if request.action != APPEND_ACTION {
            return Err(RequestError::UnsupportedAction(request.action).into());
        }
        let log_id = request.log_id()?;
        self.append(&log_id, request.data.as_bytes(), state)
    }

    /// Append one record to `log_id` and commit the result.
    pub fn append<S: StateStore + ?Sized>(
        &self,
        log_id: &LogId,
        record: &[u8],
        state: &mut S,
    ) -> Result<AppendOutcome, ApplyError> {
        let staged = self.plan(log_id, record, &*state)?;
        let tail_size = staged.pages.get(&staged.tail).map_or(0, |p| p.size);

        state.write_all(staged.encode())?;

        debug!(
            log_id = %log_id,
            page = staged.tail.index(),
            size = tail_size,
            "appended record"
        );

        Ok(AppendOutcome {
            tail: staged.tail,
            tail_size,
            pages_written: staged.pages.len(),
            created_log: staged.created_log,
            split: staged.split,
        })
    }

    /// Compute the pages an append would write, without writing them.
    pub fn plan<S: StateStore + ?Sized>(
        &self,
        log_id: &LogId,
        record: &[u8],
        state: &S,
    ) -> Result<WriteSet, ApplyError> {
        self.check_request(log_id, record)?;

        let mut changes = BTreeMap::new();
        let head_addr = log_id.head();

        let (mut head, created_log) = match self.load(state, &head_addr)? {
            Some(page) => (page, false),
            None => {
                info!(log_id = %log_id, "creating log");
                let page = Page::empty(head_addr.clone(), head_addr.clone());
                changes.insert(head_addr.clone(), page.clone());
                (page, true)
            }
        };

        let mut tail_addr = head.prev_address.clone();
        if tail_addr.log_id() != log_id {
            error!(head = %head_addr, tail = %tail_addr, "head points into another log");
            return Err(InternalError::ForeignTail {
                head: head_addr,
                tail: tail_addr,
            }
            .into());
        }

        let mut tail = if tail_addr == head_addr {
            head.clone()
        } else {
            match self.load(state, &tail_addr)? {
                Some(page) => page,
                None => {
                    error!(head = %head_addr, tail = %tail_addr, "dangling tail address");
                    return Err(InternalError::DanglingTail {
                        head: head_addr,
                        tail: tail_addr,
                    }
                    .into());
                }
            }
        };

        let mut split = false;
        if tail.is_full(self.config.max_page_size) {
            let next_index = tail_addr
                .index()
                .checked_add(1)
                .ok_or_else(|| InternalError::IndexOverflow(tail_addr.clone()))?;
            let new_addr = log_id.page(next_index);
            let new_page = Page::empty(tail_addr.clone(), head_addr.clone());

            tail.next_address = new_addr.clone();
            if tail_addr == head_addr {
                // The old tail is the head itself; keep one copy.
                head.next_address = tail.next_address.clone();
                head.prev_address = new_addr.clone();
                tail = head.clone();
            } else {
                head.prev_address = new_addr.clone();
            }

            changes.insert(head_addr.clone(), head.clone());
            changes.insert(tail_addr.clone(), tail);

            info!(log_id = %log_id, page = next_index, "split to new page");
            tail_addr = new_addr;
            tail = new_page;
            split = true;
        }

        tail.push(record);
        if tail_addr == head_addr {
            head = tail.clone();
            changes.insert(head_addr, head);
        } else {
            changes.insert(tail_addr.clone(), tail);
        }

        Ok(WriteSet {
            pages: changes,
            tail: tail_addr,
            created_log,
            split,
        })
    }

    fn check_request(&self, log_id: &LogId, record: &[u8]) -> Result<(), RequestError> {
        if log_id.namespace() != self.namespace.as_str() {
            return Err(RequestError::WrongNamespace {
                log_id: log_id.to_string(),
                namespace: self.namespace.to_string(),
            });
        }
        validate_record(record)?;
        Ok(())
    }

    fn load<S: StateStore + ?Sized>(
        &self,
        state: &S,
        address: &PageAddress,
    ) -> Result<Option<Page>, InternalError> {
        let mut found = state.read(std::slice::from_ref(address))?;
        match found.remove(address) {
            Some(bytes) => Page::decode(&bytes)
                .map(Some)
                .map_err(|source| InternalError::CorruptPage {
                    address: address.clone(),
                    source,
                }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::derive_log_identifier;

    fn engine(capacity: usize) -> LogAppendEngine {
        LogAppendEngine::new(LedgerConfig {
            max_page_size: capacity,
            ..LedgerConfig::default()
        })
        .unwrap()
    }

    fn log_id() -> LogId {
        derive_log_identifier("alethia", "host-a", "app.log").unwrap()
    }

    fn page(store: &InMemoryStateStore, addr: &PageAddress) -> Page {
        Page::decode(store.get(addr).unwrap()).unwrap()
    }

    #[test]
    fn first_append_creates_head() {
        let engine = engine(4);
        let id = log_id();
        let mut store = InMemoryStateStore::new();

        let outcome = engine.append(&id, b"a", &mut store).unwrap();

        assert!(outcome.created_log);
        assert!(!outcome.split);
        assert_eq!(outcome.tail, id.head());
        assert_eq!(store.len(), 1);

        let head = page(&store, &id.head());
        assert_eq!(head.prev_address, id.head());
        assert_eq!(head.next_address, id.head());
        assert_eq!(head.size, 1);
        assert_eq!(head.data, vec![b"a".to_vec()]);
    }

    #[test]
    fn capacity_two_links_pages() {
        let engine = engine(2);
        let id = log_id();
        let mut store = InMemoryStateStore::new();

        for record in ["a", "b", "c"] {
            engine.append(&id, record.as_bytes(), &mut store).unwrap();
        }

        let head = page(&store, &id.page(0));
        let second = page(&store, &id.page(1));

        assert_eq!(head.size, 2);
        assert_eq!(head.data, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(second.size, 1);
        assert_eq!(second.data, vec![b"c".to_vec()]);

        assert_eq!(head.prev_address, id.page(1));
        assert_eq!(head.next_address, id.page(1));
        assert_eq!(second.prev_address, id.page(0));
        assert_eq!(second.next_address, id.head());
    }

    #[test]
    fn head_next_is_only_set_by_first_split() {
        let engine = engine(1);
        let id = log_id();
        let mut store = InMemoryStateStore::new();

        for record in ["a", "b", "c", "d"] {
            engine.append(&id, record.as_bytes(), &mut store).unwrap();
        }

        let head = page(&store, &id.page(0));
        assert_eq!(head.prev_address, id.page(3));
        assert_eq!(head.next_address, id.page(1));

        assert_eq!(page(&store, &id.page(1)).next_address, id.page(2));
        assert_eq!(page(&store, &id.page(2)).next_address, id.page(3));
        assert_eq!(page(&store, &id.page(3)).next_address, id.head());
    }

    #[test]
    fn split_writes_head_old_tail_and_new_page() {
        let engine = engine(2);
        let id = log_id();
        let mut store = InMemoryStateStore::new();

        for record in ["a", "b", "c", "d"] {
            engine.append(&id, record.as_bytes(), &mut store).unwrap();
        }

        let staged = engine.plan(&id, b"e", &store).unwrap();
        assert!(staged.split);
        assert_eq!(staged.tail, id.page(2));
        assert_eq!(
            staged.pages.keys().cloned().collect::<Vec<_>>(),
            vec![id.page(0), id.page(1), id.page(2)]
        );
    }

    #[test]
    fn dangling_tail_is_internal_and_writes_nothing() {
        let engine = engine(2);
        let id = log_id();
        let mut store = InMemoryStateStore::new();

        for record in ["a", "b", "c"] {
            engine.append(&id, record.as_bytes(), &mut store).unwrap();
        }
        store.remove(&id.page(1));
        let before = store.clone();

        let err = engine.append(&id, b"d", &mut store).unwrap_err();

        assert!(err.is_internal());
        assert!(matches!(
            err,
            ApplyError::Internal(InternalError::DanglingTail { .. })
        ));
        assert_eq!(store.len(), before.len());
        assert_eq!(store.get(&id.head()), before.get(&id.head()));
    }

    #[test]
    fn corrupt_head_is_internal() {
        let engine = engine(2);
        let id = log_id();
        let mut store = InMemoryStateStore::new();
        store.put(id.head(), b"not a page".to_vec());

        let err = engine.append(&id, b"a", &mut store).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Internal(InternalError::CorruptPage { .. })
        ));
    }

    #[test]
    fn foreign_tail_is_internal() {
        let engine = engine(2);
        let id = log_id();
        let other = derive_log_identifier("alethia", "host-b", "app.log").unwrap();
        let mut store = InMemoryStateStore::new();
        store.put(id.head(), Page::empty(other.page(4), id.head()).encode());

        let err = engine.append(&id, b"a", &mut store).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Internal(InternalError::ForeignTail { .. })
        ));
    }

    #[test]
    fn split_past_last_index_is_internal() {
        let engine = engine(1);
        let id = log_id();
        let last = id.page(u64::MAX);
        let mut store = InMemoryStateStore::new();
        store.put(id.head(), Page::empty(last.clone(), id.page(1)).encode());
        let mut tail = Page::empty(id.page(u64::MAX - 1), id.head());
        tail.push(b"a");
        store.put(last.clone(), tail.encode());
        let before = store.clone();

        let err = engine.append(&id, b"b", &mut store).unwrap_err();

        assert!(err.is_internal());
        assert!(matches!(
            err,
            ApplyError::Internal(InternalError::IndexOverflow(addr)) if addr == last
        ));
        assert_eq!(store.len(), before.len());
        assert_eq!(store.get(&id.head()), before.get(&id.head()));
        assert_eq!(store.get(&last), before.get(&last));
    }

    #[test]
    fn delimiter_record_is_invalid_request() {
        let engine = engine(2);
        let id = log_id();
        let mut store = InMemoryStateStore::new();

        let err = engine.append(&id, b"a,b", &mut store).unwrap_err();

        assert!(!err.is_internal());
        assert!(store.is_empty());
    }

    #[test]
    fn foreign_namespace_is_invalid_request() {
        let engine = engine(2);
        let id = derive_log_identifier("other-family", "host-a", "app.log").unwrap();
        let mut store = InMemoryStateStore::new();

        let err = engine.append(&id, b"a", &mut store).unwrap_err();
        assert!(matches!(
            err,
            ApplyError::InvalidRequest(RequestError::WrongNamespace { .. })
        ));
    }

    #[test]
    fn apply_decodes_payload() {
        let engine = engine(2);
        let id = log_id();
        let mut store = InMemoryStateStore::new();
        let payload = AppendRequest::append(&id, "deadbeef").to_bytes().unwrap();

        let outcome = engine.apply(&payload, &mut store).unwrap();

        assert_eq!(outcome.tail_size, 1);
        assert_eq!(page(&store, &id.head()).data, vec![b"deadbeef".to_vec()]);
    }

    #[test]
    fn apply_rejects_bad_payloads() {
        let engine = engine(2);
        let id = log_id();
        let mut store = InMemoryStateStore::new();

        let mut unknown = AppendRequest::append(&id, "x");
        unknown.action = "truncate".into();
        let err = engine
            .apply(&unknown.to_bytes().unwrap(), &mut store)
            .unwrap_err();
        assert!(matches!(
            err,
            ApplyError::InvalidRequest(RequestError::UnsupportedAction(_))
        ));

        let mut bad_id = AppendRequest::append(&id, "x");
        bad_id.log_identifier = "117169".into();
        let err = engine
            .apply(&bad_id.to_bytes().unwrap(), &mut store)
            .unwrap_err();
        assert!(matches!(
            err,
            ApplyError::InvalidRequest(RequestError::InvalidLogId(_))
        ));

        assert!(store.is_empty());
    }

    #[test]
    fn zero_capacity_config_is_refused() {
        let err = LogAppendEngine::new(LedgerConfig {
            max_page_size: 0,
            ..LedgerConfig::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::ZeroPageSize);
    }
}
