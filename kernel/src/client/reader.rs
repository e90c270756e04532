// Log Reader
//
// Fetches pages by index and concatenates their records. A page that is
// missing before the expected tail is reported, not treated as end-of-log:
// it may mean tampering or incomplete replication.

use tracing::{debug, warn};

use super::TransportError;
use crate::address::{LogId, PageAddress};
use crate::page::{CodecError, Page};

/// Read side of the external ledger.
pub trait PageSource {
    /// Encoded bytes stored at `address`, or `None` if nothing is there.
    fn fetch(&self, address: &PageAddress) -> Result<Option<Vec<u8>>, TransportError>;
}

impl<T: PageSource + ?Sized> PageSource for &T {
    fn fetch(&self, address: &PageAddress) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).fetch(address)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("page {index} failed to decode: {source}")]
    Decode { index: u64, source: CodecError },

    #[error("transport failure fetching page {index}: {source}")]
    Transport { index: u64, source: TransportError },

    #[error("head declares tail outside this log: {0}")]
    ForeignTail(PageAddress),
}

/// Why a read stopped before the requested range was exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStop {
    Missing { index: u64 },
    Transport { index: u64, reason: TransportError },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadOutcome {
    pub records: Vec<Vec<u8>>,
    pub pages_read: u64,
    pub stopped: Option<ReadStop>,
}

impl ReadOutcome {
    pub fn is_complete(&self) -> bool {
        self.stopped.is_none()
    }

    /// Records as UTF-8 text, lossily.
    pub fn records_lossy(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .collect()
    }
}

pub struct LogReader<P> {
    source: P,
    log_id: LogId,
}

impl<P: PageSource> LogReader<P> {
    pub fn new(source: P, log_id: LogId) -> Self {
        Self { source, log_id }
    }

    pub fn log_id(&self) -> &LogId {
        &self.log_id
    }

    pub fn fetch_page(&self, index: u64) -> Result<Option<Page>, ReadError> {
        let address = self.log_id.page(index);
        debug!(%address, "fetching page");

        let bytes = self
            .source
            .fetch(&address)
            .map_err(|source| ReadError::Transport { index, source })?;

        bytes
            .map(|b| Page::decode(&b).map_err(|source| ReadError::Decode { index, source }))
            .transpose()
    }

    /// Index of the current tail, via `head.prev`. `None` if the log was
    /// never appended to.
    pub fn tail_index(&self) -> Result<Option<u64>, ReadError> {
        let Some(head) = self.fetch_page(0)? else {
            return Ok(None);
        };
        if head.prev_address.log_id() != &self.log_id {
            return Err(ReadError::ForeignTail(head.prev_address));
        }
        Ok(Some(head.prev_address.index()))
    }

    /// Read up to `count` pages starting at `start`.
    ///
    /// Absent pages and transport failures end the read early and are
    /// reported in `stopped`. Decode failures are errors.
    pub fn read(&self, start: u64, count: u64) -> Result<ReadOutcome, ReadError> {
        let mut outcome = ReadOutcome::default();

        for index in start..start.saturating_add(count) {
            match self.fetch_page(index) {
                Ok(Some(page)) => {
                    outcome.records.extend(page.data);
                    outcome.pages_read += 1;
                }
                Ok(None) => {
                    warn!(log_id = %self.log_id, index, "page missing");
                    outcome.stopped = Some(ReadStop::Missing { index });
                    break;
                }
                Err(ReadError::Transport { index, source }) => {
                    warn!(log_id = %self.log_id, index, error = %source, "page fetch failed");
                    outcome.stopped = Some(ReadStop::Transport {
                        index,
                        reason: source,
                    });
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }

    /// Read every page from the head to the tail named by `head.prev`.
    pub fn read_all(&self) -> Result<ReadOutcome, ReadError> {
        match self.tail_index() {
            Ok(Some(tail)) => self.read(0, tail.saturating_add(1)),
            Ok(None) => Ok(ReadOutcome {
                stopped: Some(ReadStop::Missing { index: 0 }),
                ..ReadOutcome::default()
            }),
            Err(ReadError::Transport { index, source }) => Ok(ReadOutcome {
                stopped: Some(ReadStop::Transport {
                    index,
                    reason: source,
                }),
                ..ReadOutcome::default()
            }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::derive_log_identifier;
    use crate::config::LedgerConfig;
    use crate::log::{InMemoryStateStore, LogAppendEngine};
    use std::collections::HashSet;

    struct StoreSource {
        store: InMemoryStateStore,
        unreachable: HashSet<u64>,
    }

    impl PageSource for StoreSource {
        fn fetch(&self, address: &PageAddress) -> Result<Option<Vec<u8>>, TransportError> {
            if self.unreachable.contains(&address.index()) {
                return Err(TransportError::Unavailable("timed out".into()));
            }
            Ok(self.store.get(address).map(<[u8]>::to_vec))
        }
    }

    fn populated(records: &[&str], capacity: usize) -> (LogId, StoreSource) {
        let engine = LogAppendEngine::new(LedgerConfig {
            max_page_size: capacity,
            ..LedgerConfig::default()
        })
        .unwrap();
        let id = derive_log_identifier("alethia", "host-a", "app.log").unwrap();
        let mut store = InMemoryStateStore::new();
        for r in records {
            engine.append(&id, r.as_bytes(), &mut store).unwrap();
        }
        (
            id,
            StoreSource {
                store,
                unreachable: HashSet::new(),
            },
        )
    }

    #[test]
    fn never_written_log_has_no_head() {
        let (_, source) = populated(&[], 2);
        let id = derive_log_identifier("alethia", "host-z", "never.log").unwrap();
        let reader = LogReader::new(&source, id);

        assert_eq!(reader.fetch_page(0).unwrap(), None);
        assert_eq!(reader.tail_index().unwrap(), None);
        assert_eq!(
            reader.read_all().unwrap().stopped,
            Some(ReadStop::Missing { index: 0 })
        );
    }

    #[test]
    fn read_all_follows_head_prev() {
        let (id, source) = populated(&["a", "b", "c", "d", "e"], 2);
        let reader = LogReader::new(&source, id);

        assert_eq!(reader.tail_index().unwrap(), Some(2));

        let outcome = reader.read_all().unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.pages_read, 3);
        assert_eq!(outcome.records_lossy(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn missing_page_stops_read() {
        let (id, mut source) = populated(&["a", "b", "c", "d", "e"], 2);
        source.store.remove(&id.page(1));
        let reader = LogReader::new(&source, id);

        let outcome = reader.read(0, 3).unwrap();

        assert_eq!(outcome.stopped, Some(ReadStop::Missing { index: 1 }));
        assert_eq!(outcome.records_lossy(), vec!["a", "b"]);
    }

    #[test]
    fn transport_failure_stops_read() {
        let (id, mut source) = populated(&["a", "b", "c", "d", "e"], 2);
        source.unreachable.insert(2);
        let reader = LogReader::new(&source, id);

        let outcome = reader.read_all().unwrap();

        assert!(matches!(
            outcome.stopped,
            Some(ReadStop::Transport { index: 2, .. })
        ));
        assert_eq!(outcome.pages_read, 2);
    }

    #[test]
    fn corrupt_page_is_an_error() {
        let (id, mut source) = populated(&["a", "b", "c"], 2);
        source.store.put(id.page(1), b"garbage".to_vec());
        let reader = LogReader::new(&source, id);

        let err = reader.read(0, 2).unwrap_err();
        assert!(matches!(err, ReadError::Decode { index: 1, .. }));
    }

    #[test]
    fn foreign_tail_index_is_an_error() {
        let (id, mut source) = populated(&["a"], 2);
        let other = derive_log_identifier("alethia", "host-b", "app.log").unwrap();
        source
            .store
            .put(id.head(), Page::empty(other.page(3), id.head()).encode());
        let reader = LogReader::new(&source, id);

        let err = reader.tail_index().unwrap_err();
        assert!(matches!(err, ReadError::ForeignTail(addr) if addr == other.page(3)));
        assert!(reader.read_all().is_err());
    }
}
