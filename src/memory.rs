//! In-process change feed.
//!
//! [`MemoryFeed`] behaves like the database side of the protocol: it assigns
//! opaque, ordered identifiers, filters authoritatively on wire-encoded
//! selectors, enforces a retention window and hands out consistent reads.
//! It is used to exercise clients without a database and as a reference for
//! [`ChangeSource`] implementations.

use crate::error::{CdcError, Result};
use crate::mapping;
use crate::selectors::Selector;
use crate::source::{ChangeSource, ConsistentRead};
use crate::types::{ChangeEvent, ChangeIdentifier, Event, Metadata, Value};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// A record as stored by the feed.
struct StoredRecord {
    position: u64,
    record: Value,
}

struct FeedLog {
    /// Retained records, ordered by position.
    records: Vec<StoredRecord>,
    /// Position of the latest change (0 = nothing committed yet).
    head: u64,
    /// Oldest position a query may start from.
    earliest: u64,
    next_tx: i64,
}

struct FeedInner {
    log: RwLock<FeedLog>,
    open_reads: AtomicUsize,
    /// Queued connectivity failures for upcoming change queries.
    failures: Mutex<VecDeque<String>>,
}

/// Cloneable handle to an in-process change feed.
#[derive(Clone)]
pub struct MemoryFeed {
    inner: Arc<FeedInner>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FeedInner {
                log: RwLock::new(FeedLog {
                    records: Vec::new(),
                    head: 0,
                    earliest: 0,
                    next_tx: 1,
                }),
                open_reads: AtomicUsize::new(0),
                failures: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Commit one transaction. Returns the identifiers of its changes.
    pub fn commit(&self, metadata: Metadata, events: Vec<Event>) -> Result<Vec<ChangeIdentifier>> {
        let mut log = self.inner.log.write();
        let tx_id = log.next_tx;

        let mut staged = Vec::with_capacity(events.len());
        for (seq, event) in events.into_iter().enumerate() {
            let position = log.head + 1 + seq as u64;
            let change = ChangeEvent {
                id: encode_position(position),
                tx_id,
                seq: seq as i64,
                metadata: metadata.clone(),
                event,
            };
            let record = mapping::to_record(&change)?;
            staged.push((change.id, StoredRecord { position, record }));
        }

        log.next_tx += 1;
        let mut ids = Vec::with_capacity(staged.len());
        for (id, stored) in staged {
            log.head = stored.position;
            log.records.push(stored);
            ids.push(id);
        }

        trace!(tx_id, changes = ids.len(), "committed transaction");
        Ok(ids)
    }

    /// Store a record as-is, without validation.
    pub fn commit_raw(&self, record: Value) -> ChangeIdentifier {
        let mut log = self.inner.log.write();
        log.head += 1;
        let position = log.head;
        log.records.push(StoredRecord { position, record });
        encode_position(position)
    }

    /// Drop every change up to and including `id` from the retention window.
    pub fn purge_through(&self, id: &ChangeIdentifier) -> Result<()> {
        let position = decode_position(id)?;
        let mut log = self.inner.log.write();
        if position > log.head {
            return Err(CdcError::Server(format!(
                "change identifier {} is beyond the current change",
                id
            )));
        }

        log.records.retain(|stored| stored.position > position);
        log.earliest = log.earliest.max(position);
        Ok(())
    }

    /// Make the next `count` change queries fail with a connectivity error.
    pub fn fail_next_queries(&self, count: usize, reason: impl Into<String>) {
        let reason = reason.into();
        let mut failures = self.inner.failures.lock();
        failures.extend(std::iter::repeat(reason).take(count));
    }

    /// Number of read handles currently open.
    pub fn open_reads(&self) -> usize {
        self.inner.open_reads.load(Ordering::SeqCst)
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.inner.log.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSource for MemoryFeed {
    type Read<'a> = MemoryRead<'a>
    where
        Self: 'a;

    fn open_read(&self) -> Result<MemoryRead<'_>> {
        let log = self.inner.log.read();
        self.inner.open_reads.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryRead {
            feed: self.inner.as_ref(),
            log,
        })
    }
}

/// Consistent read over a [`MemoryFeed`]. Commits wait until it is dropped.
pub struct MemoryRead<'a> {
    feed: &'a FeedInner,
    log: RwLockReadGuard<'a, FeedLog>,
}

impl MemoryRead<'_> {
    fn check_bounds(&self, id: &ChangeIdentifier) -> Result<u64> {
        let position = decode_position(id)?;
        if position < self.log.earliest {
            return Err(CdcError::Server(format!(
                "change identifier {} is older than the earliest retained change",
                id
            )));
        }
        if position > self.log.head {
            return Err(CdcError::Server(format!(
                "change identifier {} is beyond the current change",
                id
            )));
        }
        Ok(position)
    }
}

impl ConsistentRead for MemoryRead<'_> {
    fn earliest_id(&mut self) -> Result<ChangeIdentifier> {
        Ok(encode_position(self.log.earliest))
    }

    fn current_id(&mut self) -> Result<ChangeIdentifier> {
        Ok(encode_position(self.log.head))
    }

    fn changes_since(
        &mut self,
        from: &ChangeIdentifier,
        selectors: &[Value],
    ) -> Result<Vec<ChangeEvent>> {
        if let Some(reason) = self.feed.failures.lock().pop_front() {
            return Err(CdcError::Connectivity(reason));
        }

        let from_position = self.check_bounds(from)?;
        let selectors = selectors
            .iter()
            .map(Selector::from_wire)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| CdcError::Server(e.to_string()))?;

        let start = self
            .log
            .records
            .partition_point(|stored| stored.position <= from_position);

        let mut events = Vec::new();
        for stored in &self.log.records[start..] {
            let event = mapping::parse_change_event(stored.record.clone())?;
            if selectors.is_empty() || selectors.iter().any(|s| s.matches(&event)) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

impl Drop for MemoryRead<'_> {
    fn drop(&mut self) {
        self.feed.open_reads.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hex of the big-endian position, so identifiers sort like positions.
fn encode_position(position: u64) -> ChangeIdentifier {
    ChangeIdentifier::new(hex::encode(position.to_be_bytes()))
}

fn decode_position(id: &ChangeIdentifier) -> Result<u64> {
    let bytes = hex::decode(id.as_str())
        .map_err(|_| CdcError::Server(format!("invalid change identifier {}", id)))?;
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CdcError::Server(format!("invalid change identifier {}", id)))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeState, EntityOperation, NodeEvent, NodeKeys, NodeState};
    use serde_json::json;

    fn node(label: &str, id: i64) -> Event {
        Event::Node(NodeEvent {
            element_id: format!("4:n:{}", id),
            operation: EntityOperation::Create,
            labels: vec![label.to_string()],
            keys: NodeKeys::new(),
            state: ChangeState::created(NodeState::new(
                vec![label.to_string()],
                serde_json::from_value(json!({"id": id})).unwrap(),
            )),
        })
    }

    #[test]
    fn test_commit_assigns_ordered_ids() {
        let feed = MemoryFeed::new();
        let first = feed
            .commit(Metadata::default(), vec![node("Person", 1), node("Person", 2)])
            .unwrap();
        let second = feed.commit(Metadata::default(), vec![node("Place", 3)]).unwrap();

        assert_eq!(first.len(), 2);
        assert!(first[0].as_str() < first[1].as_str());
        assert!(first[1].as_str() < second[0].as_str());

        let mut read = feed.open_read().unwrap();
        assert_eq!(read.current_id().unwrap(), second[0]);

        let events = read.changes_since(&first[0], &[]).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tx_id, 1);
        assert_eq!(events[0].seq, 1);
        assert_eq!(events[1].tx_id, 2);
        assert_eq!(events[1].seq, 0);
    }

    #[test]
    fn test_server_side_filtering() {
        let feed = MemoryFeed::new();
        let start = feed.open_read().unwrap().current_id().unwrap();
        feed.commit(Metadata::default(), vec![node("Person", 1), node("Place", 2)])
            .unwrap();

        let selectors = vec![Selector::node().labels(["Place"]).build().unwrap().to_wire()];
        let mut read = feed.open_read().unwrap();
        let events = read.changes_since(&start, &selectors).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.element_id(), "4:n:2");
    }

    #[test]
    fn test_retention_window() {
        let feed = MemoryFeed::new();
        let start = feed.open_read().unwrap().current_id().unwrap();
        let ids = feed
            .commit(Metadata::default(), vec![node("Person", 1), node("Person", 2)])
            .unwrap();

        feed.purge_through(&ids[0]).unwrap();
        assert_eq!(feed.len(), 1);

        let mut read = feed.open_read().unwrap();
        assert_eq!(read.earliest_id().unwrap(), ids[0]);
        assert!(matches!(
            read.changes_since(&start, &[]),
            Err(CdcError::Server(_))
        ));
        assert_eq!(read.changes_since(&ids[0], &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_unknown_identifiers() {
        let feed = MemoryFeed::new();
        let mut read = feed.open_read().unwrap();

        let garbage = ChangeIdentifier::new("not-an-id");
        assert!(matches!(
            read.changes_since(&garbage, &[]),
            Err(CdcError::Server(_))
        ));

        let future = encode_position(10);
        assert!(matches!(
            read.changes_since(&future, &[]),
            Err(CdcError::Server(_))
        ));
    }

    #[test]
    fn test_reads_are_released() {
        let feed = MemoryFeed::new();
        {
            let _read = feed.open_read().unwrap();
            assert_eq!(feed.open_reads(), 1);
        }
        assert_eq!(feed.open_reads(), 0);
    }

    #[test]
    fn test_injected_failures() {
        let feed = MemoryFeed::new();
        let start = feed.open_read().unwrap().current_id().unwrap();
        feed.fail_next_queries(1, "connection reset");

        let mut read = feed.open_read().unwrap();
        assert_eq!(
            read.changes_since(&start, &[]),
            Err(CdcError::Connectivity("connection reset".to_string()))
        );
        assert!(read.changes_since(&start, &[]).is_ok());
    }

    #[test]
    fn test_raw_records_are_mapped_on_read() {
        let feed = MemoryFeed::new();
        let start = feed.open_read().unwrap().current_id().unwrap();
        feed.commit_raw(json!({"id": "broken"}));

        let mut read = feed.open_read().unwrap();
        assert!(matches!(
            read.changes_since(&start, &[]),
            Err(CdcError::Mapping(_))
        ));
    }
}
