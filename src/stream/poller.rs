//! Cursor state machine turning repeated change queries into a stream.

use crate::error::Result;
use crate::selectors::{apply_governing_selector, Selector};
use crate::source::{ChangeSource, ConsistentRead};
use crate::types::{ChangeEvent, Value};
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace};

use super::types::{ChangeStream, CursorHandle, StateCell, StreamState};

/// Result of one poll cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// Events were emitted; the cursor is at the last one.
    Delivered(usize),
    /// Nothing new; the cursor moved to the feed's current identifier.
    Quiet,
    /// The consumer went away mid-drain.
    Interrupted,
}

/// One subscription's poll loop state.
pub(crate) struct Poller<S> {
    source: Arc<S>,
    selectors: Arc<[Selector]>,
    wire_selectors: Arc<[Value]>,
    cursor: CursorHandle,
    state: StateCell,
}

impl<S: ChangeSource> Poller<S> {
    pub(crate) fn new(
        source: Arc<S>,
        selectors: Arc<[Selector]>,
        wire_selectors: Arc<[Value]>,
        cursor: CursorHandle,
        state: StateCell,
    ) -> Self {
        Self {
            source,
            selectors,
            wire_selectors,
            cursor,
            state,
        }
    }

    /// Run one query/drain/advance cycle.
    ///
    /// `emit` returns false when the consumer can no longer accept events; the
    /// cursor then stays at the last event actually emitted.
    pub(crate) fn cycle<F>(&self, mut emit: F) -> Result<CycleOutcome>
    where
        F: FnMut(ChangeEvent) -> bool,
    {
        self.state.set(StreamState::Querying);

        // The current identifier and the changes must come from the same read:
        // that is what makes advancing on an empty batch safe.
        let (current, events) = {
            let mut read = self.source.open_read()?;
            let current = read.current_id()?;
            let from = self.cursor.get();
            trace!(from = %from, selectors = ?self.wire_selectors, "running change query");
            let events = read.changes_since(&from, &self.wire_selectors)?;
            (current, events)
        };

        self.state.set(StreamState::Draining);
        let count = events.len();
        for event in events {
            let id = event.id.clone();
            if !emit(apply_governing_selector(&self.selectors, event)) {
                return Ok(CycleOutcome::Interrupted);
            }
            self.cursor.set(id);
        }

        self.state.set(StreamState::Advancing);
        if count == 0 {
            self.cursor.set(current);
            return Ok(CycleOutcome::Quiet);
        }
        Ok(CycleOutcome::Delivered(count))
    }
}

/// Start a poll loop on its own thread.
pub(crate) fn spawn<S>(poller: Poller<S>, poll_interval: Duration, buffer_size: usize) -> ChangeStream
where
    S: ChangeSource + Send + Sync + 'static,
{
    let (sender, receiver) = bounded(buffer_size);
    let (cancel_sender, cancel_receiver) = bounded::<()>(0);
    let cursor = poller.cursor.clone();
    let state = poller.state.clone();

    let worker = thread::spawn(move || run(poller, sender, cancel_receiver, poll_interval));

    ChangeStream {
        receiver,
        cancel: Some(cancel_sender),
        cursor,
        state,
        worker: Some(worker),
    }
}

fn run<S: ChangeSource>(
    poller: Poller<S>,
    sender: Sender<Result<ChangeEvent>>,
    cancel: Receiver<()>,
    poll_interval: Duration,
) {
    trace!(cursor = %poller.cursor.get(), "subscribed to change stream");

    loop {
        if is_cancelled(&cancel) {
            break;
        }

        match poller.cycle(|event| deliver(&sender, &cancel, Ok(event))) {
            Ok(CycleOutcome::Delivered(count)) => {
                debug!(count, cursor = %poller.cursor.get(), "delivered changes");
            }
            Ok(CycleOutcome::Quiet) => {
                trace!(cursor = %poller.cursor.get(), "no changes, cursor advanced to current");
            }
            Ok(CycleOutcome::Interrupted) => break,
            Err(e) => {
                error!(error = %e, cursor = %poller.cursor.get(), "change stream failed");
                poller.state.set(StreamState::Failed);
                deliver(&sender, &cancel, Err(e));
                return;
            }
        }

        poller.state.set(StreamState::Sleeping);
        let woken_by_cancel = select! {
            recv(cancel) -> _ => true,
            default(poll_interval) => false,
        };
        if woken_by_cancel {
            break;
        }
    }

    poller.state.set(StreamState::Cancelled);
    trace!(cursor = %poller.cursor.get(), "change stream cancelled");
}

/// Hand an item to the consumer unless the stream was cancelled first.
fn deliver(
    sender: &Sender<Result<ChangeEvent>>,
    cancel: &Receiver<()>,
    item: Result<ChangeEvent>,
) -> bool {
    if is_cancelled(cancel) {
        return false;
    }
    select! {
        send(sender, item) -> res => res.is_ok(),
        recv(cancel) -> _ => false,
    }
}

fn is_cancelled(cancel: &Receiver<()>) -> bool {
    !matches!(cancel.try_recv(), Err(TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFeed;
    use crate::selectors::encode_selectors;
    use crate::types::{
        ChangeIdentifier, ChangeState, EntityOperation, Event, Metadata, NodeEvent, NodeKeys,
        NodeState,
    };
    use serde_json::json;

    fn node(label: &str, id: i64) -> Event {
        Event::Node(NodeEvent {
            element_id: format!("4:n:{}", id),
            operation: EntityOperation::Create,
            labels: vec![label.to_string()],
            keys: NodeKeys::new(),
            state: ChangeState::created(NodeState::new(
                vec![label.to_string()],
                serde_json::from_value(json!({"id": id, "secret": "x"})).unwrap(),
            )),
        })
    }

    fn current(feed: &MemoryFeed) -> ChangeIdentifier {
        feed.open_read().unwrap().current_id().unwrap()
    }

    fn poller(feed: &MemoryFeed, selectors: Vec<Selector>) -> Poller<MemoryFeed> {
        let wire: Arc<[Value]> = encode_selectors(&selectors).into();
        Poller::new(
            Arc::new(feed.clone()),
            selectors.into(),
            wire,
            CursorHandle::new(current(feed)),
            StateCell::new(),
        )
    }

    #[test]
    fn test_cursor_follows_emitted_events() {
        let feed = MemoryFeed::new();
        let poller = poller(&feed, vec![]);
        let ids = feed
            .commit(Metadata::default(), vec![node("Person", 1), node("Person", 2)])
            .unwrap();

        let mut seen = Vec::new();
        let outcome = poller
            .cycle(|event| {
                // The cursor trails the event being emitted.
                seen.push((event.id.clone(), poller.cursor.get()));
                true
            })
            .unwrap();

        assert_eq!(outcome, CycleOutcome::Delivered(2));
        assert_eq!(seen[1].1, ids[0]);
        assert_eq!(poller.cursor.get(), ids[1]);
        assert_eq!(poller.state.get(), StreamState::Advancing);
    }

    #[test]
    fn test_quiet_cycles_advance_to_current() {
        let feed = MemoryFeed::new();
        let selectors = vec![Selector::node().labels(["Place"]).build().unwrap()];
        let poller = poller(&feed, selectors);

        let mut emitted = 0;
        for _ in 0..3 {
            // Filtered out by the feed, but it still moves the current id.
            feed.commit(Metadata::default(), vec![node("Person", 1)]).unwrap();
            let outcome = poller.cycle(|_| {
                emitted += 1;
                true
            });
            assert_eq!(outcome.unwrap(), CycleOutcome::Quiet);
            assert_eq!(poller.cursor.get(), current(&feed));
        }
        assert_eq!(emitted, 0);

        let ids = feed.commit(Metadata::default(), vec![node("Place", 48)]).unwrap();
        let mut delivered = Vec::new();
        poller
            .cycle(|event| {
                delivered.push(event);
                true
            })
            .unwrap();

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, ids[0]);
        assert_eq!(poller.cursor.get(), ids[0]);
    }

    #[test]
    fn test_interrupted_drain_keeps_cursor() {
        let feed = MemoryFeed::new();
        let poller = poller(&feed, vec![]);
        let ids = feed
            .commit(Metadata::default(), vec![node("Person", 1), node("Person", 2)])
            .unwrap();

        let mut accepted = 0;
        let outcome = poller
            .cycle(|_| {
                accepted += 1;
                accepted < 2
            })
            .unwrap();

        assert_eq!(outcome, CycleOutcome::Interrupted);
        assert_eq!(poller.cursor.get(), ids[0]);
    }

    #[test]
    fn test_projection_applied_while_draining() {
        let feed = MemoryFeed::new();
        let selectors = vec![Selector::node()
            .excluding_properties(["secret"])
            .build()
            .unwrap()];
        let poller = poller(&feed, selectors);
        feed.commit(Metadata::default(), vec![node("Person", 1)]).unwrap();

        let mut delivered = Vec::new();
        poller
            .cycle(|event| {
                delivered.push(event);
                true
            })
            .unwrap();

        let after = delivered[0].event.after_properties().unwrap();
        assert!(after.contains_key("id"));
        assert!(!after.contains_key("secret"));
    }

    #[test]
    fn test_failed_read_is_released() {
        let feed = MemoryFeed::new();
        let poller = poller(&feed, vec![]);
        let before = poller.cursor.get();
        feed.fail_next_queries(1, "connection refused");

        let result = poller.cycle(|_| true);

        assert!(result.is_err());
        assert_eq!(feed.open_reads(), 0);
        assert_eq!(poller.cursor.get(), before);
    }
}
