//! Change feed client.

use crate::error::Result;
use crate::selectors::{apply_governing_selector, encode_selectors, Selector};
use crate::source::{ChangeSource, ConsistentRead};
use crate::stream::{self, ChangeStream, CursorHandle, Poller, StateCell};
use crate::types::{ChangeEvent, ChangeIdentifier, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Pause between polls of a stream.
    /// Default: 1s
    pub poll_interval: Duration,

    /// Max events buffered between a stream's poll loop and its consumer.
    /// Default: 1000
    pub buffer_size: usize,

    /// Selectors, in priority order (empty = everything, unprojected).
    pub selectors: Vec<Selector>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            buffer_size: 1000,
            selectors: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_selectors(mut self, selectors: impl IntoIterator<Item = Selector>) -> Self {
        self.selectors.extend(selectors);
        self
    }
}

/// Reads changes from a [`ChangeSource`], projecting them through the
/// configured selectors.
///
/// The selector list is fixed at construction and shared read-only by every
/// query and stream started from this client.
pub struct CdcClient<S> {
    source: Arc<S>,
    selectors: Arc<[Selector]>,
    wire_selectors: Arc<[Value]>,
    poll_interval: Duration,
    buffer_size: usize,
}

impl<S: ChangeSource> CdcClient<S> {
    pub fn new(source: S, config: ClientConfig) -> Self {
        let wire_selectors = encode_selectors(&config.selectors);
        Self {
            source: Arc::new(source),
            selectors: config.selectors.into(),
            wire_selectors: wire_selectors.into(),
            poll_interval: config.poll_interval,
            buffer_size: config.buffer_size,
        }
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// Oldest identifier a query can start from.
    pub fn earliest(&self) -> Result<ChangeIdentifier> {
        trace!("querying earliest change identifier");
        let result = self.source.open_read().and_then(|mut read| read.earliest_id());
        log_checkpoint("earliest", result)
    }

    /// Identifier of the latest committed change.
    pub fn current(&self) -> Result<ChangeIdentifier> {
        trace!("querying current change identifier");
        let result = self.source.open_read().and_then(|mut read| read.current_id());
        log_checkpoint("current", result)
    }

    /// All changes after `from` that the selectors admit, projected.
    pub fn query(&self, from: &ChangeIdentifier) -> Result<Vec<ChangeEvent>> {
        trace!(from = %from, selectors = ?self.wire_selectors, "running change query");

        let events = {
            let mut read = self.source.open_read()?;
            read.changes_since(from, &self.wire_selectors)
        };

        match events {
            Ok(events) => {
                trace!(count = events.len(), "change query completed");
                Ok(events
                    .into_iter()
                    .map(|event| apply_governing_selector(&self.selectors, event))
                    .collect())
            }
            Err(e) => {
                error!(error = %e, from = %from, "change query failed");
                Err(e)
            }
        }
    }
}

impl<S> CdcClient<S>
where
    S: ChangeSource + Send + Sync + 'static,
{
    /// Follow the feed from `from` until cancelled or failed.
    ///
    /// Every call starts an independent poll loop with its own cursor.
    pub fn stream(&self, from: ChangeIdentifier) -> ChangeStream {
        let poller = Poller::new(
            Arc::clone(&self.source),
            Arc::clone(&self.selectors),
            Arc::clone(&self.wire_selectors),
            CursorHandle::new(from),
            StateCell::new(),
        );
        stream::spawn(poller, self.poll_interval, self.buffer_size)
    }
}

fn log_checkpoint(
    description: &str,
    result: Result<ChangeIdentifier>,
) -> Result<ChangeIdentifier> {
    match &result {
        Ok(id) => trace!(id = %id, "{} change identifier", description),
        Err(e) => error!(error = %e, "querying {} change identifier failed", description),
    }
    result
}
