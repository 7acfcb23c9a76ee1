//! Stream handle and shared stream state.

use crate::error::Result;
use crate::types::{ChangeEvent, ChangeIdentifier};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Where a stream's poll loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Created, no query issued yet.
    Idle,
    /// Waiting on the consistent read.
    Querying,
    /// Handing events to the consumer.
    Draining,
    /// Moving the cursor after a cycle.
    Advancing,
    /// Waiting for the next poll.
    Sleeping,
    /// Stopped by the consumer.
    Cancelled,
    /// Stopped by an error, which was the last item delivered.
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Cancelled | StreamState::Failed)
    }
}

/// Shared view of a stream's cursor.
///
/// Only the stream's own poll loop moves the cursor. Readers get a snapshot
/// of the whole identifier; each read or write is a single swap under the
/// lock, never a partial update.
#[derive(Clone, Debug)]
pub struct CursorHandle {
    inner: Arc<RwLock<ChangeIdentifier>>,
}

impl CursorHandle {
    pub(crate) fn new(id: ChangeIdentifier) -> Self {
        Self {
            inner: Arc::new(RwLock::new(id)),
        }
    }

    /// Snapshot of the current position.
    pub fn get(&self) -> ChangeIdentifier {
        self.inner.read().clone()
    }

    pub(crate) fn set(&self, id: ChangeIdentifier) {
        *self.inner.write() = id;
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StateCell {
    inner: Arc<RwLock<StreamState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StreamState::Idle)),
        }
    }

    pub(crate) fn get(&self) -> StreamState {
        *self.inner.read()
    }

    pub(crate) fn set(&self, state: StreamState) {
        *self.inner.write() = state;
    }
}

/// Consumer side of a change stream.
///
/// Items are delivered in feed order. A failure is delivered as the last
/// item, after which the stream ends. Iterating ends once the stream is
/// cancelled or failed and every buffered item was received.
///
/// Dropping the handle signals the poll loop to stop without waiting for it;
/// [`ChangeStream::cancel`] also waits.
pub struct ChangeStream {
    pub(crate) receiver: Receiver<Result<ChangeEvent>>,
    /// Dropping this sender is the cancellation signal.
    pub(crate) cancel: Option<Sender<()>>,
    pub(crate) cursor: CursorHandle,
    pub(crate) state: StateCell,
    pub(crate) worker: Option<JoinHandle<()>>,
}

impl ChangeStream {
    /// Receive the next item (blocking).
    pub fn recv(&self) -> std::result::Result<Result<ChangeEvent>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an item (non-blocking).
    pub fn try_recv(
        &self,
    ) -> std::result::Result<Result<ChangeEvent>, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Result<ChangeEvent>, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Identifier of the last change handed to this stream's buffer, or the
    /// feed's current identifier after a quiet poll.
    pub fn cursor(&self) -> ChangeIdentifier {
        self.cursor.get()
    }

    /// Cursor view that outlives the stream handle.
    pub fn cursor_handle(&self) -> CursorHandle {
        self.cursor.clone()
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    /// Stop polling and wait for the poll loop to exit.
    ///
    /// A read already in flight is allowed to complete; its results are not
    /// delivered.
    pub fn cancel(&mut self) {
        self.cancel.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Iterator for ChangeStream {
    type Item = Result<ChangeEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.cancel.take();
    }
}
