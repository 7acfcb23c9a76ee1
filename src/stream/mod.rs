//! Poll-to-stream protocol.
//!
//! Each stream runs its own poll loop on a dedicated thread:
//!
//! ```text
//! Idle -> Querying -> Draining -> Advancing -> Sleeping -> Querying -> ...
//!                                                 \-> Cancelled | Failed
//! ```
//!
//! - Querying: one consistent read captures the feed's current identifier and
//!   the changes after the cursor.
//! - Draining: each change is projected by its governing selector, handed to
//!   the consumer, then becomes the cursor.
//! - Advancing: after an empty batch the cursor moves to the identifier
//!   captured by the same read, so quiet periods never push the cursor out of
//!   the retention window.
//! - Sleeping: waits the poll interval; cancellation wakes it immediately.
//!
//! Errors end the stream: the error is the final item. There is no retry;
//! resume with a new stream from a cursor the consumer persisted.
//!
//! # Example
//!
//! ```ignore
//! let mut stream = client.stream(client.current()?);
//!
//! for item in stream.by_ref().take(10) {
//!     let event = item?;
//!     println!("{} {:?}", event.id, event.event);
//! }
//! stream.cancel();
//! ```

mod poller;
mod types;

pub(crate) use poller::{spawn, Poller};
pub(crate) use types::StateCell;
pub use types::{ChangeStream, CursorHandle, StreamState};
