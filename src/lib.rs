//! # Change Feed Client
//!
//! A consumer for the change-data-capture feed of a graph database: read the
//! ordered changes after a checkpoint, narrow and project them with
//! selectors, or follow the feed as a stream by polling.
//!
//! ## Core Concepts
//!
//! - **ChangeIdentifier**: Opaque, ordered checkpoint in the feed
//! - **Selectors**: Predicates sent to the feed plus client-side property
//!   projection; the first matching selector governs an event
//! - **Sources**: The database side, behind the [`ChangeSource`] trait
//! - **Streams**: A per-subscription poll loop with a cursor that never skips
//!   changes and keeps moving while the feed is quiet
//!
//! ## Example
//!
//! ```ignore
//! use changefeed::{CdcClient, ClientConfig, EntityOperation, Selector};
//!
//! let client = CdcClient::new(source, ClientConfig::default().with_selectors([
//!     Selector::node()
//!         .labels(["Place"])
//!         .operation(EntityOperation::Create)
//!         .including_properties(["id", "name"])
//!         .build()?,
//! ]));
//!
//! // One-shot
//! let changes = client.query(&checkpoint)?;
//!
//! // Streaming
//! for change in client.stream(client.current()?) {
//!     let change = change?;
//!     checkpoint = change.id.clone();
//! }
//! ```

pub mod client;
pub mod error;
pub mod mapping;
pub mod memory;
pub mod selectors;
pub mod source;
pub mod stream;
pub mod types;

// Re-exports
pub use client::{CdcClient, ClientConfig};
pub use error::{CdcError, Result};
pub use mapping::{parse_change_event, parse_change_identifier};
pub use memory::{MemoryFeed, MemoryRead};
pub use selectors::{
    apply_governing_selector, encode_selectors, governing_selector, EntityFilter, NodeFilter,
    PropertyProjection, RelationshipFilter, Selector, SelectorBuilder, SelectorTarget, WILDCARD,
};
pub use source::{ChangeSource, ConsistentRead};
pub use stream::{ChangeStream, CursorHandle, StreamState};
pub use types::*;
