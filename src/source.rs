//! Collaborator interface to the database.
//!
//! Establishing connections, running the change procedures and mapping the
//! returned rows are the job of a [`ChangeSource`] implementation. The client
//! only requires that a read handle sees one consistent snapshot of the feed
//! and that dropping it releases whatever it holds.

use crate::error::Result;
use crate::types::{ChangeEvent, ChangeIdentifier, Value};

/// A scoped, consistent read of the change feed.
///
/// All calls on one handle observe the same snapshot. The handle is released
/// when dropped, on every exit path.
pub trait ConsistentRead {
    /// Oldest identifier still inside the retention window.
    fn earliest_id(&mut self) -> Result<ChangeIdentifier>;

    /// Identifier of the latest committed change.
    fn current_id(&mut self) -> Result<ChangeIdentifier>;

    /// Changes committed after `from`, in feed order, admitted by at least one
    /// of the wire-encoded `selectors` (all changes when empty).
    fn changes_since(
        &mut self,
        from: &ChangeIdentifier,
        selectors: &[Value],
    ) -> Result<Vec<ChangeEvent>>;
}

/// Factory for consistent reads.
pub trait ChangeSource {
    type Read<'a>: ConsistentRead
    where
        Self: 'a;

    /// Open a new consistent read.
    fn open_read(&self) -> Result<Self::Read<'_>>;
}
