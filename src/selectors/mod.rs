//! Selectors: declarative predicates over change events and the property
//! projection applied to the events they govern.
//!
//! A selector list plays two roles:
//! - Encoded with [`Selector::to_wire`], the feed returns every event admitted
//!   by at least one selector.
//! - Client-side, the first selector (in configuration order) matching an
//!   event governs its projection. Later matches are never consulted.
//!
//! # Example
//!
//! ```ignore
//! let selectors = vec![
//!     Selector::node()
//!         .labels(["Place"])
//!         .operation(EntityOperation::Create)
//!         .including_properties(["id", "name"])
//!         .build()?,
//!     Selector::relationship()
//!         .rel_type("BORN_IN")
//!         .excluding_properties(["on"])
//!         .build()?,
//! ];
//!
//! let event = apply_governing_selector(&selectors, event);
//! ```

mod matcher;
mod projection;
mod types;
mod wire;

pub use matcher::governing_selector;
pub use projection::apply_governing_selector;
pub use types::{
    EntityFilter, NodeFilter, PropertyProjection, RelationshipFilter, Selector, SelectorBuilder,
    SelectorTarget, WILDCARD,
};
pub use wire::encode_selectors;
