//! Property projection of governed events.

use crate::types::{ChangeEvent, Event, PropertyMap};

use super::matcher::governing_selector;
use super::types::{PropertyProjection, Selector, WILDCARD};

impl PropertyProjection {
    /// Whether applying this projection leaves every map unchanged.
    pub fn is_identity(&self) -> bool {
        if !self.including.is_empty() {
            return self.including.contains(WILDCARD);
        }
        self.excluding.is_empty()
    }

    fn keeps(&self, name: &str) -> bool {
        if !self.including.is_empty() {
            self.including.contains(WILDCARD) || self.including.contains(name)
        } else {
            !self.excluding.contains(name)
        }
    }

    /// Projected copy of `properties`.
    pub fn apply(&self, properties: &PropertyMap) -> PropertyMap {
        properties
            .iter()
            .filter(|(name, _)| self.keeps(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn retain(&self, properties: &mut PropertyMap) {
        if !self.is_identity() {
            properties.retain(|name, _| self.keeps(name));
        }
    }
}

impl Selector {
    /// Projected copy of `properties` under this selector's policy.
    pub fn project(&self, properties: &PropertyMap) -> PropertyMap {
        self.projection.apply(properties)
    }

    /// Project the before/after properties of `event`.
    ///
    /// Only property maps are touched; absent images stay absent.
    pub fn apply_properties(&self, mut event: ChangeEvent) -> ChangeEvent {
        if self.projection.is_identity() {
            return event;
        }

        let projection = &self.projection;
        match &mut event.event {
            Event::Node(node) => {
                for state in [&mut node.state.before, &mut node.state.after] {
                    if let Some(state) = state {
                        projection.retain(&mut state.properties);
                    }
                }
            }
            Event::Relationship(rel) => {
                for state in [&mut rel.state.before, &mut rel.state.after] {
                    if let Some(state) = state {
                        projection.retain(&mut state.properties);
                    }
                }
            }
        }
        event
    }
}

/// Apply the projection of the governing selector to `event`.
///
/// Events no selector matches pass through unchanged: admission is decided by
/// the feed, not here.
pub fn apply_governing_selector(selectors: &[Selector], event: ChangeEvent) -> ChangeEvent {
    if selectors.is_empty() {
        return event;
    }

    match governing_selector(selectors, &event) {
        Some(index) => selectors[index].apply_properties(event),
        None => event,
    }
}
