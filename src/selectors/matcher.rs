//! Predicate evaluation: which selector governs an event.
//!
//! The feed already returns the union of everything the configured selectors
//! admit. Client-side evaluation exists only to pick, deterministically, the
//! one selector whose projection applies: the first match in configuration
//! order.

use crate::types::{
    ChangeEvent, Event, KeyTuple, NodeEvent, NodeKeys, PropertyMap, RelationshipEvent, Value,
};
use std::collections::{BTreeMap, BTreeSet};

use super::types::{EntityFilter, NodeFilter, RelationshipFilter, Selector, SelectorTarget};

/// Index of the first selector matching `event`, if any.
pub fn governing_selector(selectors: &[Selector], event: &ChangeEvent) -> Option<usize> {
    selectors.iter().position(|selector| selector.matches(event))
}

impl Selector {
    /// Whether every configured constraint holds for `event`.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let target_matches = match (&self.target, &event.event) {
            (SelectorTarget::Entity, _) => true,
            (SelectorTarget::Node(filter), Event::Node(node)) => filter.matches_node(node),
            (SelectorTarget::Relationship(filter), Event::Relationship(rel)) => {
                filter.matches(rel)
            }
            _ => false,
        };

        target_matches && self.filter.matches(event)
    }
}

impl EntityFilter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(operation) = self.operation {
            if operation != event.operation() {
                return false;
            }
        }

        if let Some(ref user) = self.authenticated_user {
            if event.metadata.authenticated_user.as_ref() != Some(user) {
                return false;
            }
        }

        if let Some(ref user) = self.executing_user {
            if event.metadata.executing_user.as_ref() != Some(user) {
                return false;
            }
        }

        let tx_metadata = &event.metadata.tx_metadata;
        if !self
            .tx_metadata
            .iter()
            .all(|(key, value)| tx_metadata.get(key) == Some(value))
        {
            return false;
        }

        self.changes_to.is_empty() || self.changed(&event.event)
    }

    /// Every `changes_to` property differs between the two images. A missing
    /// image counts as having no properties.
    fn changed(&self, event: &Event) -> bool {
        let empty = PropertyMap::new();
        let before = event.before_properties().unwrap_or(&empty);
        let after = event.after_properties().unwrap_or(&empty);

        self.changes_to
            .iter()
            .all(|name| before.get(name) != after.get(name))
    }
}

impl NodeFilter {
    fn matches_node(&self, node: &NodeEvent) -> bool {
        self.matches_parts(&node.labels, &node.keys)
    }

    pub(crate) fn matches_parts(&self, labels: &[String], keys: &NodeKeys) -> bool {
        if !self.labels.iter().all(|label| labels.contains(label)) {
            return false;
        }

        if self.key.is_empty() {
            return true;
        }

        // Only key tuples owned by the selected labels count.
        keys.iter()
            .filter(|(label, _)| label_selected(&self.labels, label))
            .flat_map(|(_, tuples)| tuples)
            .any(|tuple| key_equals(&self.key, tuple))
    }
}

impl RelationshipFilter {
    fn matches(&self, rel: &RelationshipEvent) -> bool {
        if let Some(ref rel_type) = self.rel_type {
            if *rel_type != rel.rel_type {
                return false;
            }
        }

        if !self.start.matches_parts(&rel.start.labels, &rel.start.keys) {
            return false;
        }

        if !self.end.matches_parts(&rel.end.labels, &rel.end.keys) {
            return false;
        }

        self.key.is_empty() || rel.keys.iter().any(|tuple| key_equals(&self.key, tuple))
    }
}

fn label_selected(selected: &BTreeSet<String>, label: &str) -> bool {
    selected.is_empty() || selected.contains(label)
}

fn key_equals(expected: &BTreeMap<String, Value>, tuple: &KeyTuple) -> bool {
    expected.len() == tuple.len()
        && expected
            .iter()
            .all(|(name, value)| tuple.get(name) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ChangeIdentifier, ChangeState, EntityOperation, Metadata, NodeRef, NodeState,
        RelationshipState,
    };
    use serde_json::json;

    fn props(value: Value) -> PropertyMap {
        serde_json::from_value(value).unwrap()
    }

    fn person_created(id: i64) -> ChangeEvent {
        let mut keys = NodeKeys::new();
        keys.insert("Person".to_string(), vec![props(json!({"id": id}))]);

        ChangeEvent {
            id: ChangeIdentifier::new(format!("C{}", id)),
            tx_id: 1,
            seq: 0,
            metadata: Metadata {
                authenticated_user: Some("neo4j".to_string()),
                executing_user: Some("app".to_string()),
                tx_metadata: [("app".to_string(), json!("billing"))].into_iter().collect(),
                ..Default::default()
            },
            event: Event::Node(NodeEvent {
                element_id: format!("4:n:{}", id),
                operation: EntityOperation::Create,
                labels: vec!["Person".to_string(), "Employee".to_string()],
                keys,
                state: ChangeState::created(NodeState::new(
                    vec!["Person".to_string(), "Employee".to_string()],
                    props(json!({"id": id, "name": "john"})),
                )),
            }),
        }
    }

    fn born_in_updated() -> ChangeEvent {
        let node = |element_id: &str, label: &str, id: i64| {
            let mut keys = NodeKeys::new();
            keys.insert(label.to_string(), vec![props(json!({"id": id}))]);
            NodeRef {
                element_id: element_id.to_string(),
                labels: vec![label.to_string()],
                keys,
            }
        };

        ChangeEvent {
            id: ChangeIdentifier::new("R1"),
            tx_id: 2,
            seq: 0,
            metadata: Metadata::default(),
            event: Event::Relationship(RelationshipEvent {
                element_id: "5:r:1".to_string(),
                rel_type: "BORN_IN".to_string(),
                operation: EntityOperation::Update,
                start: node("4:n:1", "Person", 1),
                end: node("4:n:48", "Place", 48),
                keys: vec![props(json!({"on": "1990-05-01"}))],
                state: ChangeState::updated(
                    RelationshipState::new(props(json!({"on": "1990-05-01", "at": "x"}))),
                    RelationshipState::new(props(json!({"on": "1990-05-01", "at": "y"}))),
                ),
            }),
        }
    }

    #[test]
    fn test_type_gate() {
        let node_selector = Selector::node().build().unwrap();
        let rel_selector = Selector::relationship().build().unwrap();
        let entity_selector = Selector::entity().build().unwrap();

        let node = person_created(1);
        let rel = born_in_updated();

        assert!(node_selector.matches(&node));
        assert!(!node_selector.matches(&rel));
        assert!(rel_selector.matches(&rel));
        assert!(!rel_selector.matches(&node));
        assert!(entity_selector.matches(&node));
        assert!(entity_selector.matches(&rel));
    }

    #[test]
    fn test_operation_and_users() {
        let event = person_created(1);

        let create = Selector::entity()
            .operation(EntityOperation::Create)
            .build()
            .unwrap();
        let delete = Selector::entity()
            .operation(EntityOperation::Delete)
            .build()
            .unwrap();
        assert!(create.matches(&event));
        assert!(!delete.matches(&event));

        let users = Selector::entity()
            .authenticated_user("neo4j")
            .executing_user("app")
            .build()
            .unwrap();
        assert!(users.matches(&event));

        let other = Selector::entity().executing_user("neo4j").build().unwrap();
        assert!(!other.matches(&event));
    }

    #[test]
    fn test_tx_metadata_subset() {
        let event = person_created(1);

        let subset = Selector::entity()
            .tx_metadata([("app", json!("billing"))])
            .build()
            .unwrap();
        assert!(subset.matches(&event));

        let superset = Selector::entity()
            .tx_metadata([("app", json!("billing")), ("appUser", json!("test"))])
            .build()
            .unwrap();
        assert!(!superset.matches(&event));

        let mismatch = Selector::entity()
            .tx_metadata([("app", json!("other"))])
            .build()
            .unwrap();
        assert!(!mismatch.matches(&event));
    }

    #[test]
    fn test_node_labels_and_key() {
        let event = person_created(1);

        let labels = Selector::node().labels(["Person"]).build().unwrap();
        assert!(labels.matches(&event));

        let missing = Selector::node()
            .labels(["Person", "Manager"])
            .build()
            .unwrap();
        assert!(!missing.matches(&event));

        let key = Selector::node()
            .labels(["Person"])
            .key([("id", json!(1))])
            .build()
            .unwrap();
        assert!(key.matches(&event));

        let wrong_key = Selector::node()
            .labels(["Person"])
            .key([("id", json!(2))])
            .build()
            .unwrap();
        assert!(!wrong_key.matches(&event));

        // The key belongs to Person, not Employee.
        let wrong_label = Selector::node()
            .labels(["Employee"])
            .key([("id", json!(1))])
            .build()
            .unwrap();
        assert!(!wrong_label.matches(&event));

        let any_label = Selector::node().key([("id", json!(1))]).build().unwrap();
        assert!(any_label.matches(&event));
    }

    #[test]
    fn test_relationship_constraints() {
        let event = born_in_updated();

        let typed = Selector::relationship().rel_type("BORN_IN").build().unwrap();
        assert!(typed.matches(&event));

        let other_type = Selector::relationship().rel_type("KNOWS").build().unwrap();
        assert!(!other_type.matches(&event));

        let endpoints = Selector::relationship()
            .rel_type("BORN_IN")
            .start(NodeFilter::new().with_labels(["Person"]))
            .end(NodeFilter::new().with_labels(["Place"]).with_key([("id", json!(48))]))
            .build()
            .unwrap();
        assert!(endpoints.matches(&event));

        let swapped = Selector::relationship()
            .start(NodeFilter::new().with_labels(["Place"]))
            .build()
            .unwrap();
        assert!(!swapped.matches(&event));

        let key = Selector::relationship()
            .key([("on", json!("1990-05-01"))])
            .build()
            .unwrap();
        assert!(key.matches(&event));
    }

    #[test]
    fn test_changes_to() {
        let event = born_in_updated();

        let changed = Selector::relationship().changes_to(["at"]).build().unwrap();
        assert!(changed.matches(&event));

        let unchanged = Selector::relationship()
            .changes_to(["at", "on"])
            .build()
            .unwrap();
        assert!(!unchanged.matches(&event));

        // Creation: every property in the after image has changed.
        let created = Selector::node().changes_to(["name"]).build().unwrap();
        assert!(created.matches(&person_created(1)));
    }

    #[test]
    fn test_first_match_wins() {
        let event = person_created(1);
        let selectors = vec![
            Selector::relationship().build().unwrap(),
            Selector::node().labels(["Person"]).build().unwrap(),
            Selector::entity().build().unwrap(),
        ];

        assert_eq!(governing_selector(&selectors, &event), Some(1));
        assert_eq!(governing_selector(&selectors[..1], &event), None);
        assert_eq!(governing_selector(&[], &event), None);
    }
}
