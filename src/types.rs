//! Core types for change events.
//!
//! The serde representation of these types is the record format of the feed:
//! camelCase keys, `eventType` of `"n"`/`"r"` and operations as `"c"`/`"u"`/`"d"`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Property and key values as returned by the feed.
pub type Value = serde_json::Value;

/// Properties of a node or relationship state.
pub type PropertyMap = HashMap<String, Value>;

/// Property values identifying an entity under a uniqueness constraint.
pub type KeyTuple = HashMap<String, Value>;

/// Key tuples of a node, grouped by the label that owns the constraint.
pub type NodeKeys = HashMap<String, Vec<KeyTuple>>;

/// Opaque checkpoint in the change feed.
///
/// The total order is defined by the server; the client never compares
/// identifiers, it only hands them back.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeIdentifier(String);

impl ChangeIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        ChangeIdentifier(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChangeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeId({})", self.0)
    }
}

impl fmt::Display for ChangeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation applied to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityOperation {
    #[serde(rename = "c")]
    Create,
    #[serde(rename = "u")]
    Update,
    #[serde(rename = "d")]
    Delete,
}

impl EntityOperation {
    /// Shorthand used in records and selector predicates.
    pub fn shorthand(self) -> &'static str {
        match self {
            EntityOperation::Create => "c",
            EntityOperation::Update => "u",
            EntityOperation::Delete => "d",
        }
    }

    pub fn from_shorthand(s: &str) -> Option<Self> {
        match s {
            "c" => Some(EntityOperation::Create),
            "u" => Some(EntityOperation::Update),
            "d" => Some(EntityOperation::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for EntityOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityOperation::Create => "CREATE",
            EntityOperation::Update => "UPDATE",
            EntityOperation::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Enrichment mode the transaction log was written with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaptureMode {
    Off,
    Diff,
    Full,
}

impl Default for CaptureMode {
    fn default() -> Self {
        CaptureMode::Full
    }
}

/// Transaction-level metadata attached to every change.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executing_user: Option<String>,

    #[serde(default)]
    pub capture_mode: CaptureMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_client: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_server: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    /// Transaction start time as reported by the server (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_start_time: Option<String>,

    /// Transaction commit time as reported by the server (ISO-8601).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_commit_time: Option<String>,

    /// Metadata the committing client attached to its transaction.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tx_metadata: HashMap<String, Value>,

    /// Entries this model does not know about yet.
    #[serde(flatten)]
    pub additional_entries: HashMap<String, Value>,
}

/// A single committed change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub id: ChangeIdentifier,
    pub tx_id: i64,
    /// Order of the change within its transaction.
    pub seq: i64,
    pub metadata: Metadata,
    pub event: Event,
}

impl ChangeEvent {
    pub fn operation(&self) -> EntityOperation {
        self.event.operation()
    }
}

/// Entity-level payload of a change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum Event {
    #[serde(rename = "n")]
    Node(NodeEvent),
    #[serde(rename = "r")]
    Relationship(RelationshipEvent),
}

impl Event {
    pub fn operation(&self) -> EntityOperation {
        match self {
            Event::Node(node) => node.operation,
            Event::Relationship(rel) => rel.operation,
        }
    }

    pub fn element_id(&self) -> &str {
        match self {
            Event::Node(node) => &node.element_id,
            Event::Relationship(rel) => &rel.element_id,
        }
    }

    /// Properties before the change (None for creations).
    pub fn before_properties(&self) -> Option<&PropertyMap> {
        match self {
            Event::Node(node) => node.state.before.as_ref().map(|s| &s.properties),
            Event::Relationship(rel) => rel.state.before.as_ref().map(|s| &s.properties),
        }
    }

    /// Properties after the change (None for deletions).
    pub fn after_properties(&self) -> Option<&PropertyMap> {
        match self {
            Event::Node(node) => node.state.after.as_ref().map(|s| &s.properties),
            Event::Relationship(rel) => rel.state.after.as_ref().map(|s| &s.properties),
        }
    }

    pub(crate) fn has_valid_states(&self) -> bool {
        match self {
            Event::Node(node) => node.state.is_consistent_with(node.operation),
            Event::Relationship(rel) => rel.state.is_consistent_with(rel.operation),
        }
    }
}

/// Before/after images of an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeState<T> {
    #[serde(default)]
    pub before: Option<T>,
    #[serde(default)]
    pub after: Option<T>,
}

impl<T> ChangeState<T> {
    pub fn created(after: T) -> Self {
        Self {
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(before: T, after: T) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(before: T) -> Self {
        Self {
            before: Some(before),
            after: None,
        }
    }

    /// `before` is absent iff CREATE, `after` is absent iff DELETE.
    pub fn is_consistent_with(&self, operation: EntityOperation) -> bool {
        self.before.is_none() == (operation == EntityOperation::Create)
            && self.after.is_none() == (operation == EntityOperation::Delete)
    }
}

/// Change to a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEvent {
    pub element_id: String,
    pub operation: EntityOperation,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub keys: NodeKeys,
    pub state: ChangeState<NodeState>,
}

/// Image of a node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl NodeState {
    pub fn new(labels: Vec<String>, properties: PropertyMap) -> Self {
        Self { labels, properties }
    }
}

/// Change to a relationship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEvent {
    pub element_id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub operation: EntityOperation,
    pub start: NodeRef,
    pub end: NodeRef,
    #[serde(default)]
    pub keys: Vec<KeyTuple>,
    pub state: ChangeState<RelationshipState>,
}

/// Image of a relationship.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipState {
    #[serde(default)]
    pub properties: PropertyMap,
}

impl RelationshipState {
    pub fn new(properties: PropertyMap) -> Self {
        Self { properties }
    }
}

/// Start or end node of a relationship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub element_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub keys: NodeKeys,
}
