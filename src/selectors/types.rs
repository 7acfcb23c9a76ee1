//! Selector types and builders.

use crate::error::{CdcError, Result};
use crate::types::{EntityOperation, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Property name that includes every property.
pub const WILDCARD: &str = "*";

/// Constraints shared by every selector kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityFilter {
    pub operation: Option<EntityOperation>,
    /// Properties that must all have changed value.
    pub changes_to: BTreeSet<String>,
    pub authenticated_user: Option<String>,
    pub executing_user: Option<String>,
    /// Must be a subset of the transaction metadata.
    pub tx_metadata: BTreeMap<String, Value>,
}

/// Label and key constraints on a node (or a relationship endpoint).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeFilter {
    pub labels: BTreeSet<String>,
    pub key: BTreeMap<String, Value>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_key<I, K>(mut self, key: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.key
            .extend(key.into_iter().map(|(name, value)| (name.into(), value)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.key.is_empty()
    }
}

/// Type, endpoint and key constraints on a relationship.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationshipFilter {
    pub rel_type: Option<String>,
    pub start: NodeFilter,
    pub end: NodeFilter,
    pub key: BTreeMap<String, Value>,
}

/// Which entities a selector applies to, with the type-specific constraints.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectorTarget {
    /// Nodes and relationships alike.
    Entity,
    Node(NodeFilter),
    Relationship(RelationshipFilter),
}

impl SelectorTarget {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            SelectorTarget::Entity => "entity",
            SelectorTarget::Node(_) => "node",
            SelectorTarget::Relationship(_) => "relationship",
        }
    }
}

/// Which properties survive on a governed event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyProjection {
    pub(crate) including: BTreeSet<String>,
    pub(crate) excluding: BTreeSet<String>,
}

impl PropertyProjection {
    pub fn including(&self) -> &BTreeSet<String> {
        &self.including
    }

    pub fn excluding(&self) -> &BTreeSet<String> {
        &self.excluding
    }
}

/// A predicate over change events plus the projection applied to the events
/// it governs.
///
/// Selectors are immutable once built. Construct them with
/// [`Selector::entity`], [`Selector::node`] or [`Selector::relationship`].
#[derive(Clone, Debug, PartialEq)]
pub struct Selector {
    pub(crate) filter: EntityFilter,
    pub(crate) target: SelectorTarget,
    pub(crate) projection: PropertyProjection,
}

impl Selector {
    /// Selector matching nodes and relationships.
    pub fn entity() -> SelectorBuilder {
        SelectorBuilder::new(SelectorTarget::Entity)
    }

    /// Selector matching nodes only.
    pub fn node() -> SelectorBuilder {
        SelectorBuilder::new(SelectorTarget::Node(NodeFilter::default()))
    }

    /// Selector matching relationships only.
    pub fn relationship() -> SelectorBuilder {
        SelectorBuilder::new(SelectorTarget::Relationship(RelationshipFilter::default()))
    }

    pub(crate) fn from_parts(
        filter: EntityFilter,
        target: SelectorTarget,
        projection: PropertyProjection,
    ) -> Result<Self> {
        if !projection.including.is_empty() && !projection.excluding.is_empty() {
            return Err(CdcError::Configuration(
                "including and excluding properties are mutually exclusive".to_string(),
            ));
        }
        Ok(Self {
            filter,
            target,
            projection,
        })
    }

    pub fn filter(&self) -> &EntityFilter {
        &self.filter
    }

    pub fn target(&self) -> &SelectorTarget {
        &self.target
    }

    pub fn projection(&self) -> &PropertyProjection {
        &self.projection
    }
}

/// Builder for [`Selector`].
///
/// Setting a constraint that does not apply to the selector kind (labels on
/// a relationship selector, a type on a node selector, ...) is reported by
/// [`SelectorBuilder::build`].
#[derive(Clone, Debug)]
pub struct SelectorBuilder {
    filter: EntityFilter,
    target: SelectorTarget,
    projection: PropertyProjection,
    misplaced: Vec<&'static str>,
}

impl SelectorBuilder {
    fn new(target: SelectorTarget) -> Self {
        Self {
            filter: EntityFilter::default(),
            target,
            projection: PropertyProjection::default(),
            misplaced: Vec::new(),
        }
    }

    pub fn operation(mut self, operation: EntityOperation) -> Self {
        self.filter.operation = Some(operation);
        self
    }

    pub fn changes_to<I, P>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.filter
            .changes_to
            .extend(properties.into_iter().map(Into::into));
        self
    }

    pub fn authenticated_user(mut self, user: impl Into<String>) -> Self {
        self.filter.authenticated_user = Some(user.into());
        self
    }

    pub fn executing_user(mut self, user: impl Into<String>) -> Self {
        self.filter.executing_user = Some(user.into());
        self
    }

    pub fn tx_metadata<I, K>(mut self, metadata: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.filter
            .tx_metadata
            .extend(metadata.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    /// Labels the node must carry (node selectors only).
    pub fn labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        match &mut self.target {
            SelectorTarget::Node(node) => {
                node.labels.extend(labels.into_iter().map(Into::into));
            }
            _ => self.misplaced.push("labels"),
        }
        self
    }

    /// Key tuple the entity must carry (node and relationship selectors).
    pub fn key<I, K>(mut self, key: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let key = key.into_iter().map(|(k, v)| (k.into(), v));
        match &mut self.target {
            SelectorTarget::Node(node) => node.key.extend(key),
            SelectorTarget::Relationship(rel) => rel.key.extend(key),
            SelectorTarget::Entity => self.misplaced.push("key"),
        }
        self
    }

    /// Relationship type (relationship selectors only).
    pub fn rel_type(mut self, rel_type: impl Into<String>) -> Self {
        match &mut self.target {
            SelectorTarget::Relationship(rel) => rel.rel_type = Some(rel_type.into()),
            _ => self.misplaced.push("type"),
        }
        self
    }

    /// Constraints on the start node (relationship selectors only).
    pub fn start(mut self, start: NodeFilter) -> Self {
        match &mut self.target {
            SelectorTarget::Relationship(rel) => rel.start = start,
            _ => self.misplaced.push("start"),
        }
        self
    }

    /// Constraints on the end node (relationship selectors only).
    pub fn end(mut self, end: NodeFilter) -> Self {
        match &mut self.target {
            SelectorTarget::Relationship(rel) => rel.end = end,
            _ => self.misplaced.push("end"),
        }
        self
    }

    /// Keep only these properties; `*` keeps all of them.
    pub fn including_properties<I, P>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.projection
            .including
            .extend(properties.into_iter().map(Into::into));
        self
    }

    /// Drop these properties.
    pub fn excluding_properties<I, P>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.projection
            .excluding
            .extend(properties.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<Selector> {
        if let Some(field) = self.misplaced.first() {
            return Err(CdcError::Configuration(format!(
                "'{}' is not valid for {} selectors",
                field,
                self.target.kind()
            )));
        }
        Selector::from_parts(self.filter, self.target, self.projection)
    }
}
