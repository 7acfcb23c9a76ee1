//! Wire encoding of selector predicates.
//!
//! The feed filters authoritatively on these maps, so the format must match
//! the server exactly:
//!
//! ```text
//! {"select": "e" | "n" | "r",
//!  "operation": "c" | "u" | "d",
//!  "changesTo": [..], "authenticatedUser": .., "executingUser": ..,
//!  "txMetadata": {..},
//!  "labels": [..], "key": {..},                       // nodes
//!  "type": .., "start": {"labels", "key"}, "end": {..}, "key": {..}}  // relationships
//! ```
//!
//! Unset constraints are omitted. Property projections are client-side only
//! and never sent.

use crate::error::{CdcError, Result};
use crate::types::{EntityOperation, Value};
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet};

use super::types::{
    EntityFilter, NodeFilter, PropertyProjection, RelationshipFilter, Selector, SelectorTarget,
};

const SELECT: &str = "select";
const OPERATION: &str = "operation";
const CHANGES_TO: &str = "changesTo";
const AUTHENTICATED_USER: &str = "authenticatedUser";
const EXECUTING_USER: &str = "executingUser";
const TX_METADATA: &str = "txMetadata";
const LABELS: &str = "labels";
const KEY: &str = "key";
const TYPE: &str = "type";
const START: &str = "start";
const END: &str = "end";

/// Encode every selector, preserving order.
pub fn encode_selectors(selectors: &[Selector]) -> Vec<Value> {
    selectors.iter().map(Selector::to_wire).collect()
}

impl Selector {
    /// Wire predicate for this selector.
    pub fn to_wire(&self) -> Value {
        let mut map = Map::new();

        let select = match self.target {
            SelectorTarget::Entity => "e",
            SelectorTarget::Node(_) => "n",
            SelectorTarget::Relationship(_) => "r",
        };
        map.insert(SELECT.to_string(), Value::from(select));

        let filter = &self.filter;
        if let Some(operation) = filter.operation {
            map.insert(OPERATION.to_string(), Value::from(operation.shorthand()));
        }
        if !filter.changes_to.is_empty() {
            map.insert(CHANGES_TO.to_string(), string_array(&filter.changes_to));
        }
        if let Some(ref user) = filter.authenticated_user {
            map.insert(AUTHENTICATED_USER.to_string(), Value::from(user.as_str()));
        }
        if let Some(ref user) = filter.executing_user {
            map.insert(EXECUTING_USER.to_string(), Value::from(user.as_str()));
        }
        if !filter.tx_metadata.is_empty() {
            map.insert(TX_METADATA.to_string(), value_map(&filter.tx_metadata));
        }

        match &self.target {
            SelectorTarget::Entity => {}
            SelectorTarget::Node(node) => encode_node_filter(node, &mut map),
            SelectorTarget::Relationship(rel) => {
                if let Some(ref rel_type) = rel.rel_type {
                    map.insert(TYPE.to_string(), Value::from(rel_type.as_str()));
                }
                if !rel.start.is_empty() {
                    map.insert(START.to_string(), node_filter_value(&rel.start));
                }
                if !rel.end.is_empty() {
                    map.insert(END.to_string(), node_filter_value(&rel.end));
                }
                if !rel.key.is_empty() {
                    map.insert(KEY.to_string(), value_map(&rel.key));
                }
            }
        }

        Value::Object(map)
    }

    /// Decode a wire predicate.
    ///
    /// The decoded selector carries no property projection. Unknown fields
    /// and fields that do not apply to the selector kind are rejected.
    pub fn from_wire(value: &Value) -> Result<Selector> {
        let map = value
            .as_object()
            .ok_or_else(|| invalid("selector must be a map"))?;

        let mut target = match optional_str(map, SELECT)? {
            None | Some("e") => SelectorTarget::Entity,
            Some("n") => SelectorTarget::Node(NodeFilter::default()),
            Some("r") => SelectorTarget::Relationship(RelationshipFilter::default()),
            Some(other) => return Err(invalid(&format!("unknown selector kind '{}'", other))),
        };

        let mut filter = EntityFilter::default();

        for (field, field_value) in map {
            match field.as_str() {
                SELECT => {}
                OPERATION => {
                    let shorthand = expect_str(field, field_value)?;
                    let operation = EntityOperation::from_shorthand(shorthand).ok_or_else(|| {
                        invalid(&format!("unknown operation '{}'", shorthand))
                    })?;
                    filter.operation = Some(operation);
                }
                CHANGES_TO => filter.changes_to = string_set(field, field_value)?,
                AUTHENTICATED_USER => {
                    filter.authenticated_user = Some(expect_str(field, field_value)?.to_string())
                }
                EXECUTING_USER => {
                    filter.executing_user = Some(expect_str(field, field_value)?.to_string())
                }
                TX_METADATA => filter.tx_metadata = object_map(field, field_value)?,
                LABELS => match &mut target {
                    SelectorTarget::Node(node) => node.labels = string_set(field, field_value)?,
                    other => return Err(misplaced(field, other)),
                },
                KEY => match &mut target {
                    SelectorTarget::Node(node) => node.key = object_map(field, field_value)?,
                    SelectorTarget::Relationship(rel) => {
                        rel.key = object_map(field, field_value)?
                    }
                    other => return Err(misplaced(field, other)),
                },
                TYPE => match &mut target {
                    SelectorTarget::Relationship(rel) => {
                        rel.rel_type = Some(expect_str(field, field_value)?.to_string())
                    }
                    other => return Err(misplaced(field, other)),
                },
                START => match &mut target {
                    SelectorTarget::Relationship(rel) => {
                        rel.start = decode_node_filter(field, field_value)?
                    }
                    other => return Err(misplaced(field, other)),
                },
                END => match &mut target {
                    SelectorTarget::Relationship(rel) => {
                        rel.end = decode_node_filter(field, field_value)?
                    }
                    other => return Err(misplaced(field, other)),
                },
                unknown => return Err(invalid(&format!("unknown selector field '{}'", unknown))),
            }
        }

        Selector::from_parts(filter, target, PropertyProjection::default())
    }
}

fn encode_node_filter(node: &NodeFilter, map: &mut Map<String, Value>) {
    if !node.labels.is_empty() {
        map.insert(LABELS.to_string(), string_array(&node.labels));
    }
    if !node.key.is_empty() {
        map.insert(KEY.to_string(), value_map(&node.key));
    }
}

fn node_filter_value(node: &NodeFilter) -> Value {
    let mut map = Map::new();
    encode_node_filter(node, &mut map);
    Value::Object(map)
}

fn decode_node_filter(field: &str, value: &Value) -> Result<NodeFilter> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid(&format!("'{}' must be a map", field)))?;

    let mut node = NodeFilter::default();
    for (name, inner) in map {
        match name.as_str() {
            LABELS => node.labels = string_set(name, inner)?,
            KEY => node.key = object_map(name, inner)?,
            unknown => {
                return Err(invalid(&format!(
                    "unknown field '{}' in '{}'",
                    unknown, field
                )))
            }
        }
    }
    Ok(node)
}

fn string_array(values: &BTreeSet<String>) -> Value {
    Value::Array(values.iter().map(|v| Value::from(v.as_str())).collect())
}

fn value_map(values: &BTreeMap<String, Value>) -> Value {
    Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

fn optional_str<'a>(map: &'a Map<String, Value>, field: &str) -> Result<Option<&'a str>> {
    map.get(field).map(|v| expect_str(field, v)).transpose()
}

fn expect_str<'a>(field: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(&format!("'{}' must be a string", field)))
}

fn string_set(field: &str, value: &Value) -> Result<BTreeSet<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(&format!("'{}' must be a list", field)))?;
    items
        .iter()
        .map(|item| expect_str(field, item).map(str::to_string))
        .collect()
}

fn object_map(field: &str, value: &Value) -> Result<BTreeMap<String, Value>> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid(&format!("'{}' must be a map", field)))?;
    Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn invalid(message: &str) -> CdcError {
    CdcError::Configuration(format!("invalid wire selector: {}", message))
}

fn misplaced(field: &str, target: &SelectorTarget) -> CdcError {
    invalid(&format!(
        "'{}' is not valid for {} selectors",
        field,
        target.kind()
    ))
}
