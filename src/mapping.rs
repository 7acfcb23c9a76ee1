//! Mapping of raw feed records into typed values.
//!
//! Records arrive as JSON maps (one per row of the change procedure). Mapping
//! is total for well-formed records; anything else is a [`CdcError::Mapping`].

use crate::error::{CdcError, Result};
use crate::types::{ChangeEvent, ChangeIdentifier, Value};

/// Parse a change event record.
pub fn parse_change_event(record: Value) -> Result<ChangeEvent> {
    let event: ChangeEvent = serde_json::from_value(record)?;
    validate(&event)?;
    Ok(event)
}

/// Parse the record returned by the earliest/current checkpoint procedures.
pub fn parse_change_identifier(record: &Value) -> Result<ChangeIdentifier> {
    match record.get("id") {
        Some(Value::String(id)) => Ok(ChangeIdentifier::new(id.clone())),
        Some(other) => Err(CdcError::Mapping(format!(
            "change identifier must be a string, got {}",
            other
        ))),
        None => Err(CdcError::Mapping(
            "record has no 'id' field".to_string(),
        )),
    }
}

/// Encode a change event into its record form.
pub fn to_record(event: &ChangeEvent) -> Result<Value> {
    validate(event)?;
    Ok(serde_json::to_value(event)?)
}

fn validate(event: &ChangeEvent) -> Result<()> {
    if !event.event.has_valid_states() {
        return Err(CdcError::Mapping(format!(
            "change {} has before/after states inconsistent with a {} operation",
            event.id,
            event.operation()
        )));
    }
    Ok(())
}
