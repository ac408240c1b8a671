/*!
 * Migration
 * Self-contained envelopes for moving a process between kernels
 */

use crate::core::errors::{MigrationError, StateError};
use crate::core::types::{Pid, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Portable capture of one process: identity plus saved state.
///
/// Hierarchy, mailbox contents, and crash history deliberately stay
/// behind; an imported process starts with a clean record on the
/// receiving kernel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct MigrationEnvelope {
    pub id: Pid,
    pub name: String,
    pub priority: Priority,
    pub state: Value,
}

impl MigrationEnvelope {
    /// Parse an envelope from its wire form, failing on any missing or
    /// mistyped field
    pub fn parse(value: &Value) -> Result<Self, MigrationError> {
        serde_json::from_value(value.clone()).map_err(|e| MigrationError::Envelope(e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        // Struct-to-value conversion of plain fields cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Prove that `state` survives serialize-then-parse unchanged.
///
/// Export refuses to ship state that would not restore identically; the
/// alternative is a migration that silently loses data on arrival.
pub(crate) fn validate_round_trip(pid: &Pid, state: &Value) -> Result<(), MigrationError> {
    let text = serde_json::to_string(state).map_err(|e| MigrationError::Validation {
        pid: pid.clone(),
        source: StateError::Serialize(e.to_string()),
    })?;
    let reparsed: Value = serde_json::from_str(&text).map_err(|e| MigrationError::Validation {
        pid: pid.clone(),
        source: StateError::Deserialize(e.to_string()),
    })?;
    if &reparsed != state {
        return Err(MigrationError::Validation {
            pid: pid.clone(),
            source: StateError::RoundTrip,
        });
    }
    Ok(())
}
