/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::Pid;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry-related errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum RegistryError {
    #[error("Process id {0} is already registered")]
    #[diagnostic(
        code(registry::id_conflict),
        help("Unregister the existing process first, or pick a different id.")
    )]
    IdConflict(Pid),

    #[error("Process {0} not found")]
    #[diagnostic(
        code(registry::not_found),
        help("The process may have been unregistered or killed. Check the id.")
    )]
    NotFound(Pid),
}

/// Errors raised by process save/restore hooks
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum StateError {
    #[error("State serialization failed: {0}")]
    #[diagnostic(
        code(state::serialize_failed),
        help("The save hook produced a value that cannot be serialized to JSON.")
    )]
    Serialize(String),

    #[error("State deserialization failed: {0}")]
    #[diagnostic(
        code(state::deserialize_failed),
        help("The captured state does not match what the restore hook expects.")
    )]
    Deserialize(String),

    #[error("State did not survive round-trip validation")]
    #[diagnostic(
        code(state::round_trip),
        help("The saved value changed when re-parsed. Avoid non-JSON-stable types in state.")
    )]
    RoundTrip,
}

/// Checkpoint storage errors
#[derive(Error, Debug, Diagnostic)]
pub enum CheckpointError {
    #[error("Checkpoint storage I/O failed: {0}")]
    #[diagnostic(
        code(checkpoint::io),
        help("Check file permissions and disk space for the backend path.")
    )]
    Io(#[from] std::io::Error),

    #[error("Persisted image is corrupt: {0}")]
    #[diagnostic(
        code(checkpoint::corrupt),
        help("The stored image is not valid JSON for the expected layout. Cold-start state is unavailable.")
    )]
    Corrupt(String),
}

/// Migration (export/import) errors
#[derive(Error, Debug, Diagnostic)]
pub enum MigrationError {
    #[error("Invalid migration envelope: {0}")]
    #[diagnostic(
        code(migration::envelope),
        help("Envelopes must carry id, name, priority, and state fields.")
    )]
    Envelope(String),

    #[error("Process {0} does not support state capture")]
    #[diagnostic(
        code(migration::unsupported),
        help("The process's save hook returned no state; it cannot be exported.")
    )]
    Unsupported(Pid),

    #[error("Exported state for {pid} failed validation")]
    #[diagnostic(
        code(migration::validation),
        help("Export aborts rather than shipping state that cannot be restored.")
    )]
    Validation {
        pid: Pid,
        #[source]
        source: StateError,
    },

    #[error("State restore for {pid} failed; registration rolled back")]
    #[diagnostic(
        code(migration::restore_failed),
        help("The process was unregistered again so no half-restored instance remains.")
    )]
    RestoreFailed {
        pid: Pid,
        #[source]
        source: StateError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),
}

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum KernelError {
    #[error("Registry error: {0}")]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error("State error: {0}")]
    #[diagnostic(transparent)]
    State(#[from] StateError),

    #[error("Checkpoint error: {0}")]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Migration error: {0}")]
    #[diagnostic(transparent)]
    Migration(#[from] MigrationError),
}

/// Result type for kernel operations
///
/// # Must Use
/// Kernel operations can fail and must be handled to keep registry and
/// persisted state consistent
pub type Result<T> = std::result::Result<T, KernelError>;
