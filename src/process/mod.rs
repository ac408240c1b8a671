/*!
 * Process Module
 * Process descriptors, registry, hierarchy, and migration
 */

pub mod migrate;
pub mod registry;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use migrate::MigrationEnvelope;
pub use registry::Registry;
pub use traits::Process;
pub use types::{
    CrashRecord, PersistedProcess, ProcessContextInfo, ProcessSnapshot, ProcessSpec, ProcessState,
    ResourceLimits, RuntimeState,
};
