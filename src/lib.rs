/*!
 * Cycle Kernel Library
 * Cooperative process scheduling for cycle-driven hosts
 */

pub mod checkpoint;
pub mod core;
pub mod host;
pub mod ipc;
pub mod kernel;
pub mod process;
pub mod scheduler;

// Re-exports
pub use checkpoint::{Checkpoint, JsonFileBackend, MemoryBackend, PersistedImage, StateBackend};
pub use core::errors::{
    CheckpointError, KernelError, MigrationError, RegistryError, Result, StateError,
};
pub use core::types::{Compute, Cycle, Pid, Priority, PriorityTier, ReserveLevel};
pub use host::{Host, SimHost};
pub use ipc::{ChannelVolume, Message, PayloadKind, SharedKey, TraceEntry};
pub use kernel::{Context, Kernel, KernelBuilder, KernelConfig};
pub use process::migrate::MigrationEnvelope;
pub use process::traits::Process;
pub use process::types::{
    ProcessContextInfo, ProcessSnapshot, ProcessSpec, ProcessState, ResourceLimits,
};
pub use scheduler::{BudgetConfig, CycleReport, KernelStats};
