/*!
 * Process Trait
 * The contract a scheduled process implements
 */

use crate::core::errors::StateError;
use crate::ipc::Message;
use crate::kernel::Context;
use serde_json::Value;

/// A cooperatively scheduled unit of work.
///
/// The kernel calls `run` at most once per cycle and lets it run to
/// completion; there is no preemption. A process that wants to pause
/// itself calls `Context::sleep` and returns.
///
/// Errors and panics from `run` are contained: the kernel records the
/// crash, applies cooldown or disablement, and keeps scheduling everyone
/// else.
pub trait Process {
    /// Execute one cycle slice
    fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()>;

    /// Called once at registration, before the first run
    fn init(&mut self, _ctx: &mut Context<'_>) {}

    /// Called at unregistration, after the final state capture
    fn cleanup(&mut self) {}

    /// Handle one delivered message. Pending messages are drained and
    /// delivered in send order right before each run.
    fn on_message(&mut self, _message: Message) {}

    /// Capture internal state for checkpointing and migration.
    /// Returning `None` opts out of both.
    fn save(&self) -> Option<Value> {
        None
    }

    /// Rebuild internal state from a captured value. Called on cold start
    /// when a checkpoint exists, and on migration import.
    fn restore(&mut self, _state: &Value) -> Result<(), StateError> {
        Ok(())
    }
}
