/*!
 * Syscall Surface
 * The capability handle a process holds while it runs
 */

use super::{register_inner, set_priority_inner, unregister_inner, wake_inner, Services};
use crate::core::errors::RegistryError;
use crate::core::types::{Cycle, Pid, Priority};
use crate::ipc::{Message, SharedKey};
use crate::process::traits::Process;
use crate::process::types::{ProcessSpec, ProcessState};
use log::debug;
use serde_json::Value;

static NULL: Value = Value::Null;

/// Per-run view into the kernel, handed to `Process::run` and
/// `Process::init`.
///
/// Every mutation goes through the same paths the public kernel API uses,
/// so a process can do anything an external caller can: fork children,
/// kill (including itself), message, sleep, and touch shared state.
/// Effects are immediate; a process killed here is gone before the
/// current cycle plans its next visit.
pub struct Context<'k> {
    pid: Pid,
    parent: Option<Pid>,
    cycle: Cycle,
    services: &'k mut Services,
    /// Stand-in memory document once the caller's own slot is gone
    /// (self-kill mid-run); writes land here and die with the run
    scratch: Value,
}

impl<'k> Context<'k> {
    pub(crate) fn new(
        pid: Pid,
        parent: Option<Pid>,
        cycle: Cycle,
        services: &'k mut Services,
    ) -> Self {
        Self {
            pid,
            parent,
            cycle,
            services,
            scratch: Value::Null,
        }
    }

    /// Id of the running process
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn parent(&self) -> Option<&Pid> {
        self.parent.as_ref()
    }

    /// Current host cycle
    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Direct children of the running process, sorted
    pub fn children(&self) -> Vec<Pid> {
        self.services.registry.children(&self.pid)
    }

    // ---- lifecycle ----

    /// Register `spec` as a child of the running process. The spec's
    /// parent field is overwritten with the caller's pid.
    pub fn fork(
        &mut self,
        spec: ProcessSpec,
        process: Box<dyn Process>,
    ) -> Result<(), RegistryError> {
        let spec = spec.with_parent(self.pid.clone());
        register_inner(self.services, self.cycle, spec, process)
    }

    /// Unregister `id` and its descendants. Killing the caller's own id
    /// works; the remainder of its run executes against scratch memory
    /// and the kernel completes the teardown when the run returns.
    pub fn kill(&mut self, id: &str) -> bool {
        unregister_inner(self.services, id, self.cycle, true)
    }

    /// Put the running process to sleep once this run finishes. Zero is
    /// rounded up; a sleep always skips at least the next cycle.
    pub fn sleep(&mut self, cycles: u64) {
        let until = self.cycle + cycles.max(1);
        if let Some(slot) = self.services.registry.slot_mut(&self.pid) {
            slot.runtime.state = ProcessState::Sleeping;
            slot.runtime.sleep_until = Some(until);
            debug!("process {} sleeping until cycle {until}", self.pid);
        }
    }

    /// Wake a sleeping process early
    pub fn wake(&mut self, id: &str) -> bool {
        wake_inner(&mut self.services.registry, id)
    }

    /// Adjust a declared priority. Visible to introspection immediately;
    /// scheduling keeps the registration-time priority.
    pub fn set_priority(&mut self, id: &str, priority: Priority) -> bool {
        set_priority_inner(&mut self.services.registry, id, priority)
    }

    // ---- messaging ----

    /// Queue a message for `to`, sender stamped as the running process
    pub fn send(&mut self, to: &str, payload: Value) -> bool {
        self.services.mailbox.send(to, payload, &self.pid, self.cycle)
    }

    /// Take messages that arrived for the caller since its run started
    /// (pre-run mail is delivered through `on_message` before `run`)
    pub fn take_messages(&mut self) -> Vec<Message> {
        self.services.mailbox.drain(&self.pid)
    }

    // ---- shared segment ----

    pub fn shared_get(&self, key: &str) -> Option<&Value> {
        self.services.shared.get(key)
    }

    pub fn shared_set(&mut self, key: impl Into<SharedKey>, value: Value) -> Option<Value> {
        self.services.shared.set(key, value)
    }

    pub fn shared_remove(&mut self, key: &str) -> Option<Value> {
        self.services.shared.remove(key)
    }

    // ---- private memory ----

    /// The caller's private memory document
    pub fn memory(&self) -> &Value {
        self.services
            .registry
            .slot(&self.pid)
            .map(|slot| &slot.memory)
            .unwrap_or(&NULL)
    }

    pub fn memory_mut(&mut self) -> &mut Value {
        match self.services.registry.slot_mut(&self.pid) {
            Some(slot) => &mut slot.memory,
            None => &mut self.scratch,
        }
    }
}
