/*!
 * Kernel Module
 * Registry-driven cooperative kernel: registration, syscalls, cycle loop
 */

mod cycle;
mod resilience;
mod syscall;

pub use syscall::Context;

use crate::checkpoint::{Checkpoint, CheckpointStore, MemoryBackend, PersistedImage, StateBackend};
use crate::core::errors::{KernelError, MigrationError, RegistryError, Result};
use crate::core::limits;
use crate::core::types::{Cycle, Pid, Priority};
use crate::host::Host;
use crate::ipc::{Mailbox, SharedKey, SharedSegment, TraceEntry};
use crate::process::migrate::{self, MigrationEnvelope};
use crate::process::registry::Registry;
use crate::process::traits::Process;
use crate::process::types::{ProcessContextInfo, ProcessSnapshot, ProcessSpec, ResourceLimits};
use crate::scheduler::{BudgetConfig, CycleReport, DependencyGraph, KernelStats, Scheduler};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tunable kernel behavior. Defaults come from `core::limits`; builders
/// override per kernel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct KernelConfig {
    /// Cycles between checkpoint sweeps
    pub checkpoint_interval: u64,
    /// Cycles between periodic diagnostics lines
    pub stats_interval: u64,
    /// Consecutive crashes before permanent disablement
    pub crash_disable_threshold: u32,
    /// Cycles a crashed process sits out before retry
    pub crash_cooldown: u64,
    /// Boost added per budget-starved cycle
    pub decay_increment: u16,
    /// Cap on accumulated starvation boost
    pub max_priority_boost: u16,
    /// Ceiling on priority inherited from dependents
    pub max_inherited_priority: Priority,
    /// Per-channel sends in one cycle before the spam warning
    pub spam_threshold: u32,
    /// Cycles between busiest-channel reports
    pub mailbox_report_interval: u64,
    /// Minimum cycles between repeated near-cap warnings per process
    pub budget_warn_interval: u64,
    /// Record every send into the bounded trace ring
    pub trace_ipc: bool,
    pub ipc_trace_cap: usize,
    /// Also deliver pending messages to processes that did not run this
    /// cycle (disabled processes are never delivered to)
    pub deliver_to_skipped: bool,
    pub budget: BudgetConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: limits::CHECKPOINT_INTERVAL,
            stats_interval: limits::STATS_INTERVAL,
            crash_disable_threshold: limits::CRASH_DISABLE_THRESHOLD,
            crash_cooldown: limits::CRASH_COOLDOWN_CYCLES,
            decay_increment: limits::DECAY_INCREMENT,
            max_priority_boost: limits::MAX_PRIORITY_BOOST,
            max_inherited_priority: limits::MAX_INHERITED_PRIORITY,
            spam_threshold: limits::CHANNEL_SPAM_THRESHOLD,
            mailbox_report_interval: limits::MAILBOX_REPORT_INTERVAL,
            budget_warn_interval: limits::BUDGET_WARN_INTERVAL,
            trace_ipc: false,
            ipc_trace_cap: limits::IPC_TRACE_CAP,
            deliver_to_skipped: false,
            budget: BudgetConfig::default(),
        }
    }
}

impl KernelConfig {
    pub fn with_checkpoint_interval(mut self, cycles: u64) -> Self {
        self.checkpoint_interval = cycles.max(1);
        self
    }

    pub fn with_stats_interval(mut self, cycles: u64) -> Self {
        self.stats_interval = cycles.max(1);
        self
    }

    pub fn with_crash_discipline(mut self, disable_threshold: u32, cooldown: u64) -> Self {
        self.crash_disable_threshold = disable_threshold.max(1);
        self.crash_cooldown = cooldown;
        self
    }

    pub fn with_decay(mut self, increment: u16, max_boost: u16) -> Self {
        self.decay_increment = increment;
        self.max_priority_boost = max_boost;
        self
    }

    pub fn with_max_inherited_priority(mut self, ceiling: Priority) -> Self {
        self.max_inherited_priority = ceiling.min(limits::MAX_DECLARED_PRIORITY);
        self
    }

    pub fn with_spam_threshold(mut self, threshold: u32) -> Self {
        self.spam_threshold = threshold.max(1);
        self
    }

    pub fn with_mailbox_report_interval(mut self, cycles: u64) -> Self {
        self.mailbox_report_interval = cycles.max(1);
        self
    }

    pub fn with_budget_warn_interval(mut self, cycles: u64) -> Self {
        self.budget_warn_interval = cycles.max(1);
        self
    }

    pub fn with_ipc_trace(mut self, enabled: bool) -> Self {
        self.trace_ipc = enabled;
        self
    }

    pub fn with_deliver_to_skipped(mut self, enabled: bool) -> Self {
        self.deliver_to_skipped = enabled;
        self
    }

    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }
}

/// Mutable kernel state shared between public operations and syscalls.
///
/// Everything lives behind one `&mut`, matching the single-threaded
/// run-to-completion model: no locks, no interior mutability, borrow
/// scopes are the whole concurrency story.
pub(crate) struct Services {
    pub registry: Registry,
    pub mailbox: Mailbox,
    pub shared: SharedSegment,
    pub deps: DependencyGraph,
    pub checkpoints: CheckpointStore,
}

/// The kernel: owns the registry, scheduler, IPC plumbing, and persisted
/// state, and advances them one host cycle per `run` call.
pub struct Kernel<H: Host> {
    host: H,
    config: KernelConfig,
    services: Services,
    scheduler: Scheduler,
    backend: Box<dyn StateBackend>,
    stats: KernelStats,
    last_report: CycleReport,
    restored: bool,
    cycles_since_checkpoint: u64,
    cycles_since_stats: u64,
}

/// Builder mirroring kernel assembly: host first, then optional config
/// and backend overrides.
pub struct KernelBuilder<H: Host> {
    host: H,
    config: KernelConfig,
    backend: Box<dyn StateBackend>,
}

impl<H: Host> KernelBuilder<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            config: KernelConfig::default(),
            backend: Box::new(MemoryBackend::new()),
        }
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_backend(mut self, backend: impl StateBackend + 'static) -> Self {
        self.backend = Box::new(backend);
        self
    }

    pub fn build(mut self) -> Kernel<H> {
        let checkpoints = match self.backend.load() {
            Ok(Some(image)) => {
                info!(
                    "loaded persisted image: {} process rows, {} checkpoints",
                    image.processes.len(),
                    image.checkpoints.len()
                );
                CheckpointStore::from_image(image)
            }
            Ok(None) => CheckpointStore::new(),
            Err(e) => {
                warn!("persisted image unavailable, starting empty: {e}");
                CheckpointStore::new()
            }
        };
        let mailbox = Mailbox::new(
            self.config.spam_threshold,
            self.config.mailbox_report_interval,
            self.config.trace_ipc,
            self.config.ipc_trace_cap,
        );
        Kernel {
            host: self.host,
            config: self.config,
            services: Services {
                registry: Registry::new(),
                mailbox,
                shared: SharedSegment::default(),
                deps: DependencyGraph::default(),
                checkpoints,
            },
            scheduler: Scheduler::new(),
            backend: self.backend,
            stats: KernelStats::default(),
            last_report: CycleReport::default(),
            restored: false,
            cycles_since_checkpoint: 0,
            cycles_since_stats: 0,
        }
    }
}

impl<H: Host> Kernel<H> {
    pub fn builder(host: H) -> KernelBuilder<H> {
        KernelBuilder::new(host)
    }

    // ---- registry operations ----

    /// Register a process under its spec id. Fails on id conflict without
    /// touching the incumbent. The init hook runs immediately with full
    /// syscall access.
    pub fn register(&mut self, spec: ProcessSpec, process: Box<dyn Process>) -> Result<()> {
        let cycle = self.host.cycle();
        register_inner(&mut self.services, cycle, spec, process)?;
        Ok(())
    }

    /// Unregister a process and, recursively, all of its descendants.
    /// Each one gets a final state capture and its cleanup hook before
    /// its bookkeeping disappears.
    pub fn unregister(&mut self, id: &str) -> Result<()> {
        let cycle = self.host.cycle();
        if unregister_inner(&mut self.services, id, cycle, true) {
            Ok(())
        } else {
            Err(RegistryError::NotFound(Pid::from(id)).into())
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.services.registry.contains(id)
    }

    pub fn process_count(&self) -> usize {
        self.services.registry.len()
    }

    pub fn process(&self, id: &str) -> Option<ProcessSnapshot> {
        self.services.registry.snapshot(id)
    }

    /// Snapshots of every registered process, sorted by id
    pub fn processes(&self) -> Vec<ProcessSnapshot> {
        self.services.registry.snapshots()
    }

    pub fn process_context(&self, id: &str) -> Option<ProcessContextInfo> {
        self.services.registry.context_info(id)
    }

    /// Update a process's declared priority.
    ///
    /// Takes effect for introspection immediately, but scheduling keeps
    /// the priority captured at registration until the process is
    /// re-registered. Long-standing behavior that callers rely on; see
    /// `ProcessSnapshot::sched_priority`.
    pub fn set_priority(&mut self, id: &str, priority: Priority) -> bool {
        set_priority_inner(&mut self.services.registry, id, priority)
    }

    /// Replace a process's compute caps at runtime
    pub fn update_limits(&mut self, id: &str, limits: ResourceLimits) -> Result<()> {
        let slot = self
            .services
            .registry
            .slot_mut(id)
            .ok_or_else(|| RegistryError::NotFound(Pid::from(id)))?;
        slot.limits = ResourceLimits {
            cpu_fraction: limits.cpu_fraction.clamp(0.0, 1.0),
            warn_fraction: limits.warn_fraction.clamp(0.0, 1.0),
        };
        Ok(())
    }

    /// Wake a sleeping process early. No-op unless the target exists and
    /// is actually sleeping.
    pub fn wake(&mut self, id: &str) -> bool {
        wake_inner(&mut self.services.registry, id)
    }

    // ---- dependencies ----

    /// Declare that `dependent` waits on `dependency`, lifting the
    /// dependency's effective priority. Both ends must be registered.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> bool {
        if dependent == dependency {
            debug!("ignoring self-dependency for {dependent}");
            return false;
        }
        if !self.services.registry.contains(dependent) || !self.services.registry.contains(dependency)
        {
            debug!("ignoring dependency {dependent} -> {dependency}: unregistered endpoint");
            return false;
        }
        self.services
            .deps
            .add(&Pid::from(dependent), &Pid::from(dependency))
    }

    pub fn remove_dependency(&mut self, dependent: &str, dependency: &str) -> bool {
        self.services.deps.remove(dependent, dependency)
    }

    pub fn dependents_of(&self, id: &str) -> Vec<Pid> {
        self.services.deps.dependents_of(id)
    }

    pub fn dependencies_of(&self, id: &str) -> Vec<Pid> {
        self.services.deps.dependencies_of(id)
    }

    // ---- messaging and shared state ----

    /// Inject a message from outside the process table. Delivery happens
    /// when the target next runs.
    pub fn send_message(&mut self, to: &str, payload: Value, from: &str) -> bool {
        let cycle = self.host.cycle();
        self.services.mailbox.send(to, payload, &Pid::from(from), cycle)
    }

    pub fn pending_messages(&self, id: &str) -> usize {
        self.services.mailbox.pending(id)
    }

    pub fn trace(&self) -> Vec<TraceEntry> {
        self.services.mailbox.trace_entries()
    }

    pub fn shared_get(&self, key: &str) -> Option<&Value> {
        self.services.shared.get(key)
    }

    pub fn shared_set(&mut self, key: &str, value: Value) -> Option<Value> {
        self.services.shared.set(key, value)
    }

    pub fn shared_remove(&mut self, key: &str) -> Option<Value> {
        self.services.shared.remove(key)
    }

    /// Keys currently present on the shared blackboard, sorted
    pub fn shared_keys(&self) -> Vec<SharedKey> {
        self.services.shared.keys()
    }

    // ---- migration ----

    /// Capture a process into a portable envelope. The state must be
    /// present and survive round-trip validation, otherwise the export
    /// aborts with nothing shipped.
    pub fn export_process(&self, id: &str) -> Result<MigrationEnvelope> {
        let slot = self
            .services
            .registry
            .slot(id)
            .ok_or_else(|| RegistryError::NotFound(Pid::from(id)))?;
        let pid = slot.spec.id.clone();
        let Some(process) = slot.process.as_ref() else {
            return Err(MigrationError::Unsupported(pid).into());
        };
        let Some(state) = process.save() else {
            return Err(MigrationError::Unsupported(pid).into());
        };
        migrate::validate_round_trip(&pid, &state)?;
        Ok(MigrationEnvelope {
            id: pid,
            name: slot.spec.name.clone(),
            priority: slot.spec.priority,
            state,
        })
    }

    /// Register a process from a migration envelope and restore its
    /// state. A restore failure rolls the registration back, so no
    /// half-restored process remains.
    pub fn import_process(&mut self, envelope: &Value, process: Box<dyn Process>) -> Result<()> {
        let envelope = MigrationEnvelope::parse(envelope)?;
        let cycle = self.host.cycle();
        let spec = ProcessSpec::new(envelope.id.clone(), envelope.name.clone())
            .with_priority(envelope.priority);
        register_inner(&mut self.services, cycle, spec, process)?;

        let restore_result = self
            .services
            .registry
            .slot_mut(&envelope.id)
            .and_then(|slot| slot.process.as_mut())
            .map(|instance| instance.restore(&envelope.state))
            .unwrap_or(Ok(()));
        if let Err(source) = restore_result {
            unregister_inner(&mut self.services, &envelope.id, cycle, false);
            return Err(MigrationError::RestoreFailed {
                pid: envelope.id,
                source,
            }
            .into());
        }
        info!("imported process {} at cycle {cycle}", envelope.id);
        Ok(())
    }

    // ---- persistence and introspection ----

    pub fn checkpoint_of(&self, id: &str) -> Option<Checkpoint> {
        self.services.checkpoints.checkpoint(id).cloned()
    }

    pub fn persisted_image(&self) -> &PersistedImage {
        self.services.checkpoints.image()
    }

    /// Force a checkpoint sweep and backend save outside the cadence
    pub fn flush(&mut self) -> Result<()> {
        let cycle = self.host.cycle();
        let written = self.sweep(cycle).map_err(KernelError::from)?;
        debug!("flushed persisted image ({written} checkpoint writes)");
        Ok(())
    }

    pub fn stats(&self) -> &KernelStats {
        &self.stats
    }

    pub fn last_report(&self) -> &CycleReport {
        &self.last_report
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

/// Shared registration path for public `register` and the fork syscall
pub(crate) fn register_inner(
    services: &mut Services,
    cycle: Cycle,
    spec: ProcessSpec,
    process: Box<dyn Process>,
) -> std::result::Result<(), RegistryError> {
    let id = spec.id.clone();
    services.registry.insert(spec, process)?;
    services.mailbox.create_queue(&id);
    info!("process {id} registered at cycle {cycle}");

    // The init hook runs with the instance checked out, exactly like a
    // cycle slice, so it can fork, send, and read shared state
    if let Some(mut instance) = services.registry.take_process(&id) {
        let parent = services
            .registry
            .slot(&id)
            .and_then(|slot| slot.spec.parent.clone());
        {
            let mut ctx = Context::new(id.clone(), parent, cycle, services);
            instance.init(&mut ctx);
        }
        if let Some(mut orphan) = services.registry.put_process(&id, instance) {
            // init unregistered its own id; the slot is gone, so finish
            // the instance teardown here
            debug!("process {id} removed itself during init");
            orphan.cleanup();
        }
    }
    Ok(())
}

/// Shared teardown path for public `unregister`, the kill syscall,
/// budget kills, and import rollback.
///
/// Order per process: final state capture, cleanup hook, then recurse
/// into children, then drop bookkeeping. An instance that is checked out
/// (killing itself mid-run) skips the hooks here; the cycle loop finishes
/// its teardown when the run returns.
pub(crate) fn unregister_inner(
    services: &mut Services,
    id: &str,
    cycle: Cycle,
    persist_final: bool,
) -> bool {
    if !services.registry.contains(id) {
        return false;
    }

    {
        let Services {
            registry,
            checkpoints,
            ..
        } = services;
        if let Some(slot) = registry.slot_mut(id) {
            if let Some(process) = slot.process.as_mut() {
                if persist_final {
                    if let Some(state) = process.save() {
                        checkpoints.record(&slot.spec.id, cycle, state);
                    }
                }
                process.cleanup();
            }
        }
    }

    for child in services.registry.children(id) {
        unregister_inner(services, &child, cycle, persist_final);
    }

    services.registry.remove(id);
    let dropped = services.mailbox.remove_queue(id);
    if dropped > 0 {
        debug!("dropped {dropped} undelivered messages for {id}");
    }
    services.deps.remove_process(id);
    info!("process {id} unregistered at cycle {cycle}");
    true
}

pub(crate) fn set_priority_inner(registry: &mut Registry, id: &str, priority: Priority) -> bool {
    let Some(slot) = registry.slot_mut(id) else {
        debug!("set_priority: no process {id}");
        return false;
    };
    slot.spec.priority = priority.min(limits::MAX_DECLARED_PRIORITY);
    debug!(
        "process {id} declared priority now {}, scheduling still at {}",
        slot.spec.priority, slot.sched_priority
    );
    true
}

pub(crate) fn wake_inner(registry: &mut Registry, id: &str) -> bool {
    use crate::process::types::ProcessState;
    let Some(slot) = registry.slot_mut(id) else {
        debug!("wake: no process {id}");
        return false;
    };
    if slot.runtime.state != ProcessState::Sleeping {
        return false;
    }
    slot.runtime.state = ProcessState::Idle;
    slot.runtime.sleep_until = None;
    debug!("process {id} woken early");
    true
}
