/*!
 * Process Types
 * Descriptors, runtime bookkeeping, and persisted rows
 */

use crate::core::limits;
use crate::core::serde::{is_empty_vec, is_false, is_none, is_null, is_zero_u32, is_zero_u64};
use crate::core::types::{Compute, Cycle, Pid, Priority, PriorityTier, ReserveLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Registered and eligible for scheduling
    Idle,
    /// Currently executing its cycle slice
    Running,
    /// Suspended until `sleep_until` elapses
    Sleeping,
    /// Permanently disabled after repeated crashes
    Suspended,
    /// Crashed last attempt, in cooldown before retry
    Error,
}

/// Registration descriptor for a process.
///
/// Everything the scheduler needs to place a process: tier, declared
/// priority, cadence, budget shares, and the reserve floor below which
/// the process sits out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessSpec {
    pub id: Pid,
    pub name: String,
    pub tier: PriorityTier,
    pub priority: Priority,
    /// Minimum cycles between runs (1 = every cycle)
    pub interval: u64,
    /// Per-cycle share of the compute limit this process may use
    pub cpu_fraction: f64,
    /// Fraction of the hard cap that triggers a warning
    pub warn_fraction: f64,
    /// Process only runs while host reserve is at or above this level
    pub min_reserve: ReserveLevel,
    #[serde(skip_serializing_if = "is_none")]
    pub parent: Option<Pid>,
}

impl ProcessSpec {
    pub fn new(id: impl Into<Pid>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tier: PriorityTier::Medium,
            priority: limits::DEFAULT_PRIORITY,
            interval: limits::DEFAULT_INTERVAL,
            cpu_fraction: limits::DEFAULT_CPU_FRACTION,
            warn_fraction: limits::DEFAULT_WARN_FRACTION,
            min_reserve: ReserveLevel::Critical,
            parent: None,
        }
    }

    pub fn with_tier(mut self, tier: PriorityTier) -> Self {
        self.tier = tier;
        self
    }

    /// Declared priority, clamped to the 0-100 scale
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority.min(limits::MAX_DECLARED_PRIORITY);
        self
    }

    /// Run cadence in cycles; zero is treated as every cycle
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    pub fn with_cpu_fraction(mut self, fraction: f64) -> Self {
        self.cpu_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_warn_fraction(mut self, fraction: f64) -> Self {
        self.warn_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_min_reserve(mut self, level: ReserveLevel) -> Self {
        self.min_reserve = level;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<Pid>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Per-process scheduling bookkeeping, reset on registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeState {
    pub state: ProcessState,
    #[serde(skip_serializing_if = "is_none")]
    pub last_run_cycle: Option<Cycle>,
    #[serde(skip_serializing_if = "is_none")]
    pub sleep_until: Option<Cycle>,
    /// Compute charged by the most recent run
    pub last_compute: Compute,
    /// Accumulated starvation boost, reset whenever the process runs
    pub boost: u16,
    #[serde(skip_serializing_if = "is_none")]
    pub last_warn_cycle: Option<Cycle>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self {
            state: ProcessState::Idle,
            last_run_cycle: None,
            sleep_until: None,
            last_compute: 0.0,
            boost: 0,
            last_warn_cycle: None,
        }
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Crash history for escalating discipline
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CrashRecord {
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub crashes: u64,
    /// Crashes since the last successful run
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub consecutive: u32,
    #[serde(skip_serializing_if = "is_none")]
    pub last_crash_cycle: Option<Cycle>,
    #[serde(skip_serializing_if = "is_none")]
    pub cooldown_until: Option<Cycle>,
    /// Set once the consecutive-crash threshold is hit; cleared only by
    /// re-registration
    #[serde(skip_serializing_if = "is_false")]
    pub disabled: bool,
}

/// Per-process compute caps, adjustable at runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ResourceLimits {
    /// Share of the cycle limit this process may consume in one run
    pub cpu_fraction: f64,
    /// Fraction of the hard cap that triggers a warning
    pub warn_fraction: f64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_fraction: limits::DEFAULT_CPU_FRACTION,
            warn_fraction: limits::DEFAULT_WARN_FRACTION,
        }
    }
}

/// Read-only view of one registered process
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessSnapshot {
    pub spec: ProcessSpec,
    /// Priority the scheduler actually uses, captured at registration.
    /// Runtime priority edits update `spec.priority` only.
    pub sched_priority: Priority,
    pub runtime: RuntimeState,
    pub crash: CrashRecord,
    pub limits: ResourceLimits,
    /// Direct children, sorted by id
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub children: Vec<Pid>,
}

/// Identity and hierarchy view handed out for introspection
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessContextInfo {
    pub pid: Pid,
    #[serde(skip_serializing_if = "is_none")]
    pub parent: Option<Pid>,
    #[serde(skip_serializing_if = "is_empty_vec")]
    pub children: Vec<Pid>,
    /// Copy of the process's private memory document
    #[serde(skip_serializing_if = "is_null")]
    pub memory: Value,
}

/// One process row in the persisted image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PersistedProcess {
    pub id: Pid,
    pub state: ProcessState,
    #[serde(default, skip_serializing_if = "is_none")]
    pub last_run_cycle: Option<Cycle>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub sleep_until: Option<Cycle>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub parent: Option<Pid>,
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub children: Vec<Pid>,
    /// Private memory document, null when the process kept none
    #[serde(default, skip_serializing_if = "is_null")]
    pub data: Value,
}
