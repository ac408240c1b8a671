/*!
 * Scheduler Statistics
 * Per-cycle reports and cumulative kernel counters
 */

use crate::core::serde::{is_zero_u32, is_zero_u64};
use crate::core::types::{Compute, Cycle};
use serde::{Deserialize, Serialize};

/// What one kernel cycle did, returned from every `run`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CycleReport {
    pub cycle: Cycle,
    /// Processes registered when the cycle ended
    pub processes: usize,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub ran: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub crashed: u32,
    /// Killed for exceeding their per-process cap
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub killed: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub messages_delivered: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub checkpointed: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub skipped_budget: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub skipped_interval: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub skipped_reserve: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub skipped_sleeping: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub skipped_cooldown: u32,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub skipped_disabled: u32,
    /// Processes currently sitting disabled after repeated crashes
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub disabled_total: u32,
    /// Compute charged to process runs this cycle
    pub compute_used: Compute,
    /// Sum of tier budgets granted this cycle
    pub compute_allocated: Compute,
    pub compute_limit: Compute,
}

impl CycleReport {
    pub(crate) fn new(cycle: Cycle, compute_limit: Compute) -> Self {
        Self {
            cycle,
            compute_limit,
            ..Default::default()
        }
    }

    /// Total processes skipped this cycle, for any reason
    pub fn skipped(&self) -> u32 {
        self.skipped_budget
            + self.skipped_interval
            + self.skipped_reserve
            + self.skipped_sleeping
            + self.skipped_cooldown
            + self.skipped_disabled
    }
}

/// Cumulative counters across the kernel's lifetime
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct KernelStats {
    pub cycles: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub runs: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub crashes: u64,
    /// Processes permanently disabled by crash discipline
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub disables: u64,
    /// Processes killed for budget overruns
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub kills: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub messages: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub checkpoints: u64,
    pub compute_used: Compute,
}

impl KernelStats {
    pub(crate) fn absorb(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.runs += report.ran as u64;
        self.crashes += report.crashed as u64;
        self.kills += report.killed as u64;
        self.messages += report.messages_delivered as u64;
        self.checkpoints += report.checkpointed as u64;
        self.compute_used += report.compute_used;
    }
}
