/*!
 * Scheduler Module
 * Cycle planning: eligibility, effective priority, and fairness rotation
 */

pub mod budget;
pub mod inherit;
pub mod stats;

pub use budget::BudgetConfig;
pub use stats::{CycleReport, KernelStats};

pub(crate) use budget::{verdict, BudgetVerdict, CycleBudget};
pub(crate) use inherit::DependencyGraph;

use crate::core::types::{Cycle, Pid, Priority, PriorityTier, ReserveLevel};
use crate::process::registry::Registry;
use crate::process::types::ProcessState;
use log::debug;

/// One planned execution this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Visit {
    pub pid: Pid,
    pub tier: PriorityTier,
    /// max(declared, inherited) plus starvation boost
    pub effective: u16,
}

/// Priority scheduler with wrap-around fairness.
///
/// Tiers are served in fixed order. Within a tier, processes run by
/// effective priority, and ties are broken by a per-tier cursor that
/// advances every cycle, so equal-priority processes take turns going
/// first instead of starving on registration order.
pub(crate) struct Scheduler {
    rotation: [u64; PriorityTier::COUNT],
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            rotation: [0; PriorityTier::COUNT],
        }
    }

    /// Build this cycle's visit list, waking elapsed sleepers and
    /// counting every ineligible process into the report
    pub fn plan(
        &self,
        registry: &mut Registry,
        deps: &DependencyGraph,
        cycle: Cycle,
        reserve: ReserveLevel,
        inherit_ceiling: Priority,
        report: &mut CycleReport,
    ) -> Vec<Visit> {
        let mut visits = Vec::with_capacity(registry.len());

        for tier in PriorityTier::ALL {
            let members: Vec<Pid> = registry.tier_members(tier).to_vec();
            let n = members.len();
            if n == 0 {
                continue;
            }
            let start = (self.rotation[tier.index()] % n as u64) as usize;

            let mut tier_visits: Vec<(Visit, usize)> = Vec::new();
            for (index, pid) in members.iter().enumerate() {
                let Some(slot) = registry.slot_mut(pid) else {
                    continue;
                };

                if slot.crash.disabled {
                    report.skipped_disabled += 1;
                    continue;
                }
                if let Some(until) = slot.crash.cooldown_until {
                    if cycle < until {
                        report.skipped_cooldown += 1;
                        continue;
                    }
                    slot.crash.cooldown_until = None;
                }
                if slot.runtime.state == ProcessState::Sleeping {
                    match slot.runtime.sleep_until {
                        Some(until) if cycle < until => {
                            report.skipped_sleeping += 1;
                            continue;
                        }
                        _ => {
                            debug!("process {pid} woke at cycle {cycle}");
                            slot.runtime.state = ProcessState::Idle;
                            slot.runtime.sleep_until = None;
                        }
                    }
                }
                if reserve < slot.spec.min_reserve {
                    report.skipped_reserve += 1;
                    continue;
                }
                if let Some(last) = slot.runtime.last_run_cycle {
                    if cycle.saturating_sub(last) < slot.spec.interval {
                        report.skipped_interval += 1;
                        continue;
                    }
                }

                let declared = slot.sched_priority;
                let boost = slot.runtime.boost;
                let inherited = deps.inherited(pid, registry, inherit_ceiling);
                let effective = declared.max(inherited) as u16 + boost;

                // Position relative to the rotated start breaks priority ties
                let rank = (index + n - start) % n;
                tier_visits.push((
                    Visit {
                        pid: pid.clone(),
                        tier,
                        effective,
                    },
                    rank,
                ));
            }

            tier_visits.sort_by(|a, b| b.0.effective.cmp(&a.0.effective).then(a.1.cmp(&b.1)));
            visits.extend(tier_visits.into_iter().map(|(visit, _)| visit));
        }

        visits
    }

    /// Advance the fairness cursors at the end of each cycle
    pub fn advance(&mut self) {
        for slot in &mut self.rotation {
            *slot = slot.wrapping_add(1);
        }
    }
}
