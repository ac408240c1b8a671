/*!
 * Budget Allocation
 * Per-tier compute budgets scaled by the host reserve level
 */

use crate::core::limits;
use crate::core::types::{Compute, PriorityTier, ReserveLevel};
use crate::process::types::ResourceLimits;
use serde::{Deserialize, Serialize};

/// Static shape of the per-cycle budget split
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    /// Share of the cycle limit granted to each tier, in service order
    pub tier_fractions: [f64; PriorityTier::COUNT],
    /// Scale applied per reserve level on top of the tier fraction,
    /// indexed [reserve][tier]
    pub reserve_scale: [[f64; PriorityTier::COUNT]; ReserveLevel::COUNT],
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            tier_fractions: limits::TIER_FRACTIONS,
            reserve_scale: limits::RESERVE_SCALE,
        }
    }
}

impl BudgetConfig {
    pub fn with_tier_fractions(mut self, fractions: [f64; PriorityTier::COUNT]) -> Self {
        self.tier_fractions = fractions;
        self
    }

    pub fn with_reserve_scale(
        mut self,
        scale: [[f64; PriorityTier::COUNT]; ReserveLevel::COUNT],
    ) -> Self {
        self.reserve_scale = scale;
        self
    }
}

/// Budget ledger for one cycle.
///
/// Tier budgets are fixed when the cycle starts; consumption is recorded
/// after each run, so the process that crosses a tier's line still
/// finishes and the next one is skipped.
pub(crate) struct CycleBudget {
    limit: Compute,
    tier_budget: [Compute; PriorityTier::COUNT],
    tier_used: [Compute; PriorityTier::COUNT],
}

impl CycleBudget {
    pub fn new(config: &BudgetConfig, limit: Compute, reserve: ReserveLevel) -> Self {
        let scale = &config.reserve_scale[reserve.index()];
        let mut tier_budget = [0.0; PriorityTier::COUNT];
        for tier in PriorityTier::ALL {
            let i = tier.index();
            tier_budget[i] = limit * config.tier_fractions[i] * scale[i];
        }
        Self {
            limit,
            tier_budget,
            tier_used: [0.0; PriorityTier::COUNT],
        }
    }

    pub fn limit(&self) -> Compute {
        self.limit
    }

    pub fn tier_budget(&self, tier: PriorityTier) -> Compute {
        self.tier_budget[tier.index()]
    }

    pub fn tier_used(&self, tier: PriorityTier) -> Compute {
        self.tier_used[tier.index()]
    }

    /// True once the tier has consumed its whole grant
    pub fn tier_exhausted(&self, tier: PriorityTier) -> bool {
        self.tier_used[tier.index()] >= self.tier_budget[tier.index()]
    }

    pub fn record(&mut self, tier: PriorityTier, used: Compute) {
        self.tier_used[tier.index()] += used.max(0.0);
    }

    /// Sum of all tier grants this cycle
    pub fn allocated_total(&self) -> Compute {
        self.tier_budget.iter().sum()
    }

    /// Hard per-run cap for one process under this cycle's limit
    pub fn hard_cap(&self, limits: &ResourceLimits) -> Compute {
        self.limit * limits.cpu_fraction
    }
}

/// Outcome of checking one run against the process's own cap
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BudgetVerdict {
    Within,
    /// Close to the cap; log, don't punish
    Warn { cap: Compute },
    /// Over the cap; the process is killed
    Exceeded { cap: Compute },
}

pub(crate) fn verdict(budget: &CycleBudget, limits: &ResourceLimits, used: Compute) -> BudgetVerdict {
    let cap = budget.hard_cap(limits);
    if used > cap {
        BudgetVerdict::Exceeded { cap }
    } else if used > cap * limits.warn_fraction {
        BudgetVerdict::Warn { cap }
    } else {
        BudgetVerdict::Within
    }
}
