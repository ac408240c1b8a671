/*!
 * Core Types
 * Common types used across the kernel
 */

use serde::{Deserialize, Serialize};

/// Process id: short, caller-chosen, unique while registered.
///
/// Inline-optimized so ids up to 23 bytes never touch the heap; ids are
/// cloned and hashed on every scheduling decision.
pub type Pid = smartstring::alias::String;

/// Cycle ordinal supplied by the host, monotonically increasing
pub type Cycle = u64;

/// Compute-time units, in the host's own accounting
pub type Compute = f64;

/// Declared priority level (0-100, higher is more important)
pub type Priority = u8;

/// Hash map keyed with ahash for hot lookup paths
pub type FastMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Hash set backed by ahash
pub type FastSet<T> = std::collections::HashSet<T, ahash::RandomState>;

/// Priority tier a process is scheduled and budgeted under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Critical,
    High,
    Medium,
    Low,
    Idle,
}

impl PriorityTier {
    /// All tiers in service order (visited first to last each cycle)
    pub const ALL: [PriorityTier; 5] = [
        PriorityTier::Critical,
        PriorityTier::High,
        PriorityTier::Medium,
        PriorityTier::Low,
        PriorityTier::Idle,
    ];

    pub const COUNT: usize = 5;

    /// Stable index into per-tier tables
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Host-reported reserve category, ordered from most to least pressure.
///
/// The ordering is total so per-process minimum thresholds compare
/// directly: `reserve >= spec.min_reserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveLevel {
    Critical,
    Low,
    Normal,
    High,
}

impl ReserveLevel {
    pub const ALL: [ReserveLevel; 4] = [
        ReserveLevel::Critical,
        ReserveLevel::Low,
        ReserveLevel::Normal,
        ReserveLevel::High,
    ];

    pub const COUNT: usize = 4;

    /// Stable index into per-reserve tables
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}
