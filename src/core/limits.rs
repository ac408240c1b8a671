/*!
 * Kernel Limits and Constants
 *
 * Centralized location for all kernel-wide limits, thresholds, and magic numbers.
 * Organized by domain for maintainability and discoverability.
 *
 * ## Design Philosophy
 * - All values include rationale comments explaining WHY they exist
 * - Values are grouped by domain (scheduling, budget, resilience, etc.)
 * - Everything here is a default; `KernelConfig` can override per kernel
 */

// =============================================================================
// PRIORITY & SCHEDULING
// =============================================================================

/// Maximum declared priority (0-100 scale)
/// Registrations above this are clamped, not rejected
pub const MAX_DECLARED_PRIORITY: u8 = 100;

/// Default declared priority for specs that don't set one (midpoint)
pub const DEFAULT_PRIORITY: u8 = 50;

/// Default run interval in cycles (1 = every cycle)
pub const DEFAULT_INTERVAL: u64 = 1;

/// Boost added per budget-starved cycle (starvation decay)
/// Kept at 1 so the boost doubles as a "cycles starved" counter
pub const DECAY_INCREMENT: u16 = 1;

/// Cap on accumulated starvation boost
/// Bounds how far a starved process can climb past its declared level
pub const MAX_PRIORITY_BOOST: u16 = 50;

/// Ceiling applied to priority inherited from dependents
/// Inheritance can never push a dependency above the declared scale
pub const MAX_INHERITED_PRIORITY: u8 = 100;

// =============================================================================
// BUDGET ALLOCATION
// =============================================================================

/// Fraction of the cycle compute limit granted to each tier, in service
/// order (critical, high, medium, low, idle). Sums to 1.0; the scheduler
/// itself consumes the slack left by scaled-down tiers.
pub const TIER_FRACTIONS: [f64; 5] = [0.35, 0.25, 0.20, 0.15, 0.05];

/// Per-reserve-level scale factors applied on top of `TIER_FRACTIONS`,
/// indexed [reserve][tier]. Lower reserve squeezes low tiers first while
/// the critical tier keeps its full share.
pub const RESERVE_SCALE: [[f64; 5]; 4] = [
    // critical reserve: only the critical tier runs at full share
    [1.0, 0.50, 0.25, 0.00, 0.00],
    // low reserve: background work heavily squeezed
    [1.0, 0.80, 0.60, 0.40, 0.00],
    // normal reserve: everything runs, idle slightly trimmed
    [1.0, 1.00, 1.00, 1.00, 0.50],
    // high reserve: full allocation across the board
    [1.0, 1.00, 1.00, 1.00, 1.00],
];

/// Default per-process share of the cycle limit (hard cap base)
pub const DEFAULT_CPU_FRACTION: f64 = 0.2;

/// Fraction of the hard cap that triggers a near-limit warning
pub const DEFAULT_WARN_FRACTION: f64 = 0.8;

/// Minimum cycles between repeated near-limit warnings per process
/// Keeps a chronically heavy process from flooding the log
pub const BUDGET_WARN_INTERVAL: u64 = 100;

// =============================================================================
// RESILIENCE
// =============================================================================

/// Consecutive crashes before a process is permanently disabled
pub const CRASH_DISABLE_THRESHOLD: u32 = 3;

/// Cycles a crashed process sits out before being retried
pub const CRASH_COOLDOWN_CYCLES: u64 = 10;

// =============================================================================
// CHECKPOINTING
// =============================================================================

/// Cycles between checkpoint sweeps
/// Incremental comparison makes sweeps cheap, but serialize hooks are not free
pub const CHECKPOINT_INTERVAL: u64 = 100;

// =============================================================================
// IPC
// =============================================================================

/// Messages on one sender->target channel in a single cycle before the
/// channel is flagged as spammy. Delivery still happens; the flag is a
/// diagnostic, not a limiter.
pub const CHANNEL_SPAM_THRESHOLD: u32 = 100;

/// Ring capacity for the optional message trace
/// Oldest entries are evicted first once full
pub const IPC_TRACE_CAP: usize = 1000;

/// Cycles between busiest-channel volume reports
pub const MAILBOX_REPORT_INTERVAL: u64 = 100;

/// Channels listed in each volume report
pub const TOP_BUSIEST_CHANNELS: usize = 5;

// =============================================================================
// DIAGNOSTICS
// =============================================================================

/// Cycles between periodic scheduler diagnostics lines
pub const STATS_INTERVAL: u64 = 100;
