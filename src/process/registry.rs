/*!
 * Process Registry
 * Authoritative table of registered processes and their hierarchy
 */

use crate::core::errors::RegistryError;
use crate::core::limits;
use crate::core::types::{FastMap, FastSet, Pid, Priority, PriorityTier};
use crate::process::traits::Process;
use crate::process::types::{
    CrashRecord, ProcessContextInfo, ProcessSnapshot, ProcessSpec, ResourceLimits, RuntimeState,
};
use log::warn;
use serde_json::Value;

/// Everything the kernel tracks for one registered process.
///
/// The process instance itself is held as an `Option` so the cycle loop
/// can check it out during a run while syscalls mutate the rest of the
/// slot through the registry.
pub(crate) struct Slot {
    pub spec: ProcessSpec,
    /// Priority the scheduler uses, frozen at registration time.
    /// `spec.priority` may drift via runtime priority edits; only
    /// re-registration refreshes this copy.
    pub sched_priority: Priority,
    pub runtime: RuntimeState,
    pub crash: CrashRecord,
    pub limits: ResourceLimits,
    /// Private per-process memory document
    pub memory: Value,
    pub children: FastSet<Pid>,
    pub process: Option<Box<dyn Process>>,
}

impl Slot {
    fn new(spec: ProcessSpec, process: Box<dyn Process>) -> Self {
        let sched_priority = spec.priority.min(limits::MAX_DECLARED_PRIORITY);
        let limits = ResourceLimits {
            cpu_fraction: spec.cpu_fraction,
            warn_fraction: spec.warn_fraction,
        };
        Self {
            spec,
            sched_priority,
            runtime: RuntimeState::new(),
            crash: CrashRecord::default(),
            limits,
            memory: Value::Null,
            children: FastSet::default(),
            process: Some(process),
        }
    }
}

/// Registry of live processes.
///
/// Ids are unique while registered; a conflicting registration is
/// rejected rather than replacing the incumbent. Per-tier membership is
/// kept in registration order, which the scheduler's rotation uses as its
/// stable base ordering.
pub struct Registry {
    slots: FastMap<Pid, Slot>,
    tiers: [Vec<Pid>; PriorityTier::COUNT],
}

impl Registry {
    pub fn new() -> Self {
        Self {
            slots: FastMap::default(),
            tiers: Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<Pid> {
        let mut ids: Vec<_> = self.slots.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Insert a new slot, linking it under its parent.
    ///
    /// A parent that is not itself registered is discarded with a warning
    /// and the process joins as a root; hierarchy bookkeeping never points
    /// at ids outside the table.
    pub(crate) fn insert(
        &mut self,
        mut spec: ProcessSpec,
        process: Box<dyn Process>,
    ) -> Result<(), RegistryError> {
        if self.slots.contains_key(&spec.id) {
            return Err(RegistryError::IdConflict(spec.id));
        }

        if let Some(parent) = spec.parent.clone() {
            if parent == spec.id || !self.slots.contains_key(&parent) {
                warn!("process {} names unknown parent {parent}; registering as root", spec.id);
                spec.parent = None;
            } else if let Some(parent_slot) = self.slots.get_mut(&parent) {
                parent_slot.children.insert(spec.id.clone());
            }
        }

        let id = spec.id.clone();
        self.tiers[spec.tier.index()].push(id.clone());
        self.slots.insert(id, Slot::new(spec, process));
        Ok(())
    }

    /// Remove one slot, detaching it from its parent's child set.
    ///
    /// Children are left untouched; cascading removal is the caller's job
    /// so lifecycle hooks and final checkpoints can run per process.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Slot> {
        let slot = self.slots.remove(id)?;
        if let Some(parent) = slot.spec.parent.as_ref() {
            if let Some(parent_slot) = self.slots.get_mut(parent) {
                parent_slot.children.remove(id);
            }
        }
        self.tiers[slot.spec.tier.index()].retain(|pid| pid != id);
        Some(slot)
    }

    pub(crate) fn slot(&self, id: &str) -> Option<&Slot> {
        self.slots.get(id)
    }

    pub(crate) fn slot_mut(&mut self, id: &str) -> Option<&mut Slot> {
        self.slots.get_mut(id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Pid, &Slot)> {
        self.slots.iter()
    }

    /// Check the process instance out of its slot for a run
    pub(crate) fn take_process(&mut self, id: &str) -> Option<Box<dyn Process>> {
        self.slots.get_mut(id).and_then(|slot| slot.process.take())
    }

    /// Return a checked-out instance. Gives the instance back to the
    /// caller when the slot is gone (self-kill) or was refilled by a
    /// re-registration mid-run; the caller owns its teardown.
    pub(crate) fn put_process(
        &mut self,
        id: &str,
        process: Box<dyn Process>,
    ) -> Option<Box<dyn Process>> {
        match self.slots.get_mut(id) {
            Some(slot) if slot.process.is_none() => {
                slot.process = Some(process);
                None
            }
            _ => Some(process),
        }
    }

    /// Tier membership in registration order
    pub(crate) fn tier_members(&self, tier: PriorityTier) -> &[Pid] {
        &self.tiers[tier.index()]
    }

    /// Direct children of `id`, sorted
    pub fn children(&self, id: &str) -> Vec<Pid> {
        let mut children: Vec<_> = self
            .slots
            .get(id)
            .map(|slot| slot.children.iter().cloned().collect())
            .unwrap_or_default();
        children.sort();
        children
    }

    pub fn snapshot(&self, id: &str) -> Option<ProcessSnapshot> {
        let slot = self.slots.get(id)?;
        Some(ProcessSnapshot {
            spec: slot.spec.clone(),
            sched_priority: slot.sched_priority,
            runtime: slot.runtime.clone(),
            crash: slot.crash.clone(),
            limits: slot.limits,
            children: self.children(id),
        })
    }

    /// Snapshots of every registered process, sorted by id
    pub fn snapshots(&self) -> Vec<ProcessSnapshot> {
        let mut all: Vec<_> = self.slots.keys().filter_map(|id| self.snapshot(id)).collect();
        all.sort_by(|a, b| a.spec.id.cmp(&b.spec.id));
        all
    }

    pub fn context_info(&self, id: &str) -> Option<ProcessContextInfo> {
        let slot = self.slots.get(id)?;
        Some(ProcessContextInfo {
            pid: slot.spec.id.clone(),
            parent: slot.spec.parent.clone(),
            children: self.children(id),
            memory: slot.memory.clone(),
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
