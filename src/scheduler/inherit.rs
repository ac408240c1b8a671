/*!
 * Priority Inheritance
 * Dependency edges and the effective-priority resolver
 */

use crate::core::types::{FastMap, FastSet, Pid, Priority};
use crate::process::registry::Registry;

/// Directed dependency edges between registered processes.
///
/// An edge `dependent -> dependency` means the dependent's progress waits
/// on the dependency, so the dependency runs at least as urgently as its
/// most urgent direct dependent. Propagation is one hop only; chains do
/// not accumulate.
#[derive(Default)]
pub(crate) struct DependencyGraph {
    /// dependent -> set of processes it depends on
    depends_on: FastMap<Pid, FastSet<Pid>>,
    /// dependency -> set of processes depending on it
    dependents: FastMap<Pid, FastSet<Pid>>,
}

impl DependencyGraph {
    /// Add one edge. Returns false if it already existed.
    pub fn add(&mut self, dependent: &Pid, dependency: &Pid) -> bool {
        let inserted = self
            .depends_on
            .entry(dependent.clone())
            .or_default()
            .insert(dependency.clone());
        if inserted {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(dependent.clone());
        }
        inserted
    }

    /// Remove one edge. Returns false if it was not present.
    pub fn remove(&mut self, dependent: &str, dependency: &str) -> bool {
        let removed = self
            .depends_on
            .get_mut(dependent)
            .map(|set| set.remove(dependency))
            .unwrap_or(false);
        if removed {
            if let Some(set) = self.dependents.get_mut(dependency) {
                set.remove(dependent);
            }
        }
        removed
    }

    /// Drop every edge touching `id`, in both directions
    pub fn remove_process(&mut self, id: &str) {
        if let Some(dependencies) = self.depends_on.remove(id) {
            for dep in dependencies {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.remove(id);
                }
            }
        }
        if let Some(dependents) = self.dependents.remove(id) {
            for dependent in dependents {
                if let Some(set) = self.depends_on.get_mut(&dependent) {
                    set.remove(id);
                }
            }
        }
    }

    /// Processes directly depending on `id`, sorted
    pub fn dependents_of(&self, id: &str) -> Vec<Pid> {
        let mut out: Vec<_> = self
            .dependents
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Processes `id` directly depends on, sorted
    pub fn dependencies_of(&self, id: &str) -> Vec<Pid> {
        let mut out: Vec<_> = self
            .depends_on
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Priority `id` inherits from its direct dependents: the highest
    /// scheduling priority among them, clamped to `ceiling`. Edges whose
    /// dependent is no longer registered contribute nothing.
    pub fn inherited(&self, id: &str, registry: &Registry, ceiling: Priority) -> Priority {
        let Some(dependents) = self.dependents.get(id) else {
            return 0;
        };
        let mut best = 0;
        for dependent in dependents {
            if let Some(slot) = registry.slot(dependent) {
                best = best.max(slot.sched_priority);
            }
        }
        best.min(ceiling)
    }
}
