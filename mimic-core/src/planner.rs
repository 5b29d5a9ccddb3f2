//! Dependency planner: turns a set of VM specs into ordered start/stop waves.
//!
//! Uses Kahn's algorithm, but collects *levels* instead of a flat order:
//! every VM in a wave has all of its dependencies in earlier waves, so the
//! members of one wave are eligible to start concurrently.

use crate::error::{MimicError, Result};
use crate::types::VmSpec;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// The immutable output of planning: VM definitions plus wave sequences.
///
/// `stop_waves` is the mirror of `start_waves`: outer order reversed and
/// each wave's member order reversed.
#[derive(Debug, Clone)]
pub struct OrchestrationPlan {
    /// All VM definitions, keyed by name
    pub vms: HashMap<String, VmSpec>,

    /// Ordered waves for `up`; members within a wave are parallel-eligible
    pub start_waves: Vec<Vec<String>>,

    /// Ordered waves for `down`
    pub stop_waves: Vec<Vec<String>>,
}

impl OrchestrationPlan {
    /// Index of the start wave containing `name`, if any.
    pub fn wave_of(&self, name: &str) -> Option<usize> {
        self.start_waves.iter().position(|wave| wave.iter().any(|n| n == name))
    }
}

/// Builds an [`OrchestrationPlan`] from VM specs.
pub struct DependencyPlanner;

impl DependencyPlanner {
    /// Build a plan, failing fast on unknown dependencies or cycles.
    ///
    /// No partial plan is ever produced: validation happens before any wave
    /// is assembled, and a cycle aborts the whole build.
    #[instrument(skip(specs), fields(vms = specs.len()))]
    pub fn build(specs: HashMap<String, VmSpec>) -> Result<OrchestrationPlan> {
        // Reject unknown dependency references up front.
        for (name, spec) in &specs {
            for dep in &spec.depends_on {
                if !specs.contains_key(dep) {
                    return Err(MimicError::MissingDependency {
                        vm: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut in_degree: HashMap<&str, usize> =
            specs.keys().map(|name| (name.as_str(), 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, spec) in &specs {
            // Duplicate depends_on entries count once.
            let deps: HashSet<&str> = spec.depends_on.iter().map(String::as_str).collect();
            for dep in deps {
                dependents.entry(dep).or_default().push(name.as_str());
                if let Some(degree) = in_degree.get_mut(name.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut start_waves: Vec<Vec<String>> = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            // Sorted by name for deterministic output; intra-wave order has
            // no semantic meaning since members run concurrently.
            ready.sort_unstable();
            let wave: Vec<String> = ready.iter().map(|name| name.to_string()).collect();
            placed += wave.len();

            let mut next = Vec::new();
            for name in &ready {
                if let Some(children) = dependents.get(name) {
                    for child in children {
                        if let Some(degree) = in_degree.get_mut(child) {
                            *degree -= 1;
                            if *degree == 0 {
                                next.push(*child);
                            }
                        }
                    }
                }
            }

            start_waves.push(wave);
            ready = next;
        }

        if placed != specs.len() {
            let mut unplaced: Vec<&str> = in_degree
                .iter()
                .filter(|(_, &degree)| degree > 0)
                .map(|(name, _)| *name)
                .collect();
            unplaced.sort_unstable();
            return Err(MimicError::CircularDependency { vms: unplaced.join(", ") });
        }

        let stop_waves: Vec<Vec<String>> = start_waves
            .iter()
            .rev()
            .map(|wave| wave.iter().rev().cloned().collect())
            .collect();

        debug!(waves = start_waves.len(), "dependency plan built");

        Ok(OrchestrationPlan { vms: specs, start_waves, stop_waves })
    }
}
