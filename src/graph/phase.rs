// src/graph/phase.rs

//! Phase ordering within features.
//!
//! Tasks are classified into a [`Phase`] and grouped by feature. Inside one
//! feature every task gains a dependency on every task of an earlier phase;
//! tasks of different features are never linked, so unrelated features can
//! proceed in parallel.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use tracing::{debug, info};

use super::classifier::{KeywordClassifier, TaskClassifier, TaskType};
use super::feature::{FeatureIdentifier, HeuristicFeatureIdentifier};
use crate::task::{Task, TaskId};

/// Lifecycle stage. Declaration order is ordering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Design = 1,
    Infrastructure = 2,
    Implementation = 3,
    Testing = 4,
    Documentation = 5,
    Deployment = 6,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Design,
        Phase::Infrastructure,
        Phase::Implementation,
        Phase::Testing,
        Phase::Documentation,
        Phase::Deployment,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl From<TaskType> for Phase {
    fn from(ty: TaskType) -> Self {
        match ty {
            TaskType::Design => Phase::Design,
            TaskType::Infrastructure => Phase::Infrastructure,
            TaskType::Implementation | TaskType::Other => Phase::Implementation,
            TaskType::Testing => Phase::Testing,
            TaskType::Documentation => Phase::Documentation,
            TaskType::Deployment => Phase::Deployment,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Design => "design",
            Phase::Infrastructure => "infrastructure",
            Phase::Implementation => "implementation",
            Phase::Testing => "testing",
            Phase::Documentation => "documentation",
            Phase::Deployment => "deployment",
        };
        f.write_str(s)
    }
}

/// Tasks of one feature bucketed by phase. Rebuilt on every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureGroup {
    pub name: String,
    /// Task ids in batch order.
    pub tasks: Vec<TaskId>,
    pub phases: BTreeMap<Phase, Vec<TaskId>>,
}

/// Result of [`PhaseDependencyEnforcer::enforce_with_report`].
#[derive(Debug, Clone)]
pub struct PhaseEnforcement {
    pub tasks: Vec<Task>,
    /// Every `(task, dependency)` edge that was injected.
    pub added: Vec<(TaskId, TaskId)>,
    /// Edges left out because the dependency already waits on the task,
    /// directly or through other tasks, so adding them would close a cycle.
    pub skipped: Vec<(TaskId, TaskId)>,
}

pub struct PhaseDependencyEnforcer {
    classifier: Box<dyn TaskClassifier>,
    features: Box<dyn FeatureIdentifier>,
}

impl fmt::Debug for PhaseDependencyEnforcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseDependencyEnforcer").finish_non_exhaustive()
    }
}

impl Default for PhaseDependencyEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseDependencyEnforcer {
    /// Enforcer using [`KeywordClassifier`] and [`HeuristicFeatureIdentifier`].
    pub fn new() -> Self {
        Self::with_strategies(
            Box::new(KeywordClassifier::new()),
            Box::new(HeuristicFeatureIdentifier::new()),
        )
    }

    pub fn with_strategies(
        classifier: Box<dyn TaskClassifier>,
        features: Box<dyn FeatureIdentifier>,
    ) -> Self {
        Self {
            classifier,
            features,
        }
    }

    pub fn phase_of(&self, task: &Task) -> Phase {
        Phase::from(self.classifier.classify(task))
    }

    pub fn feature_of(&self, task: &Task) -> String {
        self.features.identify(task)
    }

    /// Group `tasks` by feature, in order of first appearance.
    pub fn feature_groups(&self, tasks: &[Task]) -> Vec<FeatureGroup> {
        let mut groups: Vec<FeatureGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for task in tasks {
            let name = self.feature_of(task);
            let phase = self.phase_of(task);

            let slot = *index.entry(name.clone()).or_insert_with(|| {
                groups.push(FeatureGroup {
                    name,
                    tasks: Vec::new(),
                    phases: BTreeMap::new(),
                });
                groups.len() - 1
            });

            let group = &mut groups[slot];
            group.tasks.push(task.id.clone());
            group.phases.entry(phase).or_default().push(task.id.clone());
        }

        groups
    }

    /// Inject same-feature phase edges. Existing dependencies are kept.
    pub fn enforce_phase_dependencies(&self, tasks: Vec<Task>) -> Vec<Task> {
        self.enforce_with_report(tasks).tasks
    }

    /// Like [`enforce_phase_dependencies`](Self::enforce_phase_dependencies)
    /// but also reports which edges were added or skipped.
    pub fn enforce_with_report(&self, mut tasks: Vec<Task>) -> PhaseEnforcement {
        let groups = self.feature_groups(&tasks);
        let position: HashMap<TaskId, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        let mut added = Vec::new();
        let mut skipped = Vec::new();

        for group in &groups {
            let mut earlier: Vec<&TaskId> = Vec::new();

            for ids in group.phases.values() {
                for id in ids {
                    let Some(&ti) = position.get(id) else { continue };

                    for dep in &earlier {
                        if depends_on(&tasks, &position, dep, id) {
                            debug!(
                                task = %id,
                                dependency = %dep,
                                feature = %group.name,
                                "dependency already waits on task; not injecting phase edge"
                            );
                            skipped.push((id.clone(), (*dep).clone()));
                            continue;
                        }
                        if tasks[ti].add_dependency(dep) {
                            added.push((id.clone(), (*dep).clone()));
                        }
                    }
                }
                earlier.extend(ids.iter());
            }
        }

        info!(
            features = groups.len(),
            added = added.len(),
            skipped = skipped.len(),
            "phase dependencies enforced"
        );
        PhaseEnforcement {
            tasks,
            added,
            skipped,
        }
    }

    /// Every dependency that points from a task to a task of a later phase.
    ///
    /// Checked across all features. Dependencies outside the batch are
    /// ignored.
    pub fn validate_phase_ordering(&self, tasks: &[Task]) -> (bool, Vec<String>) {
        let phases: HashMap<&str, (Phase, &Task)> = tasks
            .iter()
            .map(|t| (t.id.as_str(), (self.phase_of(t), t)))
            .collect();

        let mut errors = Vec::new();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for task in tasks {
            let Some(&(phase, _)) = phases.get(task.id.as_str()) else { continue };
            for dep in &task.dependencies {
                let Some(&(dep_phase, dep_task)) = phases.get(dep.as_str()) else { continue };
                if dep_phase > phase && seen.insert((task.id.as_str(), dep.as_str())) {
                    errors.push(format!(
                        "{} [{phase}] depends on {} [{dep_phase}], which is a later phase",
                        task.display_name(),
                        dep_task.display_name(),
                    ));
                }
            }
        }

        (errors.is_empty(), errors)
    }
}

/// Whether `from` depends on `to`, directly or through other tasks.
fn depends_on(tasks: &[Task], position: &HashMap<TaskId, usize>, from: &str, to: &str) -> bool {
    let mut stack = vec![from];
    let mut seen: HashSet<&str> = HashSet::new();
    while let Some(id) = stack.pop() {
        if id == to {
            return true;
        }
        if !seen.insert(id) {
            continue;
        }
        if let Some(&i) = position.get(id) {
            stack.extend(tasks[i].dependencies.iter().map(String::as_str));
        }
    }
    false
}
