// src/graph/validator.rs

//! Pre-commit structural validation of task batches.
//!
//! Three checks run in order: orphaned dependencies, dependency cycles, and
//! terminal tasks without dependencies. [`TaskGraphValidator::validate_before_commit`]
//! stops at the first failing check; [`TaskGraphValidator::validate_and_log`]
//! reports everything without failing; [`TaskGraphValidator::validate_and_fix`]
//! repairs what it can and describes each change.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use tracing::{info, warn};

use super::cycles::{DependencyGraph, closing_edge, describe_cycle};
use crate::errors::{GraphValidationError, Result};
use crate::task::{Task, TaskId, done_dependency_violations};

/// Orphan pairs listed in an error message before eliding the rest.
const MAX_LISTED_ORPHANS: usize = 5;

/// Labels that mark an implementation task for the terminal-task fix.
const IMPLEMENTATION_LABELS: &[&str] = &["implementation", "impl", "backend", "frontend"];

/// Name words that mark an implementation task for the terminal-task fix.
const IMPLEMENTATION_WORDS: &[&str] = &["implement", "build", "create", "develop"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorOptions {
    /// Refuse to auto-fix terminal tasks without dependencies.
    pub strict: bool,
}

/// Repaired batch plus one human-readable line per change.
#[derive(Debug, Clone, PartialEq)]
pub struct FixOutcome {
    pub tasks: Vec<Task>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskGraphValidator {
    options: ValidatorOptions,
}

impl TaskGraphValidator {
    pub fn new(options: ValidatorOptions) -> Self {
        Self { options }
    }

    pub fn strict() -> Self {
        Self::new(ValidatorOptions { strict: true })
    }

    pub fn options(&self) -> ValidatorOptions {
        self.options
    }

    /// Fail on the first structural defect.
    pub fn validate_before_commit(
        &self,
        tasks: &[Task],
    ) -> std::result::Result<(), GraphValidationError> {
        check_orphans(tasks)?;
        check_cycles(tasks)?;
        check_terminal_tasks(tasks)?;
        info!(tasks = tasks.len(), "task graph validated");
        Ok(())
    }

    /// Run every check and describe the outcome without failing.
    ///
    /// Returns `(ok, message)`. `ok` is false if any structural check failed.
    /// DONE tasks with unfinished dependencies are reported as warnings but do
    /// not make the batch invalid.
    pub fn validate_and_log(&self, tasks: &[Task]) -> (bool, String) {
        let mut problems: Vec<String> = [
            check_orphans(tasks),
            check_cycles(tasks),
            check_terminal_tasks(tasks),
        ]
        .into_iter()
        .filter_map(|r| r.err())
        .map(|e| e.to_string())
        .collect();
        let ok = problems.is_empty();

        let done_violations = done_dependency_violations(tasks);
        if !done_violations.is_empty() {
            let names = names_by_id(tasks);
            let mut msg = format!(
                "Warning: {} completed tasks depend on unfinished work:",
                done_violations.len()
            );
            for (task, dep) in &done_violations {
                msg.push_str(&format!(
                    "\n  - {} is done but depends on {}",
                    label(&names, task),
                    label(&names, dep)
                ));
            }
            problems.push(msg);
        }

        if ok {
            info!(tasks = tasks.len(), warnings = problems.len(), "task graph is valid");
        } else {
            warn!(tasks = tasks.len(), problems = problems.len(), "task graph is invalid");
        }

        let message = if problems.is_empty() {
            format!("Task graph is valid ({} tasks)", tasks.len())
        } else {
            problems.join("\n\n")
        };
        (ok, message)
    }

    /// Repair the batch.
    ///
    /// Orphaned dependency ids are stripped and cycles are broken by removing
    /// the edge that closes each one. Terminal tasks without dependencies get
    /// dependencies on the batch's implementation tasks, unless the validator
    /// is strict, in which case that defect is returned as an error. A
    /// terminal task that every other task already waits on cannot be linked
    /// without a cycle and is also an error. Fixing the output a second time
    /// changes nothing.
    pub fn validate_and_fix(
        &self,
        tasks: Vec<Task>,
    ) -> std::result::Result<FixOutcome, GraphValidationError> {
        let mut tasks = tasks;
        let mut warnings = Vec::new();

        fix_orphans(&mut tasks, &mut warnings);
        fix_cycles(&mut tasks, &mut warnings);

        if self.options.strict {
            check_terminal_tasks(&tasks)?;
        } else {
            fix_terminal_tasks(&mut tasks, &mut warnings)?;
        }

        for w in &warnings {
            warn!(fix = %w, "task graph auto-fix");
        }
        info!(tasks = tasks.len(), fixes = warnings.len(), "task graph auto-fix complete");
        Ok(FixOutcome { tasks, warnings })
    }

    /// All-or-nothing commit gate.
    ///
    /// The batch reaches `sink` only if it validates; otherwise nothing is
    /// handed over and the validation error is returned.
    pub async fn commit_batch<F, Fut, T>(&self, tasks: Vec<Task>, sink: F) -> Result<T>
    where
        F: FnOnce(Vec<Task>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.validate_before_commit(&tasks)?;
        sink(tasks).await
    }
}

fn names_by_id(tasks: &[Task]) -> HashMap<&str, &str> {
    tasks
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect()
}

fn label(names: &HashMap<&str, &str>, id: &str) -> String {
    match names.get(id) {
        Some(name) => format!("'{name}' ({id})"),
        None => format!("'{id}'"),
    }
}

fn orphan_pairs(tasks: &[Task]) -> Vec<(TaskId, TaskId)> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    tasks
        .iter()
        .flat_map(|t| {
            t.dependencies
                .iter()
                .filter(|d| !ids.contains(d.as_str()))
                .map(|d| (t.id.clone(), d.clone()))
        })
        .collect()
}

fn check_orphans(tasks: &[Task]) -> std::result::Result<(), GraphValidationError> {
    let pairs = orphan_pairs(tasks);
    if pairs.is_empty() {
        return Ok(());
    }

    let names = names_by_id(tasks);
    let mut message = format!("Found {} orphaned dependencies:", pairs.len());
    for (task, dep) in pairs.iter().take(MAX_LISTED_ORPHANS) {
        message.push_str(&format!(
            "\n  - {} depends on missing task '{dep}'",
            label(&names, task)
        ));
    }
    if pairs.len() > MAX_LISTED_ORPHANS {
        message.push_str(&format!(
            "\n  ... and {} more",
            pairs.len() - MAX_LISTED_ORPHANS
        ));
    }

    Err(GraphValidationError::OrphanedDependencies { pairs, message })
}

fn check_cycles(tasks: &[Task]) -> std::result::Result<(), GraphValidationError> {
    let cycles = DependencyGraph::from_tasks(tasks).find_cycles();
    if cycles.is_empty() {
        return Ok(());
    }

    let mut message = format!("Found {} circular dependencies:", cycles.len());
    for cycle in &cycles {
        message.push_str(&format!("\n  - cycle: {}", describe_cycle(cycle, tasks)));
    }

    Err(GraphValidationError::CircularDependency { cycles, message })
}

/// Terminal tasks that do not depend on any non-terminal task of the batch.
///
/// Empty when the batch has no non-terminal tasks at all.
fn terminal_violations(tasks: &[Task]) -> Vec<&Task> {
    let non_terminal: HashSet<&str> = tasks
        .iter()
        .filter(|t| !t.is_terminal())
        .map(|t| t.id.as_str())
        .collect();
    if non_terminal.is_empty() {
        return Vec::new();
    }

    tasks
        .iter()
        .filter(|t| t.is_terminal())
        .filter(|t| !t.dependencies.iter().any(|d| non_terminal.contains(d.as_str())))
        .collect()
}

fn check_terminal_tasks(tasks: &[Task]) -> std::result::Result<(), GraphValidationError> {
    let offenders = terminal_violations(tasks);
    if offenders.is_empty() {
        return Ok(());
    }

    let mut message = format!("Found {} terminal tasks without dependencies:", offenders.len());
    for t in &offenders {
        message.push_str(&format!(
            "\n  - {} must depend on at least one implementation task",
            t.display_name()
        ));
    }

    Err(GraphValidationError::TerminalWithoutDependencies {
        task_ids: offenders.iter().map(|t| t.id.clone()).collect(),
        message,
    })
}

fn fix_orphans(tasks: &mut [Task], warnings: &mut Vec<String>) {
    let ids: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();

    for task in tasks.iter_mut() {
        let (kept, removed): (Vec<TaskId>, Vec<TaskId>) = task
            .dependencies
            .drain(..)
            .partition(|d| ids.contains(d));
        task.dependencies = kept;

        if !removed.is_empty() {
            warnings.push(format!(
                "Removed invalid dependencies from {}: {}",
                task.display_name(),
                removed.join(", ")
            ));
        }
    }
}

fn fix_cycles(tasks: &mut [Task], warnings: &mut Vec<String>) {
    loop {
        let Some(cycle) = DependencyGraph::from_tasks(tasks).first_cycle() else {
            return;
        };
        let Some((from, to)) = closing_edge(&cycle) else {
            return;
        };

        let description = describe_cycle(&cycle, tasks);
        let removed = tasks
            .iter_mut()
            .find(|t| t.id == from)
            .map(|t| t.remove_dependency(&to))
            .unwrap_or(false);
        if !removed {
            // Cannot happen for a cycle built from these tasks; bail rather
            // than loop.
            warn!(task = %from, dependency = %to, "cycle edge not found; giving up on cycle fix");
            return;
        }

        warnings.push(format!(
            "Removed dependency of '{from}' on '{to}' to break cycle: {description}"
        ));
    }
}

fn is_implementation_task(task: &Task) -> bool {
    if IMPLEMENTATION_LABELS.iter().any(|l| task.has_label(l)) {
        return true;
    }
    let name = task.name.to_ascii_lowercase();
    IMPLEMENTATION_WORDS.iter().any(|w| name.contains(w))
}

/// Ids of every task that (transitively) depends on `target`.
fn dependents_of(tasks: &[Task], target: &str) -> HashSet<TaskId> {
    let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
    for t in tasks {
        for d in &t.dependencies {
            reverse.entry(d.as_str()).or_default().push(t.id.as_str());
        }
    }

    let mut out = HashSet::new();
    let mut stack = vec![target];
    while let Some(id) = stack.pop() {
        for dependent in reverse.get(id).into_iter().flatten() {
            if out.insert(dependent.to_string()) {
                stack.push(dependent);
            }
        }
    }
    out
}

/// Link each offending terminal task to the batch's implementation tasks.
///
/// Tasks that already wait on the terminal task are never candidates. Among
/// the rest, implementation tasks are preferred, falling back to every
/// eligible non-terminal task. A terminal task with no eligible candidate at
/// all cannot be repaired and is returned as an error.
fn fix_terminal_tasks(
    tasks: &mut [Task],
    warnings: &mut Vec<String>,
) -> std::result::Result<(), GraphValidationError> {
    let offenders: Vec<TaskId> = terminal_violations(tasks)
        .iter()
        .map(|t| t.id.clone())
        .collect();
    let mut unrepairable = Vec::new();

    for terminal_id in offenders {
        let blocked = dependents_of(tasks, &terminal_id);
        let eligible: Vec<&Task> = tasks
            .iter()
            .filter(|t| !t.is_terminal() && !blocked.contains(&t.id))
            .collect();
        let implementation: Vec<TaskId> = eligible
            .iter()
            .filter(|t| is_implementation_task(t))
            .map(|t| t.id.clone())
            .collect();
        let candidates = if implementation.is_empty() {
            eligible.iter().map(|t| t.id.clone()).collect()
        } else {
            implementation
        };

        let Some(task) = tasks.iter_mut().find(|t| t.id == terminal_id) else {
            continue;
        };
        if candidates.is_empty() {
            warn!(task = %terminal_id, "every non-terminal task depends on this terminal task");
            unrepairable.push(terminal_id);
            continue;
        }

        let added: Vec<&str> = candidates
            .iter()
            .filter(|id| task.add_dependency(id))
            .map(|id| id.as_str())
            .collect();
        warnings.push(format!(
            "Added {} dependencies to terminal task {}: {}",
            added.len(),
            task.display_name(),
            added.join(", ")
        ));
    }

    if unrepairable.is_empty() {
        Ok(())
    } else {
        check_terminal_tasks(tasks)
    }
}
