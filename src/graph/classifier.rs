// src/graph/classifier.rs

//! Task type classification feeding phase ordering.
//!
//! The classifier is a pluggable collaborator: anything implementing
//! [`TaskClassifier`] can be handed to the
//! [`PhaseDependencyEnforcer`](super::PhaseDependencyEnforcer).
//! [`KeywordClassifier`] is the built-in label/keyword heuristic.

use std::fmt;

use crate::task::Task;

/// What kind of work a task is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Design,
    Infrastructure,
    Implementation,
    Testing,
    Documentation,
    Deployment,
    /// Nothing recognisable. Ordered as implementation.
    Other,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Design => "design",
            TaskType::Infrastructure => "infrastructure",
            TaskType::Implementation => "implementation",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
            TaskType::Deployment => "deployment",
            TaskType::Other => "other",
        };
        f.write_str(s)
    }
}

pub trait TaskClassifier: Send + Sync {
    fn classify(&self, task: &Task) -> TaskType;
}

/// How a keyword matches a lowercased word.
#[derive(Debug, Clone, Copy)]
enum Match {
    /// Word must equal the keyword.
    Exact(&'static str),
    /// Word must start with the keyword ("test" matches "tests", "testing").
    Stem(&'static str),
}

impl Match {
    fn matches(self, word: &str) -> bool {
        match self {
            Match::Exact(k) => word == k,
            Match::Stem(k) => word.starts_with(k),
        }
    }
}

const KEYWORDS: &[(TaskType, &[Match])] = &[
    (
        TaskType::Design,
        &[
            Match::Stem("design"),
            Match::Stem("architect"),
            Match::Stem("wireframe"),
            Match::Stem("mockup"),
            Match::Exact("plan"),
            Match::Exact("planning"),
            Match::Stem("research"),
        ],
    ),
    (
        TaskType::Infrastructure,
        &[
            Match::Stem("infra"),
            Match::Exact("setup"),
            Match::Stem("provision"),
            Match::Stem("scaffold"),
            Match::Stem("configur"),
            Match::Stem("install"),
            Match::Exact("ci"),
            Match::Stem("docker"),
        ],
    ),
    (
        TaskType::Implementation,
        &[
            Match::Stem("implement"),
            Match::Exact("impl"),
            Match::Exact("build"),
            Match::Stem("creat"),
            Match::Stem("develop"),
            Match::Stem("integrat"),
            Match::Stem("refactor"),
            Match::Exact("add"),
            Match::Exact("fix"),
            Match::Exact("code"),
            Match::Exact("feature"),
        ],
    ),
    (
        TaskType::Testing,
        &[
            Match::Stem("test"),
            Match::Stem("verif"),
            Match::Stem("validat"),
            Match::Exact("qa"),
            Match::Exact("e2e"),
            Match::Stem("benchmark"),
        ],
    ),
    (
        TaskType::Documentation,
        &[
            Match::Stem("document"),
            Match::Exact("docs"),
            Match::Exact("doc"),
            Match::Stem("readme"),
            Match::Exact("guide"),
        ],
    ),
    (
        TaskType::Deployment,
        &[
            Match::Stem("deploy"),
            Match::Stem("release"),
            Match::Stem("publish"),
            Match::Exact("ship"),
            Match::Stem("launch"),
            Match::Stem("rollout"),
        ],
    ),
];

/// Classifies by label first, then by the first keyword in the task name.
///
/// "Write tests for login" is testing (first matching word is "tests");
/// "Implement test harness" is implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn lookup(word: &str) -> Option<TaskType> {
        KEYWORDS
            .iter()
            .find(|(_, keys)| keys.iter().any(|k| k.matches(word)))
            .map(|(ty, _)| *ty)
    }
}

impl TaskClassifier for KeywordClassifier {
    fn classify(&self, task: &Task) -> TaskType {
        for label in &task.labels {
            let label = label.to_ascii_lowercase();
            // `feature:<name>` labels describe grouping, not type.
            if label.contains(':') {
                continue;
            }
            if let Some(ty) = Self::lookup(&label) {
                return ty;
            }
        }

        let name = task.name.to_ascii_lowercase();
        if name.contains("set up") {
            return TaskType::Infrastructure;
        }
        name.split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .find_map(Self::lookup)
            .unwrap_or(TaskType::Other)
    }
}
