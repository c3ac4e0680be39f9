// src/graph/feature.rs

//! Heuristic grouping of tasks into features.

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

use crate::task::Task;

/// Feature name used when nothing else matches.
pub const GENERAL_FEATURE: &str = "general";

/// Label prefix that names a feature explicitly: `feature:<name>`.
pub const FEATURE_LABEL_PREFIX: &str = "feature:";

/// Decides which feature a task belongs to.
pub trait FeatureIdentifier: Send + Sync {
    fn identify(&self, task: &Task) -> String;
}

const DEFAULT_COMPONENTS: &[&str] = &[
    "auth",
    "user",
    "payment",
    "billing",
    "api",
    "database",
    "frontend",
    "backend",
    "ui",
    "search",
    "notification",
    "email",
    "admin",
    "profile",
    "dashboard",
    "report",
    "analytics",
    "order",
    "cart",
    "checkout",
    "inventory",
];

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("authentication", "auth"),
    ("authorization", "auth"),
    ("login", "auth"),
    ("signin", "auth"),
    ("db", "database"),
    ("emails", "email"),
];

/// Words the name regexes may capture that are never feature names.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "for", "and", "of", "to", "new", "all", "unit", "integration", "e2e",
    "test", "tests", "testing", "doc", "docs", "documentation", "design", "initial", "basic",
    "core", "main", "project",
];

/// Default [`FeatureIdentifier`].
///
/// Tries, in order: an explicit `feature:<name>` label, a label naming a
/// known component, the task name (`<verb> [the] <feature>` then
/// `<feature> <noun>`), any known component word in the name, and finally
/// [`GENERAL_FEATURE`]. Results are normalised through an alias table and
/// plural known components are reduced to singular.
#[derive(Debug, Clone)]
pub struct HeuristicFeatureIdentifier {
    components: Vec<String>,
    aliases: HashMap<String, String>,
    verb_form: Option<Regex>,
    noun_form: Option<Regex>,
}

impl Default for HeuristicFeatureIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicFeatureIdentifier {
    pub fn new() -> Self {
        Self::with_components(DEFAULT_COMPONENTS.iter().map(|s| s.to_string()))
    }

    /// Identifier with a custom component vocabulary. Default aliases still
    /// apply.
    pub fn with_components(components: impl IntoIterator<Item = String>) -> Self {
        let aliases = DEFAULT_ALIASES
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();

        Self {
            components: components
                .into_iter()
                .map(|c| c.to_ascii_lowercase())
                .collect(),
            aliases,
            verb_form: compile(
                r"^(?:design|implement|build|create|develop|test|document|deploy|setup|set up|configure|add|integrate|refactor|fix|verify|validate|write|release)\s+(?:the\s+|a\s+|an\s+)?([a-z0-9][a-z0-9_-]*)",
            ),
            noun_form: compile(
                r"\b([a-z0-9][a-z0-9_-]*)\s+(?:service|module|api|component|feature|system|endpoint|endpoints|page|flow|schema|model|layer|workflow)\b",
            ),
        }
    }

    /// Add or replace an alias (`from` is matched lowercased).
    pub fn with_alias(mut self, from: &str, to: &str) -> Self {
        self.aliases
            .insert(from.to_ascii_lowercase(), to.to_ascii_lowercase());
        self
    }

    fn is_component(&self, word: &str) -> bool {
        self.components.iter().any(|c| c == word)
    }

    /// Apply aliases and singularise known components.
    fn normalize(&self, raw: &str) -> String {
        let word = raw.trim().to_ascii_lowercase();
        if let Some(target) = self.aliases.get(&word) {
            return target.clone();
        }
        if let Some(stem) = word.strip_suffix('s') {
            if self.is_component(stem) {
                return stem.to_string();
            }
        }
        word
    }

    fn known_component(&self, raw: &str) -> Option<String> {
        let word = self.normalize(raw);
        self.is_component(&word).then_some(word)
    }

    fn from_name_patterns(&self, name: &str) -> Option<String> {
        [&self.verb_form, &self.noun_form]
            .into_iter()
            .flatten()
            .filter_map(|re| re.captures(name))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .find(|word| !STOP_WORDS.contains(&word.as_str()))
            .map(|word| self.normalize(&word))
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "invalid feature name pattern; ignoring");
            None
        }
    }
}

impl FeatureIdentifier for HeuristicFeatureIdentifier {
    fn identify(&self, task: &Task) -> String {
        for label in &task.labels {
            let lower = label.to_ascii_lowercase();
            if let Some(name) = lower.strip_prefix(FEATURE_LABEL_PREFIX) {
                let name = name.trim();
                if !name.is_empty() {
                    return self.normalize(name);
                }
            }
        }

        if let Some(component) = task.labels.iter().find_map(|l| self.known_component(l)) {
            return component;
        }

        let name = task.name.to_ascii_lowercase();
        if let Some(feature) = self.from_name_patterns(&name) {
            return feature;
        }

        name.split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .find_map(|w| self.known_component(w))
            .unwrap_or_else(|| GENERAL_FEATURE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &str, labels: &[&str]) -> String {
        let mut t = Task::new("t", name);
        for l in labels {
            t.add_label(*l);
        }
        HeuristicFeatureIdentifier::new().identify(&t)
    }

    #[test]
    fn explicit_label_wins() {
        assert_eq!(feature("Implement payment", &["feature:Checkout"]), "checkout");
    }

    #[test]
    fn component_label_beats_name() {
        assert_eq!(feature("Implement payment", &["backend", "auth"]), "backend");
    }

    #[test]
    fn name_patterns() {
        assert_eq!(feature("Design auth", &[]), "auth");
        assert_eq!(feature("Implement the payment flow", &[]), "payment");
        assert_eq!(feature("Build Authentication", &[]), "auth");
        assert_eq!(feature("Harden search service", &[]), "search");
        assert_eq!(feature("Document orders", &[]), "order");
    }

    #[test]
    fn stop_words_fall_through_to_component_scan() {
        assert_eq!(feature("Write tests for auth", &[]), "auth");
    }

    #[test]
    fn unknown_is_general() {
        assert_eq!(feature("Misc cleanup", &[]), GENERAL_FEATURE);
    }
}
