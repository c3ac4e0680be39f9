// src/graph/mod.rs

//! Task batch validation and phase ordering.
//!
//! - [`validator`] checks a batch for orphaned dependencies, cycles and
//!   terminal tasks without dependencies, and can repair them.
//! - [`phase`] injects same-feature phase ordering edges.
//! - [`classifier`] and [`feature`] are the swappable strategies feeding
//!   phase ordering.
//! - [`cycles`] is the dependency graph + cycle search shared by both.

pub mod classifier;
pub mod cycles;
pub mod feature;
pub mod phase;
pub mod validator;

pub use classifier::{KeywordClassifier, TaskClassifier, TaskType};
pub use cycles::DependencyGraph;
pub use feature::{FeatureIdentifier, GENERAL_FEATURE, HeuristicFeatureIdentifier};
pub use phase::{FeatureGroup, Phase, PhaseDependencyEnforcer, PhaseEnforcement};
pub use validator::{FixOutcome, TaskGraphValidator, ValidatorOptions};
