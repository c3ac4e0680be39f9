// src/persistence/mod.rs

//! Durable assignment storage.
//!
//! - [`store`] holds [`AssignmentPersistence`], the agent → assignment table.
//! - [`record`] defines the per-agent [`AssignmentRecord`].
//! - [`atomic`] provides the temp-file + rename write used for every
//!   document this crate persists.

pub mod atomic;
pub mod record;
pub mod store;

pub use record::AssignmentRecord;
pub use store::AssignmentPersistence;
