//! Local stages: extraction, enrichment, validation, aggregation, packaging.

pub mod aggregate;
pub mod enrich;
pub mod extract;
pub mod orchestrator;
pub mod package;
pub mod table;
pub mod validate;

pub use orchestrator::{Orchestrator, RunSummary, Stage};
