//! Core pipeline logic: structured-output extraction, the generation
//! backend abstraction, the stage agents and orchestrator, and usage
//! accounting.

pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod usage;
