//! Cardsmith turns source documents into reviewed flashcard decks.
//!
//! A run flows through four LLM stage agents: a segmenter and a
//! content-outline agent (concurrent), a per-segment card generator, and a
//! quality reviewer whose rejection ratio can trigger a single
//! feedback-driven regeneration pass. Accepted cards are deduplicated and
//! persisted to SQLite alongside an append-only usage log.

pub mod config;
pub mod core;
pub mod database;
pub mod ingestion;

pub use crate::config::AppConfig;
pub use crate::core::llm::{GenerationBackend, StageRequest, StageResponse, TokenUsage};
pub use crate::core::pipeline::{Pipeline, PipelineError};
pub use crate::core::usage::{StageRole, UsageRecord, UsageSink};
pub use crate::database::Database;
pub use crate::ingestion::DocfileClient;
