//! Pipeline Orchestrator
//!
//! Sequences the four stage agents over a source document:
//! segment ∥ outline → generate per segment → review → at most one
//! quality-triggered regeneration pass → persist accepted cards.
//!
//! Stage-level parse failures are absorbed with per-stage fallbacks;
//! backend and persistence failures abort the run and surface unmodified.

pub mod agents;
pub mod prompts;
pub mod types;

use crate::core::llm::{GenerationBackend, LlmError};
use crate::core::pipeline::agents::{
    CardGenerator, GenContext, OutlineAgent, QualityReviewer, ReviewFeedback, ReviewSource,
    Segmenter,
};
use crate::core::pipeline::types::{
    normalize_front, AcceptedCard, Card, PipelineResult, Segment,
};
use crate::core::usage::UsageSink;
use crate::database::models::{CardRow, DeckRecord, SourceRecord};
use crate::database::Database;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

/// Rejection ratio above which (strictly) one regeneration pass runs.
const RETRY_THRESHOLD: f64 = 0.3;
/// Rejected samples included in regeneration feedback.
const FEEDBACK_SAMPLE_LIMIT: usize = 5;
/// Accepted cards returned in the result preview.
const PREVIEW_LIMIT: usize = 10;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Generation backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Input text is empty")]
    EmptyInput,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================================
// Pipeline
// ============================================================================

/// The pipeline orchestrator. Collaborators are injected at construction;
/// one instance serves many runs.
pub struct Pipeline {
    backend: Arc<dyn GenerationBackend>,
    sink: Arc<dyn UsageSink>,
    db: Database,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn GenerationBackend>, sink: Arc<dyn UsageSink>, db: Database) -> Self {
        Self { backend, sink, db }
    }

    /// Run the full document-to-deck flow for one owner. Completes the whole
    /// multi-stage flow before returning; any unrecovered stage error fails
    /// the run with nothing persisted.
    pub async fn run(
        &self,
        input_text: &str,
        owner_id: &str,
        deck_id: Option<&str>,
    ) -> Result<PipelineResult> {
        if input_text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let segmenter = Segmenter::new(self.backend.clone(), self.sink.clone(), owner_id);
        let outliner = OutlineAgent::new(self.backend.clone(), self.sink.clone(), owner_id);
        let generator = CardGenerator::new(self.backend.clone(), self.sink.clone(), owner_id);
        let reviewer = QualityReviewer::new(self.backend.clone(), self.sink.clone(), owner_id);

        // 1. Segmenter and outline agent run concurrently on the same text;
        //    either failure fails the run.
        let (segment_payload, outline) = tokio::try_join!(
            segmenter.segment(input_text),
            outliner.outline(input_text),
        )?;

        // 2. Mandatory fallback: a single synthetic segment covering the
        //    whole input when the segmenter produced nothing usable.
        let mut language = "und".to_string();
        let segments: Vec<Segment> = match segment_payload {
            Some(payload) => {
                language = payload.doc_stats.language.clone();
                match payload.validated(input_text) {
                    Some(segments) => segments,
                    None => {
                        tracing::warn!("segmenter output violated span invariants; using whole-document fallback");
                        vec![Segment::whole(input_text)]
                    }
                }
            }
            None => {
                tracing::info!("segmenter returned no usable segments; using whole-document fallback");
                vec![Segment::whole(input_text)]
            }
        };

        // 3. Sequential per-segment generation, in segment order.
        let mut candidates: Vec<Card> = Vec::new();
        for segment in &segments {
            let batch = generator
                .generate(segment, GenContext::Outline(&outline))
                .await?;
            candidates.extend(batch);
        }

        // 4. One review over the pooled candidate list.
        let review = reviewer
            .review(&candidates, ReviewSource::FullText(input_text))
            .await?;

        if review.summary.accepted_count + review.summary.rejected_count
            != review.summary.input_count
        {
            // Untrusted external contract: log, use `accepted` as-is.
            tracing::warn!(
                input = review.summary.input_count,
                accepted = review.summary.accepted_count,
                rejected = review.summary.rejected_count,
                "reviewer counts do not sum; continuing with accepted list"
            );
        }

        let mut accepted = review.accepted;

        // 5. At most one regeneration pass, using the orchestrator's own
        //    candidate count, strict inequality.
        let ratio =
            review.summary.rejected_count as f64 / std::cmp::max(1, candidates.len()) as f64;
        if !candidates.is_empty() && ratio > RETRY_THRESHOLD {
            tracing::info!(ratio, "rejection ratio above threshold; regenerating once");

            let feedback = ReviewFeedback {
                instruction: "Regenerate/improve cards addressing QA feedback. Avoid duplicates; ensure traceability to spans.".to_string(),
                qa_summary: review.summary.clone(),
                examples_of_issues: review
                    .rejected
                    .into_iter()
                    .take(FEEDBACK_SAMPLE_LIMIT)
                    .collect(),
            };

            // Fresh candidate list; first-pass candidates are discarded.
            let mut improved: Vec<Card> = Vec::new();
            for segment in &segments {
                let batch = generator
                    .generate(segment, GenContext::Feedback(&feedback))
                    .await?;
                improved.extend(batch);
            }

            let second = reviewer
                .review(&improved, ReviewSource::CharLen(input_text.len()))
                .await?;
            // The retry's accepted set replaces the first pass wholesale,
            // whatever its own rejection ratio.
            accepted = second.accepted;
        }

        // Accepted-set invariant: normalized front text is unique. First
        // occurrence wins.
        let deduplicated = dedup_by_front(&mut accepted);
        if deduplicated > 0 {
            tracing::info!(deduplicated, "dropped duplicate accepted cards");
        }

        // 6. Content fingerprint; reuse the owner's identical source if any.
        let hash = content_hash(input_text);
        let source_id = match self.db.find_source(owner_id, &hash).await? {
            Some(id) => id,
            None => {
                let record = SourceRecord::new(
                    owner_id,
                    "Uploaded text",
                    input_text,
                    &hash,
                    serde_json::json!({ "language": language }),
                );
                self.db.insert_source(&record).await?;
                record.id
            }
        };

        // 7. Caller-supplied deck or a new one tied to the source.
        let deck_id = match deck_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let deck = DeckRecord::new(
                    owner_id,
                    format!("Generated Deck {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")),
                    &source_id,
                );
                self.db.create_deck(&deck).await?;
                deck.id
            }
        };

        // 8. One batch insert; all-or-nothing.
        let rows = accepted
            .iter()
            .map(|card| CardRow::from_accepted(card, owner_id, &deck_id, &source_id))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.db.insert_cards(&rows).await?;

        Ok(PipelineResult {
            deck_id,
            inserted_count: rows.len(),
            accepted_preview: accepted.into_iter().take(PREVIEW_LIMIT).collect(),
        })
    }
}

/// Deterministic fingerprint of the source text (hex SHA-256).
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Drop accepted cards whose normalized front duplicates an earlier one.
/// Returns how many were removed.
fn dedup_by_front(accepted: &mut Vec<AcceptedCard>) -> usize {
    let before = accepted.len();
    let mut seen = HashSet::new();
    accepted.retain(|card| seen.insert(normalize_front(&card.card.front)));
    before - accepted.len()
}
