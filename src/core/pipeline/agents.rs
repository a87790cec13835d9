//! Stage agents.
//!
//! All four agents share one template: a fixed instruction string plus a
//! caller-provided input, invoked non-streaming against the generation
//! backend, with input and output text logged separately to the usage sink
//! under the stage's role id. Structured output is recovered via
//! `core::extract`; a parse failure is never an error at this level, the
//! raw text is handed back instead and each caller applies its documented
//! fallback.
//!
//! Collaborators are constructor parameters. Nothing is attached after
//! construction.

use crate::core::extract::extract_or_repair;
use crate::core::llm::{GenerationBackend, Result, StageRequest};
use crate::core::pipeline::prompts;
use crate::core::pipeline::types::{
    Card, CardsPayload, QaSummary, RejectedItem, ReviewPayload, Segment, SegmentsPayload, Span,
};
use crate::core::usage::{StageRole, UsageRecord, UsageSink};
use serde_json::Value;
use std::sync::Arc;

// ============================================================================
// Shared Agent Template
// ============================================================================

/// Result of one agent call: parsed JSON when the output held any, otherwise
/// the raw text.
#[derive(Debug, Clone)]
pub enum StageOutput {
    Json(Value),
    Text(String),
}

/// One stage: fixed instructions + role id + injected collaborators.
pub struct StageAgent {
    role: StageRole,
    instructions: &'static str,
    backend: Arc<dyn GenerationBackend>,
    sink: Arc<dyn UsageSink>,
    owner_id: String,
}

impl StageAgent {
    pub fn new(
        role: StageRole,
        instructions: &'static str,
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn UsageSink>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            role,
            instructions,
            backend,
            sink,
            owner_id: owner_id.into(),
        }
    }

    /// One backend round trip. Backend errors propagate; parse failures do
    /// not. Input and output are logged as separate usage records carrying
    /// the backend-reported token counts for their side of the call.
    pub async fn call(&self, input: String) -> Result<StageOutput> {
        let request = StageRequest::new(self.instructions, input.clone());
        let response = self.backend.invoke(request).await?;

        self.sink
            .record(UsageRecord::new(
                &self.owner_id,
                self.role,
                &input,
                response.usage.input_tokens,
            ))
            .await;
        self.sink
            .record(UsageRecord::new(
                &self.owner_id,
                self.role,
                &response.text,
                response.usage.output_tokens,
            ))
            .await;

        match extract_or_repair(&response.text) {
            Some(value) => Ok(StageOutput::Json(value)),
            None => Ok(StageOutput::Text(response.text)),
        }
    }
}

// ============================================================================
// Segmenter
// ============================================================================

pub struct Segmenter {
    agent: StageAgent,
}

impl Segmenter {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn UsageSink>,
        owner_id: &str,
    ) -> Self {
        Self {
            agent: StageAgent::new(
                StageRole::Segmenter,
                prompts::SEGMENTER_INSTRUCTIONS,
                backend,
                sink,
                owner_id,
            ),
        }
    }

    /// Segment the document. `None` means the output was unusable (prose,
    /// schema mismatch, or invariant violation) and the orchestrator must
    /// substitute the whole-document fallback segment.
    pub async fn segment(&self, text: &str) -> Result<Option<SegmentsPayload>> {
        let output = self.agent.call(text.to_string()).await?;
        let StageOutput::Json(value) = output else {
            return Ok(None);
        };
        match serde_json::from_value::<SegmentsPayload>(value) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                tracing::debug!(error = %e, "segmenter payload failed validation");
                Ok(None)
            }
        }
    }
}

// ============================================================================
// Content-Outline Agent
// ============================================================================

pub struct OutlineAgent {
    agent: StageAgent,
}

impl OutlineAgent {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn UsageSink>,
        owner_id: &str,
    ) -> Self {
        Self {
            agent: StageAgent::new(
                StageRole::ContentOutline,
                prompts::CONTENT_OUTLINE_INSTRUCTIONS,
                backend,
                sink,
                owner_id,
            ),
        }
    }

    /// Produce the content outline. No JSON contract: a JSON result is
    /// re-serialized and used as text.
    pub async fn outline(&self, text: &str) -> Result<String> {
        match self.agent.call(text.to_string()).await? {
            StageOutput::Text(text) => Ok(text),
            StageOutput::Json(value) => Ok(value.to_string()),
        }
    }
}

// ============================================================================
// Card-Generator
// ============================================================================

/// Reviewer feedback handed to the generator on the single retry pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewFeedback {
    pub instruction: String,
    pub qa_summary: QaSummary,
    pub examples_of_issues: Vec<RejectedItem>,
}

/// Context for one generation call: the outline on the first pass, reviewer
/// feedback on the retry pass.
pub enum GenContext<'a> {
    Outline(&'a str),
    Feedback(&'a ReviewFeedback),
}

pub struct CardGenerator {
    agent: StageAgent,
}

impl CardGenerator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn UsageSink>,
        owner_id: &str,
    ) -> Self {
        Self {
            agent: StageAgent::new(
                StageRole::CardGenerator,
                prompts::CARD_GENERATOR_INSTRUCTIONS,
                backend,
                sink,
                owner_id,
            ),
        }
    }

    /// Generate candidate cards for one segment. Unparseable output, or a
    /// batch holding any malformed card (empty front/back, difficulty out
    /// of 1..=5, ragged table rows), yields an empty batch, not an error.
    /// Returned spans are rebased to absolute
    /// document coordinates where they only fit as segment-relative.
    pub async fn generate(
        &self,
        segment: &Segment,
        context: GenContext<'_>,
    ) -> Result<Vec<Card>> {
        let message = match context {
            GenContext::Outline(outline) => serde_json::json!({
                "segment_index": segment.index,
                "segment_span": segment.span,
                "text": segment.text,
                "content_instructions": outline,
            }),
            GenContext::Feedback(feedback) => serde_json::json!({
                "segment_index": segment.index,
                "segment_span": segment.span,
                "text": segment.text,
                "feedback": feedback,
            }),
        };

        let output = self.agent.call(message.to_string()).await?;
        let StageOutput::Json(value) = output else {
            return Ok(Vec::new());
        };
        let Ok(payload) = serde_json::from_value::<CardsPayload>(value) else {
            tracing::debug!(segment = segment.index, "generator payload failed validation");
            return Ok(Vec::new());
        };
        let Some(mut cards) = payload.validated() else {
            tracing::debug!(segment = segment.index, "generator batch holds malformed cards");
            return Ok(Vec::new());
        };
        for card in &mut cards {
            card.source_span = rebase_span(card.source_span, &segment.span);
        }
        Ok(cards)
    }
}

/// Interpret a generated span in absolute document coordinates. A span that
/// already lies inside the segment passes through; one that only fits when
/// read as segment-relative is shifted by the segment start. Anything else
/// is left untouched — contract inconsistencies belong to the upstream
/// agent, not to us.
fn rebase_span(span: Span, segment: &Span) -> Span {
    if segment.contains(&span) {
        return span;
    }
    let shifted = Span::new(segment.start + span.start, segment.start + span.end);
    if segment.contains(&shifted) {
        return shifted;
    }
    span
}

// ============================================================================
// Quality-Reviewer
// ============================================================================

/// Source context sent with a review: the full text on the first pass, the
/// character length on the re-review pass.
pub enum ReviewSource<'a> {
    FullText(&'a str),
    CharLen(usize),
}

pub struct QualityReviewer {
    agent: StageAgent,
}

impl QualityReviewer {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn UsageSink>,
        owner_id: &str,
    ) -> Self {
        Self {
            agent: StageAgent::new(
                StageRole::QualityReviewer,
                prompts::QUALITY_REVIEWER_INSTRUCTIONS,
                backend,
                sink,
                owner_id,
            ),
        }
    }

    /// Review the pooled candidate set. Output the pipeline cannot parse
    /// counts as "zero accepted, zero rejected" for the pass — non-fatal.
    pub async fn review(
        &self,
        cards: &[Card],
        source: ReviewSource<'_>,
    ) -> Result<ReviewPayload> {
        let message = match source {
            ReviewSource::FullText(text) => serde_json::json!({
                "source_text": text,
                "cards": cards,
            }),
            ReviewSource::CharLen(len) => serde_json::json!({
                "source_char_len": len,
                "cards": cards,
            }),
        };

        let output = self.agent.call(message.to_string()).await?;
        let StageOutput::Json(value) = output else {
            return Ok(ReviewPayload::default());
        };
        match serde_json::from_value::<ReviewPayload>(value) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                tracing::debug!(error = %e, "reviewer payload failed validation");
                Ok(ReviewPayload::default())
            }
        }
    }
}
