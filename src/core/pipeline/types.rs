//! Typed stage payloads.
//!
//! Every payload that crosses an agent boundary is validated into one of
//! these shapes where it is first produced; a failed validation degrades to
//! the stage's documented fallback instead of letting a malformed object
//! flow deeper into the pipeline.

use serde::{Deserialize, Serialize};

// ============================================================================
// Segments
// ============================================================================

/// Half-open byte range into the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.start < other.end && other.end <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeadingLevel {
    H1,
    H2,
    H3,
    H4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Section,
    Paragraph,
    List,
    Example,
    Quote,
    Code,
    Math,
    Figure,
    Table,
    Caption,
    Footnote,
    Reference,
    Glossary,
    Appendix,
}

/// A bounded, offset-addressable slice of the source document; the unit of
/// card generation. Immutable once produced, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub heading_level: Option<HeadingLevel>,
    pub language: String,
    pub span: Span,
    pub text: String,
    #[serde(default)]
    pub kind: Option<SegmentKind>,
    #[serde(default)]
    pub section_path: Option<Vec<String>>,
}

impl Segment {
    /// Synthetic segment covering the whole document. Substituted when the
    /// Segmenter produces nothing usable.
    pub fn whole(text: &str) -> Self {
        Self {
            index: 0,
            title: None,
            heading_level: None,
            language: "und".to_string(),
            span: Span::new(0, text.len()),
            text: text.to_string(),
            kind: None,
            section_path: None,
        }
    }
}

/// Document-level stats reported by the Segmenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocStats {
    pub char_length: usize,
    pub language: String,
}

/// Segmenter output: ordered segments plus document stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentsPayload {
    pub doc_stats: DocStats,
    pub segments: Vec<Segment>,
}

impl SegmentsPayload {
    /// Validate against the source document and return the segments with
    /// `text` re-sliced from `source` so it is the exact substring at `span`.
    ///
    /// Requirements: at least one segment, strictly increasing indexes,
    /// valid in-bounds spans that are disjoint and non-decreasing, and span
    /// boundaries that fall on character boundaries. Any violation yields
    /// `None` and the caller substitutes the whole-document fallback.
    pub fn validated(mut self, source: &str) -> Option<Vec<Segment>> {
        if self.segments.is_empty() {
            return None;
        }

        let mut prev_index: Option<usize> = None;
        let mut prev_end = 0usize;
        for segment in &mut self.segments {
            if let Some(prev) = prev_index {
                if segment.index <= prev {
                    return None;
                }
            }
            prev_index = Some(segment.index);

            let span = segment.span;
            if !span.is_valid() || span.start < prev_end || span.end > source.len() {
                return None;
            }
            prev_end = span.end;

            segment.text = source.get(span.start..span.end)?.to_string();
        }

        Some(self.segments)
    }
}

// ============================================================================
// Cards
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Basic,
    Table,
    Process,
    ConceptCheck,
    Cloze,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Basic => "basic",
            CardType::Table => "table",
            CardType::Process => "process",
            CardType::ConceptCheck => "concept_check",
            CardType::Cloze => "cloze",
        }
    }
}

impl Default for CardType {
    fn default() -> Self {
        CardType::Basic
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    /// Every row must match the column count.
    pub fn rows_consistent(&self) -> bool {
        self.rows.iter().all(|row| row.len() == self.columns.len())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub audio_text: Option<String>,
    #[serde(default)]
    pub image_caption: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extras {
    #[serde(default)]
    pub table_data: Option<TableData>,
    #[serde(default)]
    pub process_steps: Option<Vec<String>>,
    #[serde(default)]
    pub media: Option<Media>,
}

/// A flashcard. `source_span` is expressed in absolute document coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    #[serde(rename = "type", default)]
    pub card_type: CardType,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source_span: Span,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub extras: Extras,
}

fn default_difficulty() -> u8 {
    2
}

impl Card {
    /// Structural constraints on a candidate card: non-empty front and
    /// back, difficulty in 1..=5, and table rows matching the column count.
    pub fn is_well_formed(&self) -> bool {
        !self.front.trim().is_empty()
            && !self.back.trim().is_empty()
            && (1..=5).contains(&self.difficulty)
            && self
                .extras
                .table_data
                .as_ref()
                .map_or(true, TableData::rows_consistent)
    }
}

/// Card-Generator output for one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardsPayload {
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub segment_index: usize,
    #[serde(default)]
    pub batch_index: usize,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub estimated_total_for_segment: usize,
}

impl CardsPayload {
    /// Validate the batch. One malformed card rejects the whole payload and
    /// the caller substitutes its empty-batch fallback.
    pub fn validated(self) -> Option<Vec<Card>> {
        if self.cards.iter().all(Card::is_well_formed) {
            Some(self.cards)
        } else {
            None
        }
    }
}

// ============================================================================
// Review
// ============================================================================

/// Per-card checks attached by the reviewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaChecks {
    #[serde(default)]
    pub traceability_ok: bool,
    #[serde(default)]
    pub factual_ok: bool,
    #[serde(default)]
    pub edits: Vec<String>,
}

/// A candidate the reviewer accepted, with its review metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedCard {
    #[serde(flatten)]
    pub card: Card,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub qa: Option<QaChecks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Schema,
    Span,
    Traceability,
    Factual,
    Language,
    Pedagogy,
    Content,
    Duplicate,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedItem {
    pub original: Card,
    pub reason: RejectReason,
    pub details: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Review tallies. Recomputed wholesale on every pass, never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaSummary {
    #[serde(default)]
    pub input_count: usize,
    #[serde(default)]
    pub accepted_count: usize,
    #[serde(default)]
    pub rejected_count: usize,
    #[serde(default)]
    pub deduplicated: usize,
}

/// Quality-Reviewer output over the pooled candidate set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewPayload {
    #[serde(default)]
    pub summary: QaSummary,
    #[serde(default)]
    pub accepted: Vec<AcceptedCard>,
    #[serde(default)]
    pub rejected: Vec<RejectedItem>,
}

// ============================================================================
// Pipeline Result
// ============================================================================

/// The only artifact returned to the caller; constructed once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub deck_id: String,
    pub inserted_count: usize,
    /// First 10 accepted cards, for display.
    pub accepted_preview: Vec<AcceptedCard>,
}

// ============================================================================
// Dedup Normalization
// ============================================================================

/// Dedup key for accepted cards: lowercased front text with punctuation
/// stripped and whitespace collapsed.
pub fn normalize_front(front: &str) -> String {
    let mut out = String::with_capacity(front.len());
    let mut last_was_space = true;
    for ch in front.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segment(index: usize, start: usize, end: usize) -> Segment {
        Segment {
            index,
            title: None,
            heading_level: None,
            language: "en".to_string(),
            span: Span::new(start, end),
            text: String::new(),
            kind: None,
            section_path: None,
        }
    }

    fn payload(segments: Vec<Segment>) -> SegmentsPayload {
        SegmentsPayload {
            doc_stats: DocStats {
                char_length: 0,
                language: "en".to_string(),
            },
            segments,
        }
    }

    #[test]
    fn test_validated_reslices_text_from_source() {
        let source = "alpha beta gamma";
        let segments = payload(vec![segment(0, 0, 5), segment(1, 6, 16)])
            .validated(source)
            .expect("valid");
        assert_eq!(segments[0].text, "alpha");
        assert_eq!(segments[1].text, "beta gamma");
    }

    #[test]
    fn test_validated_rejects_empty_and_overlap_and_bounds() {
        let source = "0123456789";
        assert!(payload(vec![]).validated(source).is_none());
        // Overlapping spans.
        assert!(payload(vec![segment(0, 0, 5), segment(1, 3, 8)])
            .validated(source)
            .is_none());
        // Span past the end of the document.
        assert!(payload(vec![segment(0, 0, 11)]).validated(source).is_none());
        // Inverted span.
        assert!(payload(vec![segment(0, 5, 5)]).validated(source).is_none());
        // Non-increasing indexes.
        assert!(payload(vec![segment(1, 0, 2), segment(1, 3, 5)])
            .validated(source)
            .is_none());
    }

    #[test]
    fn test_validated_rejects_non_char_boundary() {
        let source = "héllo";
        // Byte 2 falls inside the two-byte 'é'.
        assert!(payload(vec![segment(0, 0, 2)]).validated(source).is_none());
    }

    #[test]
    fn test_whole_segment_covers_input() {
        let text = "The mitochondria is the powerhouse of the cell.";
        let seg = Segment::whole(text);
        assert_eq!(seg.index, 0);
        assert_eq!(seg.span, Span::new(0, text.len()));
        assert_eq!(seg.text, text);
        assert_eq!(seg.language, "und");
    }

    #[test]
    fn test_card_deserializes_with_defaults() {
        let card: Card = serde_json::from_value(json!({
            "type": "concept_check",
            "front": "Q",
            "back": "A",
            "source_span": {"start": 0, "end": 4},
        }))
        .expect("deserializes");
        assert_eq!(card.card_type, CardType::ConceptCheck);
        assert_eq!(card.difficulty, 2);
        assert!(card.tags.is_empty());
        assert!(card.extras.table_data.is_none());
    }

    #[test]
    fn test_card_well_formedness() {
        let card = |front: &str, back: &str, difficulty: u8, table: Option<TableData>| Card {
            card_type: CardType::Basic,
            front: front.to_string(),
            back: back.to_string(),
            hint: None,
            tags: vec![],
            source_span: Span::new(0, 4),
            difficulty,
            extras: Extras {
                table_data: table,
                ..Extras::default()
            },
        };

        assert!(card("Q", "A", 1, None).is_well_formed());
        assert!(card("Q", "A", 5, None).is_well_formed());
        assert!(!card("", "A", 2, None).is_well_formed());
        assert!(!card("   ", "A", 2, None).is_well_formed());
        assert!(!card("Q", "", 2, None).is_well_formed());
        assert!(!card("Q", "A", 0, None).is_well_formed());
        assert!(!card("Q", "A", 6, None).is_well_formed());

        let ragged = TableData {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec!["1".into()]],
        };
        assert!(!card("Q", "A", 2, Some(ragged)).is_well_formed());
    }

    #[test]
    fn test_cards_payload_rejects_batch_with_malformed_card() {
        let payload: CardsPayload = serde_json::from_value(json!({
            "cards": [
                {"front": "fine", "back": "ok", "source_span": {"start": 0, "end": 4}},
                {"front": "bad", "back": "ok", "source_span": {"start": 0, "end": 4},
                 "difficulty": 99},
            ],
        }))
        .expect("deserializes");
        assert!(payload.validated().is_none());

        let payload: CardsPayload = serde_json::from_value(json!({
            "cards": [
                {"front": "fine", "back": "ok", "source_span": {"start": 0, "end": 4}},
            ],
        }))
        .expect("deserializes");
        assert_eq!(payload.validated().expect("valid").len(), 1);
    }

    #[test]
    fn test_review_payload_tolerates_missing_fields() {
        let review: ReviewPayload = serde_json::from_value(json!({
            "summary": {"rejected_count": 3},
        }))
        .expect("deserializes");
        assert_eq!(review.summary.rejected_count, 3);
        assert!(review.accepted.is_empty());
        assert!(review.rejected.is_empty());
    }

    #[test]
    fn test_table_rows_consistent() {
        let ok = TableData {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec!["1".into(), "2".into()]],
        };
        assert!(ok.rows_consistent());
        let bad = TableData {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec!["1".into()]],
        };
        assert!(!bad.rows_consistent());
    }

    #[test]
    fn test_normalize_front() {
        assert_eq!(
            normalize_front("What is the Powerhouse?!"),
            "what is the powerhouse"
        );
        assert_eq!(
            normalize_front("  What   is... the POWERHOUSE "),
            "what is the powerhouse"
        );
        assert_ne!(normalize_front("cell walls"), normalize_front("cell wall"));
    }

    #[test]
    fn test_span_contains() {
        let outer = Span::new(10, 50);
        assert!(outer.contains(&Span::new(10, 50)));
        assert!(outer.contains(&Span::new(20, 30)));
        assert!(!outer.contains(&Span::new(5, 30)));
        assert!(!outer.contains(&Span::new(20, 51)));
        assert!(!outer.contains(&Span::new(20, 20)));
    }
}
