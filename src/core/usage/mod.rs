//! Usage/Audit Logging
//!
//! Records every stage's input and output text with token counts. The sink
//! is a fire-and-forget side channel: records are write-only, never read
//! back by the pipeline, and a logging failure must never abort a run
//! (implementations log and continue).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Longest content stored per record; longer payloads are truncated.
pub const MAX_LOGGED_CONTENT: usize = 8000;

/// Role identifier of the stage that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    Segmenter,
    CardGenerator,
    QualityReviewer,
    ContentOutline,
}

impl StageRole {
    /// Numeric role id used in the audit log.
    pub fn role_id(&self) -> i64 {
        match self {
            StageRole::Segmenter => 6,
            StageRole::CardGenerator => 7,
            StageRole::QualityReviewer => 8,
            StageRole::ContentOutline => 9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageRole::Segmenter => "segmenter",
            StageRole::CardGenerator => "card_generator",
            StageRole::QualityReviewer => "quality_reviewer",
            StageRole::ContentOutline => "content_outline",
        }
    }
}

/// One side of a generation call (input or output), ready for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub owner_id: String,
    pub role: StageRole,
    pub content: String,
    pub token_count: u32,
}

impl UsageRecord {
    pub fn new(
        owner_id: impl Into<String>,
        role: StageRole,
        content: &str,
        token_count: u32,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            role,
            content: truncate(content, MAX_LOGGED_CONTENT),
            token_count,
        }
    }
}

/// Destination for usage records. Implementations must absorb their own
/// failures; callers never observe an error from `record`.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: UsageRecord);
}

/// Sink that drops every record. Useful for dry runs and tests.
pub struct NullSink;

#[async_trait]
impl UsageSink for NullSink {
    async fn record(&self, _record: UsageRecord) {}
}

fn truncate(content: &str, max: usize) -> String {
    if content.len() <= max {
        return content.to_string();
    }
    let mut end = max;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content[..end].to_string()
}
