//! Database row types.

use crate::core::pipeline::types::AcceptedCard;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted source document, keyed logically by `(owner_id, hash)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SourceRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub text: String,
    pub hash: String,
    /// JSON object (language, provenance, ...).
    pub metadata: String,
    pub created_at: String,
}

impl SourceRecord {
    pub fn new(
        owner_id: &str,
        title: &str,
        text: &str,
        hash: &str,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            hash: hash.to_string(),
            metadata: metadata.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A flashcard deck tied to one source.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeckRecord {
    pub id: String,
    pub owner_id: String,
    pub deck_name: String,
    pub source_id: String,
    pub created_at: String,
}

impl DeckRecord {
    pub fn new(owner_id: &str, deck_name: String, source_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            deck_name,
            source_id: source_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A persisted flashcard row. `tags`, `source_span` and `extras` are stored
/// as JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardRow {
    pub id: String,
    pub owner_id: String,
    pub deck_id: String,
    pub card_type: String,
    pub front: String,
    pub back: String,
    pub hint: Option<String>,
    pub tags: String,
    pub difficulty: i64,
    pub source_id: String,
    pub source_span: String,
    pub extras: String,
    pub created_at: String,
}

impl CardRow {
    pub fn from_accepted(
        accepted: &AcceptedCard,
        owner_id: &str,
        deck_id: &str,
        source_id: &str,
    ) -> Result<Self, serde_json::Error> {
        let card = &accepted.card;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            deck_id: deck_id.to_string(),
            card_type: card.card_type.as_str().to_string(),
            front: card.front.clone(),
            back: card.back.clone(),
            hint: card.hint.clone(),
            tags: serde_json::to_string(&card.tags)?,
            difficulty: card.difficulty as i64,
            source_id: source_id.to_string(),
            source_span: serde_json::to_string(&card.source_span)?,
            extras: serde_json::to_string(&card.extras)?,
            created_at: Utc::now().to_rfc3339(),
        })
    }
}

/// One append-only audit-log row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRow {
    pub id: String,
    pub owner_id: String,
    pub role: i64,
    pub content: String,
    pub token_count: i64,
    pub created_at: String,
}
