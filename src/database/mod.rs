//! SQLite persistence layer.
//!
//! Owns the persisted side of a pipeline run: source records (deduplicated
//! by content hash per owner), decks, batch-inserted cards, and the
//! append-only usage log. The pipeline core treats this as an external
//! collaborator; a failed card batch rolls back as a whole.

mod migrations;
pub mod models;

pub use migrations::run_migrations;

use crate::core::usage::{UsageRecord, UsageSink};
use async_trait::async_trait;
use models::{CardRow, DeckRecord, SourceRecord, UsageRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the database under `data_dir` and apply migrations.
    pub async fn new(data_dir: &Path) -> Result<Self, sqlx::Error> {
        let db_path = data_dir.join("cardsmith.db");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            path: db_path,
        };

        migrations::run_migrations(&db.pool).await?;

        Ok(db)
    }

    /// Get the underlying pool for direct queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Source Operations
    // =========================================================================

    /// Id of the owner's source with this content hash, if one exists.
    pub async fn find_source(
        &self,
        owner_id: &str,
        hash: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id FROM flashcard_sources WHERE owner_id = ? AND hash = ? LIMIT 1",
        )
        .bind(owner_id)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("id")))
    }

    pub async fn insert_source(&self, source: &SourceRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO flashcard_sources (id, owner_id, title, text, hash, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.id)
        .bind(&source.owner_id)
        .bind(&source.title)
        .bind(&source.text)
        .bind(&source.hash)
        .bind(&source.metadata)
        .bind(&source.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Deck Operations
    // =========================================================================

    pub async fn create_deck(&self, deck: &DeckRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO flashcard_decks (id, owner_id, deck_name, source_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&deck.id)
        .bind(&deck.owner_id)
        .bind(&deck.deck_name)
        .bind(&deck.source_id)
        .bind(&deck.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Card Operations
    // =========================================================================

    /// Insert a card batch in one transaction. All-or-nothing.
    pub async fn insert_cards(&self, rows: &[CardRow]) -> Result<(), sqlx::Error> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO flashcards
                    (id, owner_id, deck_id, card_type, front, back, hint, tags,
                     difficulty, source_id, source_span, extras, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.owner_id)
            .bind(&row.deck_id)
            .bind(&row.card_type)
            .bind(&row.front)
            .bind(&row.back)
            .bind(&row.hint)
            .bind(&row.tags)
            .bind(row.difficulty)
            .bind(&row.source_id)
            .bind(&row.source_span)
            .bind(&row.extras)
            .bind(&row.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_cards(&self, deck_id: &str) -> Result<Vec<CardRow>, sqlx::Error> {
        sqlx::query_as::<_, CardRow>(
            "SELECT * FROM flashcards WHERE deck_id = ? ORDER BY created_at",
        )
        .bind(deck_id)
        .fetch_all(&self.pool)
        .await
    }

    // =========================================================================
    // Usage Log
    // =========================================================================

    pub async fn append_usage(&self, row: &UsageRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO usage_log (id, owner_id, role, content, token_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.owner_id)
        .bind(row.role)
        .bind(&row.content)
        .bind(row.token_count)
        .bind(&row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// The database is the production usage sink. Failures are logged and
/// swallowed: the audit channel never aborts a pipeline run.
#[async_trait]
impl UsageSink for Database {
    async fn record(&self, record: UsageRecord) {
        let row = UsageRow {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: record.owner_id,
            role: record.role.role_id(),
            content: record.content,
            token_count: record.token_count as i64,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.append_usage(&row).await {
            tracing::warn!(error = %e, "failed to append usage record");
        }
    }
}
