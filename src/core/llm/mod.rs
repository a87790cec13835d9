//! Generation backend abstraction.
//!
//! A `GenerationBackend` wraps a single request/response round trip to a
//! text-generation service: fixed instruction text plus free-form input,
//! returning decoded text and usage counters. Backends do not retry; any
//! transport or API error propagates unmodified to the caller.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiResponsesClient;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from a generation backend call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LlmError>;

// ============================================================================
// Request / Response Types
// ============================================================================

/// Token usage reported by the backend. Zero when the backend omits usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A single stage invocation: fixed instructions plus free-form input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRequest {
    /// Role/system text for the stage.
    pub instructions: String,
    /// Free-form input text.
    pub input: String,
    /// Request incremental delta events instead of a batched response.
    pub stream: bool,
}

impl StageRequest {
    pub fn new(instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            input: input.into(),
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Decoded backend response. For streaming requests `text` is the
/// concatenation of all deltas in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResponse {
    pub text: String,
    pub usage: TokenUsage,
}

// ============================================================================
// Backend Trait
// ============================================================================

/// A text-generation backend. Implementations perform exactly one network
/// call per `invoke` and never retry on their own.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Unique backend identifier.
    fn id(&self) -> &str;

    /// Model the backend sends requests to.
    fn model(&self) -> &str;

    /// Perform one generation round trip.
    async fn invoke(&self, request: StageRequest) -> Result<StageResponse>;
}
