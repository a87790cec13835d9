//! OpenAI Responses API backend.
//!
//! Speaks the `/v1/responses` shape: `{model, instructions, input, stream}`.
//! Batched responses expose `output_text` (or an `output` item list whose
//! text parts are concatenated); streaming responses arrive as SSE
//! `response.output_text.delta` events whose deltas are concatenated in
//! arrival order, with usage carried on the final `response.completed` event.

use crate::core::llm::{
    GenerationBackend, LlmError, Result, StageRequest, StageResponse, TokenUsage,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for an OpenAI-compatible Responses endpoint.
pub struct OpenAiResponsesClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl OpenAiResponsesClient {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        }
    }

    fn build_body(&self, request: &StageRequest) -> Value {
        serde_json::json!({
            "model": self.model,
            "instructions": request.instructions,
            "input": request.input,
            "stream": request.stream,
        })
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/responses", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::Auth("Invalid API key".to_string()));
        }

        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp)
    }

    async fn invoke_batched(&self, request: &StageRequest) -> Result<StageResponse> {
        let body = self.build_body(request);
        let resp = self.send(&body).await?;
        let json: Value = resp.json().await?;

        // Empty or unexpected shapes degrade to empty text; downstream
        // stages treat that as an unparseable result.
        let text = output_text(&json).unwrap_or_default();
        let usage = parse_usage(&json["usage"]);

        Ok(StageResponse { text, usage })
    }

    async fn invoke_streaming(&self, request: &StageRequest) -> Result<StageResponse> {
        let body = self.build_body(request);
        let resp = self.send(&body).await?;

        let mut stream = resp.bytes_stream();
        let mut buffer = String::new();
        let mut text = String::new();
        let mut usage = TokenUsage::default();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // SSE events may be split across network chunks; only complete
            // lines are consumed from the buffer.
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    continue;
                }
                let Ok(event) = serde_json::from_str::<Value>(data) else {
                    continue;
                };

                match event["type"].as_str().unwrap_or("") {
                    "response.output_text.delta" => {
                        if let Some(delta) = event["delta"].as_str() {
                            text.push_str(delta);
                        }
                    }
                    "response.completed" => {
                        usage = parse_usage(&event["response"]["usage"]);
                    }
                    _ => {}
                }
            }
        }

        Ok(StageResponse { text, usage })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiResponsesClient {
    fn id(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, request: StageRequest) -> Result<StageResponse> {
        if request.stream {
            self.invoke_streaming(&request).await
        } else {
            self.invoke_batched(&request).await
        }
    }
}

/// Pull the response text out of a batched Responses payload.
fn output_text(json: &Value) -> Option<String> {
    if let Some(text) = json["output_text"].as_str() {
        return Some(text.trim().to_string());
    }

    let items = json["output"].as_array()?;
    let mut parts: Vec<&str> = Vec::new();
    for item in items {
        if let Some(content) = item["content"].as_array() {
            for part in content {
                if matches!(part["type"].as_str(), Some("output_text") | Some("text")) {
                    if let Some(text) = part["text"].as_str() {
                        parts.push(text);
                    }
                }
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n").trim().to_string())
    }
}

fn parse_usage(usage: &Value) -> TokenUsage {
    TokenUsage {
        input_tokens: usage["input_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: usage["output_tokens"].as_u64().unwrap_or(0) as u32,
    }
}
