//! Client for the external document-parsing service.
//!
//! The service accepts an uploaded file (or a batch) and returns a manifest
//! of extracted artifacts per document. Responses arrive in one of two
//! framings: the manifest directly, or a `{statusCode, body}` envelope with
//! the manifest JSON-encoded in `body`. Artifact values are equally varied:
//! inline text, base64, gzip-then-base64, `data:` URIs, or remote URLs.
//! This client normalizes all of that down to a `String` of text.

use base64::Engine;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::io::Read;
use url::Url;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parsing service returned status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Manifest contains no documents")]
    NoDocuments,

    #[error("No accessible text artifact for document '{0}'")]
    NoAccessibleArtifact(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Failed to decode artifact: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;

// ============================================================================
// Client
// ============================================================================

pub struct DocfileClient {
    endpoint: String,
    /// Whether artifacts referenced by remote URL may be fetched.
    allow_remote_artifacts: bool,
    client: reqwest::Client,
}

impl DocfileClient {
    pub fn new(endpoint: impl Into<String>, allow_remote_artifacts: bool) -> Self {
        Self {
            endpoint: endpoint.into(),
            allow_remote_artifacts,
            client: reqwest::Client::new(),
        }
    }

    /// Submit one file and return its extracted text.
    pub async fn extract_file(&self, file_name: &str, content: &[u8]) -> Result<String> {
        let request = serde_json::json!({
            "file_name": file_name,
            "content_b64": base64::engine::general_purpose::STANDARD.encode(content),
        });
        let manifest = self.fetch_manifest(&request).await?;
        let documents = manifest_documents(&manifest)?;
        self.extract_text(&documents[0]).await
    }

    /// Submit a batch of files. Texts come back in manifest order.
    pub async fn extract_batch(&self, files: &[(String, Vec<u8>)]) -> Result<Vec<String>> {
        let request = serde_json::json!({
            "files": files
                .iter()
                .map(|(name, content)| serde_json::json!({
                    "file_name": name,
                    "content_b64": base64::engine::general_purpose::STANDARD.encode(content),
                }))
                .collect::<Vec<_>>(),
        });
        let manifest = self.fetch_manifest(&request).await?;
        let documents = manifest_documents(&manifest)?;

        let mut texts = Vec::with_capacity(documents.len());
        for document in &documents {
            texts.push(self.extract_text(document).await?);
        }
        Ok(texts)
    }

    /// One round trip to the parsing service, envelope unwrapped.
    async fn fetch_manifest(&self, request: &Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidManifest(e.to_string()))?;
        unwrap_envelope(payload)
    }

    /// Pull the text out of one manifest document. `markdown` wins over
    /// `text`; other artifact kinds are ignored.
    async fn extract_text(&self, document: &Value) -> Result<String> {
        let name = document
            .get("input_name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>");

        let artifacts = document
            .get("artifacts")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ExtractionError::InvalidManifest(format!("document '{name}' has no artifacts"))
            })?;

        for kind in ["markdown", "text"] {
            let Some(value) = artifacts.get(kind).and_then(Value::as_str) else {
                continue;
            };
            match self.read_artifact(value).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(artifact = kind, document = name, error = %e,
                        "artifact present but not readable");
                }
            }
        }

        Err(ExtractionError::NoAccessibleArtifact(name.to_string()))
    }

    /// Normalize one artifact value to text, whatever its encoding.
    async fn read_artifact(&self, value: &str) -> Result<String> {
        if let Some(rest) = value.strip_prefix("data:") {
            return decode_data_uri(rest);
        }

        if value.starts_with("http://") || value.starts_with("https://") || value.starts_with("s3://")
        {
            if !self.allow_remote_artifacts {
                return Err(ExtractionError::Decode(
                    "remote artifact URLs are disabled".to_string(),
                ));
            }
            return self.fetch_remote(value).await;
        }

        Ok(decode_inline(value))
    }

    async fn fetch_remote(&self, location: &str) -> Result<String> {
        let url = if let Some(rest) = location.strip_prefix("s3://") {
            let (bucket, key) = rest.split_once('/').ok_or_else(|| {
                ExtractionError::Decode(format!("malformed object-storage URL: {location}"))
            })?;
            format!("https://{bucket}.s3.amazonaws.com/{key}")
        } else {
            location.to_string()
        };

        Url::parse(&url).map_err(|e| ExtractionError::Decode(e.to_string()))?;

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Service {
                status: status.as_u16(),
                message: format!("fetching remote artifact {url}"),
            });
        }
        let bytes = response.bytes().await?;
        decode_bytes(&bytes)
    }
}

// ============================================================================
// Decoding Helpers
// ============================================================================

/// Some deployments wrap the manifest in a `{statusCode, body}` envelope
/// with the body JSON-encoded as a string.
fn unwrap_envelope(payload: Value) -> Result<Value> {
    let Some(status) = payload.get("statusCode").and_then(Value::as_u64) else {
        return Ok(payload);
    };
    if !(200..300).contains(&status) {
        let message = payload
            .get("body")
            .map(|b| b.to_string())
            .unwrap_or_default();
        return Err(ExtractionError::Service {
            status: status as u16,
            message,
        });
    }
    match payload.get("body") {
        Some(Value::String(body)) => serde_json::from_str(body)
            .map_err(|e| ExtractionError::InvalidManifest(format!("envelope body: {e}"))),
        Some(body) => Ok(body.clone()),
        None => Err(ExtractionError::InvalidManifest(
            "envelope has no body".to_string(),
        )),
    }
}

fn manifest_documents(manifest: &Value) -> Result<Vec<Value>> {
    let documents = manifest
        .get("documents")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractionError::InvalidManifest("missing 'documents' array".to_string()))?;
    if documents.is_empty() {
        return Err(ExtractionError::NoDocuments);
    }
    Ok(documents.clone())
}

fn decode_data_uri(rest: &str) -> Result<String> {
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| ExtractionError::Decode("malformed data URI".to_string()))?;
    if header.ends_with(";base64") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| ExtractionError::Decode(format!("data URI base64: {e}")))?;
        decode_bytes(&bytes)
    } else {
        Ok(data.to_string())
    }
}

/// Inline artifact value: strict base64 (possibly gzip inside) or already
/// plain text. Valid base64 that decodes to non-UTF-8 garbage falls back to
/// treating the original value as plain text.
fn decode_inline(value: &str) -> String {
    let trimmed = value.trim();
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(trimmed) {
        if let Ok(text) = decode_bytes(&bytes) {
            return text;
        }
    }
    value.to_string()
}

/// Raw artifact bytes to text, gunzipping when the magic number says so.
fn decode_bytes(bytes: &[u8]) -> Result<String> {
    if bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|e| ExtractionError::Decode(format!("gzip: {e}")))?;
        return Ok(out);
    }
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ExtractionError::Decode("artifact is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_inline_plain_text() {
        assert_eq!(decode_inline("Hello, world."), "Hello, world.");
    }

    #[test]
    fn test_decode_inline_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("cell biology notes");
        assert_eq!(decode_inline(&encoded), "cell biology notes");
    }

    #[test]
    fn test_decode_inline_gzip_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(gzip("compressed notes"));
        assert_eq!(decode_inline(&encoded), "compressed notes");
    }

    #[test]
    fn test_decode_inline_ambiguous_word_stays_text() {
        // "cafe" is valid base64 but decodes to non-UTF-8 bytes.
        assert_eq!(decode_inline("cafe"), "cafe");
    }

    #[test]
    fn test_decode_data_uri_plain() {
        assert_eq!(
            decode_data_uri("text/plain,hello").unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_decode_data_uri_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("uri body");
        assert_eq!(
            decode_data_uri(&format!("text/plain;base64,{encoded}")).unwrap(),
            "uri body"
        );
    }

    #[test]
    fn test_unwrap_envelope_passthrough() {
        let manifest = serde_json::json!({"documents": []});
        assert_eq!(unwrap_envelope(manifest.clone()).unwrap(), manifest);
    }

    #[test]
    fn test_unwrap_envelope_string_body() {
        let payload = serde_json::json!({
            "statusCode": 200,
            "body": "{\"documents\": [{\"input_name\": \"a.pdf\"}]}",
        });
        let manifest = unwrap_envelope(payload).unwrap();
        assert_eq!(manifest["documents"][0]["input_name"], "a.pdf");
    }

    #[test]
    fn test_unwrap_envelope_error_status() {
        let payload = serde_json::json!({"statusCode": 500, "body": "boom"});
        assert!(matches!(
            unwrap_envelope(payload),
            Err(ExtractionError::Service { status: 500, .. })
        ));
    }

    #[test]
    fn test_empty_documents_is_distinct_error() {
        let manifest = serde_json::json!({"documents": []});
        assert!(matches!(
            manifest_documents(&manifest),
            Err(ExtractionError::NoDocuments)
        ));
        let manifest = serde_json::json!({"results": []});
        assert!(matches!(
            manifest_documents(&manifest),
            Err(ExtractionError::InvalidManifest(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_artifact_disabled_by_default() {
        let client = DocfileClient::new("http://localhost:1", false);
        let err = client
            .read_artifact("https://example.com/artifact.md")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Decode(_)));
    }
}
