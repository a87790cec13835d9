//! Structured-Output Extraction
//!
//! Recovers JSON objects from raw generation output, tolerating fenced code
//! blocks, surrounding prose, and common formatting defects. Extraction never
//! errors; callers treat `None` as "the output is plain prose" and fall back
//! per stage.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

/// Extract a JSON value from possibly-messy generation output.
///
/// Strategies, in order:
/// 1. the first fenced block explicitly tagged ```` ```json ````,
/// 2. the first fenced code block of any kind,
/// 3. the entire text as raw JSON.
///
/// The first successful parse wins; only the first matching block is tried
/// per strategy. Returns `None` when all three fail.
pub fn extract_json(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }

    if let Some(block) = fenced_block(text, "```json") {
        if let Ok(value) = serde_json::from_str(block) {
            return Some(value);
        }
    }

    if let Some(block) = fenced_block(text, "```") {
        if let Ok(value) = serde_json::from_str(block) {
            return Some(value);
        }
    }

    serde_json::from_str(text.trim()).ok()
}

/// Best-effort syntactic repair of almost-JSON text. No model call involved.
///
/// Normalizes smart quotes to straight quotes, strips byte-order marks, and
/// removes trailing commas before closing brackets/braces. Returns the
/// repaired string only if it now parses as JSON; semantic problems are out
/// of scope.
pub fn repair_json(text: &str) -> Option<String> {
    let repaired = text
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
        .replace('\u{2019}', "'")
        .replace('\u{feff}', "");
    let repaired = TRAILING_COMMA_RE.replace_all(&repaired, "$1").into_owned();

    serde_json::from_str::<Value>(&repaired).ok()?;
    Some(repaired)
}

/// Extract + repair in one step: try `extract_json` directly, then retry it
/// on the repaired text.
pub fn extract_or_repair(text: &str) -> Option<Value> {
    if let Some(value) = extract_json(text) {
        return Some(value);
    }
    let fixed = repair_json(text)?;
    extract_json(&fixed)
}

/// Content of the first fenced block opened by `fence`, if any.
fn fenced_block<'a>(text: &'a str, fence: &str) -> Option<&'a str> {
    let start = text.find(fence)? + fence.len();
    let end = text[start..].find("```")?;
    Some(text[start..start + end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_from_json_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(text), Some(json!({"a": 1})));
    }

    #[test]
    fn test_extract_from_plain_fence() {
        let text = "```\n{\"cards\": []}\n```";
        assert_eq!(extract_json(text), Some(json!({"cards": []})));
    }

    #[test]
    fn test_extract_whole_text() {
        let text = "  {\"x\": [1, 2, 3]}  ";
        assert_eq!(extract_json(text), Some(json!({"x": [1, 2, 3]})));
    }

    #[test]
    fn test_extract_only_first_block_per_strategy() {
        // First fenced block is broken; the second valid one is NOT tried.
        let text = "```json\n{broken\n```\nand then\n```json\n{\"ok\": true}\n```";
        // Strategy (b) finds the same first block, strategy (c) fails too.
        assert_eq!(extract_json(text), None);
    }

    #[test]
    fn test_extract_prose_returns_none() {
        assert_eq!(extract_json("The mitochondria is the powerhouse."), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_round_trip() {
        let payload = json!({
            "summary": {"input_count": 3, "accepted_count": 2},
            "accepted": [{"front": "Q", "back": "A"}],
        });
        let serialized = serde_json::to_string(&payload).expect("serialize");
        assert_eq!(extract_json(&serialized), Some(payload));
    }

    #[test]
    fn test_repair_smart_quotes() {
        let text = "{\u{201c}front\u{201d}: \u{201c}what\u{2019}s a cell?\u{201d}}";
        let fixed = repair_json(text).expect("repairable");
        let value: Value = serde_json::from_str(&fixed).expect("parses");
        assert_eq!(value["front"], "what's a cell?");
    }

    #[test]
    fn test_repair_trailing_commas_and_bom() {
        let text = "\u{feff}{\"tags\": [\"a\", \"b\",], \"n\": 1,}";
        let fixed = repair_json(text).expect("repairable");
        assert_eq!(
            serde_json::from_str::<Value>(&fixed).expect("parses"),
            json!({"tags": ["a", "b"], "n": 1})
        );
    }

    #[test]
    fn test_repair_only_fixes_syntax() {
        // Still not JSON after normalization: stays None.
        assert_eq!(repair_json("not json at all"), None);
        assert_eq!(repair_json("{unquoted: keys}"), None);
    }

    #[test]
    fn test_extract_or_repair_falls_back() {
        let text = "{\"a\": 1,}";
        assert_eq!(extract_json(text), None);
        assert_eq!(extract_or_repair(text), Some(json!({"a": 1})));
    }

    #[test]
    fn test_extract_is_deterministic() {
        let text = "```json\n{\"k\": 7}\n```";
        assert_eq!(extract_json(text), extract_json(text));
    }
}
