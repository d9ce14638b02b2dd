//! Extraction of the agent's final message and token usage.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Returned when neither the last-message file nor stdout carried text.
pub const NO_MESSAGE_SENTINEL: &str = "(no message captured)";

static TOKENS_USED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)tokens\s+used\s*\n\s*([\d,]+)").expect("tokens-used regex is valid")
});

/// Last-message precedence: non-empty last-message file content, else the
/// last non-empty stdout line, else the sentinel.
pub fn last_message(stdout: &str, file_contents: Option<&str>) -> String {
    if let Some(contents) = file_contents {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map_or_else(|| NO_MESSAGE_SENTINEL.to_string(), str::to_string)
}

/// Token count from the canonical `tokens used` block, checking the
/// last-message file before stdout. Commas are stripped before parsing;
/// anything that does not parse yields `None`.
pub fn token_count(stdout: &str, file_contents: Option<&str>) -> Option<u64> {
    file_contents
        .and_then(extract_token_count)
        .or_else(|| extract_token_count(stdout))
}

fn extract_token_count(text: &str) -> Option<u64> {
    let caps = TOKENS_USED.captures(text)?;
    caps[1].replace(',', "").parse().ok()
}

/// Parse a gemini-style JSON envelope from stdout.
///
/// Returns `(message, token_count)` overrides: `response` as the message
/// when it is a string, and the first `stats.models.<any>.tokens.total`
/// integer as the count. Any parse failure yields `(None, None)` and the
/// default extraction stands.
pub fn parse_json_envelope(stdout: &str) -> (Option<String>, Option<u64>) {
    let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(stdout.trim()) else {
        return (None, None);
    };
    let message = envelope
        .get("response")
        .and_then(Value::as_str)
        .map(str::to_string);
    let tokens = envelope
        .get("stats")
        .and_then(|stats| stats.get("models"))
        .and_then(Value::as_object)
        .and_then(|models| {
            models
                .values()
                .find_map(|model| model.get("tokens")?.get("total")?.as_u64())
        });
    (message, tokens)
}
