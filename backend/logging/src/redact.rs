//! Log Redaction
//!
//! Scrubs credentials from message payloads before they reach the logs.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());
static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(sk|pk|ghp|xox[bp])[-_][a-zA-Z0-9\-_]{16,}").unwrap());

/// Object keys whose string values are always replaced.
const SENSITIVE_KEYS: &[&str] = &["password", "secret", "token", "api_key", "authorization"];

/// Redacts tokens and API keys inside a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = BEARER_RE.replace_all(input, "[REDACTED_TOKEN]");
    API_KEY_RE.replace_all(&redacted, "[REDACTED_KEY]").into_owned()
}

/// Redacts a JSON payload: sensitive keys are blanked, other strings scrubbed.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_sensitive_data(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let lower = k.to_ascii_lowercase();
                    if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) && !v.is_null() {
                        (k.clone(), Value::String("[REDACTED]".into()))
                    } else {
                        (k.clone(), redact_value(v))
                    }
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redaction() {
        let raw = "calling with Bearer eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9 and sk-abcdefghijklmnopqrstuvwx";
        let clean = redact_sensitive_data(raw);
        assert!(!clean.contains("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9"));
        assert!(!clean.contains("sk-abcdefghijklmnopqrstuvwx"));
        assert!(clean.starts_with("calling with [REDACTED_TOKEN]"));
    }

    #[test]
    fn test_redact_value() {
        let payload = json!({
            "user": "ada",
            "apiToken": "hunter2",
            "nested": [{"note": "Bearer abc.def"}],
            "count": 3
        });
        let clean = redact_value(&payload);
        assert_eq!(clean["user"], "ada");
        assert_eq!(clean["apiToken"], "[REDACTED]");
        assert_eq!(clean["nested"][0]["note"], "[REDACTED_TOKEN]");
        assert_eq!(clean["count"], 3);
    }
}
