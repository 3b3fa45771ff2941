//! Parsing of error response bodies.
//!
//! The processor has shipped several error envelopes over time. Parsing never
//! fails: anything unrecognised falls back to the raw text, then to the HTTP
//! reason phrase.

use serde_json::Value;

/// Normalised error payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

/// Longest raw body kept as a message before truncation.
const MAX_RAW_MESSAGE: usize = 500;

/// Extract `{code, message, details}` from an error response.
///
/// Accepted shapes, in order:
/// - `{"error": {"code", "message", "details"}}`
/// - `{"error": "CODE", "message", "details"}`
/// - `{"detail": "..."}` or `{"detail": <any>}`
/// - `{"message": "..."}`
/// - any other text
pub fn parse_error_body(status: u16, body: &str) -> ApiErrorBody {
    let fallback_code = default_code(status);
    let fallback_message = reason_phrase(status);

    let json: Option<Value> = serde_json::from_str(body).ok();
    if let Some(Value::Object(map)) = json {
        match map.get("error") {
            Some(Value::Object(inner)) => {
                return ApiErrorBody {
                    code: str_field(inner.get("code")).unwrap_or(fallback_code),
                    message: str_field(inner.get("message")).unwrap_or(fallback_message),
                    details: inner.get("details").cloned().filter(|d| !d.is_null()),
                };
            }
            Some(Value::String(code)) => {
                return ApiErrorBody {
                    code: code.clone(),
                    message: str_field(map.get("message")).unwrap_or(fallback_message),
                    details: map.get("details").cloned().filter(|d| !d.is_null()),
                };
            }
            _ => {}
        }
        if let Some(detail) = map.get("detail") {
            let message = match detail {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return ApiErrorBody {
                code: fallback_code,
                message,
                details: None,
            };
        }
        if let Some(message) = str_field(map.get("message")) {
            return ApiErrorBody {
                code: fallback_code,
                message,
                details: None,
            };
        }
    }

    let trimmed = body.trim();
    let message = if trimmed.is_empty() || trimmed.starts_with('{') || trimmed.starts_with('<') {
        fallback_message
    } else {
        truncate(trimmed, MAX_RAW_MESSAGE)
    };
    ApiErrorBody {
        code: fallback_code,
        message,
        details: None,
    }
}

fn str_field(v: Option<&Value>) -> Option<String> {
    v.and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

fn default_code(status: u16) -> String {
    format!("HTTP_{status}")
}

fn reason_phrase(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
