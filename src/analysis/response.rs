//! Parsing of structured stage replies
//!
//! Models are asked for a single JSON object but routinely wrap it in prose or
//! markdown fences, use a 1-10 scale for confidence, or return a bare string
//! where a list was requested. The helpers here absorb those variations.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplyError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

pub fn extract_json_from_response(response: &str) -> Result<String, ReplyError> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Ok(trimmed.to_string());
    }

    if trimmed.contains("```") {
        if let Some(json) = extract_from_markdown_block(trimmed) {
            return Ok(json);
        }
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if start < end {
                return Ok(trimmed[start..=end].to_string());
            }
        }
    }

    Err(ReplyError::InvalidJson(
        "No JSON object found in response".to_string(),
    ))
}

fn extract_from_markdown_block(text: &str) -> Option<String> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").expect("fence pattern is valid")
    });

    let json = re.captures(text)?.get(1)?.as_str().trim();
    if json.starts_with('{') && json.ends_with('}') {
        Some(json.to_string())
    } else {
        None
    }
}

/// Extracts and deserializes the JSON object embedded in a reply
pub fn parse_reply<T: DeserializeOwned>(response: &str) -> Result<T, ReplyError> {
    debug!("Parsing stage reply ({} chars)", response.len());
    let json = extract_json_from_response(response)?;
    serde_json::from_str(&json).map_err(|e| {
        warn!("Stage reply JSON parse error: {}", e);
        ReplyError::InvalidJson(format!(
            "{}: {}",
            e,
            json.chars().take(100).collect::<String>()
        ))
    })
}

/// Requires a non-blank text field
pub fn require(field: &str, value: Option<String>) -> Result<String, ReplyError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReplyError::MissingField(field.to_string()))
}

/// Normalizes a confidence value to `0.0..=1.0`.
///
/// Accepts fractions, 1-10 ratings, percentages (number or `"85%"` string)
/// and the words high/medium/low.
pub fn normalize_confidence(value: &Value) -> Option<f32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            match s.as_str() {
                "high" => return Some(0.9),
                "medium" | "moderate" => return Some(0.6),
                "low" => return Some(0.3),
                _ => {}
            }
            if let Some(pct) = s.strip_suffix('%') {
                return pct
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .map(|p| clamp_unit(p / 100.0));
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };

    let scaled = if raw <= 1.0 {
        raw
    } else if raw <= 10.0 {
        raw / 10.0
    } else {
        raw / 100.0
    };

    let clamped = clamp_unit(scaled);
    if (clamped - scaled as f32).abs() > f32::EPSILON {
        warn!(
            "Confidence value {} was out of range, clamped to {}",
            raw, clamped
        );
    }
    Some(clamped)
}

fn clamp_unit(value: f64) -> f32 {
    value.clamp(0.0, 1.0) as f32
}

/// Deserializes a list of strings, tolerating a bare string or list of objects
pub fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(value_as_text).collect(),
        Some(other) => value_as_text(&other).into_iter().collect(),
    })
}

/// Deserializes an optional text field, tolerating numbers and booleans
pub fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_text))
}

pub(crate) fn value_as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) => {
            const KEYS: [&str; 5] = ["description", "text", "step", "summary", "name"];
            match KEYS.iter().find_map(|k| map.get(*k).and_then(Value::as_str)) {
                Some(s) => s.trim().to_string(),
                None => value.to_string(),
            }
        }
        Value::Array(_) => value.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Reads a line number given as a number or numeric string
pub(crate) fn value_as_line(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
