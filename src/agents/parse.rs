//! Extraction of structured answers from free model text

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static JSON_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());
static JSON_LIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[.*\]").unwrap());
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*]\s+").unwrap());
static NUMBERING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").unwrap());

/// The outermost `{...}` span parsed as a JSON object
pub(crate) fn json_object(raw: &str) -> Option<Map<String, Value>> {
    let span = JSON_OBJECT_RE.find(raw)?;
    match serde_json::from_str(span.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// The outermost `[...]` span as a list of non-empty strings.
///
/// Falls back to a bullet or numbered line list when there is no bracketed
/// span or it is not valid JSON. A valid JSON value that is not an array
/// yields `None`.
pub(crate) fn string_list(raw: &str) -> Option<Vec<String>> {
    let Some(span) = JSON_LIST_RE.find(raw) else {
        return line_list(raw);
    };
    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(Value::Array(items)) => Some(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Ok(_) => None,
        Err(_) => line_list(raw),
    }
}

/// String field of a JSON object, trimmed; empty when absent
pub(crate) fn text_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn line_list(raw: &str) -> Option<Vec<String>> {
    let items: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let line = BULLET_RE.replace(line, "");
            NUMBERING_RE.replace(&line, "").trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}
