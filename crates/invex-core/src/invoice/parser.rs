//! Tolerant parsing of language model responses into invoice records.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::FieldError;
use crate::models::invoice::InvoiceRecord;

lazy_static! {
    // First `{` through the last `}`, across lines.
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

/// Parse a completion into a record.
///
/// Prose around the JSON object is ignored. Without any brace span the whole
/// response is parsed. The result must be a non-empty JSON object.
pub fn parse_response(content: &str) -> Result<InvoiceRecord, FieldError> {
    let json = JSON_OBJECT
        .find(content)
        .map(|m| m.as_str())
        .unwrap_or(content);

    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) if map.is_empty() => Err(FieldError::NoData),
        Value::Object(map) => Ok(InvoiceRecord::from_map(map)),
        _ => Err(FieldError::NotAnObject),
    }
}
