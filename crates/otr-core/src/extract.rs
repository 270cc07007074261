//! Best-effort normalization of upstream records.
//!
//! The aggregator has shipped several field layouts over time, so each field is
//! looked up under a list of aliases and defaulted rather than rejected.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::{NormalizedRecord, RawRecord};

const SENDER_FIELDS: &[&str] = &["num", "number", "from"];
const MESSAGE_FIELDS: &[&str] = &["message", "msg", "body"];
const TIMESTAMP_FIELD: &str = "dt";

fn passcode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4,8})\b").expect("valid regex"))
}

/// Normalize a raw record. `now` supplies the timestamp when the record has none.
pub fn extract(record: &RawRecord, now: impl FnOnce() -> String) -> NormalizedRecord {
    let sender = first_present(record, SENDER_FIELDS).unwrap_or_default();
    let raw_message = first_present(record, MESSAGE_FIELDS).unwrap_or_default();
    let timestamp = first_present(record, &[TIMESTAMP_FIELD]).unwrap_or_else(now);
    let passcode = find_passcode(&raw_message).unwrap_or_default();

    NormalizedRecord {
        sender,
        passcode,
        timestamp,
        raw_message,
    }
}

/// First run of 4-8 digits bounded by word boundaries.
///
/// Any such number qualifies, including years or amounts that happen to
/// precede the real code.
pub fn find_passcode(message: &str) -> Option<String> {
    passcode_regex()
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The record's own `dt` value, used as the batch sort key.
pub fn sort_key(record: &RawRecord) -> String {
    first_present(record, &[TIMESTAMP_FIELD]).unwrap_or_default()
}

fn first_present(record: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match record.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
