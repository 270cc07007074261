use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;

use crate::{domain::RawRecord, utils::format_timestamp};

/// The `[start, end)` wall-clock interval queried in one poll cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl PollWindow {
    /// Window from `last` to `now`; never runs backwards if the wall clock does.
    pub fn between(last: NaiveDateTime, now: NaiveDateTime) -> Self {
        Self {
            start: last,
            end: now.max(last),
        }
    }

    pub fn start_str(&self) -> String {
        format_timestamp(self.start)
    }

    pub fn end_str(&self) -> String {
        format_timestamp(self.end)
    }
}

/// Port for the upstream OTP aggregator.
///
/// Implementations swallow their own failures: a network error, a bad status
/// or an unexpected body all come back as an empty batch (after logging), so
/// the poll loop simply tries the next window.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self, window: &PollWindow) -> Vec<RawRecord>;
}

/// Normalize the two response shapes the aggregator is known to use.
///
/// - `{"status": "success", "data": [...]}`
/// - a bare `[...]`
///
/// Any other shape yields no records. Array elements that are not objects are dropped.
pub fn records_from_response(body: Value) -> Vec<RawRecord> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut envelope) => {
            let ok = envelope.get("status").and_then(Value::as_str) == Some("success");
            match envelope.remove("data") {
                Some(Value::Array(items)) if ok => items,
                _ => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };

    let total = items.len();
    let records: Vec<RawRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    if records.len() < total {
        tracing::debug!(
            dropped = total - records.len(),
            "skipping non-object entries in upstream response"
        );
    }
    records
}
