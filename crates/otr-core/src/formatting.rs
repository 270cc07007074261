//! Formatting utilities (Telegram HTML for forwarded records).

use chrono_tz::Tz;

use crate::{
    domain::NormalizedRecord,
    utils::{display_timestamp, truncate_utf16, utf16_len},
};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render a forwarded record:
///
/// ```text
/// Number : <code>8801711000000</code>
/// Code   : <code>48213</code>
/// Time   : <code>2026-10-18 09:15:02 +0600</code>
///
/// <pre>Your code is 48213</pre>
/// ```
///
/// `max_len` bounds the visible text in UTF-16 code units (what Telegram counts
/// after parsing entities); only the quoted message is shortened to fit.
pub fn render_record(record: &NormalizedRecord, tz: Tz, max_len: usize) -> String {
    let number = if record.sender.is_empty() {
        "Unknown"
    } else {
        record.sender.as_str()
    };
    let time = display_timestamp(&record.timestamp, tz);

    let lines = [
        ("Number : ", number),
        ("Code   : ", record.passcode.as_str()),
        ("Time   : ", time.as_str()),
    ];

    let visible_header: usize = lines
        .iter()
        .map(|(label, value)| utf16_len(label) + utf16_len(value))
        .sum::<usize>()
        + lines.len()
        - 1;

    let mut html = lines
        .iter()
        .map(|(label, value)| format!("{label}<code>{}</code>", escape_html(value)))
        .collect::<Vec<_>>()
        .join("\n");

    if !record.raw_message.is_empty() {
        let budget = max_len.saturating_sub(visible_header + 2);
        let quoted = truncate_utf16(&record.raw_message, budget);
        if !quoted.is_empty() {
            html.push_str("\n\n<pre>");
            html.push_str(&escape_html(&quoted));
            html.push_str("</pre>");
        }
    }

    html
}
