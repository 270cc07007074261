use chrono::{NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

// ============== Timestamp Helpers ==============

/// Wall-clock format used by the upstream API, the state file and record `dt` fields.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Human format with numeric UTC offset (e.g. `2026-10-18 09:15:02 +0600`).
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Current wall-clock time in `tz`, truncated to whole seconds.
pub fn now_naive(tz: Tz) -> NaiveDateTime {
    let local = Utc::now().with_timezone(&tz).naive_local();
    local.with_nanosecond(0).unwrap_or(local)
}

pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

/// Current time in `tz`, rendered with its offset.
pub fn now_display(tz: Tz) -> String {
    Utc::now().with_timezone(&tz).format(DISPLAY_FORMAT).to_string()
}

/// Render a record timestamp with the zone offset attached.
///
/// Unparsable input is passed through with the zone's current offset appended,
/// so the reader still sees which clock the upstream was using.
pub fn display_timestamp(raw: &str, tz: Tz) -> String {
    let localized = parse_timestamp(raw).and_then(|naive| tz.from_local_datetime(&naive).earliest());
    match localized {
        Some(dt) => dt.format(DISPLAY_FORMAT).to_string(),
        None => {
            let offset = Utc::now().with_timezone(&tz).format("%z").to_string();
            format!("{raw} {offset}")
        }
    }
}

// ============== Text Helpers ==============

/// Length as Telegram counts it: UTF-16 code units.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Truncate to at most `max_units` UTF-16 code units, marking the cut with `…`.
/// Characters are never split.
pub fn truncate_utf16(text: &str, max_units: usize) -> String {
    if utf16_len(text) <= max_units {
        return text.to_string();
    }
    if max_units == 0 {
        return String::new();
    }
    // `…` is a single code unit.
    let budget = max_units - 1;
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let width = c.len_utf16();
        if used + width > budget {
            break;
        }
        used += width;
        out.push(c);
    }
    out.push('…');
    out
}
