use std::fmt;

use crate::{errors::Error, Result};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// Where forwarded records are delivered: a numeric chat or a public `@channel`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    Id(ChatId),
    Username(String),
}

impl ChatTarget {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<i64>() {
            return Ok(Self::Id(ChatId(id)));
        }
        if raw.len() > 1 && raw.starts_with('@') && !raw.contains(char::is_whitespace) {
            return Ok(Self::Username(raw.to_string()));
        }
        Err(Error::Config(format!(
            "TELEGRAM_CHAT_ID must be a numeric id or an @username, got {raw:?}"
        )))
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id.0),
            Self::Username(name) => f.write_str(name),
        }
    }
}

/// Upstream-supplied record; field names vary between aggregator versions.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A record reduced to the fields the relay cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub sender: String,
    /// Empty when no passcode-looking number was found.
    pub passcode: String,
    pub timestamp: String,
    pub raw_message: String,
}
