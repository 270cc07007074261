//! Outbound messaging abstractions (Telegram today, anything HTML-capable later).

pub mod port;
pub mod throttled;
pub mod types;
