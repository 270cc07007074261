//! Core of the OTP relay: poll an SMS/OTP aggregator, drop what was already
//! forwarded, relay the rest to a chat.
//!
//! This crate is framework-agnostic. The upstream HTTP API and Telegram live
//! behind ports (`source::RecordSource`, `messaging::port::MessagingPort`)
//! implemented in adapter crates.

pub mod config;
pub mod dedup;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod notify;
pub mod poller;
pub mod source;
pub mod state;
pub mod status;
pub mod utils;

pub use errors::{Error, Result};
