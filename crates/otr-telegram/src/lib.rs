//! Telegram adapter (teloxide).
//!
//! This crate implements the `otr-core` MessagingPort over the Telegram Bot API.
//! Each send is a single request: flood-control (`RetryAfter`) and every other
//! API error come back as `Error::External`, and spacing between sends is left
//! to `ThrottledMessenger`.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ParseMode, Recipient},
};

use otr_core::{
    config::Config,
    domain::{ChatTarget, MessageId},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Bot with a per-request timeout, so a stuck send cannot stall the poll loop.
    pub fn with_timeout(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("telegram client build error: {e}")))?;
        Ok(Self::new(Bot::with_client(token, client)))
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::with_timeout(cfg.telegram_bot_token.clone(), cfg.telegram_timeout)
    }

    fn recipient(to: &ChatTarget) -> Recipient {
        match to {
            ChatTarget::Id(id) => Recipient::Id(teloxide::types::ChatId(id.0)),
            ChatTarget::Username(name) => Recipient::ChannelUsername(name.clone()),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, to: &ChatTarget, html: &str) -> Result<MessageId> {
        let msg = self
            .bot
            .send_message(Self::recipient(to), html.to_string())
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true)
            .await
            .map_err(Self::map_err)?;

        Ok(MessageId(msg.id.0))
    }
}
