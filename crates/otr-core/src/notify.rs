use std::sync::Arc;

use chrono_tz::Tz;

use crate::{
    config::Config,
    domain::{ChatTarget, MessageId, NormalizedRecord},
    formatting::render_record,
    messaging::port::MessagingPort,
    Result,
};

/// Delivers normalized records to the configured chat.
///
/// One attempt per record. The caller decides what a failure means; the poll
/// loop logs it and moves on.
pub struct Notifier {
    messenger: Arc<dyn MessagingPort>,
    chat: ChatTarget,
    tz: Tz,
    max_len: usize,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn MessagingPort>, chat: ChatTarget, tz: Tz, safe_limit: usize) -> Self {
        let max_len = safe_limit.min(messenger.capabilities().max_message_len);
        Self {
            messenger,
            chat,
            tz,
            max_len,
        }
    }

    pub fn from_config(cfg: &Config, messenger: Arc<dyn MessagingPort>) -> Self {
        Self::new(
            messenger,
            cfg.telegram_chat.clone(),
            cfg.timezone,
            cfg.telegram_safe_limit,
        )
    }

    pub fn render(&self, record: &NormalizedRecord) -> String {
        render_record(record, self.tz, self.max_len)
    }

    pub async fn notify(&self, record: &NormalizedRecord) -> Result<MessageId> {
        let html = self.render(record);
        self.messenger.send_html(&self.chat, &html).await
    }
}
