use async_trait::async_trait;

use crate::{
    domain::{ChatTarget, MessageId},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Outbound messenger port.
///
/// Send-only: forwarded records are never edited or deleted afterwards.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, to: &ChatTarget, html: &str) -> Result<MessageId>;
}
