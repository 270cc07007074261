use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatTarget, MessageId},
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Telegram API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat (Telegram 1 msg/sec style limits).
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces out outbound sends.
///
/// The first cycle after downtime can surface dozens of codes at once; this
/// keeps such bursts under Telegram's flood limits.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<ChatTarget, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat: &ChatTarget) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat: &ChatTarget) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, to: &ChatTarget, html: &str) -> Result<MessageId> {
        self.throttle_chat(to).await;
        self.inner.send_html(to, html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<(ChatTarget, Instant)>>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for Recorder {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_html: true,
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, to: &ChatTarget, _html: &str) -> Result<MessageId> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((to.clone(), Instant::now()));
            Ok(MessageId(sent.len() as i32))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_to_one_chat_are_spaced() {
        let rec = Arc::new(Recorder::default());
        let throttled = ThrottledMessenger::new(
            rec.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(10),
                per_chat_min_interval: Duration::from_millis(500),
            },
        );
        let chat = ChatTarget::Id(ChatId(1));

        for _ in 0..3 {
            throttled.send_html(&chat, "x").await.unwrap();
        }

        let sent = rec.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent[1].1 - sent[0].1 >= Duration::from_millis(500));
        assert!(sent[2].1 - sent[1].1 >= Duration::from_millis(500));
    }
}
