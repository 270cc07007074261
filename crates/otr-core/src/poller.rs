//! The fetch → dedup → notify → persist loop.
//!
//! One task owns the `Poller` and with it the only mutable copy of
//! [`PollState`]; nothing else reads or writes the state file while it runs.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    dedup::fingerprint,
    extract::{extract, sort_key},
    notify::Notifier,
    source::{PollWindow, RecordSource},
    state::{PollState, StateStore},
    utils::{format_timestamp, now_naive},
    Result,
};

/// Where the loop currently is within a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Processing,
    Persisting,
    Sleeping,
}

/// Outcome of one cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub window: PollWindow,
    pub fetched: usize,
    pub duplicates: usize,
    pub forwarded: usize,
    /// Delivery attempts that failed; these records are still marked seen.
    pub failed: usize,
}

pub struct Poller {
    source: Arc<dyn RecordSource>,
    notifier: Notifier,
    store: StateStore,
    state: PollState,
    tz: Tz,
    interval: Duration,
    phase: Phase,
}

impl Poller {
    /// Build the loop from config, loading persisted state from `cfg.state_file`.
    pub fn new(cfg: &Config, source: Arc<dyn RecordSource>, notifier: Notifier) -> Self {
        let store = StateStore::new(cfg.state_file.clone(), cfg.timezone);
        Self::with_store(source, notifier, store, cfg.timezone, cfg.poll_interval)
    }

    pub fn with_store(
        source: Arc<dyn RecordSource>,
        notifier: Notifier,
        store: StateStore,
        tz: Tz,
        interval: Duration,
    ) -> Self {
        let state = store.load();
        tracing::info!(
            since = %format_timestamp(state.last_poll_time),
            seen = state.seen.len(),
            "poller state loaded"
        );
        Self {
            source,
            notifier,
            store,
            state,
            tz,
            interval,
            phase: Phase::Idle,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run cycles until `shutdown` is cancelled. Cancellation is only observed
    /// between cycles, never in the middle of a batch.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            state_file = %self.store.path().display(),
            "poll loop running"
        );

        while !shutdown.is_cancelled() {
            match self.run_cycle().await {
                Ok(report) if report.fetched > 0 => tracing::info!(
                    window_start = %report.window.start_str(),
                    window_end = %report.window.end_str(),
                    fetched = report.fetched,
                    forwarded = report.forwarded,
                    duplicates = report.duplicates,
                    failed = report.failed,
                    "poll cycle complete"
                ),
                Ok(report) => tracing::debug!(
                    window_end = %report.window.end_str(),
                    "poll cycle complete, nothing new"
                ),
                Err(e) => tracing::error!(error = %e, "poll cycle failed"),
            }

            self.enter(Phase::Sleeping);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
            self.enter(Phase::Idle);
        }

        self.enter(Phase::Idle);
        tracing::info!("poll loop stopped");
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let now = now_naive(self.tz);
        self.run_cycle_at(now).await
    }

    /// One cycle with an explicit "now" (the window end).
    ///
    /// State is advanced in memory before it is persisted, so a failed save
    /// only costs restart safety, not the next window.
    pub async fn run_cycle_at(&mut self, now: NaiveDateTime) -> Result<CycleReport> {
        let window = PollWindow::between(self.state.last_poll_time, now);

        self.enter(Phase::Fetching);
        let mut records = self.source.fetch(&window).await;
        // Stable: records with equal or missing `dt` keep fetch order.
        records.sort_by_cached_key(sort_key);

        self.enter(Phase::Processing);
        let mut report = CycleReport {
            window,
            fetched: records.len(),
            duplicates: 0,
            forwarded: 0,
            failed: 0,
        };

        let fallback_ts = format_timestamp(now);
        for raw in &records {
            let record = extract(raw, || fallback_ts.clone());
            let fp = fingerprint(&record.timestamp, &record.sender, &record.raw_message);
            if self.state.seen.contains(&fp) {
                report.duplicates += 1;
                continue;
            }

            match self.notifier.notify(&record).await {
                Ok(_) => {
                    report.forwarded += 1;
                    tracing::info!(
                        sender = %record.sender,
                        code = %record.passcode,
                        time = %record.timestamp,
                        "forwarded"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        sender = %record.sender,
                        time = %record.timestamp,
                        error = %e,
                        "delivery failed, record dropped"
                    );
                }
            }
            // Marked seen whatever the outcome: one attempt per record.
            self.state.seen.insert(fp);
        }

        self.state.advance_to(window.end);

        self.enter(Phase::Persisting);
        self.store.save(&self.state)?;

        Ok(report)
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, ChatTarget, MessageId, RawRecord},
        errors::Error,
        messaging::{port::MessagingPort, types::MessagingCapabilities},
        source::records_from_response,
        utils::parse_timestamp,
    };
    use serde_json::{json, Value};
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Mutex,
        },
    };

    /// Serves queued upstream bodies, one per fetch, and records the windows asked for.
    #[derive(Default)]
    struct ScriptedSource {
        bodies: Mutex<VecDeque<Value>>,
        windows: Mutex<Vec<PollWindow>>,
    }

    impl ScriptedSource {
        fn new(bodies: Vec<Value>) -> Self {
            Self {
                bodies: Mutex::new(bodies.into()),
                windows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl RecordSource for ScriptedSource {
        async fn fetch(&self, window: &PollWindow) -> Vec<RawRecord> {
            self.windows.lock().unwrap().push(*window);
            let body = self.bodies.lock().unwrap().pop_front().unwrap_or(Value::Null);
            records_from_response(body)
        }
    }

    #[derive(Default)]
    struct FakeMessenger {
        sent: Mutex<Vec<String>>,
        fail: AtomicBool,
        attempts: AtomicUsize,
    }

    impl FakeMessenger {
        fn sent_html(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_html: true,
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, _to: &ChatTarget, html: &str) -> crate::Result<MessageId> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::External("telegram error: 502 Bad Gateway".to_string()));
            }
            self.sent.lock().unwrap().push(html.to_string());
            Ok(MessageId(n as i32 + 1))
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        source: Arc<ScriptedSource>,
        messenger: Arc<FakeMessenger>,
        store: StateStore,
    }

    impl Harness {
        fn new(bodies: Vec<Value>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = StateStore::new(dir.path().join("state.json"), chrono_tz::Asia::Dhaka);
            Self {
                _dir: dir,
                source: Arc::new(ScriptedSource::new(bodies)),
                messenger: Arc::new(FakeMessenger::default()),
                store,
            }
        }

        fn poller(&self) -> Poller {
            let notifier = Notifier::new(
                self.messenger.clone(),
                ChatTarget::Id(ChatId(7)),
                chrono_tz::Asia::Dhaka,
                4000,
            );
            Poller::with_store(
                self.source.clone(),
                notifier,
                self.store.clone(),
                chrono_tz::Asia::Dhaka,
                Duration::from_secs(10),
            )
        }
    }

    fn at(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn otp(dt: &str, num: &str, msg: &str) -> Value {
        json!({"dt": dt, "num": num, "message": msg})
    }

    #[tokio::test]
    async fn same_record_in_two_cycles_is_forwarded_once() {
        let rec = otp("2026-10-18 09:00:05", "8801711000000", "Your code is 48213");
        let h = Harness::new(vec![
            json!({"status": "success", "data": [rec.clone()]}),
            json!([rec]),
        ]);
        let mut poller = h.poller();

        let first = poller.run_cycle_at(at("2026-10-18 09:00:10")).await.unwrap();
        let second = poller.run_cycle_at(at("2026-10-18 09:00:20")).await.unwrap();

        assert_eq!(first.forwarded, 1);
        assert_eq!(second.forwarded, 0);
        assert_eq!(second.duplicates, 1);
        let sent = h.messenger.sent_html();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("<code>48213</code>"));
    }

    #[tokio::test]
    async fn windows_chain_from_last_poll_time() {
        let h = Harness::new(vec![json!([]), json!([])]);
        let mut poller = h.poller();
        let start = poller.state().last_poll_time;

        poller.run_cycle_at(at("2030-01-01 00:00:00")).await.unwrap();
        poller.run_cycle_at(at("2030-01-01 00:00:10")).await.unwrap();

        let windows = h.source.windows.lock().unwrap().clone();
        assert_eq!(windows[0].start, start);
        assert_eq!(windows[0].end, at("2030-01-01 00:00:00"));
        assert_eq!(windows[1].start, at("2030-01-01 00:00:00"));
        assert_eq!(windows[1].end, at("2030-01-01 00:00:10"));
        assert_eq!(poller.state().last_poll_time, at("2030-01-01 00:00:10"));
    }

    #[tokio::test]
    async fn malformed_response_completes_cycle_and_advances() {
        let h = Harness::new(vec![json!("service temporarily unavailable")]);
        let mut poller = h.poller();

        let report = poller.run_cycle_at(at("2030-01-01 00:00:00")).await.unwrap();

        assert_eq!(report.fetched, 0);
        assert!(h.messenger.sent_html().is_empty());
        assert_eq!(h.store.load().last_poll_time, at("2030-01-01 00:00:00"));
    }

    #[tokio::test]
    async fn failed_delivery_is_not_retried() {
        let rec = otp("2026-10-18 09:00:05", "8801711000000", "code 1111");
        let h = Harness::new(vec![json!([rec.clone()]), json!([rec])]);
        h.messenger.fail.store(true, Ordering::SeqCst);
        let mut poller = h.poller();

        let first = poller.run_cycle_at(at("2026-10-18 09:00:10")).await.unwrap();
        assert_eq!(first.failed, 1);

        h.messenger.fail.store(false, Ordering::SeqCst);
        let second = poller.run_cycle_at(at("2026-10-18 09:00:20")).await.unwrap();

        assert_eq!(second.duplicates, 1);
        assert_eq!(h.messenger.attempts.load(Ordering::SeqCst), 1);
        assert!(h.messenger.sent_html().is_empty());
    }

    #[tokio::test]
    async fn batch_is_sorted_by_record_time_and_deduped_within_itself() {
        let h = Harness::new(vec![json!([
            otp("2026-10-18 09:00:03", "C", "third 3333"),
            otp("2026-10-18 09:00:01", "A", "first 1111"),
            otp("2026-10-18 09:00:02", "B", "second 2222"),
            otp("2026-10-18 09:00:01", "A", "first 1111"),
        ])]);
        let mut poller = h.poller();

        let report = poller.run_cycle_at(at("2026-10-18 09:00:10")).await.unwrap();

        assert_eq!(report.fetched, 4);
        assert_eq!(report.forwarded, 3);
        assert_eq!(report.duplicates, 1);
        let codes: Vec<_> = h
            .messenger
            .sent_html()
            .iter()
            .map(|html| html.lines().nth(1).unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            codes,
            vec![
                "Code   : <code>1111</code>",
                "Code   : <code>2222</code>",
                "Code   : <code>3333</code>",
            ]
        );
    }

    #[tokio::test]
    async fn dedup_survives_restart() {
        let rec = otp("2026-10-18 09:00:05", "8801711000000", "code 4242");
        let h = Harness::new(vec![json!([rec.clone()]), json!([rec])]);

        let mut first = h.poller();
        first.run_cycle_at(at("2030-01-01 00:00:10")).await.unwrap();
        drop(first);

        let mut restarted = h.poller();
        assert_eq!(restarted.state().last_poll_time, at("2030-01-01 00:00:10"));
        let report = restarted.run_cycle_at(at("2030-01-01 00:00:20")).await.unwrap();

        assert_eq!(report.duplicates, 1);
        assert_eq!(h.messenger.sent_html().len(), 1);
    }

    #[tokio::test]
    async fn save_failure_is_reported_but_state_still_advances() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the state file should be: the final rename fails.
        let blocked = dir.path().join("state.json");
        std::fs::create_dir(&blocked).unwrap();
        let store = StateStore::new(blocked, chrono_tz::Asia::Dhaka);
        let h = Harness::new(vec![json!([otp("2030-01-01 00:00:01", "A", "9999")])]);
        let notifier = Notifier::new(
            h.messenger.clone(),
            ChatTarget::Id(ChatId(7)),
            chrono_tz::Asia::Dhaka,
            4000,
        );
        let mut poller = Poller::with_store(
            h.source.clone(),
            notifier,
            store,
            chrono_tz::Asia::Dhaka,
            Duration::from_secs(10),
        );

        assert!(poller.run_cycle_at(at("2030-01-01 00:00:05")).await.is_err());
        assert_eq!(poller.state().last_poll_time, at("2030-01-01 00:00:05"));
        assert_eq!(poller.state().seen.len(), 1);
        assert_eq!(poller.phase(), Phase::Persisting);
    }

    #[tokio::test]
    async fn records_without_timestamp_use_cycle_time() {
        let h = Harness::new(vec![json!([{"from": "Bank", "body": "pin 8080"}])]);
        let mut poller = h.poller();

        poller.run_cycle_at(at("2030-01-01 00:00:05")).await.unwrap();

        let sent = h.messenger.sent_html();
        assert!(sent[0].contains("<code>2030-01-01 00:00:05 +0600</code>"));
        assert!(poller
            .state()
            .seen
            .contains(&fingerprint("2030-01-01 00:00:05", "Bank", "pin 8080")));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_between_cycles_on_shutdown() {
        struct CancelOnSecondFetch {
            fetches: AtomicUsize,
            token: CancellationToken,
        }

        #[async_trait::async_trait]
        impl RecordSource for CancelOnSecondFetch {
            async fn fetch(&self, _window: &PollWindow) -> Vec<RawRecord> {
                if self.fetches.fetch_add(1, Ordering::SeqCst) == 1 {
                    self.token.cancel();
                }
                Vec::new()
            }
        }

        let h = Harness::new(Vec::new());
        let token = CancellationToken::new();
        let source = Arc::new(CancelOnSecondFetch {
            fetches: AtomicUsize::new(0),
            token: token.clone(),
        });
        let notifier = Notifier::new(
            h.messenger.clone(),
            ChatTarget::Id(ChatId(7)),
            chrono_tz::Asia::Dhaka,
            4000,
        );
        let poller = Poller::with_store(
            source.clone(),
            notifier,
            h.store.clone(),
            chrono_tz::Asia::Dhaka,
            Duration::from_secs(10),
        );

        poller.run(token).await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert!(h.store.path().exists());
    }
}
