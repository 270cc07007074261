use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use otr_core::{
    config::Config,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    notify::Notifier,
    poller::Poller,
    source::RecordSource,
    status::StatusInfo,
};
use otr_hadi::HadiClient;
use otr_status::StatusServer;
use otr_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<(), otr_core::Error> {
    otr_core::logging::init("otr")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        upstream = %cfg.hadi_api_url,
        chat = %cfg.telegram_chat,
        timezone = cfg.timezone.name(),
        interval_secs = cfg.poll_interval.as_secs(),
        "otr starting"
    );

    // The status surface is optional: failing to bind must not stop the relay.
    let info = StatusInfo::new(cfg.timezone);
    let _status = cfg.status_port.and_then(|port| {
        StatusServer::spawn(&cfg.status_bind, port, info)
            .map_err(|e| tracing::warn!(error = %format!("{e:#}"), "status server disabled"))
            .ok()
    });

    let source: Arc<dyn RecordSource> = Arc::new(HadiClient::from_config(&cfg)?);

    // Throttle in front of the raw Telegram messenger; the adapter itself
    // sends each message exactly once.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::from_config(&cfg)?);
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    let notifier = Notifier::from_config(&cfg, messenger);

    let poller = Poller::new(&cfg, source, notifier);
    let shutdown = CancellationToken::new();
    let poll_task = tokio::spawn(poller.run(shutdown.clone()));

    shutdown_signal().await;
    tracing::info!("shutdown requested, finishing current cycle");
    shutdown.cancel();

    poll_task
        .await
        .map_err(|e| otr_core::Error::External(format!("poll loop task failed: {e}")))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
