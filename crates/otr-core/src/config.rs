use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono_tz::Tz;

use crate::{domain::ChatTarget, errors::Error, Result};

/// Typed, immutable configuration for the relay.
///
/// Built once at startup and shared as `Arc<Config>`; nothing reads the
/// environment after `load()` returns.
#[derive(Clone, Debug)]
pub struct Config {
    // Upstream (Hadi)
    pub hadi_api_url: String,
    pub hadi_token: String,
    pub hadi_records: u32,
    pub hadi_timeout: Duration,

    // Telegram
    pub telegram_bot_token: String,
    pub telegram_chat: ChatTarget,
    pub telegram_timeout: Duration,
    pub telegram_safe_limit: usize,

    // Poll loop
    pub poll_interval: Duration,
    pub state_file: PathBuf,
    pub timezone: Tz,

    // Status surface
    pub status_port: Option<u16>,
    pub status_bind: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build a config from an arbitrary key lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            get(key)
                .and_then(non_empty)
                .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
        };

        // Fail fast: a relay without upstream or sink credentials can do nothing useful.
        let hadi_api_url = required("HADI_API_URL")?;
        let hadi_token = required("HADI_TOKEN")?;
        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let telegram_chat = ChatTarget::parse(&required("TELEGRAM_CHAT_ID")?)?;

        let parse_u64 = |key: &str| get(key).and_then(|s| s.trim().parse::<u64>().ok());

        let hadi_records = get("HADI_RECORDS")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(100);
        let hadi_timeout = Duration::from_secs(parse_u64("HADI_TIMEOUT_SECS").unwrap_or(30));
        let telegram_timeout =
            Duration::from_secs(parse_u64("TELEGRAM_TIMEOUT_SECS").unwrap_or(15));
        let telegram_safe_limit = get("TELEGRAM_SAFE_LIMIT")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(4000);

        let poll_interval = Duration::from_secs(parse_u64("POLL_INTERVAL").unwrap_or(10).max(1));
        let state_file = PathBuf::from(
            get("STATE_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "/tmp/hadi_poller_state.json".to_string()),
        );

        let tz_name = get("TZ")
            .and_then(non_empty)
            .unwrap_or_else(|| "Asia/Dhaka".to_string());
        let timezone: Tz = tz_name
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("unknown timezone in TZ: {tz_name}")))?;

        let status_port = get("STATUS_PORT")
            .or_else(|| get("PORT"))
            .and_then(|s| s.trim().parse::<u16>().ok());
        let status_bind = get("STATUS_BIND")
            .and_then(non_empty)
            .unwrap_or_else(|| "0.0.0.0".to_string());

        Ok(Self {
            hadi_api_url,
            hadi_token,
            hadi_records,
            hadi_timeout,
            telegram_bot_token,
            telegram_chat,
            telegram_timeout,
            telegram_safe_limit,
            poll_interval,
            state_file,
            timezone,
            status_port,
            status_bind,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
