//! Persisted poll position and dedup memory.
//!
//! The file is small JSON rewritten after every cycle:
//!
//! ```json
//! {"last_poll_time": "2026-10-18 09:15:02", "seen": ["<sha256 hex>", "..."]}
//! ```
//!
//! Files written by the older poller (`last_dt` instead of `last_poll_time`)
//! load unchanged.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use chrono::{Duration, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{
    dedup::SeenSet,
    utils::{format_timestamp, now_naive, parse_timestamp},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollState {
    /// Wall-clock time in the configured zone; next window starts here.
    pub last_poll_time: NaiveDateTime,
    pub seen: SeenSet,
}

impl PollState {
    /// Fresh state: look back one minute, remember nothing.
    pub fn fresh(now: NaiveDateTime) -> Self {
        Self {
            last_poll_time: now - Duration::minutes(1),
            seen: SeenSet::new(),
        }
    }

    /// Move the poll position forward; never backwards.
    pub fn advance_to(&mut self, t: NaiveDateTime) {
        if t > self.last_poll_time {
            self.last_poll_time = t;
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFileData {
    #[serde(default, alias = "last_dt")]
    last_poll_time: Option<String>,
    #[serde(default)]
    seen: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
    tz: Tz,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            path: path.into(),
            tz,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted state, falling back to [`PollState::fresh`] on any problem.
    pub fn load(&self) -> PollState {
        let now = now_naive(self.tz);

        let data = match read_state_file(&self.path) {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "no state file, starting fresh");
                return PollState::fresh(now);
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable state file, starting fresh");
                return PollState::fresh(now);
            }
        };

        let seen = SeenSet::from_ordered(data.seen);
        let last_poll_time = match data.last_poll_time.as_deref().and_then(parse_timestamp) {
            Some(t) => t,
            None => {
                tracing::warn!(
                    value = ?data.last_poll_time,
                    "invalid last_poll_time in state file, looking back one minute"
                );
                PollState::fresh(now).last_poll_time
            }
        };

        PollState {
            last_poll_time,
            seen,
        }
    }

    /// Write state via a temp file and rename, so a crash mid-write leaves the
    /// previous file intact.
    pub fn save(&self, state: &PollState) -> Result<()> {
        let data = StateFileData {
            last_poll_time: Some(format_timestamp(state.last_poll_time)),
            seen: state.seen.iter().cloned().collect(),
        };
        let txt = serde_json::to_string(&data)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = partial_path(&self.path);
        fs::write(&tmp, txt)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Sibling of `path` with `.partial` appended to the full file name, so it
/// never equals the target whatever extension the target has.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn read_state_file(path: &Path) -> Result<Option<StateFileData>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    let data: StateFileData = serde_json::from_str(&txt)?;
    Ok(Some(data))
}
