use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::utils::DISPLAY_FORMAT;

/// Process-wide facts the status surface may report.
///
/// Fixed at startup; the poll loop never touches it, so readers need no locking.
#[derive(Clone, Copy, Debug)]
pub struct StatusInfo {
    pub started_at: DateTime<Utc>,
    pub timezone: Tz,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub started_at: String,
    pub uptime_secs: u64,
    pub timezone: String,
    pub local_time: String,
}

impl StatusInfo {
    pub fn new(timezone: Tz) -> Self {
        Self {
            started_at: Utc::now(),
            timezone,
        }
    }

    pub fn health_at(&self, now: DateTime<Utc>) -> HealthReport {
        HealthReport {
            status: "ok",
            started_at: self.started_at.to_rfc3339(),
            uptime_secs: (now - self.started_at).num_seconds().max(0) as u64,
            timezone: self.timezone.name().to_string(),
            local_time: now.with_timezone(&self.timezone).format(DISPLAY_FORMAT).to_string(),
        }
    }

    pub fn health(&self) -> HealthReport {
        self.health_at(Utc::now())
    }

    /// One-line liveness banner.
    pub fn banner_at(&self, now: DateTime<Utc>) -> String {
        format!(
            "OTP relay running. Local time ({}): {}",
            self.timezone.name(),
            now.with_timezone(&self.timezone).format(DISPLAY_FORMAT)
        )
    }

    pub fn banner(&self) -> String {
        self.banner_at(Utc::now())
    }
}
