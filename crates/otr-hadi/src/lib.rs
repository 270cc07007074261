//! Hadi SMS aggregator adapter.
//!
//! Implements the `otr-core` RecordSource over the aggregator's time-window
//! query endpoint.

use std::{fmt, time::Duration};

use async_trait::async_trait;

use otr_core::{
    config::Config,
    domain::RawRecord,
    errors::Error,
    source::{records_from_response, PollWindow, RecordSource},
    Result,
};

#[derive(Clone)]
pub struct HadiClient {
    api_url: String,
    token: String,
    records: u32,
    http: reqwest::Client,
}

impl HadiClient {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        records: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("otr/0.1")
            .build()
            .map_err(|e| Error::External(format!("hadi client build error: {e}")))?;
        Ok(Self {
            api_url: api_url.into(),
            token: token.into(),
            records,
            http,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.hadi_api_url.clone(),
            cfg.hadi_token.clone(),
            cfg.hadi_records,
            cfg.hadi_timeout,
        )
    }

    /// Query one window. Errors carry no credential: reqwest errors are
    /// stripped of their URL because the token travels in the query string.
    pub async fn try_fetch(&self, window: &PollWindow) -> Result<Vec<RawRecord>> {
        let records = self.records.to_string();
        let start = window.start_str();
        let end = window.end_str();

        let resp = self
            .http
            .get(&self.api_url)
            .query(&[
                ("token", self.token.as_str()),
                ("dt1", start.as_str()),
                ("dt2", end.as_str()),
                ("records", records.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::External(format!("hadi request error: {}", e.without_url())))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "hadi query failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("hadi json error: {}", e.without_url())))?;

        Ok(records_from_response(body))
    }
}

impl fmt::Debug for HadiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HadiClient")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("records", &self.records)
            .finish()
    }
}

#[async_trait]
impl RecordSource for HadiClient {
    async fn fetch(&self, window: &PollWindow) -> Vec<RawRecord> {
        match self.try_fetch(window).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    window_start = %window.start_str(),
                    window_end = %window.end_str(),
                    error = %e,
                    "fetch failed, treating window as empty"
                );
                Vec::new()
            }
        }
    }
}
