//! HTTP POST sink.
//!
//! Sends each sample as a compact JSON body in a single request with a
//! bounded timeout. Delivery counts are kept for the shutdown summary.
//!
//! ## Parameters
//!
//! - `url` (required): `http` or `https` endpoint
//! - `timeout_seconds` (default 30, clamped to 1..=30)
//!
//! ## Body
//!
//! ```json
//! {"cpu":12.5,"ram_used":2048,"disk_used":51200}
//! ```

use super::{Sink, SinkParams};
use crate::error::SinkError;
use crate::sample::Sample;
use crate::streak::FailureStreak;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 30;

/// JSON body posted for each sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Payload {
    /// CPU utilization in percent.
    pub cpu: f64,
    /// Used memory in MB.
    pub ram_used: u64,
    /// Used disk space in MB.
    pub disk_used: u64,
}

impl From<&Sample> for Payload {
    fn from(sample: &Sample) -> Self {
        Self { cpu: sample.cpu_percent(), ram_used: sample.ram_used_mb(), disk_used: sample.disk_used_mb() }
    }
}

/// Formats delivery counts as `delivered/attempted (pct%)`.
#[must_use]
pub fn summarize(delivered: u64, attempted: u64) -> String {
    let pct = if attempted == 0 { 0.0 } else { delivered as f64 / attempted as f64 * 100.0 };
    format!("{delivered}/{attempted} samples delivered ({pct:.1}%)")
}

fn parse_url(sink: &str, raw: &str) -> Result<Url, SinkError> {
    let url = Url::parse(raw).map_err(|e| SinkError::config(sink, format!("invalid url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SinkError::config(sink, format!("unsupported url scheme '{other}'"))),
    }
}

struct Endpoint {
    client: Client,
    url: Url,
    attempted: u64,
    delivered: u64,
    failures: FailureStreak,
}

/// Sink posting samples to an HTTP endpoint.
pub struct HttpPostSink {
    state: Mutex<Option<Endpoint>>,
}

impl HttpPostSink {
    /// Registered name.
    pub const NAME: &'static str = "http_post";

    /// Creates an uninitialized sink.
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(None) }
    }
}

impl Default for HttpPostSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpPostSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPostSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl Sink for HttpPostSink {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn initialize(&self, params: &SinkParams) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Ok(());
        }

        let url = parse_url(Self::NAME, params.required_str("url")?)?;
        let timeout = params.u64_or("timeout_seconds", DEFAULT_TIMEOUT_SECS)?.clamp(1, MAX_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| SinkError::init(Self::NAME, e.to_string()))?;

        debug!(sink = Self::NAME, %url, timeout_secs = timeout, "endpoint configured");
        *state = Some(Endpoint { client, url, attempted: 0, delivered: 0, failures: FailureStreak::new() });
        Ok(())
    }

    async fn on_sample(&self, sample: &Sample) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        let endpoint = state.as_mut().ok_or_else(|| SinkError::write(Self::NAME, "not initialized"))?;

        endpoint.attempted += 1;
        let result = endpoint
            .client
            .post(endpoint.url.clone())
            .json(&Payload::from(sample))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(_) => {
                endpoint.delivered += 1;
                if let Some(failed) = endpoint.failures.record_success() {
                    info!(sink = Self::NAME, url = %endpoint.url, failed, "delivery resumed");
                }
                Ok(())
            }
            Err(e) => {
                endpoint.failures.record_failure();
                debug!(sink = Self::NAME, url = %endpoint.url, consecutive = endpoint.failures.consecutive(), "post failed: {e}");
                Err(SinkError::write(Self::NAME, e.to_string()))
            }
        }
    }

    async fn shutdown(&self) -> Result<Option<String>, SinkError> {
        let Some(endpoint) = self.state.lock().await.take() else {
            return Ok(None);
        };
        Ok(Some(summarize(endpoint.delivered, endpoint.attempted)))
    }
}
