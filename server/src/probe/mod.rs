//! Timed HTTP calls against the target under test
//!
//! Every call produces a [`RequestOutcome`]. Network and HTTP failures are
//! data, never errors: one virtual user's broken request must not abort a run.

use bytes::Bytes;
use metrics::{counter, histogram};
use reqwest::{Client, Method};
use std::time::{Duration, Instant};
use tracing::trace;

/// Maximum number of characters kept from a failed response body
pub const BODY_SAMPLE_LIMIT: usize = 200;

/// Result of one probe call
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub url: String,
    pub elapsed: Duration,
    pub success: bool,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// Transport error message, when no response was received
    pub error: Option<String>,
    /// Truncated body of a non-2xx response
    pub body_sample: Option<String>,
    /// Full body of a 2xx response, kept only when requested
    pub body: Option<Bytes>,
}

impl RequestOutcome {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Reclassify a 2xx outcome as failed (e.g. a login without a token)
    pub fn into_failure(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.body = None;
        self
    }
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct ProbeOptions<'a> {
    pub method: Method,
    pub bearer: Option<&'a str>,
    pub json: Option<&'a serde_json::Value>,
    pub capture_body: bool,
}

impl<'a> ProbeOptions<'a> {
    pub fn post_json(json: &'a serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            bearer: None,
            json: Some(json),
            capture_body: false,
        }
    }

    pub fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn capture_body(mut self) -> Self {
        self.capture_body = true;
        self
    }
}

/// HTTP prober shared by all virtual users of a run
#[derive(Debug, Clone)]
pub struct Probe {
    client: Client,
}

impl Probe {
    /// Build a prober whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("loadrun/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Perform one timed request. Never fails: failures are encoded in the outcome.
    pub async fn probe(&self, url: &str, options: ProbeOptions<'_>) -> RequestOutcome {
        let start = Instant::now();

        let mut request = self.client.request(options.method, url);
        if let Some(token) = options.bearer {
            request = request.bearer_auth(token);
        }
        if let Some(json) = options.json {
            request = request.json(json);
        }

        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status();
                // A body that cannot be read degrades to an empty sample
                let body = response.bytes().await.unwrap_or_default();
                let elapsed = start.elapsed();

                if status.is_success() {
                    RequestOutcome {
                        url: url.to_string(),
                        elapsed,
                        success: true,
                        status: Some(status.as_u16()),
                        error: None,
                        body_sample: None,
                        body: options.capture_body.then_some(body),
                    }
                } else {
                    RequestOutcome {
                        url: url.to_string(),
                        elapsed,
                        success: false,
                        status: Some(status.as_u16()),
                        error: None,
                        body_sample: Some(truncate_chars(
                            &String::from_utf8_lossy(&body),
                            BODY_SAMPLE_LIMIT,
                        )),
                        body: None,
                    }
                }
            }
            Err(e) => RequestOutcome {
                url: url.to_string(),
                elapsed: start.elapsed(),
                success: false,
                status: None,
                error: Some(describe_transport_error(&e)),
                body_sample: None,
                body: None,
            },
        };

        let label = match (outcome.success, outcome.status) {
            (true, _) => "success",
            (false, Some(_)) => "http_error",
            (false, None) => "transport_error",
        };
        counter!("loadrun_probe_requests_total", "outcome" => label).increment(1);
        histogram!("loadrun_probe_duration_seconds").record(outcome.elapsed);
        trace!(
            "probe {} -> {} in {:?}",
            outcome.url, label, outcome.elapsed
        );

        outcome
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timeout: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}

/// Keep at most `max` characters, never splitting a code point
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
