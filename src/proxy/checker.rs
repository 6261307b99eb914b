//! Proxy checker: one validation request per candidate, sequentially

use crate::config::{HarvestConfig, DEFAULT_ECHO_URL};
use crate::error::{Error, Result};
use crate::proxy::models::{Candidate, TestOutcome};
use reqwest::{Client, Proxy as ReqwestProxy, StatusCode};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default pause between two checks in milliseconds
const DEFAULT_DELAY_MS: u64 = 300;

/// Configuration for proxy checker
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each proxy check
    pub timeout: Duration,
    /// Latency a working proxy must stay under
    pub max_latency: Duration,
    /// Pause between two checks
    pub delay: Duration,
    /// URL to test proxies against
    pub echo_url: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_latency: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            echo_url: DEFAULT_ECHO_URL.to_string(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_harvest(config: &HarvestConfig) -> Self {
        Self {
            timeout: config.test_timeout(),
            max_latency: config.max_latency(),
            delay: config.test_delay(),
            echo_url: config.echo_url.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = max_latency;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_echo_url(mut self, url: String) -> Self {
        self.echo_url = url;
        self
    }
}

/// Proxy checker for validating candidates
pub struct ProxyChecker {
    config: CheckerConfig,
    cancel: CancellationToken,
}

impl ProxyChecker {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_config(CheckerConfig::default(), cancel)
    }

    pub fn with_config(config: CheckerConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Check a single candidate
    ///
    /// Never fails: every error becomes a failed outcome carrying the time
    /// spent before it occurred.
    pub async fn check(&self, candidate: &Candidate) -> TestOutcome {
        let client = match self.create_client(candidate) {
            Ok(client) => client,
            Err(e) => return TestOutcome::failed(candidate.clone(), Duration::ZERO, e.to_string()),
        };

        let start = Instant::now();
        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return TestOutcome::failed(
                    candidate.clone(),
                    start.elapsed(),
                    Error::Cancelled.to_string(),
                );
            }
            response = tokio::time::timeout(
                self.config.timeout,
                client.get(&self.config.echo_url).send(),
            ) => response,
        };
        let latency = start.elapsed();

        match response {
            Ok(Ok(response)) => {
                let status = response.status();
                if self.is_success(status, latency) {
                    TestOutcome::working(candidate.clone(), latency)
                } else if status != StatusCode::OK {
                    TestOutcome::failed(
                        candidate.clone(),
                        latency,
                        format!("HTTP status: {}", status),
                    )
                } else {
                    TestOutcome::failed(
                        candidate.clone(),
                        latency,
                        format!("latency {}ms over ceiling", latency.as_millis()),
                    )
                }
            }
            Ok(Err(e)) => {
                TestOutcome::failed(candidate.clone(), latency, Error::from(e).to_string())
            }
            Err(_) => TestOutcome::failed(candidate.clone(), latency, Error::Timeout.to_string()),
        }
    }

    /// A check passes on HTTP 200 within the latency ceiling
    pub fn is_success(&self, status: StatusCode, latency: Duration) -> bool {
        status == StatusCode::OK && latency < self.config.max_latency
    }

    /// Check candidates one after another, pausing between checks
    ///
    /// Returns `Error::Cancelled` as soon as the cancellation token fires;
    /// outcomes gathered so far are discarded.
    pub async fn check_all(&self, candidates: &[Candidate]) -> Result<Vec<TestOutcome>> {
        let mut outcomes = Vec::with_capacity(candidates.len());

        for (index, candidate) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outcome = self.check(candidate).await;
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            log_outcome(&outcome);
            outcomes.push(outcome);

            if index + 1 < candidates.len() && !self.config.delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(self.config.delay) => {}
                }
            }
        }

        Ok(outcomes)
    }

    /// Create a single-use client routed through the candidate
    fn create_client(&self, candidate: &Candidate) -> Result<Client> {
        let proxy = ReqwestProxy::all(candidate.url())?;

        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.config.timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(client)
    }
}

fn log_outcome(outcome: &TestOutcome) {
    let latency = outcome.latency.as_secs_f64();
    match &outcome.error {
        None => info!("Test {} - ok ({:.2}s)", outcome.candidate, latency),
        Some(error) => warn!(
            "Test {} - failed ({:.2}s): {}",
            outcome.candidate, latency, error
        ),
    }
}
