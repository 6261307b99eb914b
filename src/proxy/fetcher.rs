//! Source fetcher: downloads raw proxy lists with bounded retries
//!
//! Each attempt is bounded by the client timeout. Transport failures are
//! retried immediately; a non-2xx answer is final for that source.

use crate::config::HarvestConfig;
use crate::error::{Error, Result};
use crate::proxy::models::{ProxySource, SourceKind};
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Source fetcher
pub struct SourceFetcher {
    client: Client,
    retries: u32,
    cancel: CancellationToken,
}

impl SourceFetcher {
    /// Create a fetcher from the harvest configuration
    pub fn new(config: &HarvestConfig, cancel: CancellationToken) -> Result<Self> {
        Self::with_settings(
            config.fetch_timeout(),
            config.fetch_retries,
            &config.user_agent,
            cancel,
        )
    }

    pub fn with_settings(
        timeout: Duration,
        retries: u32,
        user_agent: &str,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            retries: retries.max(1),
            cancel,
        })
    }

    /// Fetch the raw payload of a source
    ///
    /// `api` sources receive the country hint as a `country` query parameter.
    pub async fn fetch(&self, source: &ProxySource, country: Option<&str>) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.retries {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                result = self.fetch_once(source, country) => result,
            };

            match result {
                Ok(body) => {
                    info!(
                        "Fetched {} bytes from {} (attempt {})",
                        body.len(),
                        source.name,
                        attempt
                    );
                    return Ok(body);
                }
                Err(Error::Status(code)) => {
                    warn!("{} returned status {}", source.name, code);
                    return Err(Error::Status(code));
                }
                Err(e) => {
                    warn!("{} attempt {} failed: {}", source.name, attempt, e);
                    last_error = Some(e);
                }
            }
        }

        warn!("{}: all {} attempts failed", source.name, self.retries);
        Err(last_error.unwrap_or_else(|| Error::Network("no attempt made".to_string())))
    }

    async fn fetch_once(&self, source: &ProxySource, country: Option<&str>) -> Result<String> {
        let mut request = self.client.get(&source.url);
        if source.kind == SourceKind::Api {
            if let Some(country) = country {
                request = request.query(&[("country", country)]);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}
