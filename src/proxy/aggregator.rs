//! Aggregator: sweeps every (country, source) pair and builds the test list

use crate::config::HarvestConfig;
use crate::error::{ErrorKind, Result};
use crate::proxy::fetcher::SourceFetcher;
use crate::proxy::models::{Candidate, ProxySource};
use crate::proxy::parser::SourceParser;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::{info, warn};

/// Result of sweeping a single (country, source) pair
#[derive(Debug, Clone)]
pub struct SweepResult {
    pub source: String,
    pub country: String,
    /// Candidates kept from this pair
    pub candidates: Vec<Candidate>,
    /// Error message if fetching or parsing failed
    pub error: Option<String>,
}

impl SweepResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregator over a fixed set of sources and countries
pub struct Aggregator {
    sources: Vec<ProxySource>,
    countries: Vec<String>,
    per_source: usize,
    cap: usize,
    fetcher: SourceFetcher,
    parser: SourceParser,
}

impl Aggregator {
    pub fn new(config: &HarvestConfig, fetcher: SourceFetcher) -> Self {
        Self {
            sources: config.sources.clone(),
            countries: config.countries.clone(),
            per_source: config.per_source,
            cap: config.cap,
            fetcher,
            parser: SourceParser::from_config(config),
        }
    }

    /// Fetch and parse one pair, keeping at most `per_source` candidates
    ///
    /// Transient and parse errors are folded into the result; only
    /// cancellation is returned as an error.
    pub async fn sweep_pair(&self, source: &ProxySource, country: &str) -> Result<SweepResult> {
        let parsed = match self.fetcher.fetch(source, Some(country)).await {
            Ok(body) => self.parser.parse(source, &body, Some(country)),
            Err(e) => Err(e),
        };

        let (candidates, error) = match parsed {
            Ok(mut candidates) => {
                candidates.truncate(self.per_source);
                (candidates, None)
            }
            Err(e) if e.kind() == ErrorKind::Cancelled => return Err(e),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        match &error {
            None => info!(
                "Pulled {} IPv6 candidates from {} for {}",
                candidates.len(),
                source.name,
                country
            ),
            Some(e) => warn!("No candidates from {} for {}: {}", source.name, country, e),
        }

        Ok(SweepResult {
            source: source.name.clone(),
            country: country.to_string(),
            candidates,
            error,
        })
    }

    /// Sweep all pairs and return the deduplicated, capped, shuffled candidate list
    pub async fn collect(&self) -> Result<Vec<Candidate>> {
        let mut all = Vec::new();

        for country in &self.countries {
            for source in &self.sources {
                let result = self.sweep_pair(source, country).await?;
                all.extend(result.candidates);
            }
        }

        let mut unique = dedup_and_cap(all, self.cap);
        unique.shuffle(&mut rand::thread_rng());
        info!("Total unique IPv6 candidates: {}", unique.len());
        Ok(unique)
    }
}

/// Drop repeated candidates (by text form) keeping first-seen order, then truncate
pub fn dedup_and_cap(candidates: Vec<Candidate>, cap: usize) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.to_string()))
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::proxy::models::{ProxyProtocol, SourceFormat, SourceKind};
    use ipnet::Ipv6Net;
    use tokio_util::sync::CancellationToken;

    fn candidate(host: &str, country: &str) -> Candidate {
        Candidate::new(host.parse().unwrap(), 1080, country, ProxyProtocol::Socks5)
    }

    fn fixture_config(sources: Vec<ProxySource>, countries: &[&str]) -> HarvestConfig {
        HarvestConfig {
            sources,
            countries: countries.iter().map(|c| c.to_string()).collect(),
            fetch_retries: 1,
            ..HarvestConfig::default()
        }
    }

    fn aggregator(config: &HarvestConfig) -> Aggregator {
        let fetcher = SourceFetcher::new(config, CancellationToken::new()).unwrap();
        Aggregator::new(config, fetcher)
    }

    #[test]
    fn test_dedup_preserves_first_seen_order() {
        let input = vec![
            candidate("2001:db8::1", "US"),
            candidate("2001:db8::2", "US"),
            candidate("2001:db8::1", "US"),
            candidate("2001:db8::1", "JP"),
        ];
        let output = dedup_and_cap(input, 30);
        let lines: Vec<String> = output.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "[2001:db8::1]:1080#US#socks5",
                "[2001:db8::2]:1080#US#socks5",
                "[2001:db8::1]:1080#JP#socks5",
            ]
        );
    }

    #[test]
    fn test_cap_applies_after_dedup() {
        let input: Vec<Candidate> = (1..=50)
            .flat_map(|i| {
                let host = format!("2001:db8::{:x}", i);
                vec![candidate(&host, "US"), candidate(&host, "US")]
            })
            .collect();
        let output = dedup_and_cap(input, 30);
        assert_eq!(output.len(), 30);

        let unique: HashSet<String> = output.iter().map(|c| c.to_string()).collect();
        assert_eq!(unique.len(), 30);
    }

    #[tokio::test]
    async fn test_collect_across_countries_and_sources() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/socks5.txt")
            .with_status(200)
            .with_body("[2001:db8::1]:1080\n192.0.2.1:80\n[2001:db8::2]:443\n[2001:db8::3]:443\n[2001:db8::4]:443")
            .create_async()
            .await;
        let _cidr = server
            .mock("GET", "/ipv6.json")
            .with_status(200)
            .with_body(r#"{"ipv6_cidrs": ["2001:db8:ffff::/64"]}"#)
            .create_async()
            .await;
        let _down = server
            .mock("GET", "/down.txt")
            .with_status(500)
            .create_async()
            .await;

        let sources = vec![
            ProxySource::new(
                "list",
                &format!("{}/socks5.txt", server.url()),
                SourceFormat::IpPort,
                SourceKind::Txt,
                ProxyProtocol::Socks5,
            ),
            ProxySource::new(
                "cidr",
                &format!("{}/ipv6.json", server.url()),
                SourceFormat::JsonCidr,
                SourceKind::Json,
                ProxyProtocol::Http,
            ),
            ProxySource::new(
                "down",
                &format!("{}/down.txt", server.url()),
                SourceFormat::IpPort,
                SourceKind::Txt,
                ProxyProtocol::Socks5,
            ),
        ];
        let config = fixture_config(sources, &["US", "JP"]);
        let candidates = aggregator(&config).collect().await.unwrap();

        // 3 from the list and 1 from the CIDR block, per country
        assert_eq!(candidates.len(), 8);
        let unique: HashSet<String> = candidates.iter().map(|c| c.to_string()).collect();
        assert_eq!(unique.len(), candidates.len());

        let block: Ipv6Net = "2001:db8:ffff::/64".parse().unwrap();
        let from_cidr: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.protocol == ProxyProtocol::Http)
            .collect();
        assert_eq!(from_cidr.len(), 2);
        assert!(from_cidr.iter().all(|c| block.contains(&c.address)));
        assert!(!candidates.iter().any(|c| c.address.to_string() == "2001:db8::4"));
    }

    #[tokio::test]
    async fn test_collect_respects_cap() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/list.txt")
            .with_status(200)
            .with_body("[2001:db8::1]:1080\n[2001:db8::2]:1080\n[2001:db8::3]:1080")
            .create_async()
            .await;

        let source = ProxySource::new(
            "list",
            &format!("{}/list.txt", server.url()),
            SourceFormat::IpPort,
            SourceKind::Txt,
            ProxyProtocol::Socks5,
        );
        let mut config = fixture_config(vec![source], &["US", "JP", "KR"]);
        config.cap = 4;

        let candidates = aggregator(&config).collect().await.unwrap();
        assert_eq!(candidates.len(), 4);
    }

    #[tokio::test]
    async fn test_sweep_pair_folds_parse_errors() {
        let mut server = mockito::Server::new_async().await;
        let _bad = server
            .mock("GET", "/bad.json")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let source = ProxySource::new(
            "bad",
            &format!("{}/bad.json", server.url()),
            SourceFormat::JsonIpPort,
            SourceKind::Api,
            ProxyProtocol::Socks5,
        );
        let config = fixture_config(vec![source.clone()], &["US"]);
        let result = aggregator(&config).sweep_pair(&source, "US").await.unwrap();

        assert!(!result.is_success());
        assert!(result.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_collect_cancelled() {
        let config = fixture_config(
            vec![ProxySource::new(
                "unused",
                "http://127.0.0.1:9/list.txt",
                SourceFormat::IpPort,
                SourceKind::Txt,
                ProxyProtocol::Socks5,
            )],
            &["US"],
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetcher = SourceFetcher::new(&config, cancel).unwrap();

        let result = Aggregator::new(&config, fetcher).collect().await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
