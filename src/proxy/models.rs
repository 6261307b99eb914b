//! Proxy data models

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::str::FromStr;
use std::time::Duration;

/// Country tag used when a candidate carries no country hint
pub const DEFAULT_COUNTRY: &str = "US";

/// Separator between the fields of a candidate's text form
pub const FIELD_SEPARATOR: char = '#';

/// Two or three ASCII letters, e.g. `US` or `GBR`
pub fn is_country_code(code: &str) -> bool {
    (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Protocol a proxy is assumed to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    #[default]
    Http,
    Socks5,
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyProtocol::Http => write!(f, "http"),
            ProxyProtocol::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(ProxyProtocol::Http),
            "socks5" => Ok(ProxyProtocol::Socks5),
            other => Err(Error::Parse(format!(
                "Invalid proxy protocol: {}. Use: http, socks5",
                other
            ))),
        }
    }
}

/// Payload layout a source serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Plain text, one `ip:port` per line
    IpPort,
    /// Plain text, one CIDR block per line
    CidrList,
    /// JSON object holding an array of CIDR strings
    JsonCidr,
    /// JSON record(s) with `ip` and `port` fields
    JsonIpPort,
    /// Like `JsonIpPort`, plus a `country` field
    JsonIpPortCountry,
}

impl SourceFormat {
    pub fn is_json(&self) -> bool {
        matches!(
            self,
            SourceFormat::JsonCidr | SourceFormat::JsonIpPort | SourceFormat::JsonIpPortCountry
        )
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceFormat::IpPort => "ip_port",
            SourceFormat::CidrList => "cidr_list",
            SourceFormat::JsonCidr => "json_cidr",
            SourceFormat::JsonIpPort => "json_ip_port",
            SourceFormat::JsonIpPortCountry => "json_ip_port_country",
        };
        write!(f, "{}", name)
    }
}

/// How a source is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Static text file
    #[default]
    Txt,
    /// Static JSON document
    Json,
    /// Query API; receives the country hint as a query parameter
    Api,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Txt => write!(f, "txt"),
            SourceKind::Json => write!(f, "json"),
            SourceKind::Api => write!(f, "api"),
        }
    }
}

fn default_cidr_field() -> String {
    "ipv6_cidrs".to_string()
}

/// Static description of one proxy-list provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySource {
    /// Name of the proxy source
    pub name: String,
    /// URL to fetch, or base URL for `api` sources
    pub url: String,
    pub format: SourceFormat,
    #[serde(default)]
    pub kind: SourceKind,
    /// Protocol assigned to every proxy from this source
    #[serde(default)]
    pub protocol: ProxyProtocol,
    /// JSON field holding the CIDR array for `json_cidr` sources
    #[serde(default = "default_cidr_field")]
    pub cidr_field: String,
}

impl ProxySource {
    pub fn new(
        name: &str,
        url: &str,
        format: SourceFormat,
        kind: SourceKind,
        protocol: ProxyProtocol,
    ) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            format,
            kind,
            protocol,
            cidr_field: default_cidr_field(),
        }
    }

    pub fn with_cidr_field(mut self, field: &str) -> Self {
        self.cidr_field = field.to_string();
        self
    }
}

/// A parsed, not yet validated IPv6 proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub address: Ipv6Addr,
    pub port: u16,
    pub country: String,
    pub protocol: ProxyProtocol,
}

impl Candidate {
    pub fn new(address: Ipv6Addr, port: u16, country: &str, protocol: ProxyProtocol) -> Self {
        Self {
            address,
            port,
            country: country.to_uppercase(),
            protocol,
        }
    }

    pub fn socket_addr(&self) -> SocketAddrV6 {
        SocketAddrV6::new(self.address, self.port, 0, 0)
    }

    /// Proxy URL, e.g. `socks5://[2001:db8::1]:1080`
    pub fn url(&self) -> String {
        format!("{}://{}", self.protocol, self.socket_addr())
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.socket_addr(),
            self.country,
            self.protocol,
            sep = FIELD_SEPARATOR
        )
    }
}

impl FromStr for Candidate {
    type Err = Error;

    /// Parses `[addr]:port#CC#protocol`; the country and protocol fields may be omitted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.trim().split(FIELD_SEPARATOR);
        let endpoint = fields.next().unwrap_or_default();
        let country = fields
            .next()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COUNTRY);
        let protocol = match fields.next() {
            Some(p) if !p.is_empty() => p.parse()?,
            _ => ProxyProtocol::default(),
        };

        let (host, port) = crate::proxy::address::split_host_port(endpoint)
            .ok_or_else(|| Error::Parse(format!("Invalid proxy endpoint: {}", endpoint)))?;
        let address: Ipv6Addr = host
            .parse()
            .map_err(|_| Error::Parse(format!("Not an IPv6 address: {}", host)))?;

        Ok(Candidate::new(address, port, country, protocol))
    }
}

/// Outcome of a single validation request
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub candidate: Candidate,
    pub success: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn working(candidate: Candidate, latency: Duration) -> Self {
        Self {
            candidate,
            success: true,
            latency,
            error: None,
        }
    }

    pub fn failed(candidate: Candidate, latency: Duration, error: String) -> Self {
        Self {
            candidate,
            success: false,
            latency,
            error: Some(error),
        }
    }

    pub fn is_working(&self) -> bool {
        self.success
    }
}

/// Per-run counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Successful candidates per country
    pub per_country: BTreeMap<String, usize>,
    pub tested: usize,
    pub failed: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: &TestOutcome) {
        self.tested += 1;
        if outcome.is_working() {
            *self
                .per_country
                .entry(outcome.candidate.country.clone())
                .or_insert(0) += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn succeeded(&self) -> usize {
        self.per_country.values().sum()
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let countries: Vec<String> = self
            .per_country
            .iter()
            .map(|(country, count)| format!("{}={}", country, count))
            .collect();
        write!(
            f,
            "{} tested, {} ok, {} failed [{}]",
            self.tested,
            self.succeeded(),
            self.failed,
            countries.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate::new("2001:db8::1".parse().unwrap(), 1080, "jp", ProxyProtocol::Socks5)
    }

    #[test]
    fn test_candidate_display() {
        assert_eq!(candidate().to_string(), "[2001:db8::1]:1080#JP#socks5");
    }

    #[test]
    fn test_candidate_url() {
        assert_eq!(candidate().url(), "socks5://[2001:db8::1]:1080");

        let http = Candidate::new("::1".parse().unwrap(), 8080, "US", ProxyProtocol::Http);
        assert_eq!(http.url(), "http://[::1]:8080");
    }

    #[test]
    fn test_candidate_from_str() {
        let parsed: Candidate = "[2001:db8::1]:1080#JP#socks5".parse().unwrap();
        assert_eq!(parsed, candidate());

        let bare: Candidate = "2001:db8::1:1080".parse().unwrap();
        assert_eq!(bare.port, 1080);
        assert_eq!(bare.country, DEFAULT_COUNTRY);
        assert_eq!(bare.protocol, ProxyProtocol::Http);
    }

    #[test]
    fn test_candidate_from_str_rejects_ipv4() {
        assert!("192.0.2.1:80#US#http".parse::<Candidate>().is_err());
        assert!("garbage".parse::<Candidate>().is_err());
        assert!("[2001:db8::1]:1080#US#ftp".parse::<Candidate>().is_err());
    }

    #[test]
    fn test_country_codes() {
        assert!(is_country_code("US"));
        assert!(is_country_code("gbr"));
        assert!(!is_country_code("U#S"));
        assert!(!is_country_code("United States"));
        assert!(!is_country_code("U"));
        assert!(!is_country_code(""));
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("SOCKS5".parse::<ProxyProtocol>().unwrap(), ProxyProtocol::Socks5);
        assert_eq!("http".parse::<ProxyProtocol>().unwrap(), ProxyProtocol::Http);
        assert!("socks4".parse::<ProxyProtocol>().is_err());
    }

    #[test]
    fn test_source_format_serde_names() {
        let json = serde_json::to_string(&SourceFormat::JsonIpPortCountry).unwrap();
        assert_eq!(json, "\"json_ip_port_country\"");
        assert_eq!(SourceFormat::CidrList.to_string(), "cidr_list");
        assert!(SourceFormat::JsonCidr.is_json());
        assert!(!SourceFormat::IpPort.is_json());
    }

    #[test]
    fn test_run_stats() {
        let mut stats = RunStats::default();
        stats.record(&TestOutcome::working(candidate(), Duration::from_millis(120)));
        stats.record(&TestOutcome::failed(
            candidate(),
            Duration::ZERO,
            "Connection refused".to_string(),
        ));

        assert_eq!(stats.tested, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded(), 1);
        assert_eq!(stats.per_country.get("JP"), Some(&1));
        assert_eq!(stats.to_string(), "2 tested, 1 ok, 1 failed [JP=1]");
    }
}
