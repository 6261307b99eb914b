//! Format parsers turning raw source payloads into candidates

use crate::config::HarvestConfig;
use crate::error::{Error, Result};
use crate::proxy::address::{is_ipv6, random_host, split_host_port};
use crate::proxy::models::{is_country_code, Candidate, ProxyProtocol, ProxySource, SourceFormat};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Matches an IPv6 CIDR block embedded in a line, e.g. `add address=2400:cb00::/32`
static CIDR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9A-Fa-f]{0,4}(?::[0-9A-Fa-f]{0,4}){2,7}/\d{1,3}")
        .expect("Invalid CIDR regex")
});

/// Parser for source payloads
#[derive(Debug, Clone)]
pub struct SourceParser {
    /// Lines or JSON items considered per payload
    max_lines: usize,
    /// Inclusive port range for CIDR-derived candidates
    port_range: (u16, u16),
    default_country: String,
}

impl Default for SourceParser {
    fn default() -> Self {
        Self::from_config(&HarvestConfig::default())
    }
}

impl SourceParser {
    pub fn new(max_lines: usize, port_range: (u16, u16), default_country: &str) -> Self {
        Self {
            max_lines,
            port_range,
            default_country: default_country.to_uppercase(),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(config.max_lines, config.port_range, &config.default_country)
    }

    /// Parse a payload according to the source's declared format
    ///
    /// Malformed lines and items are skipped. Only a payload that cannot be
    /// read as a whole (invalid JSON, missing array) is an error.
    pub fn parse(
        &self,
        source: &ProxySource,
        body: &str,
        country: Option<&str>,
    ) -> Result<Vec<Candidate>> {
        let country = country.unwrap_or(self.default_country.as_str());

        let candidates = match source.format {
            SourceFormat::IpPort => self.parse_ip_port(body, country, source.protocol),
            SourceFormat::CidrList => self.parse_cidr_list(body, country, source.protocol),
            SourceFormat::JsonCidr => {
                self.parse_json_cidr(body, &source.cidr_field, country, source.protocol)?
            }
            SourceFormat::JsonIpPort => {
                self.parse_json_ip_port(body, country, source.protocol, false)?
            }
            SourceFormat::JsonIpPortCountry => {
                self.parse_json_ip_port(body, country, source.protocol, true)?
            }
        };

        debug!(
            "{} ({}) yielded {} candidates",
            source.name,
            source.format,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Plain `ip:port` lines, IPv6 hosts only
    pub fn parse_ip_port(
        &self,
        body: &str,
        country: &str,
        protocol: ProxyProtocol,
    ) -> Vec<Candidate> {
        body.trim()
            .lines()
            .take(self.max_lines)
            .filter_map(|line| Self::parse_ip_port_line(line, country, protocol))
            .collect()
    }

    /// Parse one line; the first whitespace-separated token holds the endpoint
    pub fn parse_ip_port_line(
        line: &str,
        country: &str,
        protocol: ProxyProtocol,
    ) -> Option<Candidate> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || !line.contains(':') {
            return None;
        }

        let token = line.split_whitespace().next()?;
        let (host, port) = split_host_port(token)?;
        if !is_ipv6(host) {
            return None;
        }

        Some(Candidate::new(host.parse().ok()?, port, country, protocol))
    }

    /// Lines containing an IPv6 CIDR block, one random host each
    pub fn parse_cidr_list(
        &self,
        body: &str,
        country: &str,
        protocol: ProxyProtocol,
    ) -> Vec<Candidate> {
        body.trim()
            .lines()
            .take(self.max_lines)
            .filter(|line| line.contains('/') && line.contains(':'))
            .filter_map(|line| CIDR_REGEX.find(line).map(|m| m.as_str()))
            .filter_map(|cidr| self.expand_cidr(cidr, country, protocol))
            .collect()
    }

    /// JSON object carrying an array of CIDR strings under `field`
    pub fn parse_json_cidr(
        &self,
        body: &str,
        field: &str,
        country: &str,
        protocol: ProxyProtocol,
    ) -> Result<Vec<Candidate>> {
        let value: Value = serde_json::from_str(body)?;
        let entries = match &value {
            Value::Array(items) => items,
            Value::Object(map) => map
                .get(field)
                .and_then(Value::as_array)
                .ok_or_else(|| Error::Parse(format!("missing array field {:?}", field)))?,
            _ => return Err(Error::Parse("expected a JSON object or array".to_string())),
        };

        Ok(entries
            .iter()
            .take(self.max_lines)
            .filter_map(Value::as_str)
            .filter_map(|cidr| self.expand_cidr(cidr, country, protocol))
            .collect())
    }

    /// JSON records with `ip`/`port` (and optionally `country`) fields
    pub fn parse_json_ip_port(
        &self,
        body: &str,
        country: &str,
        protocol: ProxyProtocol,
        use_record_country: bool,
    ) -> Result<Vec<Candidate>> {
        let value: Value = serde_json::from_str(body)?;

        Ok(json_records(&value)
            .into_iter()
            .take(self.max_lines)
            .filter_map(|record| {
                let record_country = record
                    .get("country")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|c| use_record_country && is_country_code(c));
                json_record_candidate(record, record_country.unwrap_or(country), protocol)
            })
            .collect())
    }

    fn expand_cidr(
        &self,
        cidr: &str,
        country: &str,
        protocol: ProxyProtocol,
    ) -> Option<Candidate> {
        let address = random_host(cidr)?;
        let (low, high) = self.port_range;
        let port = rand::thread_rng().gen_range(low..=high);
        Some(Candidate::new(address, port, country, protocol))
    }

    /// Read candidate lines from a file, skipping anything that is not a candidate
    pub fn parse_candidates_file<P: AsRef<Path>>(path: P) -> Result<Vec<Candidate>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse_candidates(&content))
    }

    pub fn parse_candidates(content: &str) -> Vec<Candidate> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match line.parse::<Candidate>() {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    warn!("Skipping line {:?}: {}", line, e);
                    None
                }
            })
            .collect()
    }
}

/// Records are the top-level object, a top-level array, or a `data` array
fn json_records(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![value],
        },
        _ => Vec::new(),
    }
}

fn json_record_candidate(
    record: &Value,
    country: &str,
    protocol: ProxyProtocol,
) -> Option<Candidate> {
    let ip = record.get("ip")?.as_str()?.trim();
    if !is_ipv6(ip) {
        return None;
    }

    let port = match record.get("port")? {
        Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if port == 0 {
        return None;
    }

    Some(Candidate::new(ip.parse().ok()?, port, country, protocol))
}
