//! Harvest configuration
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. With no file at all the built-in source list is used.

use crate::error::{Error, Result};
use crate::proxy::models::{
    is_country_code, ProxyProtocol, ProxySource, SourceFormat, SourceKind, DEFAULT_COUNTRY,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default user agent for source requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default URL to test proxies against
pub const DEFAULT_ECHO_URL: &str = "https://httpbin.org/ip";

/// Default result file
pub const DEFAULT_OUTPUT: &str = "proxies_success.txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Country codes to request from each source
    #[serde(default = "default_countries")]
    pub countries: Vec<String>,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Per-attempt source timeout (seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Attempts per source, transport errors only
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    /// Lines or items read from each source response
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Candidates kept from each (country, source) pair
    #[serde(default = "default_per_source")]
    pub per_source: usize,
    /// Hard cap on candidates tested per run
    #[serde(default = "default_cap")]
    pub cap: usize,
    #[serde(default = "default_echo_url")]
    pub echo_url: String,
    /// Validation request timeout (seconds)
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
    /// Latency ceiling for a successful test (milliseconds); defaults to the test timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    /// Pause between two validation requests (milliseconds)
    #[serde(default = "default_test_delay_ms")]
    pub test_delay_ms: u64,
    /// Inclusive port range assigned to CIDR-derived candidates
    #[serde(default = "default_port_range")]
    pub port_range: (u16, u16),
    #[serde(default = "default_country")]
    pub default_country: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_sources")]
    pub sources: Vec<ProxySource>,
}

fn default_countries() -> Vec<String> {
    ["US", "JP", "KR", "SG", "TW", "HK"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_fetch_retries() -> u32 {
    3
}

fn default_max_lines() -> usize {
    10
}

fn default_per_source() -> usize {
    3
}

fn default_cap() -> usize {
    30
}

fn default_echo_url() -> String {
    DEFAULT_ECHO_URL.to_string()
}

fn default_test_timeout_secs() -> u64 {
    10
}

fn default_test_delay_ms() -> u64 {
    300
}

fn default_port_range() -> (u16, u16) {
    (80, 1080)
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Built-in public sources
pub fn default_sources() -> Vec<ProxySource> {
    use ProxyProtocol::{Http, Socks5};
    use SourceFormat::*;
    use SourceKind::{Api, Json, Txt};

    vec![
        ProxySource::new(
            "prxchk_socks5_ipv6",
            "https://raw.githubusercontent.com/prxchk/proxy-list/main/socks5.txt",
            IpPort,
            Txt,
            Socks5,
        ),
        ProxySource::new(
            "cloudflare_ips_v6",
            "https://www.cloudflare.com/ips-v6/",
            CidrList,
            Txt,
            Http,
        ),
        ProxySource::new(
            "davie3_cf_ipv6",
            "https://raw.githubusercontent.com/Davie3/mikrotik-cloudflare-iplist/main/cloudflare-ips-v6.rsc",
            IpPort,
            Txt,
            Socks5,
        ),
        ProxySource::new(
            "ircfspace_cf_ips",
            "https://raw.githubusercontent.com/ircfspace/cf-ip-ranges/main/cloudflare-ipv6.json",
            JsonCidr,
            Json,
            Http,
        ),
        ProxySource::new(
            "proxyscrape_socks5_ipv6",
            "https://api.proxyscrape.com/v2/?request=get&protocol=socks5&timeout=10000&anonymity=elite",
            IpPort,
            Api,
            Socks5,
        ),
        ProxySource::new(
            "pubproxy_socks5_ipv6",
            "http://pubproxy.com/api/proxy?limit=10&type=socks5",
            JsonIpPortCountry,
            Api,
            Socks5,
        ),
        ProxySource::new(
            "getproxylist_socks5_ipv6",
            "https://api.getproxylist.com/proxy?protocol[]=socks5&anonLevel[]=1&limit=10",
            JsonIpPort,
            Api,
            Socks5,
        ),
        ProxySource::new(
            "TheSpeedX_socks5_ipv6",
            "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/socks5.txt",
            IpPort,
            Txt,
            Socks5,
        ),
        ProxySource::new(
            "jetkai_socks5_ipv6",
            "https://raw.githubusercontent.com/jetkai/proxy-list/main/online-proxies/txt/proxies-socks5.txt",
            IpPort,
            Txt,
            Socks5,
        ),
        ProxySource::new(
            "gfpcom_socks5_ipv6",
            "https://raw.githubusercontent.com/gfpcom/free-proxy-list/main/proxies/socks5.txt",
            IpPort,
            Txt,
            Socks5,
        ),
    ]
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            countries: default_countries(),
            output: default_output(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_retries: default_fetch_retries(),
            max_lines: default_max_lines(),
            per_source: default_per_source(),
            cap: default_cap(),
            echo_url: default_echo_url(),
            test_timeout_secs: default_test_timeout_secs(),
            max_latency_ms: None,
            test_delay_ms: default_test_delay_ms(),
            port_range: default_port_range(),
            default_country: default_country(),
            user_agent: default_user_agent(),
            sources: default_sources(),
        }
    }
}

impl HarvestConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            warn!("Cannot read config file {:?}: {}", path, e);
            Error::Config(format!("cannot read {:?}: {}", path, e))
        })?;

        let config: Self = toml::from_str(&content)?;
        info!(
            "Loaded config from {:?}: {} sources, {} countries",
            path,
            config.sources.len(),
            config.countries.len()
        );
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.countries.is_empty() {
            return Err(Error::Config("no countries configured".to_string()));
        }
        if let Some(code) = self
            .countries
            .iter()
            .chain(std::iter::once(&self.default_country))
            .find(|c| !is_country_code(c))
        {
            return Err(Error::Config(format!("invalid country code {:?}", code)));
        }
        if self.sources.is_empty() {
            return Err(Error::Config("no sources configured".to_string()));
        }
        if let Some(source) = self
            .sources
            .iter()
            .find(|s| s.name.is_empty() || !s.url.starts_with("http"))
        {
            return Err(Error::Config(format!(
                "source {:?} has an invalid url {:?}",
                source.name, source.url
            )));
        }
        if self.cap == 0 || self.per_source == 0 || self.max_lines == 0 {
            return Err(Error::Config(
                "cap, per_source and max_lines must be positive".to_string(),
            ));
        }
        if self.fetch_retries == 0 {
            return Err(Error::Config("fetch_retries must be at least 1".to_string()));
        }
        if self.fetch_timeout_secs == 0 || self.test_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        let (low, high) = self.port_range;
        if low == 0 || low > high {
            return Err(Error::Config(format!(
                "invalid port range {}-{}",
                low, high
            )));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Latency ceiling; the test timeout unless set explicitly
    pub fn max_latency(&self) -> Duration {
        self.max_latency_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.test_timeout())
    }

    pub fn test_delay(&self) -> Duration {
        Duration::from_millis(self.test_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HarvestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.countries, vec!["US", "JP", "KR", "SG", "TW", "HK"]);
        assert_eq!(config.sources.len(), 10);
        assert_eq!(config.cap, 30);
        assert_eq!(config.per_source, 3);
        assert_eq!(config.max_lines, 10);
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
    }

    #[test]
    fn test_latency_ceiling_follows_timeout() {
        let mut config = HarvestConfig::default();
        assert_eq!(config.max_latency(), config.test_timeout());

        config.max_latency_ms = Some(2500);
        assert_eq!(config.max_latency(), Duration::from_millis(2500));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: HarvestConfig = toml::from_str(
            r#"
countries = ["DE"]
cap = 5

[[sources]]
name = "local"
url = "http://127.0.0.1:9/list.txt"
format = "ip_port"
protocol = "socks5"
"#,
        )
        .unwrap();

        assert_eq!(config.countries, vec!["DE"]);
        assert_eq!(config.cap, 5);
        assert_eq!(config.per_source, 3);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].kind, SourceKind::Txt);
        assert_eq!(config.sources[0].protocol, ProxyProtocol::Socks5);
        assert_eq!(config.sources[0].cidr_field, "ipv6_cidrs");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HarvestConfig::default();
        config.countries.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = HarvestConfig::default();
        config.port_range = (2000, 1000);
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.countries = vec!["US".to_string(), "U#S".to_string()];
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = HarvestConfig::default();
        config.cap = 0;
        assert!(config.validate().is_err());

        let mut config = HarvestConfig::default();
        config.sources[0].url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");

        let config = HarvestConfig::default();
        config.save_to_file(&path).unwrap();
        let loaded = HarvestConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = HarvestConfig::from_file("/nonexistent/harvest.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
