//! Proxy module for harvesting and validating IPv6 proxies
//!
//! This module provides functionality for:
//! - Validating IPv6 tokens and expanding CIDR blocks to hosts
//! - Fetching proxy lists from remote sources with bounded retries
//! - Parsing plain-text and JSON payloads into candidates
//! - Aggregating, deduplicating and capping candidates across sources
//! - Checking candidates through a fixed echo endpoint

pub mod address;
pub mod aggregator;
pub mod checker;
pub mod fetcher;
pub mod models;
pub mod parser;

pub use aggregator::{Aggregator, SweepResult};
pub use checker::{CheckerConfig, ProxyChecker};
pub use fetcher::SourceFetcher;
pub use models::{
    Candidate, ProxyProtocol, ProxySource, RunStats, SourceFormat, SourceKind, TestOutcome,
};
pub use parser::SourceParser;
