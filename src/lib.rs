//! IPv6 Proxy Harvest
//!
//! Aggregates public proxy lists, keeps the IPv6 entries, checks each one
//! through an echo endpoint and writes the working set to a result file.

pub mod config;
pub mod error;
pub mod output;
pub mod proxy;
pub mod runner;

#[cfg(test)]
mod test_support;

pub use config::HarvestConfig;
pub use error::{Error, ErrorKind, Result};
pub use output::{ResultFile, Sentinel};
pub use proxy::*;
pub use runner::{RunReport, RunStatus, Runner};
