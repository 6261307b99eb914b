//! Run orchestration: aggregate, test, then write the result file

use crate::config::HarvestConfig;
use crate::error::{ErrorKind, Result};
use crate::output::{ResultFile, Sentinel};
use crate::proxy::{Aggregator, Candidate, CheckerConfig, ProxyChecker, RunStats, SourceFetcher};
use chrono::Local;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// All candidates tested; zero successes still counts
    Completed,
    Interrupted,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Interrupted => write!(f, "interrupted"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Unique candidates that went to testing
    pub candidates: usize,
    pub working: Vec<Candidate>,
    pub stats: RunStats,
    pub error: Option<String>,
}

impl RunReport {
    fn completed(harvest: Harvest) -> Self {
        Self {
            status: RunStatus::Completed,
            candidates: harvest.candidates,
            working: harvest.working,
            stats: harvest.stats,
            error: None,
        }
    }

    fn aborted(status: RunStatus, error: String) -> Self {
        Self {
            status,
            candidates: 0,
            working: Vec::new(),
            stats: RunStats::default(),
            error: Some(error),
        }
    }

    /// Process exit code: 0 for a completed run, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RunStatus::Completed => 0,
            RunStatus::Interrupted | RunStatus::Failed => 1,
        }
    }
}

struct Harvest {
    candidates: usize,
    working: Vec<Candidate>,
    stats: RunStats,
}

/// Runs the full harvest once
pub struct Runner {
    config: HarvestConfig,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(config: HarvestConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Run the pipeline and write the result file
    ///
    /// The result file is written exactly once on every path: the working
    /// candidates, or a sentinel for an empty, interrupted or failed run.
    pub async fn run(&self) -> RunReport {
        info!(
            "Starting multi-source IPv6 proxy harvest ({})",
            Local::now().format("%Y-%m-%d")
        );
        let output = ResultFile::new(&self.config.output);

        let report = match self.harvest().await {
            Ok(harvest) => match output.write_candidates(&harvest.working) {
                Ok(()) => RunReport::completed(harvest),
                Err(e) => {
                    error!("Cannot write result file {:?}: {}", self.config.output, e);
                    RunReport::aborted(RunStatus::Failed, e.to_string())
                }
            },
            Err(e) if e.kind() == ErrorKind::Cancelled => {
                warn!("Interrupted, writing sentinel to {:?}", self.config.output);
                write_sentinel(output, Sentinel::Interrupted);
                RunReport::aborted(RunStatus::Interrupted, e.to_string())
            }
            Err(e) => {
                error!("Harvest failed: {}", e);
                write_sentinel(output, Sentinel::Failed);
                RunReport::aborted(RunStatus::Failed, e.to_string())
            }
        };

        log_summary(&report, &self.config);
        report
    }

    async fn harvest(&self) -> Result<Harvest> {
        self.config.validate()?;

        let fetcher = SourceFetcher::new(&self.config, self.cancel.clone())?;
        let candidates = Aggregator::new(&self.config, fetcher).collect().await?;

        let checker = ProxyChecker::with_config(
            CheckerConfig::from_harvest(&self.config),
            self.cancel.clone(),
        );
        let outcomes = checker.check_all(&candidates).await?;

        let mut stats = RunStats::default();
        let mut working = Vec::new();
        for outcome in outcomes {
            stats.record(&outcome);
            if outcome.is_working() {
                working.push(outcome.candidate);
            }
        }

        Ok(Harvest {
            candidates: candidates.len(),
            working,
            stats,
        })
    }
}

fn write_sentinel(output: ResultFile, sentinel: Sentinel) {
    let path = output.path().to_path_buf();
    if let Err(e) = output.write_sentinel(sentinel) {
        error!("Cannot write sentinel to {:?}: {}", path, e);
    }
}

fn log_summary(report: &RunReport, config: &HarvestConfig) {
    match report.status {
        RunStatus::Completed => info!(
            "Working IPv6 proxies: {} of {} | written to {:?}",
            report.working.len(),
            report.candidates,
            config.output
        ),
        status => warn!(
            "Run {}: {}",
            status,
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
    info!("Country stats: {}", report.stats);
}
