//! Result file handling
//!
//! The result file is rewritten on every run and holds either the working
//! candidates, one per line, or exactly one sentinel line.

use crate::error::Result;
use crate::proxy::models::Candidate;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Single-line markers written instead of results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Run completed but no candidate passed validation
    NoProxies,
    /// Run was interrupted by a signal
    Interrupted,
    /// Run aborted on a fatal error
    Failed,
}

impl Sentinel {
    pub const ALL: [Sentinel; 3] = [Sentinel::NoProxies, Sentinel::Interrupted, Sentinel::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentinel::NoProxies => "NO_PROXIES_AVAILABLE: no IPv6 proxy passed validation",
            Sentinel::Interrupted => {
                "RUN_INTERRUPTED: operation cancelled, possibly timed out or runner interrupted"
            }
            Sentinel::Failed => "RUN_FAILED: fatal error during harvest, see logs",
        }
    }

    /// Machine-readable token at the start of the line
    pub fn token(&self) -> &'static str {
        match self {
            Sentinel::NoProxies => "NO_PROXIES_AVAILABLE",
            Sentinel::Interrupted => "RUN_INTERRUPTED",
            Sentinel::Failed => "RUN_FAILED",
        }
    }

    /// Recognise a sentinel line, as written to a result file
    pub fn detect(line: &str) -> Option<Sentinel> {
        let line = line.trim();
        Sentinel::ALL
            .into_iter()
            .find(|s| line.split(':').next() == Some(s.token()))
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle on the result file that is written exactly once
///
/// Dropping the handle without writing leaves the `Failed` sentinel behind.
#[derive(Debug)]
pub struct ResultFile {
    path: PathBuf,
    written: bool,
}

impl ResultFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            written: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write working candidates, or the `NoProxies` sentinel when there are none
    pub fn write_candidates(mut self, candidates: &[Candidate]) -> Result<()> {
        if candidates.is_empty() {
            warn!("No working proxies");
            return self.write(&sentinel_line(Sentinel::NoProxies));
        }

        self.write(&candidate_lines(candidates))?;
        info!(
            "Wrote {} working IPv6 proxies to {:?}",
            candidates.len(),
            self.path
        );
        Ok(())
    }

    pub fn write_sentinel(mut self, sentinel: Sentinel) -> Result<()> {
        self.write(&sentinel_line(sentinel))
    }

    fn write(&mut self, content: &str) -> Result<()> {
        self.written = true;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl Drop for ResultFile {
    fn drop(&mut self) {
        if self.written {
            return;
        }
        warn!("Result file {:?} left unwritten, marking run as failed", self.path);
        if let Err(e) = fs::write(&self.path, sentinel_line(Sentinel::Failed)) {
            error!("Cannot write {:?}: {}", self.path, e);
        }
    }
}

fn sentinel_line(sentinel: Sentinel) -> String {
    format!("{}\n", sentinel)
}

fn candidate_lines(candidates: &[Candidate]) -> String {
    candidates.iter().map(|c| format!("{}\n", c)).collect()
}

/// Save candidates one per line, without sentinel handling
pub fn save_candidates<P: AsRef<Path>>(candidates: &[Candidate], path: P) -> Result<()> {
    fs::write(path, candidate_lines(candidates))?;
    Ok(())
}
