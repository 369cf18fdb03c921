// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Job identifiers and the status records exchanged with the scheduler.
//!
//! `JobStatus` is a live observation from the active queue, `FinalDisposition`
//! is what the accounting database reports once the job has left it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use regex::Regex;

use super::slurm::JobState;

/// Numeric Slurm job ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u32);

impl JobId {
    /// Extract the job ID from a log file name such as `train-9560.out`.
    ///
    /// Only the `<name>-<id>.out` / `<name>-<id>.err` naming used by the
    /// batch scripts is recognized.
    pub fn from_log_path(path: &Path) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"-(\d+)\.(?:out|err)$").expect("job id pattern is valid")
        });

        let name = path.file_name()?.to_str()?;
        let caps = pattern.captures(name)?;
        caps[1].parse().ok().map(JobId)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(JobId)
            .with_context(|| format!("Invalid job id '{}'", s))
    }
}

/// Live job state from the active queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Elapsed runtime as formatted by the scheduler (e.g. "1:02:03")
    pub runtime: String,
    /// Pending reason or node list, empty if none
    pub reason: String,
}

impl JobStatus {
    /// The one-line status text shown in the footer.
    ///
    /// Duplicate suppression compares this text, so a runtime change alone
    /// counts as a new status.
    pub fn summary(&self, job: JobId) -> String {
        let mut line = format!("Job {}: {} - Runtime: {}", job, self.state, self.runtime);
        if !self.reason.is_empty() && self.reason != "None" {
            line.push_str(" - ");
            line.push_str(&self.reason);
        }
        line
    }
}

/// Exit code as reported by Slurm: "code:signal"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode {
    pub code: i32,
    pub signal: i32,
}

impl ExitCode {
    pub fn is_success(&self) -> bool {
        self.code == 0 && self.signal == 0
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.code, self.signal)
    }
}

impl FromStr for ExitCode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (code, signal) = s.split_once(':').unwrap_or((s, "0"));
        Ok(ExitCode {
            code: code.parse().map_err(|_| anyhow!("Invalid exit code '{}'", s))?,
            signal: signal.parse().map_err(|_| anyhow!("Invalid exit signal '{}'", s))?,
        })
    }
}

/// Terminal state of a job after it left the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalDisposition {
    pub state: JobState,
    pub exit_code: ExitCode,
}

/// How a finished job is summarized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure,
    Other,
}

impl FinalDisposition {
    pub fn verdict(&self) -> Verdict {
        if self.state == JobState::Completed && self.exit_code.is_success() {
            Verdict::Success
        } else if self.state.is_failure() || self.exit_code.code != 0 {
            Verdict::Failure
        } else {
            Verdict::Other
        }
    }
}
