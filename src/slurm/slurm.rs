// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Slurm CLI integration: live job status via squeue, final state via sacct.

use std::fmt;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;
use tracing::debug;

use super::types::{ExitCode, FinalDisposition, JobId, JobStatus};
use super::Scheduler;

/// Job state as reported by Slurm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Suspended,
    Completing,
    Completed,
    Cancelled,
    Failed,
    Timeout,
    NodeFail,
    OutOfMemory,
    Preempted,
    Unknown(String),
}

impl From<&str> for JobState {
    fn from(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PENDING" | "PD" => JobState::Pending,
            "RUNNING" | "R" => JobState::Running,
            "SUSPENDED" | "S" => JobState::Suspended,
            "COMPLETING" | "CG" => JobState::Completing,
            "COMPLETED" | "CD" => JobState::Completed,
            "CANCELLED" | "CA" => JobState::Cancelled,
            "FAILED" | "F" => JobState::Failed,
            "TIMEOUT" | "TO" => JobState::Timeout,
            "NODE_FAIL" | "NF" => JobState::NodeFail,
            "OUT_OF_MEMORY" | "OOM" => JobState::OutOfMemory,
            "PREEMPTED" | "PR" => JobState::Preempted,
            other => JobState::Unknown(other.to_string()),
        }
    }
}

impl JobState {
    /// Check if the job ended because something went wrong
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Failed | JobState::NodeFail | JobState::OutOfMemory)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::Completing => "COMPLETING",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
            JobState::Failed => "FAILED",
            JobState::Timeout => "TIMEOUT",
            JobState::NodeFail => "NODE_FAIL",
            JobState::OutOfMemory => "OUT_OF_MEMORY",
            JobState::Preempted => "PREEMPTED",
            JobState::Unknown(s) => s,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduler backed by the Slurm command line tools
#[derive(Debug, Clone, Copy, Default)]
pub struct SlurmScheduler;

impl Scheduler for SlurmScheduler {
    async fn query_status(&self, job: JobId) -> Result<Option<JobStatus>> {
        let output = Command::new("squeue")
            .args(["-j", &job.to_string(), "-h", "-o", "%T %M %R"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute squeue")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // slurmctld forgets finished jobs after MinJobAge
            if stderr.contains("Invalid job id") {
                debug!(%job, "squeue no longer knows the job");
                return Ok(None);
            }
            return Err(anyhow!("squeue failed: {}", stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_squeue_output(&stdout))
    }

    async fn query_final_disposition(&self, job: JobId) -> Result<Option<FinalDisposition>> {
        let output = Command::new("sacct")
            .args(["-j", &job.to_string(), "-n", "-X", "-P", "-o", "State,ExitCode"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute sacct")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("sacct failed: {}", stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_sacct_output(&stdout)
    }
}

/// Parse `squeue -h -o "%T %M %R"` output
///
/// Returns None when the job is no longer in the queue (empty output).
fn parse_squeue_output(output: &str) -> Option<JobStatus> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;

    let (state, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim_start();
    let (runtime, reason) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));

    Some(JobStatus {
        state: JobState::from(state),
        runtime: if runtime.is_empty() {
            "0:00".to_string()
        } else {
            runtime.to_string()
        },
        reason: reason.trim().to_string(),
    })
}

/// Parse `sacct -n -X -P -o State,ExitCode` output
fn parse_sacct_output(output: &str) -> Result<Option<FinalDisposition>> {
    let Some(line) = output.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let (state, exit_code) = line
        .split_once('|')
        .ok_or_else(|| anyhow!("Unexpected sacct output: {}", line))?;

    // State may carry a suffix, e.g. "CANCELLED by 1000"
    let state = state.split_whitespace().next().unwrap_or("UNKNOWN");

    Ok(Some(FinalDisposition {
        state: JobState::from(state),
        exit_code: exit_code.parse::<ExitCode>()?,
    }))
}
