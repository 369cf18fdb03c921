// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Scheduler integration for the follow session.
//!
//! The session only needs two capabilities from the batch scheduler:
//! - live status of a job while it is in the queue (squeue)
//! - final state and exit code once it has left (sacct)

use std::future::Future;

use anyhow::Result;

pub mod slurm;
pub mod types;

pub use slurm::{JobState, SlurmScheduler};
pub use types::{ExitCode, FinalDisposition, JobId, JobStatus, Verdict};

/// Read-only view of a batch scheduler
pub trait Scheduler: Send + Sync {
    /// Current status of `job`, or None once it is no longer active.
    ///
    /// Errors are transient: the caller retries on the next poll.
    fn query_status(&self, job: JobId) -> impl Future<Output = Result<Option<JobStatus>>> + Send;

    /// Best-effort terminal state of a job that has left the queue.
    fn query_final_disposition(
        &self,
        job: JobId,
    ) -> impl Future<Output = Result<Option<FinalDisposition>>> + Send;
}
