// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Status prober: polls the scheduler for one job and reports changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::event::Event;
use super::send_or_cancel;
use crate::slurm::{JobId, Scheduler};

pub struct StatusProber<S> {
    scheduler: Arc<S>,
    job: JobId,
    interval: Duration,
    query_timeout: Duration,
}

impl<S: Scheduler> StatusProber<S> {
    pub fn new(scheduler: Arc<S>, job: JobId, interval: Duration, query_timeout: Duration) -> Self {
        Self {
            scheduler,
            job,
            interval,
            query_timeout,
        }
    }

    /// Poll until the job leaves the queue or `cancel` fires.
    ///
    /// Sends a `StatusUpdate` whenever the status text changes and exactly one
    /// `JobCompleted` once the job is gone; nothing is polled after that.
    pub async fn run(self, tx: mpsc::Sender<Event>, cancel: CancellationToken) {
        let mut last_summary: Option<String> = None;

        loop {
            let query = timeout(self.query_timeout, self.scheduler.query_status(self.job));
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = query => result,
            };

            match result {
                Ok(Ok(Some(status))) => {
                    let summary = status.summary(self.job);
                    if last_summary.as_deref() != Some(summary.as_str()) {
                        debug!(job = %self.job, %summary, "status changed");
                        if !send_or_cancel(&tx, Event::StatusUpdate { job: self.job, status }, &cancel).await {
                            break;
                        }
                        last_summary = Some(summary);
                    }
                }
                Ok(Ok(None)) => {
                    debug!(job = %self.job, "job left the queue");
                    send_or_cancel(&tx, Event::JobCompleted { job: self.job }, &cancel).await;
                    break;
                }
                Ok(Err(e)) => {
                    warn!(job = %self.job, error = %e, "status query failed");
                }
                Err(_) => {
                    warn!(job = %self.job, timeout = ?self.query_timeout, "status query timed out");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!(job = %self.job, "status prober stopped");
    }
}
