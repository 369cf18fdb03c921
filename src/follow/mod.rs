// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Log-follow engine.
//!
//! Two producers feed one ordered channel:
//! - the tail reader (new lines of the job's log files)
//! - the status prober (live job state from the scheduler)
//!
//! The session loop is the only consumer and the only writer of terminal output.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod event;
pub mod probe;
pub mod session;
pub mod tail;

#[cfg(test)]
pub(crate) mod testing;

pub use event::{Event, FollowTarget, Source};
pub use session::{run_follow_session, SessionOutcome};
pub use tail::TailOptions;

/// Capacity of the channel between producers and the session loop
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Runtime knobs of a follow session
#[derive(Debug, Clone)]
pub struct FollowConfig {
    /// Pause between two status queries
    pub status_interval: Duration,
    /// Upper bound for one status query
    pub query_timeout: Duration,
    /// Upper bound for the final state lookup after completion
    pub disposition_timeout: Duration,
    pub tail: TailOptions,
    pub color: bool,
    /// Keep a sticky status footer; needs a terminal
    pub status_line: bool,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(10),
            query_timeout: Duration::from_secs(10),
            disposition_timeout: Duration::from_secs(5),
            tail: TailOptions::default(),
            color: false,
            status_line: true,
        }
    }
}

impl FollowConfig {
    /// How long already produced lines are still shown after completion
    pub fn linger(&self) -> Duration {
        self.tail.poll_interval * 2
    }
}

/// Send `event` unless `cancel` fires first.
///
/// Returns false when the producer should stop: cancelled, or the session
/// loop is gone.
pub(crate) async fn send_or_cancel(
    tx: &mpsc::Sender<Event>,
    event: Event,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        result = tx.send(event) => result.is_ok(),
    }
}
