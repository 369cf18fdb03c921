// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::path::PathBuf;

use crate::slurm::{JobId, JobStatus};

/// Which job stream a log file carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Output,
    Error,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Output => "output",
            Source::Error => "error",
        }
    }
}

/// A file to tail during a follow session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowTarget {
    pub path: PathBuf,
    pub source: Source,
}

impl FollowTarget {
    pub fn new(path: impl Into<PathBuf>, source: Source) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Everything the producers hand to the session loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A complete line appended to a target
    LogLine { source: Source, text: String },
    /// The following lines come from another target
    SourceMarker { source: Source },
    /// The job status changed
    StatusUpdate { job: JobId, status: JobStatus },
    /// The job left the active queue
    JobCompleted { job: JobId },
    /// No more log events will arrive
    StreamClosed,
}
