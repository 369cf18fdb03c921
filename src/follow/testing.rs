// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Test doubles for the scheduler and the terminal.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::display::OutputSink;
use crate::slurm::{FinalDisposition, JobId, JobStatus, Scheduler};

/// Scheduler answering status queries from a script.
///
/// The last scripted answer repeats once the script is used up.
pub struct ScriptedScheduler {
    statuses: Mutex<VecDeque<Option<JobStatus>>>,
    disposition: Option<FinalDisposition>,
    disposition_fails: bool,
    fail_first: usize,
    delay: Option<Duration>,
    status_calls: AtomicUsize,
}

impl ScriptedScheduler {
    pub fn new(statuses: Vec<Option<JobStatus>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            disposition: None,
            disposition_fails: false,
            fail_first: 0,
            delay: None,
            status_calls: AtomicUsize::new(0),
        }
    }

    /// The first `n` status queries fail
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Every status query takes `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_disposition(mut self, disposition: FinalDisposition) -> Self {
        self.disposition = Some(disposition);
        self
    }

    pub fn failing_disposition(mut self) -> Self {
        self.disposition_fails = true;
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

impl Scheduler for ScriptedScheduler {
    async fn query_status(&self, _job: JobId) -> Result<Option<JobStatus>> {
        let call = self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if call < self.fail_first {
            bail!("squeue: slurm_load_jobs error: Socket timed out");
        }

        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            Ok(statuses.pop_front().flatten())
        } else {
            Ok(statuses.front().cloned().flatten())
        }
    }

    async fn query_final_disposition(&self, _job: JobId) -> Result<Option<FinalDisposition>> {
        if self.disposition_fails {
            bail!("sacct: accounting storage is disabled");
        }
        Ok(self.disposition.clone())
    }
}

/// One recorded sink operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Line(String),
    Erase,
    Write(String),
    Flush,
}

/// Sink recording every operation instead of writing to a terminal
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub ops: Vec<Op>,
}

impl RecordingSink {
    /// Recorded operations without flushes
    pub fn visible(&self) -> Vec<Op> {
        self.ops.iter().filter(|op| **op != Op::Flush).cloned().collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Line(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, op: &Op) -> Option<usize> {
        self.visible().iter().position(|o| o == op)
    }
}

impl OutputSink for RecordingSink {
    fn print_line(&mut self, text: &str) -> io::Result<()> {
        self.ops.push(Op::Line(text.to_string()));
        Ok(())
    }

    fn erase_line(&mut self) -> io::Result<()> {
        self.ops.push(Op::Erase);
        Ok(())
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        self.ops.push(Op::Write(text.to_string()));
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ops.push(Op::Flush);
        Ok(())
    }
}
