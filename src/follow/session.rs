// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Follow session: merges tail and status events into one terminal stream.
//!
//! The session moves through `Starting -> Running -> Draining -> Terminated`.
//! Log lines scroll above a sticky status footer that is erased before and
//! redrawn after every printed line. Completion is only acted upon once the
//! prober reports the job gone; cancellation wins over anything still queued.

use std::io;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::{Event, FollowTarget, Source};
use super::probe::StatusProber;
use super::tail::{run_tail_producer, tail_files};
use super::{FollowConfig, EVENT_CHANNEL_CAPACITY};
use crate::display::{OutputSink, Palette, Tone};
use crate::slurm::{FinalDisposition, JobId, Scheduler, Verdict};

const BANNER_WIDTH: usize = 80;

/// How a follow session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The job completed or the log stream closed
    CompletedNormally,
    /// The operator interrupted the session
    Cancelled,
    /// None of the targets existed at start
    NothingToFollow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Running,
    Draining,
    Terminated,
}

/// Mutable display state, owned by the session loop
#[derive(Debug)]
struct SessionState {
    /// Footer text currently shown at the bottom line
    current_status: Option<String>,
    running: bool,
}

/// Follow `targets` until the job completes, the log stream closes or
/// `interrupt` fires.
///
/// Spawns the tail reader and, when `job` is known, the status prober. Both
/// are stopped and awaited before this returns, on every path.
pub async fn run_follow_session<S, O>(
    targets: &[FollowTarget],
    job: Option<JobId>,
    scheduler: Arc<S>,
    sink: &mut O,
    config: &FollowConfig,
    interrupt: CancellationToken,
) -> Result<SessionOutcome>
where
    S: Scheduler + 'static,
    O: OutputSink,
{
    let palette = Palette::new(config.color);

    let existing: Vec<&FollowTarget> = targets.iter().filter(|t| t.path.exists()).collect();
    if existing.is_empty() {
        sink.print_line(&palette.paint("No log files found to follow", Tone::Problem))?;
        sink.flush()?;
        return Ok(SessionOutcome::NothingToFollow);
    }

    sink.print_line(&palette.paint(&follow_banner(&existing), Tone::Notice))?;
    sink.flush()?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let producers = interrupt.child_token();

    let mut tasks = vec![tokio::spawn(run_tail_producer(
        tail_files(targets, config.tail),
        tx.clone(),
        producers.clone(),
    ))];
    match job {
        Some(job) => {
            let prober = StatusProber::new(
                scheduler.clone(),
                job,
                config.status_interval,
                config.query_timeout,
            );
            tasks.push(tokio::spawn(prober.run(tx.clone(), producers.clone())));
        }
        None => info!("no job id, status probing disabled"),
    }
    drop(tx);

    let outcome = Merger::new(sink, palette, targets, scheduler, config, rx)
        .run(&interrupt)
        .await;

    producers.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "producer task failed");
        }
    }

    debug!(?outcome, "follow session finished");
    outcome
}

/// Announce what is followed, counting only targets that exist already
fn follow_banner(existing: &[&FollowTarget]) -> String {
    match existing {
        [target] => format!("Following {} log... (Ctrl+C to stop)", target.source.label()),
        _ => "Following both output and error logs in real-time... (Ctrl+C to stop)".to_string(),
    }
}

/// The single consumer of producer events
struct Merger<'a, S, O> {
    sink: &'a mut O,
    palette: Palette,
    targets: &'a [FollowTarget],
    scheduler: Arc<S>,
    config: &'a FollowConfig,
    rx: mpsc::Receiver<Event>,
    state: SessionState,
    phase: Phase,
}

impl<'a, S: Scheduler, O: OutputSink> Merger<'a, S, O> {
    fn new(
        sink: &'a mut O,
        palette: Palette,
        targets: &'a [FollowTarget],
        scheduler: Arc<S>,
        config: &'a FollowConfig,
        rx: mpsc::Receiver<Event>,
    ) -> Self {
        Self {
            sink,
            palette,
            targets,
            scheduler,
            config,
            rx,
            state: SessionState {
                current_status: None,
                running: true,
            },
            phase: Phase::Starting,
        }
    }

    async fn run(mut self, interrupt: &CancellationToken) -> Result<SessionOutcome> {
        self.enter(Phase::Running);

        loop {
            let event = tokio::select! {
                biased;
                _ = interrupt.cancelled() => return self.stop(),
                event = self.rx.recv() => event,
            };

            match event {
                Some(Event::LogLine { source, text }) => self.show_log_line(source, &text)?,
                Some(Event::SourceMarker { source }) => self.show_marker(source)?,
                Some(Event::StatusUpdate { job, status }) => self.show_status(status.summary(job))?,
                Some(Event::JobCompleted { job }) => return self.drain(job, interrupt).await,
                Some(Event::StreamClosed) | None => return self.close(),
            }
        }
    }

    /// Show what the tail reader already produced, then the final summary
    async fn drain(&mut self, job: JobId, interrupt: &CancellationToken) -> Result<SessionOutcome> {
        self.enter(Phase::Draining);
        self.state.running = false;
        self.clear_footer()?;

        let deadline = Instant::now() + self.config.linger();
        loop {
            let event = tokio::select! {
                biased;
                _ = interrupt.cancelled() => return self.stop(),
                event = timeout_at(deadline, self.rx.recv()) => event,
            };

            match event {
                Ok(Some(Event::LogLine { source, text })) => self.show_log_line(source, &text)?,
                Ok(Some(Event::SourceMarker { source })) => self.show_marker(source)?,
                Ok(Some(Event::StatusUpdate { .. } | Event::JobCompleted { .. })) => {}
                Ok(Some(Event::StreamClosed) | None) | Err(_) => break,
            }
        }

        let banner = self.palette.paint(&"=".repeat(BANNER_WIDTH), Tone::Banner);
        self.sink.print_line("")?;
        self.sink.print_line(&banner)?;
        self.sink
            .print_line(&self.palette.paint(&format!("Job {} completed!", job), Tone::Success))?;
        self.sink.flush()?;

        let scheduler = self.scheduler.clone();
        let lookup = timeout(self.config.disposition_timeout, scheduler.query_final_disposition(job));
        let result = tokio::select! {
            biased;
            _ = interrupt.cancelled() => return self.stop(),
            result = lookup => result,
        };

        let disposition = match result {
            Ok(Ok(disposition)) => disposition,
            Ok(Err(e)) => {
                warn!(%job, error = %e, "final state lookup failed");
                None
            }
            Err(_) => {
                warn!(%job, timeout = ?self.config.disposition_timeout, "final state lookup timed out");
                None
            }
        };

        let verdict = self.verdict_line(disposition.as_ref());
        self.sink.print_line(&verdict)?;
        self.sink.print_line(&banner)?;
        self.sink.flush()?;

        self.enter(Phase::Terminated);
        Ok(SessionOutcome::CompletedNormally)
    }

    /// Operator interrupt
    fn stop(&mut self) -> Result<SessionOutcome> {
        self.enter(Phase::Terminated);
        self.state.running = false;
        self.state.current_status = None;

        // Clears the footer as well as an echoed ^C
        if self.config.status_line {
            self.sink.erase_line()?;
        }
        self.sink
            .print_line(&self.palette.paint("Stopped following logs", Tone::Notice))?;
        self.sink.flush()?;
        Ok(SessionOutcome::Cancelled)
    }

    /// The tail reader is done and no completion was seen
    fn close(&mut self) -> Result<SessionOutcome> {
        self.enter(Phase::Terminated);
        self.state.running = false;
        self.clear_footer()?;

        self.sink
            .print_line(&self.palette.paint("Log stream closed", Tone::Notice))?;
        self.sink.flush()?;
        Ok(SessionOutcome::CompletedNormally)
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "session phase");
        self.phase = phase;
    }

    fn verdict_line(&self, disposition: Option<&FinalDisposition>) -> String {
        let Some(disposition) = disposition else {
            return self.palette.paint(
                "Status: job left the queue, final state unavailable",
                Tone::Notice,
            );
        };

        match disposition.verdict() {
            Verdict::Success => self
                .palette
                .paint(&format!("Status: {} (Success)", disposition.state), Tone::Success),
            Verdict::Failure => self.palette.paint(
                &format!(
                    "Status: {} - Exit code: {}",
                    disposition.state, disposition.exit_code
                ),
                Tone::Failure,
            ),
            Verdict::Other => self.palette.paint(
                &format!(
                    "Status: {} - Exit code: {}",
                    disposition.state, disposition.exit_code
                ),
                Tone::Caution,
            ),
        }
    }

    fn show_log_line(&mut self, source: Source, text: &str) -> io::Result<()> {
        let line = self.palette.log_line(text, source);
        self.print(&line)
    }

    fn show_marker(&mut self, source: Source) -> io::Result<()> {
        let targets = self.targets;
        let Some(target) = targets.iter().find(|t| t.source == source) else {
            return Ok(());
        };
        let header = self.palette.paint(
            &format!("==> {} <==", target.path.display()),
            Tone::Header(source),
        );
        self.print(&header)
    }

    fn show_status(&mut self, summary: String) -> io::Result<()> {
        // Nothing is redrawn once the job is done
        if !self.config.status_line
            || !self.state.running
            || self.state.current_status.as_deref() == Some(summary.as_str())
        {
            return Ok(());
        }

        self.erase_footer()?;
        self.state.current_status = Some(summary);
        self.draw_footer()?;
        self.sink.flush()
    }

    /// Print one line above the footer
    fn print(&mut self, text: &str) -> io::Result<()> {
        self.erase_footer()?;
        self.sink.print_line(text)?;
        self.draw_footer()?;
        self.sink.flush()
    }

    fn erase_footer(&mut self) -> io::Result<()> {
        if self.state.current_status.is_some() {
            self.sink.erase_line()?;
        }
        Ok(())
    }

    fn draw_footer(&mut self) -> io::Result<()> {
        if let Some(status) = &self.state.current_status {
            let footer = self.palette.paint(&format!("[{}]", status), Tone::Footer);
            self.sink.write(&footer)?;
        }
        Ok(())
    }

    fn clear_footer(&mut self) -> io::Result<()> {
        self.erase_footer()?;
        self.state.current_status = None;
        Ok(())
    }
}
