// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod classify;
mod display;
mod follow;
mod slurm;

use display::{OutputSink, Palette, Terminal, Tone};
use follow::{
    run_follow_session, FollowConfig, FollowTarget, SessionOutcome, Source, TailOptions,
};
use slurm::{JobId, SlurmScheduler};

#[derive(Parser, Debug)]
#[command(name = "slog")]
#[command(about = "Follow Slurm job logs in real time with a live job status line")]
#[command(version)]
#[command(group(ArgGroup::new("logs").required(true).multiple(true).args(["out", "err"])))]
struct Args {
    /// Standard output log of the job
    #[arg(short, long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Standard error log of the job
    #[arg(short, long, value_name = "PATH")]
    err: Option<PathBuf>,

    /// Slurm job ID (default: taken from a log name like train-1234.out)
    #[arg(short, long)]
    job: Option<JobId>,

    /// Seconds between job status queries
    #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    status_interval: u64,

    /// Show the last N existing lines of each log before following
    #[arg(short = 'n', long, default_value = "0")]
    lines: usize,

    /// Do not query the scheduler for job status
    #[arg(long)]
    no_status: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Diagnostics on stderr (-v info, -vv debug, SLOG_LOG overrides)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn targets(&self) -> Vec<FollowTarget> {
        [(&self.out, Source::Output), (&self.err, Source::Error)]
            .into_iter()
            .filter_map(|(path, source)| path.as_ref().map(|p| FollowTarget::new(p, source)))
            .collect()
    }

    fn resolve_job(&self, targets: &[FollowTarget]) -> Option<JobId> {
        if self.no_status {
            return None;
        }
        self.job
            .or_else(|| targets.iter().find_map(|t| JobId::from_log_path(&t.path)))
    }
}

fn main() -> Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // Help and version go to stdout and are not failures
            return Ok(if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
    };

    init_logging(args.verbose);

    let targets = args.targets();
    let job = args.resolve_job(&targets);
    let stdout_is_terminal = io::stdout().is_terminal();
    let config = FollowConfig {
        status_interval: Duration::from_secs(args.status_interval),
        tail: TailOptions {
            backlog_lines: args.lines,
            ..TailOptions::default()
        },
        color: !args.no_color && stdout_is_terminal,
        status_line: stdout_is_terminal,
        ..FollowConfig::default()
    };
    debug!(?targets, ?job, ?config, "starting follow session");

    let mut terminal = Terminal::new(io::stdout());
    if job.is_none() && !args.no_status {
        let palette = Palette::new(config.color);
        terminal.print_line(&palette.paint(
            "Could not determine the job ID, job status will not be shown",
            Tone::Notice,
        ))?;
        terminal.print_line(&palette.paint("Pass it with --job <ID>", Tone::Hint))?;
    }

    // Single-threaded runtime: two producers and one consumer
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let outcome = rt.block_on(follow(&targets, job, &config, &mut terminal))?;

    Ok(match outcome {
        SessionOutcome::NothingToFollow => ExitCode::FAILURE,
        SessionOutcome::CompletedNormally | SessionOutcome::Cancelled => ExitCode::SUCCESS,
    })
}

/// Log filter from SLOG_LOG, else from the verbosity flag
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("SLOG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn follow(
    targets: &[FollowTarget],
    job: Option<JobId>,
    config: &FollowConfig,
    sink: &mut impl OutputSink,
) -> Result<SessionOutcome> {
    let interrupt = CancellationToken::new();

    let on_ctrl_c = interrupt.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_ctrl_c.cancel(),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
        }
    });

    run_follow_session(targets, job, Arc::new(SlurmScheduler), sink, config, interrupt).await
}
