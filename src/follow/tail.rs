// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Tail reader: turns one or two growing log files into a stream of events.
//!
//! Files are polled for new data like `tail -f`: targets that do not exist yet
//! are picked up once they appear, truncated files are re-read from the start.
//! The first handle stays in use, so a log renamed away and recreated is not
//! followed.

use std::collections::VecDeque;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::event::{Event, FollowTarget, Source};
use super::send_or_cancel;

/// Largest window scanned backwards for `--lines` backlog
const BACKLOG_WINDOW: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct TailOptions {
    /// How often files are checked for new data
    pub poll_interval: Duration,
    /// Number of existing lines to show per file at attach
    pub backlog_lines: usize,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            backlog_lines: 0,
        }
    }
}

struct TailedFile {
    target: FollowTarget,
    file: Option<File>,
    /// Byte offset of the next unread byte
    pos: u64,
    /// Bytes of an unterminated last line
    partial: Vec<u8>,
    /// The last read ended in `\r`; a leading `\n` belongs to that line end
    after_cr: bool,
    closed: bool,
}

impl TailedFile {
    /// Attach to `target`: existing files are read from their current end
    fn attach(target: FollowTarget, backlog_lines: usize) -> Self {
        let pos = match std::fs::metadata(&target.path) {
            Ok(meta) if backlog_lines > 0 => backlog_offset(&target.path, meta.len(), backlog_lines)
                .unwrap_or_else(|e| {
                    warn!(path = %target.path.display(), error = %e, "failed to read backlog");
                    meta.len()
                }),
            Ok(meta) => meta.len(),
            Err(_) => {
                debug!(path = %target.path.display(), "waiting for file to appear");
                0
            }
        };

        Self {
            target,
            file: None,
            pos,
            partial: Vec::new(),
            after_cr: false,
            closed: false,
        }
    }

    /// Read whatever was appended since the last call, split into complete lines
    async fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        if self.file.is_none() {
            match File::open(&self.target.path).await {
                Ok(file) => {
                    debug!(path = %self.target.path.display(), offset = self.pos, "attached");
                    self.file = Some(file);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e),
            }
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };

        let meta = file.metadata().await?;
        if meta.is_dir() {
            return Err(io::Error::other("is a directory"));
        }
        let len = meta.len();
        if len < self.pos {
            warn!(path = %self.target.path.display(), "file truncated, reading from start");
            self.pos = 0;
            self.partial.clear();
            self.after_cr = false;
        }
        if len == self.pos {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.pos)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.pos += read as u64;
        self.partial.extend_from_slice(&buf);

        Ok(split_lines(&mut self.partial, &mut self.after_cr))
    }

    /// Give up on this file, keeping an unterminated last line
    fn close(&mut self) -> Option<String> {
        self.closed = true;
        self.file = None;
        if self.partial.is_empty() {
            None
        } else {
            let rest = std::mem::take(&mut self.partial);
            Some(String::from_utf8_lossy(&rest).into_owned())
        }
    }
}

/// Drain complete lines from `buf`, leaving any unterminated tail in place.
///
/// `\n`, `\r\n` and a bare `\r` each end a line. `after_cr` carries a `\r`
/// that ended the previous chunk, so a `\r\n` split across reads ends one line.
fn split_lines(buf: &mut Vec<u8>, after_cr: &mut bool) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;

    if *after_cr && !buf.is_empty() {
        if buf[0] == b'\n' {
            start = 1;
        }
        *after_cr = false;
    }

    let mut i = start;
    while i < buf.len() {
        match buf[i] {
            b'\n' => {
                lines.push(String::from_utf8_lossy(&buf[start..i]).into_owned());
                start = i + 1;
            }
            b'\r' => {
                lines.push(String::from_utf8_lossy(&buf[start..i]).into_owned());
                match buf.get(i + 1) {
                    Some(b'\n') => i += 1,
                    Some(_) => {}
                    None => *after_cr = true,
                }
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    buf.drain(..start);
    lines
}

/// Offset of the first of the last `lines` lines of a file
fn backlog_offset(path: &Path, len: u64, lines: usize) -> io::Result<u64> {
    use std::io::{Read, Seek};

    let start = len.saturating_sub(BACKLOG_WINDOW);
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::new();
    file.take(len - start).read_to_end(&mut buf)?;

    let mut end = buf.len();
    if buf.last() == Some(&b'\n') {
        end -= 1;
    }
    let mut seen = 0;
    for (i, &b) in buf[..end].iter().enumerate().rev() {
        if b == b'\n' {
            seen += 1;
            if seen == lines {
                return Ok(start + i as u64 + 1);
            }
        }
    }
    Ok(start)
}

struct TailState {
    files: Vec<TailedFile>,
    /// Emit source markers (more than one target)
    multi: bool,
    last_source: Option<Source>,
    queue: VecDeque<Event>,
    poll_interval: Duration,
}

impl TailState {
    fn push_line(&mut self, source: Source, text: String) {
        if self.multi && self.last_source != Some(source) {
            self.queue.push_back(Event::SourceMarker { source });
        }
        self.last_source = Some(source);
        self.queue.push_back(Event::LogLine { source, text });
    }

    async fn poll_files(&mut self) {
        for i in 0..self.files.len() {
            if self.files[i].closed {
                continue;
            }
            let source = self.files[i].target.source;
            match self.files[i].read_new_lines().await {
                Ok(lines) => {
                    for line in lines {
                        self.push_line(source, line);
                    }
                }
                Err(e) => {
                    warn!(path = %self.files[i].target.path.display(), error = %e, "stopped tailing");
                    if let Some(rest) = self.files[i].close() {
                        self.push_line(source, rest);
                    }
                }
            }
        }
    }

    async fn next_event(&mut self) -> Event {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return event;
            }
            if self.files.iter().all(|f| f.closed) {
                return Event::StreamClosed;
            }
            self.poll_files().await;
            if self.queue.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}

/// Tail `targets`, yielding lines appended after this call.
///
/// The stream ends after yielding `StreamClosed`, which happens only when
/// every target failed.
pub fn tail_files(targets: &[FollowTarget], options: TailOptions) -> impl Stream<Item = Event> + Send {
    let state = TailState {
        files: targets
            .iter()
            .map(|t| TailedFile::attach(t.clone(), options.backlog_lines))
            .collect(),
        multi: targets.len() > 1,
        last_source: None,
        queue: VecDeque::new(),
        poll_interval: options.poll_interval,
    };

    futures::stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        match state.next_event().await {
            Event::StreamClosed => Some((Event::StreamClosed, None)), // Stop after close
            event => Some((event, Some(state))),
        }
    })
}

/// Producer task: forward tail events into the session channel until the
/// stream closes or `cancel` fires
pub async fn run_tail_producer(
    stream: impl Stream<Item = Event> + Send,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    let mut stream = std::pin::pin!(stream);

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tx.try_send(Event::StreamClosed);
                break;
            }
            event = stream.next() => event,
        };

        let Some(event) = event else { break };
        let closed = event == Event::StreamClosed;
        if !send_or_cancel(&tx, event, &cancel).await || closed {
            break;
        }
    }

    debug!("tail producer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn options() -> TailOptions {
        TailOptions {
            poll_interval: Duration::from_millis(20),
            backlog_lines: 0,
        }
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    async fn next(stream: &mut (impl Stream<Item = Event> + Unpin)) -> Event {
        tokio::time::timeout(TIMEOUT, stream.next())
            .await
            .expect("timed out waiting for tail event")
            .expect("tail stream ended")
    }

    fn line(source: Source, text: &str) -> Event {
        Event::LogLine {
            source,
            text: text.to_string(),
        }
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("job-123.out");
        let err = dir.path().join("job-123.err");
        (dir, out, err)
    }

    #[test]
    fn test_split_lines_keeps_partial() {
        let mut after_cr = false;
        let mut buf = b"one\r\ntwo\nthr".to_vec();
        assert_eq!(split_lines(&mut buf, &mut after_cr), vec!["one", "two"]);
        assert_eq!(buf, b"thr");
        buf.extend_from_slice(b"ee\n");
        assert_eq!(split_lines(&mut buf, &mut after_cr), vec!["three"]);
        assert!(buf.is_empty());
        assert!(!after_cr);
    }

    #[test]
    fn test_split_lines_carriage_return_ends_line() {
        let mut after_cr = false;
        let mut buf = b"10%\r20%\r30%\r".to_vec();
        assert_eq!(split_lines(&mut buf, &mut after_cr), vec!["10%", "20%", "30%"]);
        assert!(buf.is_empty());
        assert!(after_cr);

        // Next chunk starts a new line rather than continuing the last one
        buf.extend_from_slice(b"100%\n");
        assert_eq!(split_lines(&mut buf, &mut after_cr), vec!["100%"]);
        assert!(!after_cr);
    }

    #[test]
    fn test_split_lines_crlf_across_reads() {
        let mut after_cr = false;
        let mut buf = b"a\r".to_vec();
        assert_eq!(split_lines(&mut buf, &mut after_cr), vec!["a"]);

        // Nothing new: the pending \r is kept
        assert!(split_lines(&mut buf, &mut after_cr).is_empty());
        assert!(after_cr);

        buf.extend_from_slice(b"\nb\n\n");
        assert_eq!(split_lines(&mut buf, &mut after_cr), vec!["b", ""]);
    }

    #[test]
    fn test_backlog_offset() {
        let (_dir, out, _) = setup();
        append(&out, "1\n2\n3\n");
        assert_eq!(backlog_offset(&out, 6, 2).unwrap(), 2);
        assert_eq!(backlog_offset(&out, 6, 10).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_only_appended_lines() {
        let (_dir, out, _) = setup();
        append(&out, "old line\n");

        let mut stream = Box::pin(tail_files(&[FollowTarget::new(&out, Source::Output)], options()));
        append(&out, "new 1\nnew 2\n");

        assert_eq!(next(&mut stream).await, line(Source::Output, "new 1"));
        assert_eq!(next(&mut stream).await, line(Source::Output, "new 2"));
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let (_dir, out, _) = setup();
        append(&out, "");

        let mut stream = Box::pin(tail_files(&[FollowTarget::new(&out, Source::Output)], options()));
        append(&out, "abc");
        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&out, "def\n");

        assert_eq!(next(&mut stream).await, line(Source::Output, "abcdef"));
    }

    #[tokio::test]
    async fn test_backlog_lines() {
        let (_dir, out, _) = setup();
        append(&out, "1\n2\n3\n");

        let options = TailOptions {
            backlog_lines: 2,
            ..options()
        };
        let mut stream = Box::pin(tail_files(&[FollowTarget::new(&out, Source::Output)], options));

        assert_eq!(next(&mut stream).await, line(Source::Output, "2"));
        assert_eq!(next(&mut stream).await, line(Source::Output, "3"));
    }

    #[tokio::test]
    async fn test_source_markers_on_switch() {
        let (_dir, out, err) = setup();
        append(&out, "");
        append(&err, "");

        let targets = [
            FollowTarget::new(&out, Source::Output),
            FollowTarget::new(&err, Source::Error),
        ];
        let mut stream = Box::pin(tail_files(&targets, options()));

        append(&out, "a\n");
        assert_eq!(next(&mut stream).await, Event::SourceMarker { source: Source::Output });
        assert_eq!(next(&mut stream).await, line(Source::Output, "a"));

        append(&err, "b\n");
        assert_eq!(next(&mut stream).await, Event::SourceMarker { source: Source::Error });
        assert_eq!(next(&mut stream).await, line(Source::Error, "b"));

        // Same source again: no marker
        append(&err, "c\n");
        assert_eq!(next(&mut stream).await, line(Source::Error, "c"));

        append(&out, "d\n");
        assert_eq!(next(&mut stream).await, Event::SourceMarker { source: Source::Output });
        assert_eq!(next(&mut stream).await, line(Source::Output, "d"));
    }

    #[tokio::test]
    async fn test_pending_file_is_picked_up() {
        let (_dir, out, err) = setup();
        append(&out, "");

        let targets = [
            FollowTarget::new(&out, Source::Output),
            FollowTarget::new(&err, Source::Error),
        ];
        let mut stream = Box::pin(tail_files(&targets, options()));

        append(&out, "x\n");
        assert_eq!(next(&mut stream).await, Event::SourceMarker { source: Source::Output });
        assert_eq!(next(&mut stream).await, line(Source::Output, "x"));

        // Created after attach: everything in it is new
        append(&err, "late 1\nlate 2\n");
        assert_eq!(next(&mut stream).await, Event::SourceMarker { source: Source::Error });
        assert_eq!(next(&mut stream).await, line(Source::Error, "late 1"));
        assert_eq!(next(&mut stream).await, line(Source::Error, "late 2"));
    }

    #[tokio::test]
    async fn test_progress_updates_show_live() {
        let (_dir, _, err) = setup();
        append(&err, "");

        let mut stream = Box::pin(tail_files(&[FollowTarget::new(&err, Source::Error)], options()));
        append(&err, "10%\r20%\r30%\r");

        assert_eq!(next(&mut stream).await, line(Source::Error, "10%"));
        assert_eq!(next(&mut stream).await, line(Source::Error, "20%"));
        assert_eq!(next(&mut stream).await, line(Source::Error, "30%"));

        append(&err, "100%\n");
        assert_eq!(next(&mut stream).await, line(Source::Error, "100%"));
    }

    #[tokio::test]
    async fn test_unreadable_target_closes_stream() {
        let (_dir, out, _) = setup();

        let mut stream = Box::pin(tail_files(&[FollowTarget::new(&out, Source::Output)], options()));
        std::fs::create_dir(&out).unwrap();

        assert_eq!(next(&mut stream).await, Event::StreamClosed);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_unreadable_target_leaves_others_open() {
        let (_dir, out, err) = setup();
        append(&out, "");

        let targets = [
            FollowTarget::new(&out, Source::Output),
            FollowTarget::new(&err, Source::Error),
        ];
        let mut stream = Box::pin(tail_files(&targets, options()));

        // Buffered as a partial line while the other target fails
        append(&out, "half");
        std::fs::create_dir(&err).unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
        assert!(pending.is_err(), "unexpected event: {:?}", pending);

        append(&out, "way\n");
        assert_eq!(next(&mut stream).await, Event::SourceMarker { source: Source::Output });
        assert_eq!(next(&mut stream).await, line(Source::Output, "halfway"));
    }

    #[test]
    fn test_close_flushes_partial_line() {
        let (_dir, out, _) = setup();
        let mut file = TailedFile::attach(FollowTarget::new(&out, Source::Output), 0);
        file.partial = b"no newline".to_vec();

        assert_eq!(file.close(), Some("no newline".to_string()));
        assert!(file.closed);
        assert_eq!(file.close(), None);
    }

    #[tokio::test]
    async fn test_truncated_file_restarts() {
        let (_dir, out, _) = setup();
        append(&out, "a long first line\n");

        let mut stream = Box::pin(tail_files(&[FollowTarget::new(&out, Source::Output)], options()));
        std::fs::write(&out, "b\n").unwrap();

        assert_eq!(next(&mut stream).await, line(Source::Output, "b"));
    }

    #[tokio::test]
    async fn test_producer_stops_on_cancel() {
        let (_dir, out, _) = setup();
        append(&out, "");

        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let stream = tail_files(&[FollowTarget::new(&out, Source::Output)], options());
        let handle = tokio::spawn(run_tail_producer(stream, tx, cancel.clone()));

        append(&out, "before\n");
        let event = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap();
        assert_eq!(event, Some(line(Source::Output, "before")));

        cancel.cancel();
        tokio::time::timeout(TIMEOUT, handle).await.unwrap().unwrap();
        assert_eq!(rx.recv().await, Some(Event::StreamClosed));
        assert_eq!(rx.recv().await, None);
    }
}
