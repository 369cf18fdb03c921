// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Terminal output: the line-oriented sink used by the follow session and the
//! palette that turns display categories into colors.

use std::io::{self, Write};

use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::{Attribute, Color, ContentStyle},
    terminal::{Clear, ClearType},
};

use crate::classify::{classify, DisplayCategory};
use crate::follow::Source;

/// Minimal terminal capabilities needed to keep a sticky status footer
pub trait OutputSink {
    /// Write `text` followed by a newline
    fn print_line(&mut self, text: &str) -> io::Result<()>;
    /// Clear the current line and return the cursor to its start
    fn erase_line(&mut self) -> io::Result<()>;
    /// Write `text` without a newline
    fn write(&mut self, text: &str) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Sink writing to a terminal (or any writer) with crossterm control sequences
pub struct Terminal<W: Write> {
    out: W,
}

impl<W: Write> Terminal<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> OutputSink for Terminal<W> {
    fn print_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }

    fn erase_line(&mut self) -> io::Result<()> {
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        self.out.write_all(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Named styles used outside of line classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Banner,
    Notice,
    Problem,
    Hint,
    Footer,
    Header(Source),
    Success,
    Failure,
    Caution,
}

fn style(fg: Option<Color>, bold: bool) -> ContentStyle {
    let mut style = ContentStyle::new();
    style.foreground_color = fg;
    if bold {
        style.attributes.set(Attribute::Bold);
    }
    style
}

/// Applies colors when enabled, passes text through otherwise
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    color: bool,
}

impl Palette {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn paint(&self, text: &str, tone: Tone) -> String {
        let style = match tone {
            Tone::Banner => style(None, true),
            Tone::Notice => style(Some(Color::DarkYellow), false),
            Tone::Problem => style(Some(Color::DarkRed), false),
            Tone::Hint => style(Some(Color::DarkCyan), false),
            Tone::Footer => style(Some(Color::DarkCyan), true),
            Tone::Header(Source::Output) => style(Some(Color::DarkGreen), true),
            Tone::Header(Source::Error) => style(Some(Color::DarkRed), true),
            Tone::Success => style(Some(Color::DarkGreen), true),
            Tone::Failure => style(Some(Color::DarkRed), true),
            Tone::Caution => style(Some(Color::DarkYellow), true),
        };
        self.apply(text, style)
    }

    /// Classify and color one log line
    pub fn log_line(&self, line: &str, source: Source) -> String {
        let fg = match classify(line, source == Source::Error) {
            DisplayCategory::Plain => return line.to_string(),
            DisplayCategory::Success | DisplayCategory::DiffAdd => Color::DarkGreen,
            DisplayCategory::Failure | DisplayCategory::DiffRemove => Color::DarkRed,
            DisplayCategory::Warning => return self.apply(line, style(Some(Color::DarkYellow), true)),
            DisplayCategory::Timestamp => Color::DarkCyan,
            DisplayCategory::Bracketed => Color::DarkBlue,
            DisplayCategory::ErrorContext => Color::DarkMagenta,
        };
        self.apply(line, style(Some(fg), false))
    }

    fn apply(&self, text: &str, style: ContentStyle) -> String {
        if self.color {
            style.apply(text).to_string()
        } else {
            text.to_string()
        }
    }
}
