// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Contextual highlighting of log lines.
//!
//! Rule order matters: the first matching rule wins, so failure dominates
//! warning and diff markers dominate keyword matches.

use std::sync::OnceLock;

use regex::Regex;

/// Display category of a single log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayCategory {
    Success,
    Failure,
    Warning,
    DiffAdd,
    DiffRemove,
    Timestamp,
    Bracketed,
    /// Any other line of an error stream
    ErrorContext,
    /// No highlighting; also used for lines that already carry escapes
    Plain,
}

struct Patterns {
    success: Regex,
    failure: Regex,
    warning: Regex,
    timestamp: Regex,
    bracketed: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        success: Regex::new(r"(?i)success|completed|done").expect("valid pattern"),
        failure: Regex::new(r"(?i)error|failed").expect("valid pattern"),
        warning: Regex::new(r"(?i)warning").expect("valid pattern"),
        timestamp: Regex::new(r"^(?:\d{4}-\d{2}-\d{2}|\d{2}:\d{2}:\d{2})").expect("valid pattern"),
        bracketed: Regex::new(r"^\[.*\]").expect("valid pattern"),
    })
}

/// Check if a line already contains a terminal escape sequence
pub fn has_escape(line: &str) -> bool {
    line.contains("\x1b[")
}

/// Classify a line of the output (`is_error == false`) or error stream
pub fn classify(line: &str, is_error: bool) -> DisplayCategory {
    if has_escape(line) {
        return DisplayCategory::Plain;
    }

    let p = patterns();

    if is_error {
        return if p.failure.is_match(line) {
            DisplayCategory::Failure
        } else if p.warning.is_match(line) {
            DisplayCategory::Warning
        } else {
            DisplayCategory::ErrorContext
        };
    }

    if line.starts_with(['+', '>']) {
        DisplayCategory::DiffAdd
    } else if line.starts_with('-') {
        DisplayCategory::DiffRemove
    } else if p.success.is_match(line) {
        DisplayCategory::Success
    } else if p.failure.is_match(line) {
        DisplayCategory::Failure
    } else if p.warning.is_match(line) {
        DisplayCategory::Warning
    } else if p.timestamp.is_match(line) {
        DisplayCategory::Timestamp
    } else if p.bracketed.is_match(line) {
        DisplayCategory::Bracketed
    } else {
        DisplayCategory::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaped_lines_are_plain() {
        let colored = "\x1b[0;31mERROR: disk full\x1b[0m";
        assert_eq!(classify(colored, false), DisplayCategory::Plain);
        assert_eq!(classify(colored, true), DisplayCategory::Plain);
        // Already formatted output stays untouched on a second pass
        assert_eq!(classify("\x1b[1m+ added\x1b[0m", false), DisplayCategory::Plain);
    }

    #[test]
    fn test_error_stream() {
        assert_eq!(classify("Segmentation fault: error 11", true), DisplayCategory::Failure);
        assert_eq!(classify("step FAILED", true), DisplayCategory::Failure);
        assert_eq!(classify("Warning: deprecated flag", true), DisplayCategory::Warning);
        assert_eq!(classify("loading modules", true), DisplayCategory::ErrorContext);
    }

    #[test]
    fn test_error_stream_failure_beats_warning() {
        assert_eq!(
            classify("WARNING: retry failed after 3 attempts", true),
            DisplayCategory::Failure
        );
        assert_eq!(classify("warning: Error budget low", true), DisplayCategory::Failure);
    }

    #[test]
    fn test_case_insensitive_keywords() {
        assert_eq!(classify("eRRoR somewhere", true), DisplayCategory::Failure);
        assert_eq!(classify("Training Completed", false), DisplayCategory::Success);
        assert_eq!(classify("wArNiNg", false), DisplayCategory::Warning);
    }

    #[test]
    fn test_diff_markers_take_priority() {
        assert_eq!(classify("+ error handling added", false), DisplayCategory::DiffAdd);
        assert_eq!(classify("> done", false), DisplayCategory::DiffAdd);
        assert_eq!(classify("- success path removed", false), DisplayCategory::DiffRemove);
    }

    #[test]
    fn test_output_stream_order() {
        assert_eq!(classify("epoch 3 done, no error", false), DisplayCategory::Success);
        assert_eq!(classify("job failed", false), DisplayCategory::Failure);
        assert_eq!(classify("warning: low memory", false), DisplayCategory::Warning);
        assert_eq!(classify("2024-01-01 10:00 start", false), DisplayCategory::Timestamp);
        assert_eq!(classify("10:00:01 tick", false), DisplayCategory::Timestamp);
        assert_eq!(classify("[rank 0] ready", false), DisplayCategory::Bracketed);
        assert_eq!(classify("loss=0.123", false), DisplayCategory::Plain);
        assert_eq!(classify("", false), DisplayCategory::Plain);
    }

    #[test]
    fn test_timestamp_must_lead() {
        assert_eq!(classify("started at 2024-01-01", false), DisplayCategory::Plain);
        assert_eq!(classify("[unterminated", false), DisplayCategory::Plain);
    }

    #[test]
    fn test_deterministic() {
        let line = "[2024-01-01] warning";
        assert_eq!(classify(line, false), classify(line, false));
    }
}
