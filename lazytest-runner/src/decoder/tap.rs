// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TAP v13 "flat" support.
//!
//! In the flat variant, every result line carries the full path of the test,
//! separated by ` > `:
//!
//! ```text
//! TAP version 13
//! 1..2
//! ok 1 - src/math.test.ts > math > adds # time=1.20ms
//! not ok 2 - src/math.test.ts > math > divides # time=0.85ms
//!   ---
//!   message: "expected 2 to be 3"
//!   at: "src/math.test.ts:12:5"
//!   ...
//! ```
//!
//! A failing result may be followed by a YAML-ish diagnostic block delimited by
//! `---` and `...`, so failing tests are held back until the next line shows
//! whether such a block follows.

use super::{DecodedEvents, LineDecoder, millis_to_duration};
use crate::events::Event;
use regex::Regex;
use std::{sync::LazyLock, time::Duration};

static RESULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(not ok|ok)\s+(\d+)\s+-\s+(.+)$").expect("valid regex"));
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=([0-9.]+)ms").expect("valid regex"));
static SKIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SKIP\b(.*)").expect("valid regex"));
static PLAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1\.\.\d+$").expect("valid regex"));

const NAME_SEPARATOR: &str = " > ";
const DIRECTIVE_SEPARATOR: &str = " # ";
const DIAGNOSTIC_START: &str = "---";
const DIAGNOSTIC_END: &str = "...";

/// A stateful decoder for TAP v13 flat output.
#[derive(Debug, Default)]
pub struct TapDecoder {
    current_suite: Option<String>,
    diagnostic: Option<Vec<String>>,
    pending: Option<PendingFailure>,
}

/// A failing test that hasn't been emitted yet.
#[derive(Debug)]
struct PendingFailure {
    name: String,
    duration: Duration,
}

impl TapDecoder {
    /// Creates a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_result(&mut self, result: TapResult<'_>, out: &mut DecodedEvents) {
        if self.current_suite.as_deref() != Some(result.suite) {
            if let Some(old) = self.current_suite.take() {
                out.push(Event::SuiteFinished { name: old });
            }
            self.current_suite = Some(result.suite.to_owned());
            out.push(Event::SuiteStarted {
                name: result.suite.to_owned(),
            });
        }

        let name = result.test.to_owned();
        let duration = result.duration();

        if !result.ok {
            self.pending = Some(PendingFailure { name, duration });
            return;
        }

        out.push(Event::TestStarted { name: name.clone() });
        if let Some(reason) = result.skip_reason() {
            out.push(Event::TestIgnored {
                name: name.clone(),
                message: reason.to_owned(),
            });
        }
        out.push(Event::TestFinished { name, duration });
    }

    fn emit_pending(&mut self, diagnostic: Option<Vec<String>>, out: &mut DecodedEvents) {
        let Some(PendingFailure { name, duration }) = self.pending.take() else {
            return;
        };
        let (message, details) = match diagnostic {
            Some(lines) => Diagnostic::parse(&lines).into_message_and_details(),
            None => (String::new(), String::new()),
        };

        out.push(Event::TestStarted { name: name.clone() });
        out.push(Event::TestFailed {
            name: name.clone(),
            message,
            details,
        });
        out.push(Event::TestFinished { name, duration });
    }
}

impl LineDecoder for TapDecoder {
    fn decode_line(&mut self, line: &str) -> DecodedEvents {
        let mut out = DecodedEvents::new();
        let trimmed = line.trim();

        if self.diagnostic.is_some() {
            if trimmed == DIAGNOSTIC_END {
                let lines = self.diagnostic.take();
                self.emit_pending(lines, &mut out);
            } else if let Some(lines) = &mut self.diagnostic {
                lines.push(trimmed.to_owned());
            }
            return out;
        }

        if self.pending.is_some() {
            if trimmed == DIAGNOSTIC_START {
                self.diagnostic = Some(Vec::new());
                return out;
            }
            self.emit_pending(None, &mut out);
        }

        if trimmed.starts_with("TAP version") || PLAN_RE.is_match(trimmed) {
            return out;
        }

        match TapResult::parse(trimmed) {
            Some(result) => self.handle_result(result, &mut out),
            None if !trimmed.is_empty() => out.push(Event::RawOutput {
                line: line.to_owned(),
            }),
            None => {}
        }

        out
    }

    fn finish(&mut self) -> DecodedEvents {
        let mut out = DecodedEvents::new();
        let diagnostic = self.diagnostic.take();
        self.emit_pending(diagnostic, &mut out);
        if let Some(suite) = self.current_suite.take() {
            out.push(Event::SuiteFinished { name: suite });
        }
        out
    }
}

/// A parsed `ok`/`not ok` line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct TapResult<'a> {
    ok: bool,
    suite: &'a str,
    test: &'a str,
    directive: Option<&'a str>,
}

impl<'a> TapResult<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let captures = RESULT_RE.captures(line)?;
        let ok = captures.get(1)?.as_str() == "ok";
        let rest = captures.get(3)?.as_str();

        // Directives are split off at the last separator, so a test name
        // containing " # " is split in the wrong place.
        let (full_name, directive) = match rest.rfind(DIRECTIVE_SEPARATOR) {
            Some(idx) => (
                &rest[..idx],
                Some(&rest[idx + DIRECTIVE_SEPARATOR.len()..]),
            ),
            None => (rest, None),
        };
        let (suite, test) = split_name(full_name);

        Some(Self {
            ok,
            suite,
            test,
            directive,
        })
    }

    fn duration(&self) -> Duration {
        self.directive
            .and_then(|directive| TIME_RE.captures(directive))
            .and_then(|captures| captures.get(1)?.as_str().parse::<f64>().ok())
            .map(millis_to_duration)
            .unwrap_or_default()
    }

    fn skip_reason(&self) -> Option<&'a str> {
        let captures = SKIP_RE.captures(self.directive?)?;
        Some(captures.get(1).map_or("", |m| m.as_str().trim()))
    }
}

/// Splits a flat name into `(suite, test)`.
///
/// With three or more segments the first one is the source file, which is
/// dropped, and the middle segments form the suite.
fn split_name(full_name: &str) -> (&str, &str) {
    let segments: Vec<_> = full_name.split(NAME_SEPARATOR).collect();
    match segments.as_slice() {
        [single] => (*single, *single),
        [suite, test] => (*suite, *test),
        [file, .., test] => {
            // The middle segments are contiguous in the input.
            let start = file.len() + NAME_SEPARATOR.len();
            let end = full_name.len() - test.len() - NAME_SEPARATOR.len();
            (&full_name[start..end], *test)
        }
        [] => (full_name, full_name),
    }
}

/// The fields of a diagnostic block that are interpreted.
#[derive(Debug, Default)]
struct Diagnostic {
    message: String,
    at: String,
    actual: String,
    expected: String,
}

impl Diagnostic {
    fn parse(lines: &[String]) -> Self {
        let mut diagnostic = Self::default();
        for line in lines {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            let field = match key.trim() {
                "message" => &mut diagnostic.message,
                "at" => &mut diagnostic.at,
                "actual" => &mut diagnostic.actual,
                "expected" => &mut diagnostic.expected,
                _ => continue,
            };
            *field = value.to_owned();
        }
        diagnostic
    }

    fn into_message_and_details(self) -> (String, String) {
        let message = if !self.message.is_empty() {
            self.message
        } else if !self.actual.is_empty() || !self.expected.is_empty() {
            format!("expected: {}, actual: {}", self.expected, self.actual)
        } else {
            String::new()
        };
        (message, self.at)
    }
}
