// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TeamCity service message support.
//!
//! A service message is a single line of the form
//!
//! ```text
//! ##teamcity[messageName name='value' other='value']
//! ```
//!
//! Attribute values are single-quoted and use `|` as an escape character:
//!
//! | escape | meaning |
//! |--------|---------|
//! | `\|'`  | `'`     |
//! | `\|n`  | LF      |
//! | `\|r`  | CR      |
//! | `\|\|` | `\|`    |
//! | `\|[`  | `[`     |
//! | `\|]`  | `]`     |
//!
//! Any other escape is passed through as-is. Only the message types describing
//! suites and tests are interpreted; other service messages are dropped.

use super::{DecodedEvents, LineDecoder};
use crate::events::Event;
use smallvec::smallvec;
use std::time::Duration;

const PREFIX: &str = "##teamcity[";
const SUFFIX: &str = "]";

const SUITE_STARTED: &str = "testSuiteStarted";
const SUITE_FINISHED: &str = "testSuiteFinished";
const TEST_STARTED: &str = "testStarted";
const TEST_FINISHED: &str = "testFinished";
const TEST_FAILED: &str = "testFailed";
const TEST_IGNORED: &str = "testIgnored";

/// A stateless decoder for TeamCity service messages.
#[derive(Clone, Debug, Default)]
pub struct TeamCityDecoder {
    _private: (),
}

impl TeamCityDecoder {
    /// Creates a new decoder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineDecoder for TeamCityDecoder {
    fn decode_line(&mut self, line: &str) -> DecodedEvents {
        match parse_line(line) {
            ParsedLine::Event(event) => smallvec![event],
            ParsedLine::Unsupported => DecodedEvents::new(),
            ParsedLine::NotServiceMessage => smallvec![Event::RawOutput {
                line: line.to_owned()
            }],
        }
    }

    fn finish(&mut self) -> DecodedEvents {
        DecodedEvents::new()
    }
}

/// The result of parsing a single line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParsedLine {
    /// A service message describing a suite or a test.
    Event(Event),

    /// A well-formed service message of a type that isn't interpreted, such
    /// as `testCount` or `progressMessage`.
    Unsupported,

    /// The line isn't a service message.
    NotServiceMessage,
}

/// Parses a single line of output.
///
/// Leading and trailing whitespace is ignored.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    let Some(inner) = line
        .strip_prefix(PREFIX)
        .and_then(|rest| rest.strip_suffix(SUFFIX))
    else {
        return ParsedLine::NotServiceMessage;
    };

    // A message type without attributes isn't a service message.
    let Some((message_type, attrs)) = inner.split_once(' ') else {
        return ParsedLine::NotServiceMessage;
    };
    let attrs = parse_attributes(attrs);
    if message_type.is_empty() {
        return ParsedLine::NotServiceMessage;
    }

    let attr = |key: &str| -> String {
        attrs
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    let name = attr("name");

    let event = match message_type {
        SUITE_STARTED => Event::SuiteStarted { name },
        SUITE_FINISHED => Event::SuiteFinished { name },
        TEST_STARTED => Event::TestStarted { name },
        TEST_FINISHED => Event::TestFinished {
            name,
            duration: parse_duration(&attr("duration")),
        },
        TEST_FAILED => Event::TestFailed {
            name,
            message: attr("message"),
            details: attr("details"),
        },
        TEST_IGNORED => Event::TestIgnored {
            name,
            message: attr("message"),
        },
        _ => return ParsedLine::Unsupported,
    };
    ParsedLine::Event(event)
}

/// Parses `key='value'` pairs, in order of appearance.
///
/// Parsing stops at the first malformed pair; everything before it is kept.
fn parse_attributes(mut input: &str) -> Vec<(&str, String)> {
    let mut attrs = Vec::new();

    loop {
        input = input.trim_start();
        if input.is_empty() {
            break;
        }
        let Some((key, rest)) = input.split_once('=') else {
            break;
        };
        let Some(rest) = rest.strip_prefix('\'') else {
            break;
        };
        let (value, rest) = unescape_value(rest);
        attrs.push((key.trim(), value));
        input = rest;
    }

    attrs
}

/// Reads an escaped value up to the first unescaped `'`, returning the
/// unescaped value and the input following the closing quote.
///
/// An unterminated value extends to the end of the input.
fn unescape_value(input: &str) -> (String, &str) {
    let mut value = String::with_capacity(input.len());
    let mut chars = input.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '\'' => return (value, &input[idx + 1..]),
            '|' => match chars.next() {
                Some((_, '\'')) => value.push('\''),
                Some((_, 'n')) => value.push('\n'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, '|')) => value.push('|'),
                Some((_, '[')) => value.push('['),
                Some((_, ']')) => value.push(']'),
                Some((_, other)) => {
                    value.push('|');
                    value.push(other);
                }
                None => value.push('|'),
            },
            c => value.push(c),
        }
    }

    (value, "")
}

/// Escapes a value for use inside a service message attribute.
///
/// This is the inverse of the unescaping performed while parsing.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\'' => escaped.push_str("|'"),
            '\n' => escaped.push_str("|n"),
            '\r' => escaped.push_str("|r"),
            '|' => escaped.push_str("||"),
            '[' => escaped.push_str("|["),
            ']' => escaped.push_str("|]"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Parses a duration in milliseconds.
///
/// PHPUnit reports integer milliseconds while JS reporters typically report
/// fractional ones. Anything unparseable is treated as zero.
pub fn parse_duration(input: &str) -> Duration {
    let input = input.trim();
    if let Ok(millis) = input.parse::<u64>() {
        return Duration::from_millis(millis);
    }
    input
        .parse::<f64>()
        .ok()
        .map(super::millis_to_duration)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn decode(line: &str) -> Vec<Event> {
        TeamCityDecoder::new().decode_line(line).into_vec()
    }

    #[test]
    fn suite_and_test_lifecycle() {
        assert_eq!(
            parse_line("##teamcity[testSuiteStarted name='Tests\\MathTest' flowId='1']"),
            ParsedLine::Event(Event::SuiteStarted {
                name: "Tests\\MathTest".into()
            })
        );
        assert_eq!(
            parse_line("##teamcity[testStarted name='testAdd' locationHint='php_qn://x']"),
            ParsedLine::Event(Event::TestStarted {
                name: "testAdd".into()
            })
        );
        assert_eq!(
            parse_line("##teamcity[testSuiteFinished name='Tests\\MathTest']"),
            ParsedLine::Event(Event::SuiteFinished {
                name: "Tests\\MathTest".into()
            })
        );
    }

    #[test]
    fn failed_and_ignored() {
        assert_eq!(
            parse_line(
                "##teamcity[testFailed name='testDiv' message='Division by zero' details='/app/MathTest.php:12|n']"
            ),
            ParsedLine::Event(Event::TestFailed {
                name: "testDiv".into(),
                message: "Division by zero".into(),
                details: "/app/MathTest.php:12\n".into(),
            })
        );
        assert_eq!(
            parse_line("##teamcity[testIgnored name='testSkip' message='not ready']"),
            ParsedLine::Event(Event::TestIgnored {
                name: "testSkip".into(),
                message: "not ready".into(),
            })
        );
    }

    #[test]
    fn escape_round_trip() {
        let message = "it's a [test]";
        let details = "line1\nline2|pipe";
        assert_eq!(escape_value(message), "it|'s a |[test|]");
        assert_eq!(escape_value(details), "line1|nline2||pipe");

        let line = format!(
            "##teamcity[testFailed name='t' message='{}' details='{}']",
            escape_value(message),
            escape_value(details),
        );
        assert_eq!(
            line,
            "##teamcity[testFailed name='t' message='it|'s a |[test|]' details='line1|nline2||pipe']"
        );
        assert_eq!(
            parse_line(&line),
            ParsedLine::Event(Event::TestFailed {
                name: "t".into(),
                message: message.into(),
                details: details.into(),
            })
        );
    }

    #[test_case("|'", "'" ; "quote")]
    #[test_case("|n", "\n" ; "newline")]
    #[test_case("|r", "\r" ; "carriage return")]
    #[test_case("||", "|" ; "pipe")]
    #[test_case("|[", "[" ; "open bracket")]
    #[test_case("|]", "]" ; "close bracket")]
    #[test_case("|x", "|x" ; "unknown escape passes through")]
    #[test_case("|0x00e9", "|0x00e9" ; "unicode escape is not interpreted")]
    fn unescape(escaped: &str, expected: &str) {
        let line = format!("##teamcity[testStarted name='{escaped}']");
        assert_eq!(
            parse_line(&line),
            ParsedLine::Event(Event::TestStarted {
                name: expected.into()
            })
        );
    }

    #[test]
    fn value_stops_at_unescaped_quote() {
        assert_eq!(
            parse_line("##teamcity[testIgnored name='a'b' message='why']"),
            ParsedLine::Event(Event::TestIgnored {
                name: "a".into(),
                message: String::new(),
            })
        );
    }

    #[test_case("12", Duration::from_millis(12) ; "integer millis")]
    #[test_case("5.23", Duration::from_secs_f64(5.23 / 1000.0) ; "fractional millis")]
    #[test_case("", Duration::ZERO ; "empty")]
    #[test_case("abc", Duration::ZERO ; "garbage")]
    #[test_case("-4.5", Duration::ZERO ; "negative")]
    fn duration(input: &str, expected: Duration) {
        assert_eq!(parse_duration(input), expected);
    }

    #[test]
    fn test_finished_duration() {
        assert_eq!(
            decode("##teamcity[testFinished name='testAdd' duration='12']"),
            vec![Event::TestFinished {
                name: "testAdd".into(),
                duration: Duration::from_millis(12),
            }]
        );
        assert_eq!(
            decode("##teamcity[testFinished name='testAdd' duration='soon']"),
            vec![Event::TestFinished {
                name: "testAdd".into(),
                duration: Duration::ZERO,
            }]
        );
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(
            decode("   ##teamcity[testStarted name='x']  \r"),
            vec![Event::TestStarted { name: "x".into() }]
        );
    }

    #[test]
    fn unknown_message_types_are_dropped() {
        assert_eq!(
            parse_line("##teamcity[testCount count='3' flowId='1']"),
            ParsedLine::Unsupported
        );
        assert_eq!(decode("##teamcity[progressMessage 'compiling']"), vec![]);
    }

    #[test_case("Time: 00:00.012, Memory: 8.00 MB" ; "plain text")]
    #[test_case("##teamcity[testStarted name='x'" ; "missing closing bracket")]
    #[test_case("teamcity[testStarted name='x']" ; "missing prefix")]
    #[test_case("##teamcity[]" ; "empty message")]
    #[test_case("##teamcity[testStarted]" ; "no attributes")]
    fn non_service_messages_are_raw(line: &str) {
        assert_eq!(
            decode(line),
            vec![Event::RawOutput { line: line.into() }]
        );
    }

    #[test]
    fn finish_emits_nothing() {
        let mut decoder = TeamCityDecoder::new();
        decoder.decode_line("##teamcity[testSuiteStarted name='Open']");
        assert!(decoder.finish().is_empty());
    }
}
