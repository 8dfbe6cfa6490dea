// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming decoders for test framework output.
//!
//! Two line-oriented dialects are supported:
//!
//! * [TeamCity service messages](teamcity), as emitted by PHPUnit's
//!   `--teamcity` flag and by custom reporters for JS test runners.
//! * [TAP v13 "flat"](tap), where the suite hierarchy is folded into a single
//!   name field per result line.
//!
//! Decoders are fed one line at a time and never need the whole output, so
//! results can be shown while a target is still running.

pub mod tap;
pub mod teamcity;

use crate::events::Event;
use serde::Deserialize;
use smallvec::SmallVec;
use std::{fmt, time::Duration};

pub use tap::TapDecoder;
pub use teamcity::TeamCityDecoder;

/// The events produced by decoding a single line.
///
/// A TAP result line can expand into up to five events (closing the previous
/// suite, opening the next one and three test events), most lines produce one.
pub type DecodedEvents = SmallVec<[Event; 2]>;

/// A line-oriented, incremental decoder.
pub trait LineDecoder: Send {
    /// Decodes a single line of output. The line must not include its
    /// terminator.
    fn decode_line(&mut self, line: &str) -> DecodedEvents;

    /// Called exactly once when the output ends, to emit anything still held
    /// back by the decoder.
    fn finish(&mut self) -> DecodedEvents;
}

/// The output dialect a target's command writes to stdout.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputDialect {
    /// TeamCity service messages.
    #[default]
    #[serde(alias = "team-city")]
    Teamcity,

    /// TAP v13, flat variant.
    Tap,
}

impl OutputDialect {
    /// Returns all known dialects.
    pub fn variants() -> &'static [&'static str] {
        &["teamcity", "tap"]
    }

    /// Creates a fresh decoder for this dialect.
    pub fn decoder(self) -> DialectDecoder {
        match self {
            Self::Teamcity => DialectDecoder::Teamcity(TeamCityDecoder::new()),
            Self::Tap => DialectDecoder::Tap(TapDecoder::new()),
        }
    }
}

impl fmt::Display for OutputDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Teamcity => f.write_str("teamcity"),
            Self::Tap => f.write_str("tap"),
        }
    }
}

/// A decoder for any [`OutputDialect`].
#[derive(Debug)]
pub enum DialectDecoder {
    /// A TeamCity decoder.
    Teamcity(TeamCityDecoder),
    /// A TAP decoder.
    Tap(TapDecoder),
}

impl LineDecoder for DialectDecoder {
    fn decode_line(&mut self, line: &str) -> DecodedEvents {
        match self {
            Self::Teamcity(decoder) => decoder.decode_line(line),
            Self::Tap(decoder) => decoder.decode_line(line),
        }
    }

    fn finish(&mut self) -> DecodedEvents {
        match self {
            Self::Teamcity(decoder) => decoder.finish(),
            Self::Tap(decoder) => decoder.finish(),
        }
    }
}

/// Converts fractional milliseconds to a duration. Negative and non-finite
/// values become zero.
pub(crate) fn millis_to_duration(millis: f64) -> Duration {
    Duration::try_from_secs_f64(millis / 1000.0).unwrap_or_default()
}

/// Decodes a complete buffer of output, including the final flush.
///
/// Useful for replaying captured output. Live runs feed decoders line by line
/// instead.
pub fn decode_all(dialect: OutputDialect, output: &str) -> Vec<Event> {
    let mut decoder = dialect.decoder();
    let mut events = Vec::new();
    for line in output.lines() {
        events.extend(decoder.decode_line(line));
    }
    events.extend(decoder.finish());
    events
}
