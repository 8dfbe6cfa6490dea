// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The event vocabulary shared by both protocol decoders, and the tagged
//! events the executor sends to consumers.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, process::ExitStatus, time::Duration};

/// A single decoded protocol event.
///
/// Events are produced by a [`LineDecoder`](crate::decoder::LineDecoder) and
/// consumed by a [`RunAggregator`](crate::reporter::RunAggregator).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A suite started.
    SuiteStarted {
        /// The raw protocol identifier of the suite. May be hierarchical.
        name: String,
    },

    /// A suite finished.
    SuiteFinished {
        /// The raw protocol identifier of the suite.
        name: String,
    },

    /// A test started running.
    TestStarted {
        /// The name of the test.
        name: String,
    },

    /// A test finished running. Always follows any `TestFailed` or
    /// `TestIgnored` event for the same test.
    TestFinished {
        /// The name of the test.
        name: String,

        /// The time the test took, as reported by the test framework. Zero if
        /// the framework didn't report a usable duration.
        duration: Duration,
    },

    /// A test failed.
    TestFailed {
        /// The name of the test.
        name: String,

        /// The failure message, possibly empty.
        message: String,

        /// Additional details (typically a location or stack trace), possibly
        /// empty.
        details: String,
    },

    /// A test was skipped.
    TestIgnored {
        /// The name of the test.
        name: String,

        /// The reason the test was skipped, possibly empty.
        message: String,
    },

    /// A line that isn't part of the protocol.
    RawOutput {
        /// The original text of the line.
        line: String,
    },
}

impl Event {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SuiteStarted { .. } => EventKind::SuiteStarted,
            Self::SuiteFinished { .. } => EventKind::SuiteFinished,
            Self::TestStarted { .. } => EventKind::TestStarted,
            Self::TestFinished { .. } => EventKind::TestFinished,
            Self::TestFailed { .. } => EventKind::TestFailed,
            Self::TestIgnored { .. } => EventKind::TestIgnored,
            Self::RawOutput { .. } => EventKind::RawOutput,
        }
    }

    /// Returns the suite or test name this event refers to, or `None` for raw
    /// output.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::SuiteStarted { name }
            | Self::SuiteFinished { name }
            | Self::TestStarted { name }
            | Self::TestFinished { name, .. }
            | Self::TestFailed { name, .. }
            | Self::TestIgnored { name, .. } => Some(name),
            Self::RawOutput { .. } => None,
        }
    }

    /// Returns true if this event was decoded from protocol output, i.e. it is
    /// anything other than [`Event::RawOutput`].
    #[inline]
    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::RawOutput { .. })
    }
}

/// The kind of an [`Event`], without its payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    /// See [`Event::SuiteStarted`].
    SuiteStarted,
    /// See [`Event::SuiteFinished`].
    SuiteFinished,
    /// See [`Event::TestStarted`].
    TestStarted,
    /// See [`Event::TestFinished`].
    TestFinished,
    /// See [`Event::TestFailed`].
    TestFailed,
    /// See [`Event::TestIgnored`].
    TestIgnored,
    /// See [`Event::RawOutput`].
    RawOutput,
}

/// The identity of a configured target.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(SmolStr);

impl TargetId {
    /// Creates a new target ID.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(SmolStr::new(name))
    }

    /// Returns the target name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifies one run (generation) across all targets.
///
/// Run IDs handed out by a [`TargetExecutor`](crate::runner::TargetExecutor)
/// are strictly increasing, so results from a cancelled run can be recognized
/// after a newer run has started.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// An event tagged with the run and target that produced it.
#[derive(Debug)]
pub struct TargetEvent {
    /// The run this event belongs to.
    pub run_id: RunId,

    /// The target that produced this event.
    pub target: TargetId,

    /// The payload.
    pub kind: TargetEventKind,
}

/// The payload of a [`TargetEvent`].
#[derive(Debug)]
pub enum TargetEventKind {
    /// A decoded protocol event.
    Event(Event),

    /// The target has finished. This is always the last message for a target
    /// within a run, and is sent exactly once even if the target produced no
    /// events at all.
    Done(TargetDone),
}

/// Completion information for a single target.
#[derive(Clone, Debug)]
pub struct TargetDone {
    /// The number of structured (non-raw) events the target produced.
    pub structured_events: usize,

    /// The exit status of the subprocess, if it was spawned and reaped.
    pub exit_status: Option<ExitStatus>,

    /// How the target ended.
    pub outcome: TargetOutcome,
}

impl TargetDone {
    /// Returns the error message to surface for this target, if any.
    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            TargetOutcome::InfrastructureFailure(message)
            | TargetOutcome::SpawnFailure(message) => Some(message),
            TargetOutcome::Completed | TargetOutcome::Cancelled => None,
        }
    }
}

/// How a target ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TargetOutcome {
    /// The target produced structured output, or exited successfully without
    /// any. The exit code is not otherwise interpreted: failing tests also
    /// cause non-zero exit codes.
    Completed,

    /// The subprocess exited unsuccessfully without producing any structured
    /// output. Carries captured stderr, or the process error if stderr was
    /// empty.
    InfrastructureFailure(String),

    /// The subprocess or one of its pipes could not be set up.
    SpawnFailure(String),

    /// The run was cancelled before the target finished.
    Cancelled,
}
