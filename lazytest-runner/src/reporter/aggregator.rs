// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestCase, TestCounts, TestStatus, TestSuite};
use crate::events::{Event, RunId, TargetDone, TargetEvent, TargetEventKind, TargetId, TargetOutcome};
use indexmap::IndexMap;
use std::time::Duration;
use tracing::trace;

/// Builds live per-target suite/test trees from the events of a single run.
///
/// Lookups are always scoped to the currently open suite of one target, so
/// same-named suites in different targets never collide.
#[derive(Clone, Debug)]
pub struct RunAggregator {
    run_id: RunId,
    expected: Vec<TargetId>,
    targets: IndexMap<TargetId, TargetRunState>,
}

/// Whether an event was applied by [`RunAggregator::apply`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub enum ApplyOutcome {
    /// The event belongs to this run and was applied.
    Applied,
    /// The event belongs to a different run and was ignored.
    Stale,
}

impl RunAggregator {
    /// Creates an aggregator for the given run, which is complete once each
    /// of `expected` has reported that it is done.
    pub fn new(run_id: RunId, expected: impl IntoIterator<Item = TargetId>) -> Self {
        Self {
            run_id,
            expected: expected.into_iter().collect(),
            targets: IndexMap::new(),
        }
    }

    /// Returns the run this aggregator tracks.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Applies a single event.
    pub fn apply(&mut self, event: &TargetEvent) -> ApplyOutcome {
        if event.run_id != self.run_id {
            trace!(
                run_id = %event.run_id,
                current = %self.run_id,
                target = %event.target,
                "ignoring event from superseded run"
            );
            return ApplyOutcome::Stale;
        }

        let state = self.targets.entry(event.target.clone()).or_default();
        match &event.kind {
            TargetEventKind::Event(event) => state.apply_event(event),
            TargetEventKind::Done(done) => state.apply_done(done),
        }
        ApplyOutcome::Applied
    }

    /// Returns the state of a target, if it has produced any events yet.
    pub fn target(&self, target: &TargetId) -> Option<&TargetRunState> {
        self.targets.get(target)
    }

    /// Iterates over targets in the order they first produced an event.
    pub fn targets(&self) -> impl Iterator<Item = (&TargetId, &TargetRunState)> {
        self.targets.iter()
    }

    /// Returns true once every expected target, and every target seen so far,
    /// has reported that it is done.
    ///
    /// The last suite of a target closing is not enough: the process may still
    /// be running.
    pub fn all_done(&self) -> bool {
        self.expected
            .iter()
            .all(|target| self.targets.get(target).is_some_and(|state| state.done))
            && self.targets.values().all(|state| state.done)
    }

    /// Returns the aggregated results so far.
    pub fn snapshot(&self) -> AggregatedRun {
        AggregatedRun {
            run_id: self.run_id,
            runs: self
                .targets
                .iter()
                .map(|(target, state)| TargetRun::new(target.clone(), state.clone()))
                .collect(),
        }
    }

    /// Consumes the aggregator, returning the final results.
    pub fn finish(self) -> AggregatedRun {
        AggregatedRun {
            run_id: self.run_id,
            runs: self
                .targets
                .into_iter()
                .map(|(target, state)| TargetRun::new(target, state))
                .collect(),
        }
    }
}

/// The state of a single target within a run.
#[derive(Clone, Debug, Default)]
pub struct TargetRunState {
    suites: Vec<TestSuite>,
    current: Option<usize>,
    done: bool,
    cancelled: bool,
    error: Option<String>,
    raw_lines: usize,
}

impl TargetRunState {
    /// Returns suites in the order they were discovered.
    pub fn suites(&self) -> &[TestSuite] {
        &self.suites
    }

    /// Returns the currently open suite, if any.
    pub fn current_suite(&self) -> Option<&TestSuite> {
        self.current.map(|idx| &self.suites[idx])
    }

    /// Returns true once the target's process has been reaped.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Returns true if the target was cancelled before it finished.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns the infrastructure or spawn error reported for this target.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the number of non-protocol lines the target printed.
    pub fn raw_output_lines(&self) -> usize {
        self.raw_lines
    }

    fn current_test_mut(&mut self, name: &str) -> Option<&mut TestCase> {
        let idx = self.current?;
        self.suites[idx].test_mut(name)
    }

    fn apply_event(&mut self, event: &Event) {
        match event {
            Event::SuiteStarted { name } => {
                self.suites.push(TestSuite::started(name.clone()));
                self.current = Some(self.suites.len() - 1);
            }
            Event::SuiteFinished { name } => {
                if let Some(idx) = self.current
                    && self.suites[idx].name == *name
                {
                    let suite = &mut self.suites[idx];
                    suite.status = suite.computed_status();
                    self.current = None;
                }
            }
            Event::TestStarted { name } => {
                if let Some(idx) = self.current {
                    let suite = &mut self.suites[idx];
                    let test = TestCase::started(name.clone(), suite.name.clone());
                    suite.tests.push(test);
                } else {
                    trace!(test = %name, "dropping test started outside of a suite");
                }
            }
            Event::TestFinished { name, duration } => {
                if let Some(test) = self.current_test_mut(name) {
                    if test.status == TestStatus::Running {
                        test.status = TestStatus::Passed;
                    }
                    test.duration = *duration;
                }
            }
            Event::TestFailed {
                name,
                message,
                details,
            } => {
                if let Some(test) = self.current_test_mut(name) {
                    test.status = TestStatus::Failed;
                    test.message.clone_from(message);
                    test.details.clone_from(details);
                }
            }
            Event::TestIgnored { name, message } => {
                if let Some(test) = self.current_test_mut(name) {
                    test.status = TestStatus::Skipped;
                    test.message.clone_from(message);
                }
            }
            Event::RawOutput { .. } => {
                self.raw_lines += 1;
            }
        }
    }

    fn apply_done(&mut self, done: &TargetDone) {
        self.done = true;
        self.cancelled = done.outcome == TargetOutcome::Cancelled;
        self.error = done.error_message().map(ToOwned::to_owned);
    }
}

/// The results of a run, across all targets.
#[derive(Clone, Debug)]
pub struct AggregatedRun {
    /// The run these results belong to.
    pub run_id: RunId,
    /// Per-target results, in the order targets first produced output.
    pub runs: Vec<TargetRun>,
}

impl AggregatedRun {
    /// Returns the counts summed across all targets.
    pub fn counts(&self) -> TestCounts {
        let mut counts = TestCounts::default();
        for run in &self.runs {
            counts += run.counts;
        }
        counts
    }

    /// Returns the total duration summed across all targets.
    pub fn duration(&self) -> Duration {
        self.runs.iter().map(|run| run.duration).sum()
    }

    /// Returns true if no test failed and no target reported an error.
    pub fn is_success(&self) -> bool {
        self.runs
            .iter()
            .all(|run| run.counts.failed == 0 && run.error.is_none())
    }
}

/// The results of a single target.
#[derive(Clone, Debug)]
pub struct TargetRun {
    /// The target.
    pub target: TargetId,
    /// Suites in discovery order.
    pub suites: Vec<TestSuite>,
    /// Test counts across all suites.
    pub counts: TestCounts,
    /// Sum of all test durations.
    pub duration: Duration,
    /// The infrastructure or spawn error, if any.
    pub error: Option<String>,
    /// True if the target was cancelled.
    pub cancelled: bool,
}

impl TargetRun {
    fn new(target: TargetId, state: TargetRunState) -> Self {
        let counts = TestCounts::from_suites(&state.suites);
        let duration = state.suites.iter().map(TestSuite::duration).sum();
        Self {
            target,
            suites: state.suites,
            counts,
            duration,
            error: state.error,
            cancelled: state.cancelled,
        }
    }
}
