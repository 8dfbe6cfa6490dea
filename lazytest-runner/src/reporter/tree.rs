// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, time::Duration};

/// The status of a test case, or the aggregate status of a suite.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum TestStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Currently running.
    Running,
    /// Finished successfully.
    Passed,
    /// Finished with a failure.
    Failed,
    /// Skipped by the test framework.
    Skipped,
}

impl TestStatus {
    /// Computes the aggregate status of a group of statuses.
    ///
    /// Any failure makes the group fail, then anything still running keeps it
    /// running, then anything pending keeps it pending. Otherwise the group
    /// passed: skipped children never make a group non-passing, so a group of
    /// only skipped (or no) children has passed.
    pub fn aggregate(statuses: impl IntoIterator<Item = TestStatus>) -> TestStatus {
        let (mut running, mut pending) = (false, false);
        for status in statuses {
            match status {
                TestStatus::Failed => return TestStatus::Failed,
                TestStatus::Running => running = true,
                TestStatus::Pending => pending = true,
                TestStatus::Passed | TestStatus::Skipped => {}
            }
        }
        if running {
            TestStatus::Running
        } else if pending {
            TestStatus::Pending
        } else {
            TestStatus::Passed
        }
    }

    /// Returns true if this status is final.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Skipped)
    }

    /// Returns the lowercase name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCase {
    /// The name of the test.
    pub name: String,
    /// The name of the suite the test belongs to.
    pub suite: String,
    /// The current status.
    pub status: TestStatus,
    /// The duration reported by the framework.
    pub duration: Duration,
    /// The failure or skip message.
    pub message: String,
    /// Failure details, typically a location or stack trace.
    pub details: String,
}

impl TestCase {
    pub(crate) fn started(name: String, suite: String) -> Self {
        Self {
            name,
            suite,
            status: TestStatus::Running,
            duration: Duration::ZERO,
            message: String::new(),
            details: String::new(),
        }
    }
}

/// A group of tests, in discovery order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestSuite {
    /// The raw protocol identifier of the suite.
    pub name: String,
    /// The tests in this suite, in the order they were started.
    pub tests: Vec<TestCase>,
    /// `Running` while the suite is open, then the aggregate status at the
    /// time the suite finished.
    pub status: TestStatus,
}

impl TestSuite {
    pub(crate) fn started(name: String) -> Self {
        Self {
            name,
            tests: Vec::new(),
            status: TestStatus::Running,
        }
    }

    /// Computes the aggregate status from the tests in this suite.
    pub fn computed_status(&self) -> TestStatus {
        TestStatus::aggregate(self.tests.iter().map(|test| test.status))
    }

    /// Returns the total duration of all tests in this suite.
    pub fn duration(&self) -> Duration {
        self.tests.iter().map(|test| test.duration).sum()
    }

    /// Finds a test by name. If several tests share a name, the most recently
    /// started one wins.
    pub(crate) fn test_mut(&mut self, name: &str) -> Option<&mut TestCase> {
        self.tests.iter_mut().rev().find(|test| test.name == name)
    }
}

/// Counts of tests by final status.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TestCounts {
    /// Number of passed tests.
    pub passed: usize,
    /// Number of failed tests.
    pub failed: usize,
    /// Number of skipped tests.
    pub skipped: usize,
    /// Number of tests that haven't finished.
    pub unfinished: usize,
}

impl TestCounts {
    /// Counts the tests in the given suites.
    pub fn from_suites<'a>(suites: impl IntoIterator<Item = &'a TestSuite>) -> Self {
        let mut counts = Self::default();
        for test in suites.into_iter().flat_map(|suite| &suite.tests) {
            match test.status {
                TestStatus::Passed => counts.passed += 1,
                TestStatus::Failed => counts.failed += 1,
                TestStatus::Skipped => counts.skipped += 1,
                TestStatus::Pending | TestStatus::Running => counts.unfinished += 1,
            }
        }
        counts
    }

    /// Returns the total number of tests.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.unfinished
    }
}

impl std::ops::AddAssign for TestCounts {
    fn add_assign(&mut self, other: Self) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.unfinished += other.unfinished;
    }
}
