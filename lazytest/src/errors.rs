// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use camino::Utf8PathBuf;
use lazytest_runner::errors::*;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Process exit codes returned by lazytest.
#[doc(hidden)]
pub enum LazytestExitCode {}

impl LazytestExitCode {
    /// The config couldn't be read or was invalid.
    pub const CONFIG_ERROR: i32 = 96;

    /// An error occurred while setting up the run.
    pub const SETUP_ERROR: i32 = 97;

    /// At least one test failed, a target couldn't run, or the run was
    /// interrupted.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// Writing results to the terminal failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that lazytest expects might happen, as opposed to a bug.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("no targets configured")]
    NoTargets { config_file: Utf8PathBuf },
    #[error("unknown target")]
    UnknownTarget {
        #[from]
        err: UnknownTargetError,
    },
    #[error("session build error")]
    SessionBuildError {
        #[from]
        err: SessionBuildError,
    },
    #[error("error writing output")]
    WriteError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn write_error(err: std::io::Error) -> Self {
        Self::WriteError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. } | Self::NoTargets { .. } => {
                LazytestExitCode::CONFIG_ERROR
            }
            Self::CurrentDirInvalid { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::UnknownTarget { .. }
            | Self::SessionBuildError { .. } => LazytestExitCode::SETUP_ERROR,
            Self::WriteError { .. } => LazytestExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => LazytestExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirInvalid { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse lazytest config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::NoTargets { config_file } => {
                error!(
                    "no targets configured (add [[targets]] to `{}`)",
                    config_file.style(styles.bold)
                );
                None
            }
            Self::UnknownTarget { err } => {
                error!("{err}");
                None
            }
            Self::SessionBuildError { err } => {
                error!("failed to set up the run");
                Some(err as &dyn Error)
            }
            Self::WriteError { err } => {
                error!("failed to write results");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: "lazytest::no_heading", "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
