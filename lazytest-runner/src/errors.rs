// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by lazytest.
//!
//! Failures of individual targets are not errors: they are reported through
//! [`TargetDone`](crate::events::TargetDone) markers.

use crate::events::TargetId;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::fmt;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse lazytest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`] that occurred.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// The file could not be read or deserialized.
    #[error(transparent)]
    Build(#[from] ConfigError),

    /// A target had an empty name.
    #[error("target #{index} has an empty name")]
    EmptyTargetName {
        /// The zero-based position of the target in the config.
        index: usize,
    },

    /// Two targets share a name.
    #[error("target `{name}` is defined more than once")]
    DuplicateTarget {
        /// The duplicated name.
        name: TargetId,
    },

    /// A target's command couldn't be parsed.
    #[error("invalid command for target `{name}`")]
    InvalidCommand {
        /// The target name.
        name: TargetId,

        /// The underlying error.
        #[source]
        err: CommandTemplateError,
    },
}

/// An error that occurred while parsing a command template.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CommandTemplateError {
    /// The command line was empty.
    #[error("command is empty")]
    Empty,

    /// The command line had unbalanced quotes.
    #[error("failed to split command `{input}`: {message}")]
    Split {
        /// The command line.
        input: String,

        /// The error reported by the shell-words parser.
        message: String,
    },
}

/// One or more targets were requested that aren't configured.
#[derive(Clone, Debug, Error)]
pub struct UnknownTargetError {
    unknown: Vec<String>,
    known: Vec<String>,
}

impl UnknownTargetError {
    pub(crate) fn new(
        unknown: impl IntoIterator<Item = impl Into<String>>,
        known: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut known: Vec<_> = known.into_iter().map(Into::into).collect();
        known.sort_unstable();
        Self {
            unknown: unknown.into_iter().map(Into::into).collect(),
            known,
        }
    }

    /// Returns the names that weren't found.
    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }
}

impl fmt::Display for UnknownTargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.unknown.len() == 1 {
            "target"
        } else {
            "targets"
        };
        write!(f, "unknown {noun} `{}`", self.unknown.join("`, `"))?;
        if self.known.is_empty() {
            write!(f, " (no targets are configured)")
        } else {
            write!(f, " (known targets: {})", self.known.join(", "))
        }
    }
}

/// An error occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurred while building a [`SessionRunner`](crate::runner::SessionRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionBuildError {
    /// The tokio runtime couldn't be created.
    #[error("error creating tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// The signal handler couldn't be installed.
    #[error("error setting up signals")]
    SignalHandler(#[from] SignalHandlerSetupError),
}
