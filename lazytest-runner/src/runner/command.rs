// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::CommandTemplateError;
use std::fmt;

const FILES: &str = "{files}";
const FILE: &str = "{file}";
const REPORTER: &str = "{reporter}";

/// A target command line with placeholders.
///
/// The command is split into words with shell quoting rules, but is never run
/// through a shell. Supported placeholders:
///
/// * `{files}`: all file paths. As a word of its own it expands to one
///   argument per path, otherwise to the paths joined by spaces.
/// * `{file}`: the first file path, or nothing if there are no files.
/// * `{reporter}`: the path to an output adapter, or nothing if none is set.
///
/// A word that consists of a single placeholder expanding to nothing is
/// dropped from the command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandTemplate {
    raw: String,
    words: Vec<String>,
}

impl CommandTemplate {
    /// Parses a command template.
    pub fn parse(input: &str) -> Result<Self, CommandTemplateError> {
        let words = shell_words::split(input).map_err(|err| CommandTemplateError::Split {
            input: input.to_owned(),
            message: err.to_string(),
        })?;
        if words.is_empty() {
            return Err(CommandTemplateError::Empty);
        }
        Ok(Self {
            raw: input.to_owned(),
            words,
        })
    }

    /// Returns the template as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Renders the template into an argument vector. The first element is the
    /// program.
    pub fn render(&self, files: &[String], reporter: Option<&str>) -> Vec<String> {
        let first = files.first().map_or("", String::as_str);
        let reporter = reporter.unwrap_or("");

        let mut argv = Vec::with_capacity(self.words.len() + files.len());
        for word in &self.words {
            match word.as_str() {
                FILES => argv.extend(files.iter().cloned()),
                FILE if first.is_empty() => {}
                REPORTER if reporter.is_empty() => {}
                _ => argv.push(
                    word.replace(FILES, &files.join(" "))
                        .replace(FILE, first)
                        .replace(REPORTER, reporter),
                ),
            }
        }
        argv
    }

    /// Renders the template into a single quoted command line, for display.
    pub fn display(&self, files: &[String], reporter: Option<&str>) -> String {
        shell_words::join(self.render(files, reporter))
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
