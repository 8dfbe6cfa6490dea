// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for lazytest, read from `.lazytest.toml`.
//!
//! ```toml
//! reporter = "tools/teamcity-reporter.mjs"
//!
//! [[targets]]
//! name = "phpunit"
//! command = "./vendor/bin/phpunit --teamcity {files}"
//! dialect = "teamcity"
//! working-dir = "backend"
//! path-strip-prefix = "backend/"
//! ```

use crate::{
    decoder::OutputDialect,
    errors::{ConfigParseError, ConfigParseErrorKind, UnknownTargetError},
    events::TargetId,
    runner::{CommandTemplate, TargetPlan},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

/// Configuration for lazytest.
#[derive(Clone, Debug)]
pub struct LazytestConfig {
    config_file: Utf8PathBuf,
    reporter: Option<String>,
    targets: Vec<TargetConfig>,
}

impl LazytestConfig {
    /// The default location of the config file, relative to the project root.
    pub const CONFIG_PATH: &'static str = ".lazytest.toml";

    /// Reads the config from `config_file`, or from [`Self::CONFIG_PATH`]
    /// under `root` if it's not given.
    ///
    /// A missing default file is not an error and results in a config with no
    /// targets. A missing explicit file is an error.
    pub fn from_sources(
        root: impl AsRef<Utf8Path>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.as_ref().join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let deserialized: DeserializedConfig = Config::builder()
            .add_source(source)
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigParseError::new(&config_file, err.into()))?;

        Self::from_deserialized(config_file, deserialized)
    }

    /// Parses the config from a TOML string. `config_file` is only used for
    /// error messages.
    pub fn from_toml_str(
        config_file: impl Into<Utf8PathBuf>,
        contents: &str,
    ) -> Result<Self, ConfigParseError> {
        let config_file = config_file.into();
        let deserialized: DeserializedConfig = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigParseError::new(&config_file, err.into()))?;

        Self::from_deserialized(config_file, deserialized)
    }

    fn from_deserialized(
        config_file: Utf8PathBuf,
        deserialized: DeserializedConfig,
    ) -> Result<Self, ConfigParseError> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(deserialized.targets.len());
        for (index, target) in deserialized.targets.into_iter().enumerate() {
            let kind = if target.name.trim().is_empty() {
                Some(ConfigParseErrorKind::EmptyTargetName { index })
            } else if !seen.insert(target.name.clone()) {
                Some(ConfigParseErrorKind::DuplicateTarget {
                    name: TargetId::new(&target.name),
                })
            } else {
                None
            };
            if let Some(kind) = kind {
                return Err(ConfigParseError::new(config_file, kind));
            }

            let name = TargetId::new(&target.name);
            let command = match CommandTemplate::parse(&target.command) {
                Ok(command) => command,
                Err(err) => {
                    return Err(ConfigParseError::new(
                        config_file,
                        ConfigParseErrorKind::InvalidCommand { name, err },
                    ));
                }
            };

            targets.push(TargetConfig {
                name,
                command,
                dialect: target.dialect,
                working_dir: target.working_dir,
                path_strip_prefix: target.path_strip_prefix,
            });
        }

        debug!(%config_file, targets = targets.len(), "loaded config");
        Ok(Self {
            config_file,
            reporter: deserialized.reporter,
            targets,
        })
    }

    /// Returns the path the config was read from.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the reporter path used for `{reporter}` placeholders.
    pub fn reporter(&self) -> Option<&str> {
        self.reporter.as_deref()
    }

    /// Returns the configured targets, in config order.
    pub fn targets(&self) -> &[TargetConfig] {
        &self.targets
    }

    /// Returns a target by name.
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|target| target.name.as_str() == name)
    }

    /// Builds a plan for every selected target, in config order. All targets
    /// are selected if `selected` is empty.
    pub fn plans(
        &self,
        files: &[String],
        selected: &[String],
    ) -> Result<Vec<TargetPlan>, UnknownTargetError> {
        let unknown: Vec<_> = selected
            .iter()
            .filter(|name| self.target(name).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(UnknownTargetError::new(
                unknown.into_iter().cloned(),
                self.targets.iter().map(|target| target.name.as_str()),
            ));
        }

        let plans = self
            .targets
            .iter()
            .filter(|target| {
                selected.is_empty() || selected.iter().any(|name| target.name.as_str() == name)
            })
            .map(|target| target.plan(files, self.reporter()))
            .collect();
        Ok(plans)
    }
}

/// A single configured target.
#[derive(Clone, Debug)]
pub struct TargetConfig {
    name: TargetId,
    command: CommandTemplate,
    dialect: OutputDialect,
    working_dir: Option<Utf8PathBuf>,
    path_strip_prefix: Option<String>,
}

impl TargetConfig {
    /// Returns the target name.
    pub fn name(&self) -> &TargetId {
        &self.name
    }

    /// Returns the command template.
    pub fn command(&self) -> &CommandTemplate {
        &self.command
    }

    /// Returns the output dialect.
    pub fn dialect(&self) -> OutputDialect {
        self.dialect
    }

    /// Returns the working directory, if configured.
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }

    /// Rewrites a project-relative path into the form the target's command
    /// expects: the configured prefix is removed first, then the working
    /// directory.
    pub fn strip_path<'a>(&self, path: &'a str) -> &'a str {
        let mut path = path;
        if let Some(prefix) = &self.path_strip_prefix {
            path = path.strip_prefix(prefix.as_str()).unwrap_or(path);
        }
        if let Some(dir) = &self.working_dir {
            let dir = dir.as_str().trim_end_matches('/');
            if let Some(rest) = path.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
                path = rest;
            }
        }
        path
    }

    /// Builds a plan to run this target against `files`.
    pub fn plan(&self, files: &[String], reporter: Option<&str>) -> TargetPlan {
        let files: Vec<_> = files
            .iter()
            .map(|file| self.strip_path(file).to_owned())
            .collect();
        let mut plan = TargetPlan::new(
            self.name.clone(),
            self.command.render(&files, reporter),
            self.dialect,
        );
        if let Some(dir) = &self.working_dir {
            plan = plan.with_working_dir(dir.clone());
        }
        plan
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    reporter: Option<String>,
    #[serde(default)]
    targets: Vec<DeserializedTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedTarget {
    name: String,
    command: String,
    #[serde(default)]
    dialect: OutputDialect,
    #[serde(default)]
    working_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    path_strip_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const CONFIG: &str = indoc! {r#"
        reporter = "tools/reporter.mjs"

        [[targets]]
        name = "phpunit"
        command = "./vendor/bin/phpunit --teamcity {files}"
        working-dir = "backend"
        path-strip-prefix = "src/"

        [[targets]]
        name = "vitest"
        command = "npx vitest run --reporter={reporter} {files}"
        dialect = "tap"
    "#};

    #[test]
    fn parse_config() {
        let config = LazytestConfig::from_toml_str("test.toml", CONFIG).expect("valid config");
        assert_eq!(config.reporter(), Some("tools/reporter.mjs"));

        let names: Vec<_> = config.targets().iter().map(|t| t.name().as_str()).collect();
        assert_eq!(names, vec!["phpunit", "vitest"]);

        let phpunit = config.target("phpunit").unwrap();
        assert_eq!(phpunit.dialect(), OutputDialect::Teamcity);
        assert_eq!(phpunit.working_dir(), Some(Utf8Path::new("backend")));
        assert_eq!(config.target("vitest").unwrap().dialect(), OutputDialect::Tap);
    }

    #[test]
    fn read_from_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(LazytestConfig::CONFIG_PATH), CONFIG).unwrap();

        let config = LazytestConfig::from_sources(dir.path(), None).expect("config read");
        assert_eq!(config.targets().len(), 2);
        assert_eq!(
            config.config_file().as_str(),
            dir.path().join(LazytestConfig::CONFIG_PATH).as_str()
        );
    }

    #[test]
    fn missing_default_file_is_empty() {
        let dir = tempdir().unwrap();
        let config = LazytestConfig::from_sources(dir.path(), None).expect("no file is ok");
        assert!(config.targets().is_empty());
    }

    #[test]
    fn missing_explicit_file_errors() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("nope.toml");
        let err = LazytestConfig::from_sources(dir.path(), Some(file.as_path())).unwrap_err();
        assert_eq!(err.config_file(), &file);
        assert!(matches!(err.kind(), ConfigParseErrorKind::Build(_)));
    }

    #[test_case(
        indoc! {r#"
            [[targets]]
            name = ""
            command = "jest"
        "#},
        |kind| matches!(kind, ConfigParseErrorKind::EmptyTargetName { index: 0 })
        ; "empty name"
    )]
    #[test_case(
        indoc! {r#"
            [[targets]]
            name = "jest"
            command = "jest"

            [[targets]]
            name = "jest"
            command = "jest --ci"
        "#},
        |kind| matches!(kind, ConfigParseErrorKind::DuplicateTarget { name } if name.as_str() == "jest")
        ; "duplicate name"
    )]
    #[test_case(
        indoc! {r#"
            [[targets]]
            name = "jest"
            command = ""
        "#},
        |kind| matches!(kind, ConfigParseErrorKind::InvalidCommand { .. })
        ; "empty command"
    )]
    #[test_case(
        indoc! {r#"
            [[targets]]
            name = "jest"
            command = "jest"
            dialect = "junit"
        "#},
        |kind| matches!(kind, ConfigParseErrorKind::Build(_))
        ; "unknown dialect"
    )]
    fn invalid_config(input: &str, check: fn(&ConfigParseErrorKind) -> bool) {
        let err = LazytestConfig::from_toml_str("test.toml", input).unwrap_err();
        assert!(check(err.kind()), "unexpected error kind: {:?}", err.kind());
    }

    #[test_case("src/backend/tests/UserTest.php", "tests/UserTest.php" ; "prefix then working dir")]
    #[test_case("backend/tests/UserTest.php", "tests/UserTest.php" ; "working dir only")]
    #[test_case("frontend/app.test.ts", "frontend/app.test.ts" ; "unrelated")]
    #[test_case("backendish/a.php", "backendish/a.php" ; "working dir is a path component")]
    fn strip_path(input: &str, expected: &str) {
        let config = LazytestConfig::from_toml_str("test.toml", CONFIG).unwrap();
        let phpunit = config.target("phpunit").unwrap();
        assert_eq!(phpunit.strip_path(input), expected);
    }

    #[test]
    fn plans() {
        let config = LazytestConfig::from_toml_str("test.toml", CONFIG).unwrap();
        let files = vec!["backend/tests/A.php".to_owned()];

        let plans = config.plans(&files, &[]).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(
            plans[0].argv(),
            ["./vendor/bin/phpunit", "--teamcity", "tests/A.php"]
        );
        assert_eq!(plans[0].working_dir(), Some(Utf8Path::new("backend")));
        assert_eq!(
            plans[1].argv(),
            [
                "npx",
                "vitest",
                "run",
                "--reporter=tools/reporter.mjs",
                "backend/tests/A.php"
            ]
        );

        let plans = config.plans(&files, &["vitest".to_owned()]).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].target().as_str(), "vitest");

        let err = config.plans(&files, &["rspec".to_owned()]).unwrap_err();
        assert_eq!(err.unknown(), ["rspec"]);
    }
}
