// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts},
    reporter::{LineReporter, ReporterStyles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use lazytest_runner::{
    config::LazytestConfig,
    runner::SessionRunnerBuilder,
    signal::SignalHandlerKind,
};
use owo_colors::OwoColorize;
use std::io::{self, BufWriter, Write};
use tracing::{debug, warn};

/// Run tests across several test frameworks at once, with live results.
///
/// Targets are read from `.lazytest.toml` in the current directory.
#[derive(Debug, Parser)]
#[command(version, name = "lazytest", styles = crate::output::clap_styles::style())]
pub struct LazytestApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl LazytestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let root = current_dir()?;
        match self.command {
            Command::Run(opts) => opts.exec(&root, &self.config_opts, output),
            Command::ListTargets => {
                let config = self.config_opts.make_config(&root)?;
                list_targets(&config, output, &mut io::stdout().lock())
                    .map_err(ExpectedError::write_error)?;
                Ok(0)
            }
        }
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .lazytest.toml in the current directory]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, root: &Utf8Path) -> Result<LazytestConfig> {
        let config = LazytestConfig::from_sources(root, self.config.as_deref())?;
        if config.targets().is_empty() {
            return Err(ExpectedError::NoTargets {
                config_file: config.config_file().to_owned(),
            });
        }
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run targets against a set of test files
    Run(RunOpts),
    /// List configured targets
    ListTargets,
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Only run this target (can be repeated) [default: all targets]
    #[arg(long = "target", short = 't', value_name = "NAME")]
    targets: Vec<String>,

    /// Test files to pass to each target, relative to the current directory
    #[arg(value_name = "FILES")]
    files: Vec<String>,
}

impl RunOpts {
    fn exec(self, root: &Utf8Path, config_opts: &ConfigOpts, output: OutputContext) -> Result<i32> {
        let config = config_opts.make_config(root)?;
        let plans = config.plans(&self.files, &self.targets)?;
        debug!(targets = plans.len(), files = self.files.len(), "built plans");

        let runner = SessionRunnerBuilder::default().build(SignalHandlerKind::Standard)?;

        let mut styles = ReporterStyles::default();
        if output
            .color
            .should_colorize(supports_color::Stream::Stderr)
        {
            styles.colorize();
        }
        let mut reporter = LineReporter::new(BufWriter::new(io::stderr()), styles, output.verbose);
        let outcome = runner.execute(plans, |event| reporter.report_event(event));
        reporter
            .finish(&outcome)
            .map_err(ExpectedError::write_error)?;

        if let Some(signal) = outcome.interrupted {
            warn!("run interrupted by {} signal", signal.as_str());
            return Err(ExpectedError::TestRunFailed);
        }
        if !outcome.run.is_success() {
            return Err(ExpectedError::TestRunFailed);
        }
        Ok(0)
    }
}

fn list_targets(
    config: &LazytestConfig,
    output: OutputContext,
    writer: &mut impl Write,
) -> io::Result<()> {
    let colorize = output.color.should_colorize(supports_color::Stream::Stdout);
    for target in config.targets() {
        let name = target.name().as_str();
        if colorize {
            write!(writer, "{}", name.magenta().bold())?;
        } else {
            write!(writer, "{name}")?;
        }
        write!(writer, " ({}): {}", target.dialect(), target.command())?;
        if let Some(dir) = target.working_dir() {
            write!(writer, " [in {dir}]")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirInvalid { err })?;
    Utf8PathBuf::try_from(dir).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 {
        path: err.into_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Color;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_run_args() {
        let app = LazytestApp::try_parse_from([
            "lazytest",
            "run",
            "--config",
            "ci/lazytest.toml",
            "-t",
            "phpunit",
            "--target",
            "vitest",
            "--color",
            "never",
            "tests/A.php",
            "src/b.test.ts",
        ])
        .expect("valid args");

        assert_eq!(
            app.config_opts.config.as_deref(),
            Some(Utf8Path::new("ci/lazytest.toml"))
        );
        assert_eq!(app.output.color, Color::Never);
        let Command::Run(opts) = app.command else {
            panic!("expected run command");
        };
        assert_eq!(opts.targets, ["phpunit", "vitest"]);
        assert_eq!(opts.files, ["tests/A.php", "src/b.test.ts"]);
    }

    #[test]
    fn list() {
        let config = LazytestConfig::from_toml_str(
            "test.toml",
            indoc! {r#"
                [[targets]]
                name = "phpunit"
                command = "./vendor/bin/phpunit --teamcity {files}"
                working-dir = "backend"

                [[targets]]
                name = "vitest"
                command = "npx vitest run {files}"
                dialect = "tap"
            "#},
        )
        .unwrap();
        let output = OutputContext {
            verbose: false,
            color: Color::Never,
        };

        let mut buf = Vec::new();
        list_targets(&config, output, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            indoc! {"
                phpunit (teamcity): ./vendor/bin/phpunit --teamcity {files} [in backend]
                vitest (tap): npx vitest run {files}
            "}
        );
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        LazytestApp::command().debug_assert();
    }
}
