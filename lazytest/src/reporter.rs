// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plain line-based output for a run: one line per finished test, target
//! errors as they happen and a summary at the end.

use lazytest_runner::{
    events::{Event, TargetEvent, TargetEventKind, TargetOutcome},
    reporter::{AggregatedRun, RunAggregator, TestCase, TestCounts, TestStatus},
    runner::{RunnerEvent, RunnerOutcome},
};
use owo_colors::{OwoColorize, Style, style};
use std::{io, time::Duration};
use swrite::{SWrite, swrite};

#[derive(Debug, Default)]
pub(crate) struct ReporterStyles {
    pass: Style,
    fail: Style,
    skip: Style,
    error: Style,
    target: Style,
    count: Style,
    dimmed: Style,
}

impl ReporterStyles {
    pub(crate) fn colorize(&mut self) {
        self.pass = style().green().bold();
        self.fail = style().red().bold();
        self.skip = style().yellow().bold();
        self.error = style().red().bold();
        self.target = style().magenta().bold();
        self.count = style().bold();
        self.dimmed = style().dimmed();
    }
}

pub(crate) struct LineReporter<W> {
    writer: W,
    styles: ReporterStyles,
    verbose: bool,
    error: Option<io::Error>,
}

impl<W: io::Write> LineReporter<W> {
    pub(crate) fn new(writer: W, styles: ReporterStyles, verbose: bool) -> Self {
        Self {
            writer,
            styles,
            verbose,
            error: None,
        }
    }

    /// Reports a single runner event. The first write error is kept and
    /// returned by [`Self::finish`].
    pub(crate) fn report_event(&mut self, event: RunnerEvent<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(error) = self.write_event(event).and_then(|()| self.writer.flush()) {
            self.error = Some(error);
        }
    }

    /// Writes the summary, returning the writer.
    pub(crate) fn finish(mut self, outcome: &RunnerOutcome) -> io::Result<W> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        self.write_summary(&outcome.run)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_event(&mut self, event: RunnerEvent<'_>) -> io::Result<()> {
        match event {
            RunnerEvent::Started { run_id, plans } => {
                writeln!(
                    self.writer,
                    "{:>12} {} {} ({run_id})",
                    "Starting".style(self.styles.pass),
                    plans.len().style(self.styles.count),
                    plural(plans.len(), "target", "targets"),
                )?;
                if self.verbose {
                    for plan in plans {
                        writeln!(
                            self.writer,
                            "{:>12} {}",
                            plan.target().style(self.styles.target),
                            plan.display_command().style(self.styles.dimmed),
                        )?;
                    }
                }
            }
            RunnerEvent::Event { event, aggregator } => {
                self.write_target_event(event, aggregator)?;
            }
            RunnerEvent::Interrupted(signal) => {
                writeln!(
                    self.writer,
                    "{:>12} received {} signal, cancelling run",
                    "Cancelling".style(self.styles.error),
                    signal.as_str(),
                )?;
            }
        }
        Ok(())
    }

    fn write_target_event(
        &mut self,
        event: &TargetEvent,
        aggregator: &RunAggregator,
    ) -> io::Result<()> {
        match &event.kind {
            TargetEventKind::Event(Event::TestFinished { name, .. }) => {
                let Some(suite) = aggregator
                    .target(&event.target)
                    .and_then(|state| state.current_suite())
                else {
                    return Ok(());
                };
                if let Some(test) = suite.tests.iter().rev().find(|test| test.name == *name) {
                    self.write_test(event.target.as_str(), test)?;
                }
            }
            TargetEventKind::Event(Event::RawOutput { line }) if self.verbose => {
                writeln!(
                    self.writer,
                    "{:>12} {}",
                    event.target.style(self.styles.target),
                    line.style(self.styles.dimmed),
                )?;
            }
            TargetEventKind::Event(_) => {}
            TargetEventKind::Done(done) => match &done.outcome {
                TargetOutcome::InfrastructureFailure(message)
                | TargetOutcome::SpawnFailure(message) => {
                    writeln!(
                        self.writer,
                        "{:>12} {} failed to run",
                        "ERROR".style(self.styles.error),
                        event.target.style(self.styles.target),
                    )?;
                    write_indented(&mut self.writer, message)?;
                }
                TargetOutcome::Cancelled => {
                    writeln!(
                        self.writer,
                        "{:>12} {}",
                        "CANCEL".style(self.styles.error),
                        event.target.style(self.styles.target),
                    )?;
                }
                TargetOutcome::Completed => {}
            },
        }
        Ok(())
    }

    fn write_test(&mut self, target: &str, test: &TestCase) -> io::Result<()> {
        let (label, label_style) = match test.status {
            TestStatus::Passed => ("PASS", self.styles.pass),
            TestStatus::Failed => ("FAIL", self.styles.fail),
            TestStatus::Skipped => ("SKIP", self.styles.skip),
            TestStatus::Pending | TestStatus::Running => return Ok(()),
        };
        writeln!(
            self.writer,
            "{:>12} [{}] {} {} {} {}",
            label.style(label_style),
            format_duration(test.duration),
            target.style(self.styles.target),
            test.suite,
            ">".style(self.styles.dimmed),
            test.name,
        )?;
        if test.status == TestStatus::Failed {
            for text in [&test.message, &test.details] {
                if !text.trim().is_empty() {
                    write_indented(&mut self.writer, text)?;
                }
            }
        }
        Ok(())
    }

    fn write_summary(&mut self, run: &AggregatedRun) -> io::Result<()> {
        let counts = run.counts();
        let counts_line = self.format_counts(&counts);
        writeln!(self.writer, "{}", "------------".style(self.styles.dimmed))?;
        writeln!(
            self.writer,
            "{:>12} [{}] {} {} run: {}",
            "Summary".style(self.styles.pass),
            format_duration(run.duration()),
            counts.total().style(self.styles.count),
            plural(counts.total(), "test", "tests"),
            counts_line,
        )?;
        for target in &run.runs {
            let mut line = self.format_counts(&target.counts);
            if target.error.is_some() {
                swrite!(line, ", {}", "error".style(self.styles.error));
            }
            if target.cancelled {
                swrite!(line, ", {}", "cancelled".style(self.styles.error));
            }
            writeln!(
                self.writer,
                "{:>12} {line}",
                target.target.style(self.styles.target),
            )?;
        }
        Ok(())
    }

    fn format_counts(&self, counts: &TestCounts) -> String {
        let mut out = String::new();
        swrite!(
            out,
            "{} passed",
            counts.passed.style(self.styles.pass)
        );
        let failed_style = if counts.failed > 0 {
            self.styles.fail
        } else {
            self.styles.count
        };
        swrite!(out, ", {} failed", counts.failed.style(failed_style));
        if counts.skipped > 0 {
            swrite!(out, ", {} skipped", counts.skipped.style(self.styles.skip));
        }
        if counts.unfinished > 0 {
            swrite!(
                out,
                ", {} unfinished",
                counts.unfinished.style(self.styles.error)
            );
        }
        out
    }
}

fn write_indented(writer: &mut impl io::Write, text: &str) -> io::Result<()> {
    for line in text.trim_end().lines() {
        writeln!(writer, "{:>12}   {line}", "")?;
    }
    Ok(())
}

fn format_duration(duration: Duration) -> String {
    format!("{:>8.3}s", duration.as_secs_f64())
}

fn plural<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use lazytest_runner::{
        decoder::{OutputDialect, decode_all},
        events::{RunId, TargetDone, TargetId},
        reporter::ApplyOutcome,
        runner::TargetPlan,
    };
    use pretty_assertions::assert_eq;

    fn report(output: &str, verbose: bool) -> String {
        let run_id = RunId(3);
        let target = TargetId::new("vitest");
        let plans = [TargetPlan::new(
            target.clone(),
            ["npx", "vitest", "run"],
            OutputDialect::Tap,
        )];
        let mut reporter = LineReporter::new(Vec::new(), ReporterStyles::default(), verbose);
        reporter.report_event(RunnerEvent::Started {
            run_id,
            plans: &plans,
        });

        let mut aggregator = RunAggregator::new(run_id, [target.clone()]);
        let kinds = decode_all(OutputDialect::Tap, output)
            .into_iter()
            .map(TargetEventKind::Event)
            .chain([TargetEventKind::Done(TargetDone {
                structured_events: 0,
                exit_status: None,
                outcome: TargetOutcome::Completed,
            })]);
        for kind in kinds {
            let event = TargetEvent {
                run_id,
                target: target.clone(),
                kind,
            };
            assert_eq!(aggregator.apply(&event), ApplyOutcome::Applied);
            reporter.report_event(RunnerEvent::Event {
                event: &event,
                aggregator: &aggregator,
            });
        }

        let outcome = RunnerOutcome {
            run: aggregator.finish(),
            interrupted: None,
        };
        let buf = reporter.finish(&outcome).expect("writing to a Vec succeeds");
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn reports_tests_and_summary() {
        let output = indoc! {"
            ok 1 - math > adds # time=1ms
            not ok 2 - math > divides # time=2ms
              ---
              message: \"expected 2 to be 3\"
              at: \"math.test.ts:9\"
              ...
            ok 3 - strings > upper # SKIP later
        "};

        let expected = indoc! {"
                Starting 1 target (run-3)
                    PASS [   0.001s] vitest math > adds
                    FAIL [   0.002s] vitest math > divides
                           expected 2 to be 3
                           math.test.ts:9
                    SKIP [   0.000s] vitest strings > upper
            ------------
                 Summary [   0.003s] 3 tests run: 1 passed, 1 failed, 1 skipped
                  vitest 1 passed, 1 failed, 1 skipped
        "};
        assert_eq!(report(output, false), expected);
    }

    #[test]
    fn verbose_shows_commands_and_raw_output() {
        let output = "compiling...\nok 1 - s > t\n";
        let report = report(output, true);
        assert!(report.contains("      vitest npx vitest run\n"), "{report}");
        assert!(report.contains("      vitest compiling...\n"), "{report}");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "   1.500s");
        assert_eq!(format_duration(Duration::ZERO), "   0.000s");
    }
}
