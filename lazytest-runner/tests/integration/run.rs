// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure, eyre};
use lazytest_runner::{
    config::LazytestConfig,
    decoder::{OutputDialect, decode_all},
    events::{RunId, TargetDone, TargetEvent, TargetEventKind, TargetId, TargetOutcome},
    reporter::{AggregatedRun, RunAggregator, TargetRun, TestCounts, TestStatus},
    runner::{RunnerEvent, SessionRunnerBuilder},
    signal::SignalHandlerKind,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn execute(config: &LazytestConfig, targets: &[String]) -> Result<(AggregatedRun, usize)> {
    let plans = config.plans(&[], targets)?;
    let runner = SessionRunnerBuilder::default().build(SignalHandlerKind::Noop)?;

    let mut events = 0;
    let outcome = runner.execute(plans, |event| {
        if let RunnerEvent::Event { .. } = event {
            events += 1;
        }
    });
    ensure!(outcome.interrupted.is_none(), "run was not interrupted");
    Ok((outcome.run, events))
}

fn target_run<'a>(run: &'a AggregatedRun, name: &str) -> Result<&'a TargetRun> {
    run.runs
        .iter()
        .find(|run| run.target.as_str() == name)
        .ok_or_else(|| eyre!("target {name} not in results"))
}

#[test]
fn run_all_targets() -> Result<()> {
    test_init();

    let project = TempProject::new()?;
    let config = LazytestConfig::from_sources(project.root(), None)?;
    let (run, events) = execute(&config, &[])?;

    let expected_counts = TestCounts {
        passed: 2,
        failed: 1,
        skipped: 1,
        unfinished: 0,
    };

    let phpunit = target_run(&run, "phpunit")?;
    assert_eq!(phpunit.error, None);
    assert_eq!(phpunit.counts, expected_counts);
    assert_eq!(phpunit.duration, Duration::from_millis(4));
    let suites: Vec<_> = phpunit
        .suites
        .iter()
        .map(|suite| (suite.name.as_str(), suite.status))
        .collect();
    assert_eq!(
        suites,
        [
            ("Tests\\Unit\\MathTest", TestStatus::Failed),
            ("Tests\\Unit\\StringTest", TestStatus::Passed),
        ]
    );
    let divide = &phpunit.suites[0].tests[1];
    assert_eq!(divide.name, "testDivide");
    assert_eq!(divide.message, "Failed asserting that 2 matches expected 3.");
    assert_eq!(divide.details, "/app/tests/Unit/MathTest.php:21\n");
    assert_eq!(
        phpunit.suites[1].tests[1].message,
        "intl extension missing"
    );

    let vitest = target_run(&run, "vitest")?;
    assert_eq!(vitest.error, None);
    assert_eq!(vitest.counts, expected_counts);
    let suites: Vec<_> = vitest
        .suites
        .iter()
        .map(|suite| (suite.name.as_str(), suite.status))
        .collect();
    assert_eq!(
        suites,
        [
            ("math", TestStatus::Failed),
            ("strings > nested", TestStatus::Passed),
        ]
    );
    let divides = &vitest.suites[0].tests[1];
    assert_eq!(divides.message, "expected 2 to be 3");
    assert_eq!(divides.details, "src/math.test.ts:9:21");
    assert_eq!(vitest.suites[1].tests[1].message, "needs ICU");

    assert_eq!(run.counts().total(), 8);
    assert!(!run.is_success());
    ensure!(events > 0, "callback saw events");

    Ok(())
}

#[test]
fn live_run_matches_replay() -> Result<()> {
    test_init();

    let project = TempProject::new()?;
    let config = LazytestConfig::from_sources(project.root(), None)?;
    let (live, _) = execute(&config, &["vitest".to_owned()])?;
    ensure!(live.runs.len() == 1, "only the selected target ran");

    // Feed the same output through an aggregator directly.
    let run_id = RunId(1);
    let target = TargetId::new("vitest");
    let mut aggregator = RunAggregator::new(run_id, [target.clone()]);
    let events = decode_all(OutputDialect::Tap, VITEST_OUTPUT)
        .into_iter()
        .map(TargetEventKind::Event)
        .chain([TargetEventKind::Done(TargetDone {
            structured_events: 0,
            exit_status: None,
            outcome: TargetOutcome::Completed,
        })]);
    for kind in events {
        let _ = aggregator.apply(&TargetEvent {
            run_id,
            target: target.clone(),
            kind,
        });
    }
    ensure!(aggregator.all_done(), "replayed target is done");
    let replayed = aggregator.finish();

    assert_eq!(live.runs[0].suites, replayed.runs[0].suites);
    assert_eq!(live.runs[0].counts, replayed.runs[0].counts);

    Ok(())
}

#[test]
fn unknown_target() -> Result<()> {
    test_init();

    let project = TempProject::new()?;
    let config = LazytestConfig::from_sources(project.root(), None)?;
    let err = config
        .plans(&[], &["rspec".to_owned()])
        .expect_err("rspec isn't configured");
    assert_eq!(
        err.to_string(),
        "unknown target `rspec` (known targets: phpunit, vitest)"
    );

    Ok(())
}
