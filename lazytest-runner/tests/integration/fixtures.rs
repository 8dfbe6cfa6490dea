// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use indoc::indoc;
use std::sync::Once;

/// Output of `phpunit --teamcity` for a small project, with one failing test
/// and a non-protocol banner line.
pub(crate) static PHPUNIT_OUTPUT: &str = indoc! {"
    PHPUnit 10.5.0 by Sebastian Bergmann and contributors.

    ##teamcity[testCount count='4' flowId='1']
    ##teamcity[testSuiteStarted name='Tests\\Unit\\MathTest' locationHint='php_qn://tests/Unit/MathTest.php::\\Tests\\Unit\\MathTest' flowId='1']
    ##teamcity[testStarted name='testAdd' locationHint='php_qn://tests/Unit/MathTest.php::\\Tests\\Unit\\MathTest::testAdd' flowId='1']
    ##teamcity[testFinished name='testAdd' duration='3' flowId='1']
    ##teamcity[testStarted name='testDivide' flowId='1']
    ##teamcity[testFailed name='testDivide' message='Failed asserting that 2 matches expected 3.' details='/app/tests/Unit/MathTest.php:21|n' duration='1' flowId='1']
    ##teamcity[testFinished name='testDivide' duration='1' flowId='1']
    ##teamcity[testSuiteFinished name='Tests\\Unit\\MathTest' flowId='1']
    ##teamcity[testSuiteStarted name='Tests\\Unit\\StringTest' flowId='1']
    ##teamcity[testStarted name='testUpper' flowId='1']
    ##teamcity[testFinished name='testUpper' duration='0' flowId='1']
    ##teamcity[testStarted name='testLocale' flowId='1']
    ##teamcity[testIgnored name='testLocale' message='intl extension missing' flowId='1']
    ##teamcity[testFinished name='testLocale' duration='0' flowId='1']
    ##teamcity[testSuiteFinished name='Tests\\Unit\\StringTest' flowId='1']

    Time: 00:00.012, Memory: 8.00 MB

    FAILURES!
    Tests: 4, Assertions: 4, Failures: 1, Skipped: 1.
"};

/// Output of a TAP "flat" reporter for a small JS project.
pub(crate) static VITEST_OUTPUT: &str = indoc! {"
    TAP version 13
    1..4
    ok 1 - src/math.test.ts > math > adds # time=1.20ms
    not ok 2 - src/math.test.ts > math > divides # time=0.85ms
      ---
      message: \"expected 2 to be 3\"
      at: \"src/math.test.ts:9:21\"
      ...
    ok 3 - src/strings.test.ts > strings > nested > upper # time=0.10ms
    ok 4 - src/strings.test.ts > strings > nested > locale # SKIP needs ICU
"};

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        _ = color_eyre::install();
    });
}

/// A project directory with captured framework output and a config whose
/// targets replay that output.
pub(crate) struct TempProject {
    dir: Utf8TempDir,
}

impl TempProject {
    pub(crate) fn new() -> Result<Self> {
        let dir = camino_tempfile::Builder::new()
            .prefix("lazytest-integration-")
            .tempdir()?;
        std::fs::create_dir(dir.path().join("backend"))?;
        std::fs::write(dir.path().join("backend/phpunit.out"), PHPUNIT_OUTPUT)?;
        std::fs::write(dir.path().join("vitest.out"), VITEST_OUTPUT)?;

        let config = format!(
            indoc! {r#"
                [[targets]]
                name = "phpunit"
                command = "cat phpunit.out"
                working-dir = "{root}/backend"

                [[targets]]
                name = "vitest"
                command = "cat {root}/vitest.out"
                dialect = "tap"
            "#},
            root = dir.path(),
        );
        std::fs::write(dir.path().join(".lazytest.toml"), config)?;

        Ok(Self { dir })
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }
}
