// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The end-of-run console report.
//!
//! Classification ([`RunReport::classify`]) is kept separate from rendering, so that the set of
//! flaky and permanently failed tests can be inspected without producing any output.

use super::helpers::{Styles, heavy_rule, light_rule};
use crate::helpers::{first_line, head_lines, round_millis_to_secs};
use camino::{Utf8Path, Utf8PathBuf};
use flaketrack_metadata::RunFinishedEvent;
use owo_colors::OwoColorize;
use swrite::{SWrite, swrite, swriteln};

/// The number of stack trace lines shown for each failed test.
const STACK_LINES: usize = 5;

const NOT_AVAILABLE: &str = "N/A";

/// The console report for a finished run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunReport {
    /// Overall counts, as reported by the runner.
    pub totals: RunTotals,

    /// Tests whose final attempt failed, in the order the runner reported them.
    pub failed: Vec<FailedTestEntry>,

    /// Tests that passed after at least one retry, in the order the runner reported them.
    pub flaky: Vec<FlakyTestEntry>,

    /// Videos recorded for each spec file.
    pub videos: Vec<SpecVideo>,
}

/// Overall counts for a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunTotals {
    /// The total number of tests.
    pub tests: usize,
    /// Tests that passed.
    pub passed: usize,
    /// Tests that failed.
    pub failed: usize,
    /// Pending tests.
    pub pending: usize,
    /// Skipped tests.
    pub skipped: usize,
    /// The duration of the run, in milliseconds.
    pub duration_ms: u64,
}

/// A test that failed on its final attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailedTestEntry {
    /// The full title of the test.
    pub title: String,

    /// The number of attempts made. A test without attempt details counts as a single attempt.
    pub attempts: usize,

    /// The first line of the error displayed for the test, or `"Unknown error"`.
    pub error: String,

    /// The video recorded for the test's spec file.
    pub video: Option<Utf8PathBuf>,

    /// The stack trace of the last attempt, falling back to the displayed error.
    pub stack: Option<String>,
}

/// A test that passed after one or more retries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlakyTestEntry {
    /// The full title of the test.
    pub title: String,

    /// The number of attempts made.
    pub total_attempts: usize,

    /// The number of attempts that failed.
    pub failed_attempts: usize,

    /// The error message of the first failed attempt, if it had one.
    pub first_error: Option<String>,

    /// The video recorded for the test's spec file.
    pub video: Option<Utf8PathBuf>,
}

/// A video recorded for a spec file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpecVideo {
    /// The file name of the spec file.
    pub spec_name: String,

    /// The path to the video.
    pub video: Utf8PathBuf,
}

impl RunReport {
    /// Classifies every test in a finished run.
    pub fn classify(event: &RunFinishedEvent) -> Self {
        let mut failed = Vec::new();
        let mut flaky = Vec::new();
        let mut videos = Vec::new();

        for run in &event.runs {
            let video = run.video_path().map(Utf8Path::to_owned);

            for test in &run.tests {
                if test.attempts.len() > 1 && test.state.is_passed() {
                    let failed_attempts = test
                        .attempts
                        .iter()
                        .filter(|attempt| attempt.state.is_failed())
                        .count();
                    let first_error = test
                        .attempts
                        .iter()
                        .find(|attempt| attempt.state.is_failed())
                        .and_then(|attempt| attempt.error.as_ref())
                        .map(|error| error.message.clone());
                    flaky.push(FlakyTestEntry {
                        title: test.full_title(),
                        total_attempts: test.attempts.len(),
                        failed_attempts,
                        first_error,
                        video: video.clone(),
                    });
                }

                if test.state.is_failed() {
                    let stack = match test.attempts.last().and_then(|a| a.error.as_ref()) {
                        Some(error) => error.stack.clone(),
                        None => test.display_error.clone(),
                    };
                    failed.push(FailedTestEntry {
                        title: test.full_title(),
                        attempts: test.attempts.len().max(1),
                        error: test
                            .display_error
                            .as_deref()
                            .map_or("Unknown error", first_line)
                            .to_owned(),
                        video: video.clone(),
                        stack,
                    });
                }
            }

            if let Some(video) = video {
                videos.push(SpecVideo {
                    spec_name: run.spec_file_name().to_owned(),
                    video,
                });
            }
        }

        Self {
            totals: RunTotals {
                tests: event.total_tests,
                passed: event.total_passed,
                failed: event.total_failed,
                pending: event.total_pending,
                skipped: event.total_skipped,
                duration_ms: event.total_duration_ms,
            },
            failed,
            flaky,
            videos,
        }
    }

    /// Returns true if any test failed.
    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0 || !self.failed.is_empty()
    }
}

/// Renders a [`RunReport`] as console text.
#[derive(Debug)]
pub(super) struct RunReportDisplayer<'a> {
    pub(super) report: &'a RunReport,
    pub(super) max_attempts: u32,
    pub(super) videos_dir: &'a Utf8Path,
    pub(super) styles: &'a Styles,
}

impl RunReportDisplayer<'_> {
    pub(super) fn render(&self) -> String {
        let mut out = String::new();
        self.write_totals(&mut out);
        self.write_failed(&mut out);
        self.write_flaky(&mut out);
        self.write_videos(&mut out);
        out
    }

    fn write_totals(&self, out: &mut String) {
        let totals = &self.report.totals;
        let styles = self.styles;

        swriteln!(out, "\n📊 Test Run Summary:");
        swriteln!(out, "{}", heavy_rule());
        swriteln!(out, "Total Tests: {}", totals.tests.style(styles.count));
        swriteln!(out, "Passed: {}", totals.passed.style(styles.pass));
        swriteln!(out, "Failed: {}", totals.failed.style(styles.fail));
        swriteln!(out, "Pending: {}", totals.pending.style(styles.skip));
        swriteln!(out, "Skipped: {}", totals.skipped.style(styles.skip));
        swriteln!(
            out,
            "Duration: {}s",
            round_millis_to_secs(totals.duration_ms)
        );
        swriteln!(out, "{}", heavy_rule());
    }

    fn write_failed(&self, out: &mut String) {
        if self.report.failed.is_empty() {
            return;
        }

        swriteln!(
            out,
            "\n{}",
            "❌ FAILED TESTS (Failed on all attempts):".style(self.styles.fail)
        );
        swriteln!(out, "{}", light_rule());
        for test in &self.report.failed {
            swriteln!(out, "\n  Test: {}", test.title);
            swriteln!(
                out,
                "  Attempts: {} (Max: {})",
                test.attempts,
                self.max_attempts
            );
            swriteln!(out, "  Error: {}", test.error);
            swriteln!(out, "  📹 Video: {}", display_video(test.video.as_deref()));
            swriteln!(out, "\n  Full Error:");
            match &test.stack {
                Some(stack) => swriteln!(out, "{}", head_lines(stack, STACK_LINES)),
                None => swriteln!(out, "No stack trace available"),
            }
        }
        swriteln!(out, "{}", light_rule());
    }

    fn write_flaky(&self, out: &mut String) {
        if self.report.flaky.is_empty() {
            return;
        }

        swriteln!(
            out,
            "\n{}",
            "⚠️  FLAKY TESTS (Passed after retry):".style(self.styles.retry)
        );
        swriteln!(out, "{}", light_rule());
        for test in &self.report.flaky {
            swriteln!(out, "\n  Test: {}", test.title);
            swriteln!(
                out,
                "  Total Attempts: {} (Max: {})",
                test.total_attempts,
                self.max_attempts
            );
            swriteln!(out, "  Failed Attempts: {}", test.failed_attempts);
            swriteln!(out, "  Flaky Count: {}", test.failed_attempts);
            swriteln!(
                out,
                "  First Failure: {}",
                test.first_error.as_deref().unwrap_or(NOT_AVAILABLE)
            );
            swriteln!(out, "  📹 Video: {}", display_video(test.video.as_deref()));
        }
        swriteln!(out, "{}", light_rule());
        swrite!(out, "\n🔄 Total Flaky Tests: ");
        swriteln!(out, "{}", self.report.flaky.len().style(self.styles.count));
    }

    fn write_videos(&self, out: &mut String) {
        swriteln!(out, "\n📹 Video Reports:");
        swriteln!(out, "{}", light_rule());
        swriteln!(out, "Videos saved to: {}", self.videos_dir);
        for video in &self.report.videos {
            swriteln!(out, "  ✓ {}: {}", video.spec_name, video.video);
        }
        swriteln!(out, "{}", light_rule());
    }
}

fn display_video(video: Option<&Utf8Path>) -> &str {
    video.map_or(NOT_AVAILABLE, Utf8Path::as_str)
}
