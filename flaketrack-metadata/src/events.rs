// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::EventParseError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The separator used to join a test's describe-block path and name into its full title.
pub const TITLE_PATH_SEPARATOR: &str = " > ";

/// A lifecycle notification sent by the external test-execution engine.
///
/// In a JSON-lines stream, each notification is an object tagged by `"type"`:
///
/// ```json
/// {"type":"attempt-started","testTitle":"should display widgets"}
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    /// An attempt of a test is about to run.
    AttemptStarted(AttemptStartedEvent),

    /// An attempt of a test concluded.
    AttemptFinished(AttemptFinishedEvent),

    /// An assertion or error propagated out of a test.
    Failure(FailureEvent),

    /// A free-form message to write to the run log.
    Log(LogEvent),

    /// The runner captured a screenshot.
    ScreenshotTaken(ScreenshotTakenEvent),

    /// The whole run finished.
    RunFinished(RunFinishedEvent),
}

impl LifecycleEvent {
    /// Parses a single line of a JSON-lines event stream.
    ///
    /// `line_number` is 1-based and only used for error reporting. Returns `Ok(None)` for lines
    /// that are empty or whitespace-only.
    pub fn parse_line(line_number: usize, line: &str) -> Result<Option<Self>, EventParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|error| EventParseError::new(line_number, error))
    }

    /// Returns a short, human-readable name for this kind of event.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::AttemptStarted(_) => "attempt-started",
            Self::AttemptFinished(_) => "attempt-finished",
            Self::Failure(_) => "failure",
            Self::Log(_) => "log",
            Self::ScreenshotTaken(_) => "screenshot-taken",
            Self::RunFinished(_) => "run-finished",
        }
    }
}

/// The state an attempt (or a test as a whole) concluded in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptState {
    /// The attempt passed.
    Passed,

    /// The attempt failed.
    Failed,

    /// The test was marked pending and did not run.
    Pending,

    /// Any other state reported by the runner.
    #[serde(other)]
    Other,
}

impl AttemptState {
    /// Returns true if this state is [`AttemptState::Passed`].
    pub fn is_passed(self) -> bool {
        self == Self::Passed
    }

    /// Returns true if this state is [`AttemptState::Failed`].
    pub fn is_failed(self) -> bool {
        self == Self::Failed
    }

    /// Returns the string used for this state in JSON output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error attached to a failed attempt or a failure notification.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// The error message.
    pub message: String,

    /// The stack trace, if the runner captured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Payload of [`LifecycleEvent::AttemptStarted`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptStartedEvent {
    /// The test's own title, without the describe-block path.
    pub test_title: String,
}

/// Payload of [`LifecycleEvent::AttemptFinished`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFinishedEvent {
    /// The test's own title, without the describe-block path.
    pub test_title: String,

    /// The describe-block path and test title, joined by [`TITLE_PATH_SEPARATOR`].
    pub full_title_path: String,

    /// The title of the innermost describe block, if the runner reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_title: Option<String>,

    /// The state the attempt concluded in.
    pub state: AttemptState,

    /// The error that failed the attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
}

/// Payload of [`LifecycleEvent::Failure`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    /// The error that propagated.
    pub error: ErrorSummary,

    /// The title of the test or hook the error propagated out of.
    pub runnable_title: String,
}

/// Payload of [`LifecycleEvent::Log`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// The message to write.
    pub message: String,
}

/// Payload of [`LifecycleEvent::ScreenshotTaken`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotTakenEvent {
    /// Where the screenshot was written.
    pub path: Utf8PathBuf,
}

/// Payload of [`LifecycleEvent::RunFinished`]: the results of every spec file in the run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFinishedEvent {
    /// The total number of tests.
    pub total_tests: usize,

    /// The number of tests that passed.
    pub total_passed: usize,

    /// The number of tests that failed.
    pub total_failed: usize,

    /// The number of pending tests.
    pub total_pending: usize,

    /// The number of skipped tests.
    pub total_skipped: usize,

    /// The wall-clock duration of the run, in milliseconds.
    pub total_duration_ms: u64,

    /// Results for each spec file.
    #[serde(default)]
    pub runs: Vec<SpecRunSummary>,
}

/// Results for a single spec file, forming part of [`RunFinishedEvent`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecRunSummary {
    /// The spec file, relative to the project root.
    pub spec_file: Utf8PathBuf,

    /// The video recorded for this spec file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<Utf8PathBuf>,

    /// Every test in this spec file.
    #[serde(default)]
    pub tests: Vec<TestRunSummary>,
}

impl SpecRunSummary {
    /// Returns the file name of the spec file, falling back to the full path.
    pub fn spec_file_name(&self) -> &str {
        self.spec_file
            .file_name()
            .unwrap_or_else(|| self.spec_file.as_str())
    }

    /// Returns the video path, if one was recorded.
    pub fn video_path(&self) -> Option<&Utf8Path> {
        self.video_path.as_deref()
    }
}

/// The results of a single test across all its attempts, forming part of [`SpecRunSummary`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunSummary {
    /// The describe-block path followed by the test title.
    pub title_path: Vec<String>,

    /// The final state of the test.
    pub state: AttemptState,

    /// Every attempt, in order.
    #[serde(default)]
    pub attempts: Vec<AttemptResultSummary>,

    /// The error the runner displays for this test, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_error: Option<String>,
}

impl TestRunSummary {
    /// Returns the full title of this test, joined by [`TITLE_PATH_SEPARATOR`].
    pub fn full_title(&self) -> String {
        self.title_path.join(TITLE_PATH_SEPARATOR)
    }
}

/// The outcome of one attempt, forming part of [`TestRunSummary`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttemptResultSummary {
    /// The state the attempt concluded in.
    pub state: AttemptState,

    /// The error that failed the attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(r#""passed""#, AttemptState::Passed ; "passed")]
    #[test_case(r#""failed""#, AttemptState::Failed ; "failed")]
    #[test_case(r#""pending""#, AttemptState::Pending ; "pending")]
    #[test_case(r#""skipped""#, AttemptState::Other ; "unknown state")]
    fn attempt_state_deserialize(input: &str, expected: AttemptState) {
        let state: AttemptState = serde_json::from_str(input).unwrap();
        assert_eq!(state, expected);
    }

    #[test]
    fn parse_attempt_finished() {
        let line = r#"{"type":"attempt-finished","testTitle":"should login with valid credentials","fullTitlePath":"Login > should login with valid credentials","state":"failed","error":{"message":"Timed out retrying after 10000ms"}}"#;
        let event = LifecycleEvent::parse_line(1, line).unwrap().unwrap();
        assert_eq!(
            event,
            LifecycleEvent::AttemptFinished(AttemptFinishedEvent {
                test_title: "should login with valid credentials".to_owned(),
                full_title_path: "Login > should login with valid credentials".to_owned(),
                suite_title: None,
                state: AttemptState::Failed,
                error: Some(ErrorSummary {
                    message: "Timed out retrying after 10000ms".to_owned(),
                    stack: None,
                }),
            })
        );
        assert_eq!(event.kind_str(), "attempt-finished");
    }

    #[test]
    fn parse_run_finished() {
        let line = indoc::indoc! {r#"
            {"type":"run-finished","totalTests":2,"totalPassed":1,"totalFailed":1,
             "totalPending":0,"totalSkipped":0,"totalDurationMs":12345,
             "runs":[{"specFile":"cypress/e2e/login.cy.ts","videoPath":"cypress/videos/login.cy.ts.mp4",
                      "tests":[{"titlePath":["Login","should logout"],"state":"passed",
                                "attempts":[{"state":"passed"}]}]}]}
        "#}
        .replace('\n', "");
        let event = LifecycleEvent::parse_line(7, &line).unwrap().unwrap();
        let LifecycleEvent::RunFinished(run) = event else {
            panic!("expected run-finished, found {event:?}");
        };
        assert_eq!(run.total_duration_ms, 12345);
        assert_eq!(run.runs[0].spec_file_name(), "login.cy.ts");
        assert_eq!(run.runs[0].tests[0].full_title(), "Login > should logout");
    }

    #[test_case("" ; "empty")]
    #[test_case("   \t" ; "whitespace")]
    fn parse_blank_line(line: &str) {
        assert_eq!(LifecycleEvent::parse_line(3, line).unwrap(), None);
    }

    #[test]
    fn parse_error_line_number() {
        let error = LifecycleEvent::parse_line(42, r#"{"type":"no-such-event"}"#).unwrap_err();
        assert_eq!(error.line_number(), 42);
        assert_eq!(error.to_string(), "error parsing lifecycle event at line 42");
    }
}
