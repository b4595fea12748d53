// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-attempt timing and bookkeeping.
//!
//! The [`AttemptTracker`] observes each attempt of each test as the runner reports it, and
//! normalizes it into an [`AttemptRecord`] for the [`RunAggregator`](crate::aggregator::RunAggregator).

use crate::{
    capture::{CaptureMode, ScreenshotRequest},
    helpers::{duration_millis, parent_title, sanitize_file_name},
    time::{StopwatchStart, stopwatch},
};
use chrono::{DateTime, Utc};
use flaketrack_metadata::{AttemptFinishedEvent, AttemptStartedEvent, AttemptState};
use indexmap::IndexMap;
use serde::Serialize;
use std::{collections::HashMap, fmt, time::Duration};
use tracing::{debug, warn};

/// One observation of a single attempt of a test.
///
/// Records are created when an attempt concludes and are never modified afterwards.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttemptRecord {
    /// The full title of the test: its describe-block path and title.
    pub test_title: String,

    /// The 1-based attempt number.
    pub attempt_number: u32,

    /// The state the attempt concluded in.
    pub state: AttemptState,

    /// When the attempt concluded.
    pub timestamp: DateTime<Utc>,

    /// How long the attempt took, or `None` if its start was never observed.
    pub duration: Option<Duration>,
}

/// Everything the tracker produced for a concluded attempt.
#[derive(Clone, Debug)]
pub struct AttemptOutcome {
    /// The record to forward to the aggregator.
    pub record: AttemptRecord,

    /// Messages to write to the run log, in order.
    pub messages: Vec<AttemptMessage>,

    /// A screenshot to capture, for failed attempts.
    pub screenshot: Option<ScreenshotRequest>,
}

/// A message about a concluded attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttemptMessage {
    /// The result of every attempt.
    Result {
        /// The test's own title.
        test_title: String,

        /// The state the attempt concluded in.
        state: AttemptState,

        /// How long the attempt took, if known.
        duration: Option<Duration>,

        /// The attempt number.
        attempt: u32,
    },

    /// A passing attempt took longer than the slow threshold.
    Slow {
        /// The test's own title.
        test_title: String,

        /// How long the attempt took.
        duration: Duration,
    },

    /// A test passed after one or more failed attempts.
    Flaky {
        /// The test's own title.
        test_title: String,

        /// The number of attempts it took to pass.
        attempts: u32,
    },

    /// A test failed on a retry.
    PermanentlyFailed {
        /// The test's own title.
        test_title: String,

        /// The number of attempts that were made.
        attempts: u32,
    },
}

impl fmt::Display for AttemptMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Result {
                test_title,
                state,
                duration,
                attempt,
            } => {
                write!(f, "{} {test_title} - ", state_emoji(*state))?;
                match duration {
                    Some(duration) => write!(f, "{}ms", duration_millis(*duration))?,
                    None => write!(f, "unknown duration")?,
                }
                if *attempt > 1 {
                    write!(f, " (attempt {attempt})")?;
                }
                Ok(())
            }
            Self::Slow {
                test_title,
                duration,
            } => write!(
                f,
                "⚠️  SLOW TEST: {test_title} took {}ms",
                duration_millis(*duration)
            ),
            Self::Flaky {
                test_title,
                attempts,
            } => write!(
                f,
                "🔄 FLAKY TEST: {test_title} passed after {attempts} attempts \
                 (Flaky Count: {})",
                attempts - 1
            ),
            Self::PermanentlyFailed {
                test_title,
                attempts,
            } => write!(
                f,
                "💀 PERMANENTLY FAILED: {test_title} failed {attempts} times \
                 - Check video for details"
            ),
        }
    }
}

/// Compares whole milliseconds, the precision attempt durations are reported in.
fn is_slow(duration: Duration, threshold: Duration) -> bool {
    duration_millis(duration) > duration_millis(threshold)
}

fn state_emoji(state: AttemptState) -> &'static str {
    match state {
        AttemptState::Passed => "✅",
        AttemptState::Failed => "❌",
        AttemptState::Pending => "⏭️",
        AttemptState::Other => "⚠️",
    }
}

/// Timing state for one test title, as dumped at the end of the run.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTiming {
    /// When the most recent attempt started.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub start: Option<DateTime<Utc>>,

    /// When the most recent attempt ended.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub end: Option<DateTime<Utc>>,

    /// How long the most recent attempt took, in milliseconds.
    pub duration: Option<u64>,

    /// The state of the most recent attempt.
    pub state: Option<AttemptState>,

    /// The attempt number of the most recent attempt that concluded, or 0 if none has.
    pub attempts: u32,
}

#[derive(Debug, Default)]
struct TestTimer {
    running: Option<StopwatchStart>,
    timing: TestTiming,
}

/// Tracks timing and attempt counts for every test.
///
/// Timers are keyed by the test's own title, the only identifier an attempt start carries.
/// Attempt counts are keyed by the full title path, so that tests with the same title in different
/// describe blocks are counted separately.
#[derive(Debug)]
pub struct AttemptTracker {
    slow_threshold: Duration,
    timers: IndexMap<String, TestTimer>,
    attempt_counts: HashMap<String, u32>,
}

impl AttemptTracker {
    /// Creates a new tracker. Passing attempts slower than `slow_threshold` are reported as slow.
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            slow_threshold,
            timers: IndexMap::new(),
            attempt_counts: HashMap::new(),
        }
    }

    /// Records that an attempt of a test is starting.
    ///
    /// The attempt count for the test is preserved across attempts.
    pub fn on_attempt_start(&mut self, event: &AttemptStartedEvent) {
        let timer = self.timers.entry(event.test_title.clone()).or_default();
        if timer.running.is_some() {
            warn!(
                "attempt of `{}` started while a previous attempt was still running; \
                 restarting its timer",
                event.test_title
            );
        }
        let start = stopwatch();
        timer.timing.start = Some(start.start_time());
        timer.timing.end = None;
        timer.timing.duration = None;
        timer.running = Some(start);
        debug!("attempt of `{}` started", event.test_title);
    }

    /// Records that an attempt of a test concluded.
    ///
    /// If no matching start was observed, the duration is unknown but the attempt is still
    /// counted: the runner is the source of truth for whether an attempt happened.
    pub fn on_attempt_end(&mut self, event: &AttemptFinishedEvent) -> AttemptOutcome {
        let timer = self.timers.entry(event.test_title.clone()).or_default();

        let (timestamp, duration) = match timer.running.take() {
            Some(start) => {
                let snapshot = start.snapshot();
                (snapshot.end_time(), Some(snapshot.duration))
            }
            None => {
                warn!(
                    "attempt of `{}` finished without a recorded start; its duration is unknown",
                    event.test_title
                );
                (Utc::now(), None)
            }
        };

        let attempt = self
            .attempt_counts
            .entry(event.full_title_path.clone())
            .or_default();
        *attempt += 1;
        let attempt = *attempt;

        timer.timing.attempts = attempt;
        timer.timing.end = Some(timestamp);
        timer.timing.duration = duration.map(duration_millis);
        timer.timing.state = Some(event.state);

        let mut messages = vec![AttemptMessage::Result {
            test_title: event.test_title.clone(),
            state: event.state,
            duration,
            attempt,
        }];

        if let Some(duration) = duration
            && event.state.is_passed()
            && is_slow(duration, self.slow_threshold)
        {
            messages.push(AttemptMessage::Slow {
                test_title: event.test_title.clone(),
                duration,
            });
        }

        if attempt > 1 && event.state.is_passed() {
            messages.push(AttemptMessage::Flaky {
                test_title: event.test_title.clone(),
                attempts: attempt,
            });
        }

        if event.state.is_failed() && attempt >= 2 {
            messages.push(AttemptMessage::PermanentlyFailed {
                test_title: event.test_title.clone(),
                attempts: attempt,
            });
        }

        let screenshot = event.state.is_failed().then(|| {
            let suite_title = event
                .suite_title
                .as_deref()
                .unwrap_or_else(|| parent_title(&event.full_title_path));
            ScreenshotRequest {
                name: sanitize_file_name(&format!(
                    "FAILED-Attempt{attempt}-{suite_title}-{}",
                    event.test_title
                )),
                capture: CaptureMode::FullPage,
            }
        });

        AttemptOutcome {
            record: AttemptRecord {
                test_title: event.full_title_path.clone(),
                attempt_number: attempt,
                state: event.state,
                timestamp,
                duration,
            },
            messages,
            screenshot,
        }
    }

    /// Returns the timing state of every test seen so far, in the order they were first seen.
    pub fn timings(&self) -> IndexMap<&str, &TestTiming> {
        self.timers
            .iter()
            .map(|(title, timer)| (title.as_str(), &timer.timing))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RunAggregator;
    use pretty_assertions::assert_eq;

    fn started(title: &str) -> AttemptStartedEvent {
        AttemptStartedEvent {
            test_title: title.to_owned(),
        }
    }

    fn finished(suite: &str, title: &str, state: AttemptState) -> AttemptFinishedEvent {
        AttemptFinishedEvent {
            test_title: title.to_owned(),
            full_title_path: format!("{suite} > {title}"),
            suite_title: None,
            state,
            error: None,
        }
    }

    #[test]
    fn attempt_counter_survives_restarts() {
        let mut tracker = AttemptTracker::new(Duration::from_secs(5));
        let title = "should login with valid credentials";

        tracker.on_attempt_start(&started(title));
        let first = tracker.on_attempt_end(&finished("Login", title, AttemptState::Failed));
        tracker.on_attempt_start(&started(title));
        let second = tracker.on_attempt_end(&finished("Login", title, AttemptState::Passed));

        assert_eq!(first.record.attempt_number, 1);
        assert_eq!(second.record.attempt_number, 2);
        assert_eq!(
            second.record.test_title,
            "Login > should login with valid credentials"
        );
        assert!(first.record.duration.is_some());
        assert!(second.record.timestamp >= first.record.timestamp);
    }

    #[test]
    fn failed_attempt_messages_and_screenshot() {
        let mut tracker = AttemptTracker::new(Duration::from_secs(5));
        let title = "should display widgets";

        tracker.on_attempt_start(&started(title));
        let first = tracker.on_attempt_end(&finished("Dashboard", title, AttemptState::Failed));
        assert_eq!(first.messages.len(), 1, "no permanent failure on attempt 1");
        assert_eq!(
            first.screenshot,
            Some(ScreenshotRequest {
                name: "FAILED_Attempt1_Dashboard_should_display_widgets".to_owned(),
                capture: CaptureMode::FullPage,
            })
        );

        tracker.on_attempt_start(&started(title));
        let second = tracker.on_attempt_end(&finished("Dashboard", title, AttemptState::Failed));
        assert_eq!(
            second.messages[1..].to_vec(),
            vec![AttemptMessage::PermanentlyFailed {
                test_title: title.to_owned(),
                attempts: 2,
            }]
        );
        assert_eq!(
            second.messages[1].to_string(),
            "💀 PERMANENTLY FAILED: should display widgets failed 2 times - Check video for details"
        );
        assert_eq!(
            second.screenshot.unwrap().name,
            "FAILED_Attempt2_Dashboard_should_display_widgets"
        );
    }

    #[test]
    fn passed_after_retry_is_flaky() {
        let mut tracker = AttemptTracker::new(Duration::from_secs(5));
        let title = "should logout";

        tracker.on_attempt_start(&started(title));
        tracker.on_attempt_end(&finished("Login", title, AttemptState::Failed));
        tracker.on_attempt_start(&started(title));
        let outcome = tracker.on_attempt_end(&finished("Login", title, AttemptState::Passed));

        assert_eq!(outcome.screenshot, None);
        assert_eq!(
            outcome.messages[1].to_string(),
            "🔄 FLAKY TEST: should logout passed after 2 attempts (Flaky Count: 1)"
        );
        assert!(
            outcome.messages[0].to_string().ends_with("ms (attempt 2)"),
            "result message: {}",
            outcome.messages[0]
        );
    }

    #[test]
    fn slow_passing_attempt() {
        let mut tracker = AttemptTracker::new(Duration::ZERO);
        let title = "should load the directory";

        tracker.on_attempt_start(&started(title));
        std::thread::sleep(Duration::from_millis(5));
        let outcome = tracker.on_attempt_end(&finished("PIM", title, AttemptState::Passed));
        assert!(
            matches!(&outcome.messages[1], AttemptMessage::Slow { test_title, .. } if test_title == title),
            "messages: {:?}",
            outcome.messages
        );

        // Slow failures aren't reported as slow.
        tracker.on_attempt_start(&started(title));
        std::thread::sleep(Duration::from_millis(5));
        let outcome = tracker.on_attempt_end(&finished("PIM", title, AttemptState::Failed));
        assert!(
            !outcome
                .messages
                .iter()
                .any(|message| matches!(message, AttemptMessage::Slow { .. })),
            "messages: {:?}",
            outcome.messages
        );
    }

    #[test]
    fn same_title_in_different_suites_is_counted_separately() {
        let mut tracker = AttemptTracker::new(Duration::from_secs(5));
        let mut aggregator = RunAggregator::new();
        let title = "should logout";

        for suite in ["Login", "Admin"] {
            tracker.on_attempt_start(&started(title));
            let outcome = tracker.on_attempt_end(&finished(suite, title, AttemptState::Passed));
            assert_eq!(outcome.record.attempt_number, 1, "first attempt in {suite}");
            assert_eq!(outcome.messages.len(), 1, "no flaky message in {suite}");
            aggregator.record_attempt(outcome.record);
        }

        let admin = aggregator.get("Admin > should logout").unwrap();
        assert_eq!(admin.total_attempts(), 1);
        assert!(!admin.passed_after_retry());

        let summary = aggregator.build_summary(Utc::now());
        assert_eq!(summary.summary.total_tests, 2);
        assert_eq!(summary.summary.flaky_tests, 0);
        assert_eq!(summary.summary.total_retries, 0);

        // A retry of one of them still continues its own count.
        tracker.on_attempt_start(&started(title));
        let outcome = tracker.on_attempt_end(&finished("Admin", title, AttemptState::Failed));
        assert_eq!(outcome.record.attempt_number, 2);
        assert_eq!(
            outcome.screenshot.unwrap().name,
            "FAILED_Attempt2_Admin_should_logout"
        );
    }

    #[test]
    fn slow_check_uses_whole_milliseconds() {
        let threshold = Duration::from_secs(5);
        assert!(!is_slow(Duration::from_micros(5_000_400), threshold));
        assert!(!is_slow(threshold, threshold));
        assert!(is_slow(Duration::from_millis(5_001), threshold));
    }

    #[test]
    fn end_without_start_is_tolerated() {
        let mut tracker = AttemptTracker::new(Duration::ZERO);
        let outcome = tracker.on_attempt_end(&finished("Login", "orphan", AttemptState::Passed));

        assert_eq!(outcome.record.attempt_number, 1);
        assert_eq!(outcome.record.duration, None);
        assert_eq!(outcome.messages.len(), 1, "slow check skipped");
        assert_eq!(outcome.messages[0].to_string(), "✅ orphan - unknown duration");
    }

    #[test]
    fn explicit_suite_title_is_preferred() {
        let mut tracker = AttemptTracker::new(Duration::from_secs(5));
        let mut event = finished("Admin > Employees", "should add", AttemptState::Failed);
        event.suite_title = Some("Employee Management".to_owned());

        let outcome = tracker.on_attempt_end(&event);
        assert_eq!(
            outcome.screenshot.unwrap().name,
            "FAILED_Attempt1_Employee_Management_should_add"
        );
    }

    #[test]
    fn result_message_format() {
        let message = AttemptMessage::Result {
            test_title: "should be skipped".to_owned(),
            state: AttemptState::Pending,
            duration: Some(Duration::from_millis(12)),
            attempt: 1,
        };
        assert_eq!(message.to_string(), "⏭️ should be skipped - 12ms");
    }

    #[test]
    fn timings_snapshot() {
        let mut tracker = AttemptTracker::new(Duration::from_secs(5));
        tracker.on_attempt_start(&started("b"));
        tracker.on_attempt_end(&finished("S", "b", AttemptState::Passed));
        tracker.on_attempt_start(&started("a"));

        let timings = tracker.timings();
        assert_eq!(timings.keys().copied().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(timings["b"].attempts, 1);
        assert_eq!(timings["b"].state, Some(AttemptState::Passed));
        assert!(timings["b"].end.is_some());
        assert_eq!(timings["a"].attempts, 0);
        assert!(timings["a"].start.is_some());
        assert_eq!(timings["a"].end, None);
    }
}
