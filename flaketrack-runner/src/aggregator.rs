// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregates attempt records across a run.
//!
//! The main type here is [`RunAggregator`], the single owner of every [`TestAggregate`] for the
//! lifetime of a run.

use crate::tracker::AttemptRecord;
use chrono::{DateTime, Utc};
use flaketrack_metadata::{
    AttemptEntry, AttemptState, FlakyTestsReport, ReportTotals, TestAggregateSummary,
};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Every attempt recorded for a single test, along with running totals.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestAggregate {
    attempts: Vec<AttemptRecord>,
    total_attempts: u32,
    failed_attempts: u32,
    passed_after_retry: bool,
}

impl TestAggregate {
    /// Returns the attempts recorded for this test, in chronological order.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Returns the number of attempts recorded so far.
    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    /// Returns the number of attempts that failed.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Returns true if an attempt after the first one passed.
    pub fn passed_after_retry(&self) -> bool {
        self.passed_after_retry
    }

    /// Returns the state of the most recent attempt.
    pub fn last_state(&self) -> Option<AttemptState> {
        self.attempts.last().map(|record| record.state)
    }

    fn push(&mut self, record: AttemptRecord) {
        self.total_attempts += 1;
        if record.state.is_failed() {
            self.failed_attempts += 1;
        }
        // A lone attempt is never a pass after retry, whatever number it was reported with.
        if record.attempt_number > 1 && self.total_attempts > 1 && record.state.is_passed() {
            self.passed_after_retry = true;
        }
        self.attempts.push(record);
    }

    fn to_summary(&self) -> TestAggregateSummary {
        TestAggregateSummary {
            attempts: self
                .attempts
                .iter()
                .map(|record| AttemptEntry {
                    attempt: record.attempt_number,
                    state: record.state,
                    timestamp: record.timestamp,
                })
                .collect(),
            total_attempts: self.total_attempts,
            failed_attempts: self.failed_attempts,
            passed_after_retry: self.passed_after_retry,
        }
    }
}

/// The canonical record of every attempt in a run.
#[derive(Clone, Debug, Default)]
pub struct RunAggregator {
    tests: IndexMap<String, TestAggregate>,
}

impl RunAggregator {
    /// Creates a new, empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a concluded attempt.
    ///
    /// Each call represents a new attempt. Attempt numbers are supplied by the tracker and are
    /// expected to be contiguous from 1; a gap or repeat is logged but the attempt is still
    /// recorded.
    pub fn record_attempt(&mut self, record: AttemptRecord) {
        let aggregate = self.tests.entry(record.test_title.clone()).or_default();
        let expected = aggregate.total_attempts + 1;
        if record.attempt_number != expected {
            warn!(
                "test `{}` reported attempt {} but attempt {expected} was expected",
                record.test_title, record.attempt_number,
            );
        }
        debug!(
            "recorded attempt {} of `{}`: {}",
            record.attempt_number, record.test_title, record.state
        );
        aggregate.push(record);
    }

    /// Returns the aggregate for the test with the given full title.
    pub fn get(&self, test_title: &str) -> Option<&TestAggregate> {
        self.tests.get(test_title)
    }

    /// Iterates over every test, in the order each first reported an attempt.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TestAggregate)> + '_ {
        self.tests
            .iter()
            .map(|(title, aggregate)| (title.as_str(), aggregate))
    }

    /// Returns the number of tests that reported at least one attempt.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if no attempts have been recorded.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Builds a snapshot of the run, stamped with the instant the run completed.
    ///
    /// This doesn't modify the aggregator: calling it again with the same `completed_at` produces
    /// an identical summary.
    pub fn build_summary(&self, completed_at: DateTime<Utc>) -> FlakyTestsReport {
        let tests: IndexMap<_, _> = self
            .tests
            .iter()
            .map(|(title, aggregate)| (title.clone(), aggregate.to_summary()))
            .collect();

        let summary = ReportTotals {
            total_tests: tests.len(),
            flaky_tests: self
                .tests
                .values()
                .filter(|aggregate| aggregate.passed_after_retry)
                .count(),
            total_retries: self
                .tests
                .values()
                .map(|aggregate| aggregate.total_attempts.saturating_sub(1))
                .sum(),
        };

        FlakyTestsReport {
            timestamp: completed_at,
            tests,
            summary,
        }
    }
}
