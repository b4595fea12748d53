// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::AttemptState;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The default file name of the persisted report, relative to the project root.
pub const DEFAULT_REPORT_FILE_NAME: &str = "flaky-tests-report.json";

/// The flaky test report persisted at the end of every run.
///
/// The file is overwritten wholesale by each run: it never contains data from earlier runs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FlakyTestsReport {
    /// The instant the run completed, serialized as ISO-8601 with millisecond precision.
    #[serde(with = "iso8601_millis")]
    pub timestamp: DateTime<Utc>,

    /// Per-test aggregates, keyed by full title, in the order tests first reported an attempt.
    pub tests: IndexMap<String, TestAggregateSummary>,

    /// Run-wide totals.
    pub summary: ReportTotals,
}

impl FlakyTestsReport {
    /// Iterates over tests that passed after at least one retry.
    pub fn flaky_tests(&self) -> impl Iterator<Item = (&str, &TestAggregateSummary)> + '_ {
        self.tests
            .iter()
            .filter(|(_, aggregate)| aggregate.passed_after_retry)
            .map(|(title, aggregate)| (title.as_str(), aggregate))
    }

    /// Serializes this report as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A snapshot of every attempt recorded for a single test.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAggregateSummary {
    /// Attempts in chronological order.
    pub attempts: Vec<AttemptEntry>,

    /// The number of attempts recorded.
    pub total_attempts: u32,

    /// The number of attempts that failed.
    pub failed_attempts: u32,

    /// True if an attempt after the first one passed.
    pub passed_after_retry: bool,
}

/// A single attempt, forming part of [`TestAggregateSummary`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttemptEntry {
    /// The 1-based attempt number.
    pub attempt: u32,

    /// The state the attempt concluded in.
    pub state: AttemptState,

    /// When the attempt concluded, in milliseconds since the Unix epoch.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Run-wide totals, forming part of [`FlakyTestsReport`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTotals {
    /// The number of distinct tests that reported at least one attempt.
    pub total_tests: usize,

    /// The number of tests that passed after a retry.
    pub flaky_tests: usize,

    /// The number of retries across all tests.
    pub total_retries: u32,
}

mod iso8601_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|timestamp| timestamp.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
