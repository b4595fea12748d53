// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `flaketrack` failures.
///
/// Reporting failures (for example, being unable to write the flaky test report) never change the
/// exit code: the verdict of a run only depends on the outcomes reported by the test runner.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum FlaketrackExitCode {}

impl FlaketrackExitCode {
    /// No errors occurred and flaketrack exited normally.
    pub const OK: i32 = 0;

    /// One or more tests failed on their final attempt.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The event stream ended before the run-finished notification arrived.
    pub const INCOMPLETE_RUN: i32 = 106;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a flaketrack invocation, for example an invalid
    /// config file or an unreadable event stream.
    pub const SETUP_ERROR: i32 = 96;

    /// A line in the event stream could not be parsed as a lifecycle event.
    pub const INVALID_EVENT: i32 = 94;

    /// The persisted report could not be read by `flaketrack show`.
    pub const REPORT_READ_FAILED: i32 = 93;
}
