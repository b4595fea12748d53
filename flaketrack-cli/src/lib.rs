// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracks flaky and permanently failed tests across retries of a browser test run.
//!
//! The `flaketrack` binary reads lifecycle events emitted by a test runner as JSON lines, logs
//! each attempt as it concludes, prints a run report once the runner reports the run finished, and
//! writes a flaky test report to the project root.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
