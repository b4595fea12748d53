// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the data flaketrack consumes and produces.
//!
//! flaketrack observes a browser test run through lifecycle notifications sent by the external
//! test-execution engine. This crate defines:
//!
//! * the notifications themselves ([`LifecycleEvent`] and its payloads), which the `flaketrack
//!   ingest` command reads as a JSON-lines stream;
//! * the persisted flaky test report ([`FlakyTestsReport`]), written once per run;
//! * the documented exit codes of the `flaketrack` binary ([`FlaketrackExitCode`]).

mod errors;
mod events;
mod exit_codes;
mod report;

pub use errors::*;
pub use events::*;
pub use exit_codes::*;
pub use report::*;
