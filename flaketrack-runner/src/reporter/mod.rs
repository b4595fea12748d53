// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report on a run as its lifecycle events arrive.
//!
//! The main type here is [`Reporter`], which is constructed via a [`ReporterBuilder`].

mod displayer;
mod helpers;
mod imp;

pub use displayer::{FailedTestEntry, FlakyTestEntry, RunReport, RunTotals, SpecVideo};
pub use imp::*;
