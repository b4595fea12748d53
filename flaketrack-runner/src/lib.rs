// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for flaketrack: tracking test attempts reported by an external test runner,
//! classifying flaky and permanently failed tests, and reporting on the run.
//!
//! The usual entry point is [`reporter::ReporterBuilder`], which builds a
//! [`Reporter`](reporter::Reporter) that is fed lifecycle events for a single run.

pub mod aggregator;
pub mod capture;
pub mod config;
pub mod errors;
pub mod helpers;
pub mod reporter;
pub mod store;
mod time;
pub mod tracker;
