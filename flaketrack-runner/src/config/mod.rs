// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for flaketrack.
//!
//! Configuration is read once, when a run starts, and never reloaded. Built-in defaults are
//! embedded in the binary; a TOML file in the project (`.config/flaketrack.toml`) or passed in
//! explicitly overrides them key by key.

mod imp;

pub use imp::*;
