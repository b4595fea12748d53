// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while parsing a line of a lifecycle event stream.
#[derive(Debug)]
pub struct EventParseError {
    line_number: usize,
    error: serde_json::Error,
}

impl EventParseError {
    pub(crate) fn new(line_number: usize, error: serde_json::Error) -> Self {
        Self { line_number, error }
    }

    /// Returns the 1-based line number that failed to parse.
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

impl fmt::Display for EventParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "error parsing lifecycle event at line {}", self.line_number)
    }
}

impl error::Error for EventParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error)
    }
}
