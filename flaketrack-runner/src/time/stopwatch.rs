// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long test attempts take.
//!
//! An attempt needs a start time and a duration. For that we use a combination of a `DateTime`
//! (realtime clock) and an `Instant` (monotonic clock). The duration is always measured with the
//! monotonic clock, and the end time is derived from the start time plus the duration.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Utc>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            // These two syscalls will happen imperceptibly close to each other, which is good
            // enough for our purposes.
            start_time: Utc::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) duration: Duration,
}

impl StopwatchSnapshot {
    pub(crate) fn end_time(&self) -> DateTime<Utc> {
        chrono::TimeDelta::from_std(self.duration)
            .ok()
            .and_then(|delta| self.start_time.checked_add_signed(delta))
            .unwrap_or(self.start_time)
    }
}
