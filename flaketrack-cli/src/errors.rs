// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use camino::{FromPathBufError, Utf8PathBuf};
use flaketrack_metadata::{EventParseError, FlaketrackExitCode};
use flaketrack_runner::errors::{ConfigParseError, ReadReportError, ReporterError};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that flaketrack expects to produce, each mapping to a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to read lifecycle events")]
    EventsReadFailed {
        /// `None` for standard input.
        path: Option<Utf8PathBuf>,
        #[source]
        err: std::io::Error,
    },
    #[error("failed to parse lifecycle event")]
    EventParseError {
        #[from]
        err: EventParseError,
    },
    #[error("reporter error")]
    ReporterError {
        #[from]
        err: ReporterError,
    },
    #[error("failed to read flaky test report")]
    ReportReadError {
        #[from]
        err: ReadReportError,
    },
    #[error("failed to write output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed {
        /// The number of tests that failed.
        failed: usize,
    },
    #[error("test run incomplete")]
    IncompleteRun {
        /// The number of tests with at least one concluded attempt.
        recorded: usize,
    },
}

impl ExpectedError {
    pub(crate) fn events_read_failed(path: Option<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self::EventsReadFailed { path, err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::EventsReadFailed { .. } => FlaketrackExitCode::SETUP_ERROR,
            // The reporter only rejects events that arrive out of order.
            Self::EventParseError { .. } | Self::ReporterError { .. } => {
                FlaketrackExitCode::INVALID_EVENT
            }
            Self::ReportReadError { .. } => FlaketrackExitCode::REPORT_READ_FAILED,
            Self::WriteOutputError { .. } => FlaketrackExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed { .. } => FlaketrackExitCode::TEST_RUN_FAILED,
            Self::IncompleteRun { .. } => FlaketrackExitCode::INCOMPLETE_RUN,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                err.source()
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::EventsReadFailed { path, err } => {
                match path {
                    Some(path) => {
                        error!("failed to read lifecycle events from `{}`", path.style(styles.bold))
                    }
                    None => error!("failed to read lifecycle events from standard input"),
                }
                Some(err as &dyn Error)
            }
            Self::EventParseError { err } => {
                error!(
                    "failed to parse lifecycle event at line {}",
                    err.line_number().style(styles.bold)
                );
                err.source()
            }
            Self::ReporterError { err } => {
                error!("{err}");
                err.source()
            }
            Self::ReportReadError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteOutputError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed { failed } => {
                error!(
                    "test run failed: {} permanently failed",
                    failed.style(styles.fail)
                );
                None
            }
            Self::IncompleteRun { recorded } => {
                error!(
                    "{}: event stream ended before the run finished \
                     (flaky test report written for {recorded} tests)",
                    "test run incomplete".style(styles.warning_text)
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: "flaketrack::no_heading", "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(
            ExpectedError::TestRunFailed { failed: 1 }.process_exit_code(),
            100
        );
        assert_eq!(
            ExpectedError::IncompleteRun { recorded: 0 }.process_exit_code(),
            106
        );
        assert_eq!(
            ExpectedError::from(ReporterError::RunAlreadyFinished { kind: "log" })
                .process_exit_code(),
            FlaketrackExitCode::INVALID_EVENT
        );
        assert_eq!(
            ExpectedError::events_read_failed(
                None,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "stream did not contain valid UTF-8",
                ),
            )
            .process_exit_code(),
            FlaketrackExitCode::SETUP_ERROR
        );
    }
}
