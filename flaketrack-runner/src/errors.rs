// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by flaketrack.

use camino::Utf8PathBuf;
use flaketrack_metadata::ErrorSummary;
use std::{error, fmt};
use thiserror::Error;

/// An error that occurred while loading the config.
#[derive(Debug, Error)]
#[error("failed to parse flaketrack config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while loading the config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An explicitly requested config file does not exist.
    #[error("config file does not exist")]
    NotFound,

    /// The config file could not be read.
    #[error("error reading config file")]
    Read(#[source] std::io::Error),

    /// The config file is not valid TOML, or doesn't match the expected schema.
    #[error("error deserializing config file")]
    Deserialize(#[source] toml::de::Error),

    /// A value was syntactically valid but not usable.
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// The key with the invalid value.
        key: &'static str,

        /// Why the value is invalid.
        reason: &'static str,
    },
}

/// An error that occurred while writing the flaky test report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportError {
    /// The report's parent directory could not be created.
    #[error("error creating directory `{path}`")]
    CreateDir {
        /// The directory that could not be created.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The report could not be serialized.
    #[error("error serializing flaky test report")]
    Serialize(#[source] serde_json::Error),

    /// The report could not be written.
    #[error("error writing flaky test report to `{path}`")]
    Write {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },
}

/// An error that occurred while reading a persisted flaky test report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadReportError {
    /// The report could not be read.
    #[error("error reading flaky test report at `{path}`")]
    Read {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The report is not valid JSON or has an unexpected shape.
    #[error("error deserializing flaky test report at `{path}`")]
    Deserialize {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while requesting a screenshot capture.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaptureError {
    /// The capture request could not be serialized.
    #[error("error serializing capture request for `{name}`")]
    Serialize {
        /// The screenshot name.
        name: String,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The capture request could not be written.
    #[error("error writing capture request for `{name}`")]
    Write {
        /// The screenshot name.
        name: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurred while the reporter handled an event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReporterError {
    /// An event arrived after the run had already finished.
    #[error("received {kind} event after the run finished")]
    RunAlreadyFinished {
        /// The kind of event that arrived.
        kind: &'static str,
    },
}

/// A test failure passed through the failure hook.
///
/// The reporter logs the failure and then hands it back unchanged: flaketrack never swallows a
/// genuine test failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("test `{runnable_title}` failed: {}", .error.message)]
pub struct TestFailure {
    /// The test or hook the failure propagated out of.
    pub runnable_title: String,

    /// The error as reported by the runner.
    pub error: ErrorSummary,
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        while let Some(error) = source {
            write!(f, "\n  caused by: {error}")?;
            source = error.source();
        }

        Ok(())
    }
}
