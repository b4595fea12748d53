// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for the flaky test report.

use crate::errors::{ReadReportError, WriteReportError};
use camino::{Utf8Path, Utf8PathBuf};
use flaketrack_metadata::FlakyTestsReport;
use std::io::Write;
use tracing::debug;

/// Reads and writes the flaky test report at a fixed path.
///
/// Each write replaces the previous report wholesale. The write is atomic, so readers never observe
/// a partially written file.
#[derive(Clone, Debug)]
pub struct ReportStore {
    path: Utf8PathBuf,
}

impl ReportStore {
    /// Creates a new store for the report at `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the report.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes `report` to disk, replacing any previous report.
    pub fn persist_summary(&self, report: &FlakyTestsReport) -> Result<(), WriteReportError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| WriteReportError::CreateDir {
                path: parent.to_owned(),
                error,
            })?;
        }

        let json = report
            .to_json_pretty()
            .map_err(WriteReportError::Serialize)?;

        atomicwrites::AtomicFile::new(&self.path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(json.as_bytes()))
            .map_err(|error| WriteReportError::Write {
                path: self.path.clone(),
                error,
            })?;

        debug!(
            "wrote flaky test report for {} tests to {}",
            report.summary.total_tests, self.path
        );
        Ok(())
    }

    /// Reads the report written by the most recent run.
    pub fn load(&self) -> Result<FlakyTestsReport, ReadReportError> {
        let contents =
            std::fs::read_to_string(&self.path).map_err(|error| ReadReportError::Read {
                path: self.path.clone(),
                error,
            })?;
        serde_json::from_str(&contents).map_err(|error| ReadReportError::Deserialize {
            path: self.path.clone(),
            error,
        })
    }
}
