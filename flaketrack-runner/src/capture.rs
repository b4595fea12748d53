// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Screenshot capture requests.
//!
//! flaketrack doesn't drive the browser, so it can't take screenshots itself. When an attempt
//! fails, the tracker produces a [`ScreenshotRequest`], and the reporter hands it to a
//! [`CaptureSink`] which forwards it to whatever does own the browser.

use crate::errors::CaptureError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::io::Write;

/// The file extension of captured screenshots.
pub const SCREENSHOT_EXTENSION: &str = "png";

/// How much of the page a screenshot should cover.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    /// The whole scrollable page.
    FullPage,

    /// Only the visible viewport.
    Viewport,
}

/// A request to capture a screenshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScreenshotRequest {
    /// The file name of the screenshot, without an extension. Only contains ASCII letters, digits
    /// and underscores.
    pub name: String,

    /// How much of the page to capture.
    pub capture: CaptureMode,
}

impl ScreenshotRequest {
    /// Returns the path the screenshot is written to within `screenshots_dir`.
    pub fn path_in(&self, screenshots_dir: &Utf8Path) -> Utf8PathBuf {
        screenshots_dir.join(format!("{}.{SCREENSHOT_EXTENSION}", self.name))
    }
}

/// Forwards screenshot requests to the component that owns the browser.
pub trait CaptureSink {
    /// Requests a screenshot, returning the path it will be written to.
    fn capture(&mut self, request: &ScreenshotRequest) -> Result<Utf8PathBuf, CaptureError>;
}

/// A [`CaptureSink`] that writes each request as a line of JSON.
///
/// The `flaketrack` binary uses this with standard output, so that the harness feeding it
/// lifecycle events can read the requests back:
///
/// ```json
/// {"type":"capture-screenshot","name":"FAILED_Attempt1_Login_should_login","capture":"full-page","path":"cypress/screenshots/FAILED_Attempt1_Login_should_login.png"}
/// ```
#[derive(Debug)]
pub struct JsonLinesCapture<W> {
    screenshots_dir: Utf8PathBuf,
    writer: W,
}

impl<W: Write> JsonLinesCapture<W> {
    /// Creates a new sink writing requests to `writer`, for screenshots in `screenshots_dir`.
    pub fn new(screenshots_dir: impl Into<Utf8PathBuf>, writer: W) -> Self {
        Self {
            screenshots_dir: screenshots_dir.into(),
            writer,
        }
    }

    /// Consumes the sink, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[derive(Serialize)]
struct CaptureRequestLine<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    capture: CaptureMode,
    path: &'a Utf8Path,
}

impl<W: Write> CaptureSink for JsonLinesCapture<W> {
    fn capture(&mut self, request: &ScreenshotRequest) -> Result<Utf8PathBuf, CaptureError> {
        let path = request.path_in(&self.screenshots_dir);
        let line = serde_json::to_string(&CaptureRequestLine {
            kind: "capture-screenshot",
            name: &request.name,
            capture: request.capture,
            path: &path,
        })
        .map_err(|error| CaptureError::Serialize {
            name: request.name.clone(),
            error,
        })?;

        writeln!(self.writer, "{line}")
            .and_then(|()| self.writer.flush())
            .map_err(|error| CaptureError::Write {
                name: request.name.clone(),
                error,
            })?;

        Ok(path)
    }
}
