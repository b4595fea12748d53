// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatches lifecycle events for a single run.
//!
//! The main structure in this module is [`Reporter`].

use super::{
    displayer::{RunReport, RunReportDisplayer},
    helpers::Styles,
};
use crate::{
    aggregator::RunAggregator,
    capture::CaptureSink,
    config::{FlaketrackConfig, RunMode},
    errors::{DisplayErrorChain, ReporterError, TestFailure},
    helpers::plural,
    store::ReportStore,
    tracker::{AttemptMessage, AttemptTracker},
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use debug_ignore::DebugIgnore;
use flaketrack_metadata::{
    AttemptFinishedEvent, AttemptStartedEvent, FailureEvent, FlakyTestsReport, LifecycleEvent,
    RunFinishedEvent, ScreenshotTakenEvent,
};
use owo_colors::OwoColorize;
use std::io::{self, BufWriter, Write};
use swrite::{SWrite, swriteln};
use tracing::{debug, error, warn};

/// Output destination for the reporter.
///
/// This is usually the terminal's standard error, but can be an in-memory buffer for tests.
#[derive(Debug)]
pub enum ReporterOutput<'a> {
    /// Write output to standard error.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),

    /// Fail every write, as a closed standard error would.
    #[cfg(test)]
    Broken,
}

impl ReporterOutput<'_> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        match self {
            Self::Terminal => {
                let mut writer = BufWriter::new(io::stderr());
                writer.write_all(s.as_bytes())?;
                writer.flush()
            }
            Self::Buffer(buf) => buf.write_all(s.as_bytes()),
            #[cfg(test)]
            Self::Broken => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }
}

/// Reporter builder.
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    mode: RunMode,
    should_colorize: bool,
}

impl ReporterBuilder {
    /// Sets the mode the runner was invoked in. This determines the maximum number of attempts
    /// shown in the run report.
    pub fn set_mode(&mut self, mode: RunMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Creates a new reporter for a single run.
    pub fn build<'a>(
        &self,
        config: &FlaketrackConfig,
        output: ReporterOutput<'a>,
        capture: Box<dyn CaptureSink + 'a>,
    ) -> Reporter<'a> {
        let mut styles = Styles::default();
        if self.should_colorize {
            styles.colorize();
        }

        Reporter {
            tracker: AttemptTracker::new(config.slow_threshold()),
            aggregator: RunAggregator::new(),
            store: ReportStore::new(config.report_path()),
            capture: DebugIgnore(capture),
            output,
            styles,
            max_attempts: config.max_attempts(self.mode),
            videos_dir: config.videos_dir(),
            finished: false,
            output_failed: false,
        }
    }
}

/// What the caller should do after the reporter handled an event.
#[derive(Debug)]
pub enum ReporterEventOutcome {
    /// Keep feeding events.
    Continue,

    /// A failure propagated out of a test. The caller must surface it; the reporter only logs it.
    Failure(TestFailure),

    /// The run finished. No further events are accepted.
    Finished(RunOutcome),
}

/// The verdict for a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunVerdict {
    /// Every test passed, possibly after retries.
    Passed,

    /// At least one test failed on its final attempt.
    Failed,

    /// The run ended before the runner reported it finished.
    Incomplete,
}

/// The result of a finished run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The summary built from every recorded attempt.
    pub summary: FlakyTestsReport,

    /// Where the summary was written, or `None` if writing it failed.
    pub report_path: Option<Utf8PathBuf>,

    /// The run report, if the runner reported the run finished.
    pub run_report: Option<RunReport>,

    /// The verdict for the run. This doesn't depend on whether the summary could be written.
    pub verdict: RunVerdict,
}

/// Tracks attempts, aggregates them, and reports on a single run.
///
/// Constructed via a [`ReporterBuilder`]. Events must be fed in the order the runner produced
/// them.
#[derive(Debug)]
pub struct Reporter<'a> {
    tracker: AttemptTracker,
    aggregator: RunAggregator,
    store: ReportStore,
    capture: DebugIgnore<Box<dyn CaptureSink + 'a>>,
    output: ReporterOutput<'a>,
    styles: Styles,
    max_attempts: u32,
    videos_dir: Utf8PathBuf,
    finished: bool,
    output_failed: bool,
}

impl Reporter<'_> {
    /// Reports a lifecycle event.
    pub fn report_event(
        &mut self,
        event: LifecycleEvent,
    ) -> Result<ReporterEventOutcome, ReporterError> {
        self.ensure_running(event.kind_str())?;

        match event {
            LifecycleEvent::AttemptStarted(event) => {
                self.on_attempt_start(&event)?;
            }
            LifecycleEvent::AttemptFinished(event) => {
                self.on_attempt_end(&event)?;
            }
            LifecycleEvent::Failure(event) => {
                return self.on_failure(&event).map(ReporterEventOutcome::Failure);
            }
            LifecycleEvent::Log(event) => {
                self.log(&event.message)?;
            }
            LifecycleEvent::ScreenshotTaken(event) => {
                self.on_screenshot_taken(&event)?;
            }
            LifecycleEvent::RunFinished(event) => {
                return self
                    .on_run_finished(&event)
                    .map(ReporterEventOutcome::Finished);
            }
        }

        Ok(ReporterEventOutcome::Continue)
    }

    /// Records that an attempt of a test is starting.
    pub fn on_attempt_start(&mut self, event: &AttemptStartedEvent) -> Result<(), ReporterError> {
        self.ensure_running("attempt-started")?;
        self.tracker.on_attempt_start(event);
        Ok(())
    }

    /// Records that an attempt of a test concluded.
    ///
    /// Writes the attempt's log lines, forwards its record to the aggregator and, for failed
    /// attempts, requests a screenshot. A screenshot that can't be requested is logged and
    /// otherwise ignored.
    pub fn on_attempt_end(&mut self, event: &AttemptFinishedEvent) -> Result<(), ReporterError> {
        self.ensure_running("attempt-finished")?;
        let outcome = self.tracker.on_attempt_end(event);

        let mut out = String::new();
        for message in &outcome.messages {
            self.write_attempt_message(message, &mut out);
        }
        self.aggregator.record_attempt(outcome.record);
        self.write(&out);

        if let Some(request) = outcome.screenshot {
            match self.capture.capture(&request) {
                Ok(path) => debug!("requested screenshot {path}"),
                Err(err) => warn!(
                    "failed to request screenshot: {}",
                    DisplayErrorChain::new(err)
                ),
            }
        }

        Ok(())
    }

    /// Logs a failure that propagated out of a test, then returns it unchanged.
    ///
    /// The caller is expected to surface the returned failure: logging it never counts as handling
    /// it.
    pub fn on_failure(&mut self, event: &FailureEvent) -> Result<TestFailure, ReporterError> {
        self.ensure_running("failure")?;

        let mut out = String::new();
        swriteln!(
            out,
            "\n{}",
            "❌ TEST FAILURE DETAILS:".style(self.styles.fail)
        );
        swriteln!(out, "Test: {}", event.runnable_title);
        swriteln!(out, "Error: {}", event.error.message);
        swriteln!(
            out,
            "Stack: {}",
            event
                .error
                .stack
                .as_deref()
                .unwrap_or("No stack trace available")
        );
        self.write(&out);

        Ok(TestFailure {
            runnable_title: event.runnable_title.clone(),
            error: event.error.clone(),
        })
    }

    /// Writes a free-form message to the run log.
    pub fn log(&mut self, message: &str) -> Result<(), ReporterError> {
        self.ensure_running("log")?;
        let mut out = String::with_capacity(message.len() + 1);
        swriteln!(out, "{message}");
        self.write(&out);
        Ok(())
    }

    /// Logs that the runner captured a screenshot.
    pub fn on_screenshot_taken(
        &mut self,
        event: &ScreenshotTakenEvent,
    ) -> Result<(), ReporterError> {
        self.ensure_running("screenshot-taken")?;
        let mut out = String::new();
        swriteln!(out, "📸 Screenshot captured: {}", event.path);
        self.write(&out);
        Ok(())
    }

    /// Finishes the run.
    ///
    /// Dumps the timing state of every test, writes the flaky test report and prints the run
    /// report. Failing to write the flaky test report or the log output is logged, and doesn't
    /// affect the verdict.
    pub fn on_run_finished(
        &mut self,
        event: &RunFinishedEvent,
    ) -> Result<RunOutcome, ReporterError> {
        self.ensure_running("run-finished")?;
        self.finished = true;

        let (summary, report_path) = self.persist_summary(Utc::now());

        let run_report = RunReport::classify(event);
        let rendered = RunReportDisplayer {
            report: &run_report,
            max_attempts: self.max_attempts,
            videos_dir: &self.videos_dir,
            styles: &self.styles,
        }
        .render();
        self.write(&rendered);

        let verdict = if run_report.has_failures() {
            RunVerdict::Failed
        } else {
            RunVerdict::Passed
        };

        Ok(RunOutcome {
            summary,
            report_path,
            run_report: Some(run_report),
            verdict,
        })
    }

    /// Finishes a run whose event stream ended before the runner reported it finished.
    ///
    /// The summary is still built and written from the attempts that concluded. Attempts that
    /// were still running are not recorded.
    pub fn finish_incomplete(&mut self) -> Result<RunOutcome, ReporterError> {
        self.ensure_running("end-of-stream")?;
        self.finished = true;

        let test_count = self.aggregator.len();
        warn!(
            "event stream ended before the run finished ({test_count} {} recorded)",
            plural::tests_str(test_count)
        );

        let (summary, report_path) = self.persist_summary(Utc::now());

        Ok(RunOutcome {
            summary,
            report_path,
            run_report: None,
            verdict: RunVerdict::Incomplete,
        })
    }

    /// Returns the path the flaky test report is written to.
    pub fn report_path(&self) -> &Utf8Path {
        self.store.path()
    }

    /// Returns the aggregator holding every attempt recorded so far.
    pub fn aggregator(&self) -> &RunAggregator {
        &self.aggregator
    }

    // ---
    // Helper methods
    // ---

    fn ensure_running(&self, kind: &'static str) -> Result<(), ReporterError> {
        if self.finished {
            Err(ReporterError::RunAlreadyFinished { kind })
        } else {
            Ok(())
        }
    }

    /// Writes to the log output. A failed write is logged once and otherwise ignored: losing
    /// log output never aborts the run.
    fn write(&mut self, s: &str) {
        if let Err(err) = self.output.write_str(s)
            && !self.output_failed
        {
            self.output_failed = true;
            warn!("failed to write to log output, continuing without it: {err}");
        }
    }

    fn write_attempt_message(&self, message: &AttemptMessage, out: &mut String) {
        match message {
            AttemptMessage::Result { .. } => swriteln!(out, "{message}"),
            AttemptMessage::Slow { .. } => {
                swriteln!(out, "{}", message.style(self.styles.skip))
            }
            AttemptMessage::Flaky { .. } => {
                swriteln!(out, "{}", message.style(self.styles.retry))
            }
            AttemptMessage::PermanentlyFailed { .. } => {
                swriteln!(out, "{}", message.style(self.styles.fail))
            }
        }
    }

    fn write_execution_summary(&mut self) {
        let mut out = String::new();
        swriteln!(out, "\n📊 Test Execution Summary:");
        match serde_json::to_string_pretty(&self.tracker.timings()) {
            Ok(json) => swriteln!(out, "{json}"),
            Err(err) => error!("failed to serialize test timings: {err}"),
        }
        self.write(&out);
    }

    /// Writes the flaky test report, then the execution summary and where the report went.
    ///
    /// The report is written before any log output.
    fn persist_summary(
        &mut self,
        completed_at: DateTime<Utc>,
    ) -> (FlakyTestsReport, Option<Utf8PathBuf>) {
        let summary = self.aggregator.build_summary(completed_at);
        let report_path = match self.store.persist_summary(&summary) {
            Ok(()) => Some(self.store.path().to_owned()),
            Err(err) => {
                error!(
                    "failed to save flaky test report: {}",
                    DisplayErrorChain::new(err)
                );
                None
            }
        };

        self.write_execution_summary();
        if let Some(path) = &report_path {
            let mut out = String::new();
            swriteln!(out, "\n📊 Flaky test report saved to: {path}");
            self.write(&out);
        }

        debug!(
            "run summary: {} flaky of {} {}, {} {}",
            summary.summary.flaky_tests,
            summary.summary.total_tests,
            plural::tests_str(summary.summary.total_tests),
            summary.summary.total_retries,
            plural::retries_str(summary.summary.total_retries),
        );

        (summary, report_path)
    }
}
