// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line parsing and command routing.

use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use flaketrack_metadata::LifecycleEvent;
use flaketrack_runner::{
    capture::JsonLinesCapture,
    config::{CONFIG_PATH, FlaketrackConfig, RunMode},
    helpers::plural,
    reporter::{ReporterBuilder, ReporterEventOutcome, RunVerdict},
    store::ReportStore,
};
use owo_colors::OwoColorize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
};
use swrite::{SWrite, swriteln};
use tracing::debug;

/// Tracks flaky and permanently failed tests across retries of a browser test run.
///
/// flaketrack reads the lifecycle events an external test runner emits, and produces per-attempt
/// log lines, a console run report and a JSON flaky test report.
#[derive(Debug, Parser)]
#[command(
    name = "flaketrack",
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct FlaketrackApp {
    #[clap(flatten)]
    common: CommonOpts,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct CommonOpts {
    /// Project root directory [default: the current directory]
    #[arg(long, global = true, value_name = "DIR")]
    project_root: Option<Utf8PathBuf>,

    /// Config file [default: <project-root>/.config/flaketrack.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    #[clap(flatten)]
    output: OutputOpts,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read a stream of lifecycle events and report on the run
    ///
    /// Events are read as JSON lines. Screenshot capture requests are written to standard output
    /// as JSON lines, and the run log to standard error.
    Ingest {
        /// File to read events from, or `-` for standard input
        #[arg(long, value_name = "FILE", default_value = "-")]
        events: Utf8PathBuf,

        /// The mode the test runner was invoked in
        #[arg(long, value_enum, default_value_t)]
        mode: RunModeOpt,
    },

    /// Show the flaky test report written by the most recent run
    Show {
        /// Report to show [default: the report path in the config]
        #[arg(long, value_name = "FILE")]
        report: Option<Utf8PathBuf>,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum RunModeOpt {
    /// A normal, headless run
    #[default]
    Run,

    /// An interactive session
    Open,
}

impl From<RunModeOpt> for RunMode {
    fn from(mode: RunModeOpt) -> Self {
        match mode {
            RunModeOpt::Run => RunMode::Run,
            RunModeOpt::Open => RunMode::Open,
        }
    }
}

impl FlaketrackApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.common.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let project_root = match self.common.project_root {
            Some(project_root) => project_root,
            None => current_dir()?,
        };
        let config =
            FlaketrackConfig::from_sources(project_root, self.common.config_file.as_deref())?;

        match self.command {
            Command::Ingest { events, mode } => {
                exec_ingest(&config, &events, mode.into(), output, output_writer)
            }
            Command::Show { report } => {
                let report_path = report.unwrap_or_else(|| config.report_path());
                exec_show(&report_path, output, output_writer)
            }
            Command::ShowConfig => exec_show_config(&config, output_writer),
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(dir).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}

fn exec_ingest(
    config: &FlaketrackConfig,
    events: &Utf8Path,
    mode: RunMode,
    output: OutputContext,
    output_writer: &mut OutputWriter,
) -> Result<i32> {
    let (events_path, reader): (Option<Utf8PathBuf>, Box<dyn BufRead>) =
        if events.as_str() == "-" {
            (None, Box::new(io::stdin().lock()))
        } else {
            let file = File::open(events)
                .map_err(|err| ExpectedError::events_read_failed(Some(events.to_owned()), err))?;
            (Some(events.to_owned()), Box::new(BufReader::new(file)))
        };

    let should_colorize = output
        .color
        .should_colorize(supports_color::Stream::Stderr);
    let (stdout, reporter_output) = output_writer.split();
    let capture = JsonLinesCapture::new(config.screenshots_dir(), stdout);
    let mut reporter = ReporterBuilder::default()
        .set_mode(mode)
        .set_colorize(should_colorize)
        .build(config, reporter_output, Box::new(capture));

    let mut outcome = None;
    let mut failure_count = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let event = line
            .map_err(|err| ExpectedError::events_read_failed(events_path.clone(), err))
            .and_then(|line| Ok(LifecycleEvent::parse_line(index + 1, &line)?));
        let event = match event {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                // An interrupted runner often leaves a partial last line. Keep what concluded
                // before it.
                if outcome.is_none() {
                    reporter.finish_incomplete()?;
                }
                return Err(err);
            }
        };
        match reporter.report_event(event)? {
            ReporterEventOutcome::Continue => {}
            ReporterEventOutcome::Failure(failure) => {
                // The failure was already logged. Whether it fails the run is up to the runner,
                // since a failed attempt may still be retried.
                failure_count += 1;
                debug!("runner reported a failure: {failure}");
            }
            ReporterEventOutcome::Finished(finished) => outcome = Some(finished),
        }
    }

    let outcome = match outcome {
        Some(outcome) => outcome,
        None => reporter.finish_incomplete()?,
    };
    debug!(
        "ingested run with {failure_count} failure notifications, verdict {:?}",
        outcome.verdict
    );

    match outcome.verdict {
        RunVerdict::Passed => Ok(0),
        RunVerdict::Failed => Err(ExpectedError::TestRunFailed {
            failed: outcome
                .run_report
                .as_ref()
                .map_or(0, |report| report.totals.failed.max(report.failed.len())),
        }),
        RunVerdict::Incomplete => Err(ExpectedError::IncompleteRun {
            recorded: outcome.summary.summary.total_tests,
        }),
    }
}

fn exec_show(
    report_path: &Utf8Path,
    output: OutputContext,
    output_writer: &mut OutputWriter,
) -> Result<i32> {
    let report = ReportStore::new(report_path).load()?;
    let styles = output.stdout_styles();
    let totals = &report.summary;

    let mut out = String::new();
    swriteln!(
        out,
        "flaky test report from {} ({})",
        report.timestamp.to_rfc3339().style(styles.bold),
        report_path,
    );
    swriteln!(
        out,
        "{} {}, {} flaky, {} {}",
        totals.total_tests.style(styles.bold),
        plural::tests_str(totals.total_tests),
        totals.flaky_tests.style(styles.bold),
        totals.total_retries.style(styles.bold),
        plural::retries_str(totals.total_retries),
    );

    for (title, test) in report.flaky_tests() {
        swriteln!(
            out,
            "  {} {title}: failed {} of {} {}",
            "FLAKY".style(styles.warning_text),
            test.failed_attempts,
            test.total_attempts,
            plural::attempts_str(test.total_attempts),
        );
    }

    let failed = report.tests.iter().filter(|(_, test)| {
        test.attempts
            .last()
            .is_some_and(|attempt| attempt.state.is_failed())
    });
    for (title, test) in failed {
        swriteln!(
            out,
            "  {} {title}: failed {} {}",
            "FAILED".style(styles.fail),
            test.failed_attempts,
            plural::attempts_str(test.failed_attempts),
        );
    }

    write_stdout(output_writer, &out)?;
    Ok(0)
}

fn exec_show_config(config: &FlaketrackConfig, output_writer: &mut OutputWriter) -> Result<i32> {
    let timeouts = config.timeouts();
    let mut out = String::new();
    swriteln!(out, "project root: {}", config.project_root());
    swriteln!(
        out,
        "retries: {} in run mode, {} in open mode",
        config.retry_count(RunMode::Run),
        config.retry_count(RunMode::Open),
    );
    swriteln!(out, "report path: {}", config.report_path());
    swriteln!(
        out,
        "slow threshold: {}",
        humantime::format_duration(config.slow_threshold())
    );
    swriteln!(out, "videos dir: {}", config.videos_dir());
    swriteln!(out, "screenshots dir: {}", config.screenshots_dir());
    swriteln!(
        out,
        "timeouts: command {}, page load {}, request {}",
        humantime::format_duration(timeouts.command),
        humantime::format_duration(timeouts.page_load),
        humantime::format_duration(timeouts.request),
    );
    debug!("default config file location: {CONFIG_PATH}");

    write_stdout(output_writer, &out)?;
    Ok(0)
}

fn write_stdout(output_writer: &mut OutputWriter, s: &str) -> Result<()> {
    let mut writer = output_writer.stdout_writer();
    writer
        .write_all(s.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|err| ExpectedError::WriteOutputError { err })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Color;
    use camino_tempfile::{Utf8TempDir, tempdir};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const FLAKY_AND_FAILED: &str = indoc! {r#"
        {"type":"attempt-started","testTitle":"should login with valid credentials"}
        {"type":"attempt-finished","testTitle":"should login with valid credentials","fullTitlePath":"Login > should login with valid credentials","state":"failed"}
        {"type":"attempt-started","testTitle":"should login with valid credentials"}
        {"type":"attempt-finished","testTitle":"should login with valid credentials","fullTitlePath":"Login > should login with valid credentials","state":"passed"}
        {"type":"attempt-started","testTitle":"should display widgets"}
        {"type":"attempt-finished","testTitle":"should display widgets","fullTitlePath":"Dashboard > should display widgets","state":"failed"}
        {"type":"attempt-started","testTitle":"should display widgets"}
        {"type":"attempt-finished","testTitle":"should display widgets","fullTitlePath":"Dashboard > should display widgets","state":"failed"}
        {"type":"run-finished","totalTests":2,"totalPassed":1,"totalFailed":1,"totalPending":0,"totalSkipped":0,"totalDurationMs":9000,"runs":[{"specFile":"cypress/e2e/login.cy.ts","tests":[{"titlePath":["Login","should login with valid credentials"],"state":"passed","attempts":[{"state":"failed"},{"state":"passed"}]}]},{"specFile":"cypress/e2e/dashboard.cy.ts","tests":[{"titlePath":["Dashboard","should display widgets"],"state":"failed","attempts":[{"state":"failed"},{"state":"failed"}],"displayError":"expected 6 widgets"}]}]}
    "#};

    fn output() -> OutputContext {
        OutputContext {
            color: Color::Never,
        }
    }

    fn test_writer() -> OutputWriter {
        OutputWriter::Test {
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    fn run(dir: &Utf8TempDir, args: &[&str], writer: &mut OutputWriter) -> Result<i32> {
        let mut full_args = vec!["flaketrack", "--project-root", dir.path().as_str()];
        full_args.extend_from_slice(args);
        let app = FlaketrackApp::try_parse_from(full_args).expect("arguments are valid");
        app.exec(output(), writer)
    }

    fn stdout(writer: &OutputWriter) -> &str {
        match writer {
            OutputWriter::Test { stdout, .. } => std::str::from_utf8(stdout).unwrap(),
            OutputWriter::Normal => panic!("test writer expected"),
        }
    }

    fn write_events(dir: &Utf8TempDir, events: &str) -> Utf8PathBuf {
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, events).unwrap();
        path
    }

    #[test]
    fn ingest_then_show() {
        let dir = tempdir().unwrap();
        let events = write_events(&dir, FLAKY_AND_FAILED);

        let mut writer = test_writer();
        let err = run(&dir, &["ingest", "--events", events.as_str()], &mut writer).unwrap_err();
        assert!(
            matches!(err, ExpectedError::TestRunFailed { failed: 1 }),
            "unexpected error: {err:?}"
        );
        assert_eq!(err.process_exit_code(), 100);

        // One capture request per failed attempt, on stdout.
        let captures: Vec<serde_json::Value> = stdout(&writer)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(captures.len(), 3);
        assert_eq!(captures[0]["type"], "capture-screenshot");
        assert_eq!(
            captures[2]["name"],
            "FAILED_Attempt2_Dashboard_should_display_widgets"
        );

        let mut writer = test_writer();
        assert_eq!(run(&dir, &["show"], &mut writer).unwrap(), 0);
        let out = stdout(&writer);
        let mut lines = out.lines();
        assert!(lines.next().unwrap().starts_with("flaky test report from "));
        assert_eq!(
            lines.collect::<Vec<_>>(),
            [
                "2 tests, 1 flaky, 2 retries",
                "  FLAKY Login > should login with valid credentials: failed 1 of 2 attempts",
                "  FAILED Dashboard > should display widgets: failed 2 attempts",
            ]
        );
    }

    #[test]
    fn ingest_truncated_stream() {
        let dir = tempdir().unwrap();
        let truncated: String = FLAKY_AND_FAILED
            .lines()
            .take(4)
            .map(|line| format!("{line}\n"))
            .collect();
        let events = write_events(&dir, &truncated);

        let mut writer = test_writer();
        let err = run(&dir, &["ingest", "--events", events.as_str()], &mut writer).unwrap_err();
        assert!(
            matches!(err, ExpectedError::IncompleteRun { recorded: 1 }),
            "unexpected error: {err:?}"
        );
        assert_eq!(err.process_exit_code(), 106);
        assert!(
            dir.path().join("flaky-tests-report.json").exists(),
            "report is written for incomplete runs"
        );
    }

    #[test]
    fn ingest_malformed_event() {
        let dir = tempdir().unwrap();
        let events = write_events(
            &dir,
            indoc! {r#"
                {"type":"attempt-started","testTitle":"a"}
                {"type":"attempt-started"
            "#},
        );

        let mut writer = test_writer();
        let err = run(&dir, &["ingest", "--events", events.as_str()], &mut writer).unwrap_err();
        match &err {
            ExpectedError::EventParseError { err } => assert_eq!(err.line_number(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.process_exit_code(), 94);
    }

    #[test]
    fn ingest_partial_last_line_keeps_concluded_attempts() {
        let dir = tempdir().unwrap();
        let mut events: String = FLAKY_AND_FAILED
            .lines()
            .take(4)
            .map(|line| format!("{line}\n"))
            .collect();
        events.push_str(r#"{"type":"attempt-fini"#);
        let events = write_events(&dir, &events);

        let mut writer = test_writer();
        let err = run(&dir, &["ingest", "--events", events.as_str()], &mut writer).unwrap_err();
        match &err {
            ExpectedError::EventParseError { err } => assert_eq!(err.line_number(), 5),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.process_exit_code(), 94);

        let mut writer = test_writer();
        assert_eq!(run(&dir, &["show"], &mut writer).unwrap(), 0);
        let out = stdout(&writer);
        assert!(
            out.contains("1 test, 1 flaky, 1 retry\n"),
            "the concluded attempts were saved:\n{out}"
        );
    }

    #[test]
    fn ingest_events_after_finish() {
        let dir = tempdir().unwrap();
        let events = write_events(
            &dir,
            indoc! {r#"
                {"type":"run-finished","totalTests":0,"totalPassed":0,"totalFailed":0,"totalPending":0,"totalSkipped":0,"totalDurationMs":0}
                {"type":"log","message":"too late"}
            "#},
        );

        let mut writer = test_writer();
        let err = run(&dir, &["ingest", "--events", events.as_str()], &mut writer).unwrap_err();
        assert_eq!(err.process_exit_code(), 94);
    }

    #[test]
    fn ingest_missing_events_file() {
        let dir = tempdir().unwrap();
        let mut writer = test_writer();
        let err = run(&dir, &["ingest", "--events", "missing.jsonl"], &mut writer).unwrap_err();
        assert!(
            matches!(err, ExpectedError::EventsReadFailed { path: Some(_), .. }),
            "unexpected error: {err:?}"
        );
        assert_eq!(err.process_exit_code(), 96);
    }

    #[test]
    fn show_missing_report() {
        let dir = tempdir().unwrap();
        let mut writer = test_writer();
        let err = run(&dir, &["show"], &mut writer).unwrap_err();
        assert_eq!(err.process_exit_code(), 93);
    }

    #[test]
    fn show_config_with_overrides() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom.toml");
        std::fs::write(
            &config_path,
            indoc! {r#"
                [retries]
                run-mode = 3

                [report]
                slow-threshold = "2s 500ms"
            "#},
        )
        .unwrap();

        let mut writer = test_writer();
        let code = run(
            &dir,
            &["show-config", "--config-file", config_path.as_str()],
            &mut writer,
        )
        .unwrap();
        assert_eq!(code, 0);

        let root = dir.path();
        assert_eq!(
            stdout(&writer),
            format!(
                "project root: {root}\n\
                 retries: 3 in run mode, 0 in open mode\n\
                 report path: {root}/flaky-tests-report.json\n\
                 slow threshold: 2s 500ms\n\
                 videos dir: {root}/cypress/videos\n\
                 screenshots dir: {root}/cypress/screenshots\n\
                 timeouts: command 10s, page load 30s, request 10s\n"
            )
        );
    }

    #[test]
    fn invalid_config_is_setup_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("bad.toml");
        std::fs::write(&config_path, "[retries]\nrun-mode = \"many\"\n").unwrap();

        let mut writer = test_writer();
        let err = run(
            &dir,
            &["show-config", "--config-file", config_path.as_str()],
            &mut writer,
        )
        .unwrap_err();
        assert!(
            matches!(err, ExpectedError::ConfigParseError { .. }),
            "unexpected error: {err:?}"
        );
        assert_eq!(err.process_exit_code(), 96);
    }
}
