// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::{collections::BTreeSet, io, time::Duration};
use tracing::{debug, warn};

/// The config file looked up in the project root when no file is passed in explicitly.
pub const CONFIG_PATH: &str = ".config/flaketrack.toml";

/// The default config, embedded at build time.
pub const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// The mode the test runner was invoked in.
///
/// The mode selects the retry count: normal (headless) runs retry failed tests, interactive runs
/// by default do not.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunMode {
    /// A normal, headless run.
    #[default]
    Run,

    /// An interactive or debugging session.
    Open,
}

/// Resolved flaketrack configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlaketrackConfig {
    project_root: Utf8PathBuf,
    retries: RetriesConfig,
    report: ReportConfig,
    timeouts: TimeoutsConfig,
}

impl FlaketrackConfig {
    /// Loads the config for the project at `project_root`.
    ///
    /// If `config_file` is `None`, the file at [`CONFIG_PATH`] is used if it exists. An explicitly
    /// specified config file must exist.
    pub fn from_sources(
        project_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(project_root, config_file, &mut DefaultConfigWarnings)
    }

    /// Returns the config built only from the embedded defaults.
    pub fn default_config(project_root: impl Into<Utf8PathBuf>) -> Self {
        let defaults = DeserializedConfig::defaults();
        Self::resolve(project_root.into(), defaults, DeserializedConfig::default())
            .expect("embedded default config is valid")
    }

    fn from_sources_with_warnings(
        project_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let project_root = project_root.into();
        let user_config = match config_file {
            Some(path) => {
                debug!("config: loading from explicit path {path}");
                match DeserializedConfig::from_path(path, warnings)? {
                    Some(config) => config,
                    None => {
                        return Err(ConfigParseError::new(path, ConfigParseErrorKind::NotFound));
                    }
                }
            }
            None => {
                let path = project_root.join(CONFIG_PATH);
                DeserializedConfig::from_path(&path, warnings)?.unwrap_or_default()
            }
        };

        let config_file = config_file
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| project_root.join(CONFIG_PATH));
        Self::resolve(project_root, DeserializedConfig::defaults(), user_config)
            .map_err(|kind| ConfigParseError::new(config_file, kind))
    }

    fn resolve(
        project_root: Utf8PathBuf,
        defaults: DeserializedConfig,
        user: DeserializedConfig,
    ) -> Result<Self, ConfigParseErrorKind> {
        // Every key is present in the embedded defaults, so the `expect`s below can only fail if
        // default-config.toml is edited incorrectly.
        let retries = RetriesConfig {
            run_mode: user
                .retries
                .run_mode
                .or(defaults.retries.run_mode)
                .expect("retries.run-mode has a default"),
            open_mode: user
                .retries
                .open_mode
                .or(defaults.retries.open_mode)
                .expect("retries.open-mode has a default"),
        };

        let report = ReportConfig {
            path: user
                .report
                .path
                .or(defaults.report.path)
                .expect("report.path has a default"),
            slow_threshold: user
                .report
                .slow_threshold
                .or(defaults.report.slow_threshold)
                .expect("report.slow-threshold has a default"),
            videos_dir: user
                .report
                .videos_dir
                .or(defaults.report.videos_dir)
                .expect("report.videos-dir has a default"),
            screenshots_dir: user
                .report
                .screenshots_dir
                .or(defaults.report.screenshots_dir)
                .expect("report.screenshots-dir has a default"),
        };

        if report.path.as_str().is_empty() {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "report.path",
                reason: "must not be empty",
            });
        }
        if report.path.file_name().is_none() {
            return Err(ConfigParseErrorKind::InvalidValue {
                key: "report.path",
                reason: "must name a file",
            });
        }

        let timeouts = TimeoutsConfig {
            command: user
                .timeouts
                .command
                .or(defaults.timeouts.command)
                .expect("timeouts.command has a default"),
            page_load: user
                .timeouts
                .page_load
                .or(defaults.timeouts.page_load)
                .expect("timeouts.page-load has a default"),
            request: user
                .timeouts
                .request
                .or(defaults.timeouts.request)
                .expect("timeouts.request has a default"),
        };

        Ok(Self {
            project_root,
            retries,
            report,
            timeouts,
        })
    }

    /// Returns the project root.
    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    /// Returns the number of retries the runner performs in the given mode.
    pub fn retry_count(&self, mode: RunMode) -> u32 {
        match mode {
            RunMode::Run => self.retries.run_mode,
            RunMode::Open => self.retries.open_mode,
        }
    }

    /// Returns the maximum number of attempts a test gets in the given mode.
    pub fn max_attempts(&self, mode: RunMode) -> u32 {
        self.retry_count(mode) + 1
    }

    /// Returns the threshold above which a passing attempt is reported as slow.
    pub fn slow_threshold(&self) -> Duration {
        self.report.slow_threshold
    }

    /// Returns the absolute path of the flaky test report.
    pub fn report_path(&self) -> Utf8PathBuf {
        self.project_root.join(&self.report.path)
    }

    /// Returns the absolute path of the videos directory.
    pub fn videos_dir(&self) -> Utf8PathBuf {
        self.project_root.join(&self.report.videos_dir)
    }

    /// Returns the absolute path of the screenshots directory.
    pub fn screenshots_dir(&self) -> Utf8PathBuf {
        self.project_root.join(&self.report.screenshots_dir)
    }

    /// Returns the runner's timeouts.
    pub fn timeouts(&self) -> &TimeoutsConfig {
        &self.timeouts
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct RetriesConfig {
    run_mode: u32,
    open_mode: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct ReportConfig {
    path: Utf8PathBuf,
    slow_threshold: Duration,
    videos_dir: Utf8PathBuf,
    screenshots_dir: Utf8PathBuf,
}

/// Timeouts enforced by the test runner.
///
/// flaketrack doesn't enforce these itself. A timed-out attempt is reported to it as a failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeoutsConfig {
    /// The timeout for a single runner command.
    pub command: Duration,

    /// The timeout for a page load.
    pub page_load: Duration,

    /// The timeout for a network request.
    pub request: Duration,
}

/// Handles warnings produced while loading the config.
trait ConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if unknown.len() == 1 {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.push_str(unknown.iter().next().expect("length is 1"));
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push_str("\n  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    retries: DeserializedRetries,
    #[serde(default)]
    report: DeserializedReport,
    #[serde(default)]
    timeouts: DeserializedTimeouts,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedRetries {
    #[serde(default)]
    run_mode: Option<u32>,
    #[serde(default)]
    open_mode: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedReport {
    #[serde(default)]
    path: Option<Utf8PathBuf>,
    #[serde(default, with = "humantime_serde")]
    slow_threshold: Option<Duration>,
    #[serde(default)]
    videos_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    screenshots_dir: Option<Utf8PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedTimeouts {
    #[serde(default, with = "humantime_serde")]
    command: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    page_load: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    request: Option<Duration>,
}

impl DeserializedConfig {
    fn defaults() -> Self {
        let (config, unknown) =
            Self::deserialize_toml(DEFAULT_CONFIG).expect("embedded default config is valid TOML");
        debug_assert!(
            unknown.is_empty(),
            "embedded default config has unknown keys: {unknown:?}"
        );
        config
    }

    /// Returns `Ok(None)` if the file does not exist.
    fn from_path(
        path: &Utf8Path,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Option<Self>, ConfigParseError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("config: file does not exist at {path}");
                return Ok(None);
            }
            Err(error) => {
                return Err(ConfigParseError::new(
                    path,
                    ConfigParseErrorKind::Read(error),
                ));
            }
        };

        let (config, unknown) = Self::deserialize_toml(&contents)
            .map_err(|error| ConfigParseError::new(path, ConfigParseErrorKind::Deserialize(error)))?;

        if !unknown.is_empty() {
            warnings.unknown_config_keys(path, &unknown);
        }

        debug!("config: loaded successfully from {path}");
        Ok(Some(config))
    }

    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::de::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config: DeserializedConfig = serde_ignored::deserialize(deserializer, |path| {
            unknown.insert(path.to_string());
        })?;
        Ok((config, unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use flaketrack_metadata::DEFAULT_REPORT_FILE_NAME;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[derive(Default)]
    struct TestConfigWarnings {
        unknown_keys: Vec<(Utf8PathBuf, BTreeSet<String>)>,
    }

    impl ConfigWarnings for TestConfigWarnings {
        fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
            self.unknown_keys
                .push((config_file.to_owned(), unknown.clone()));
        }
    }

    fn write_config(dir: &Utf8TempDir, contents: &str) -> Utf8PathBuf {
        let path = dir.path().join(CONFIG_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_without_config_file() {
        let dir = Utf8TempDir::new().unwrap();
        let config = FlaketrackConfig::from_sources(dir.path(), None).unwrap();

        assert_eq!(config, FlaketrackConfig::default_config(dir.path()));
        assert_eq!(config.retry_count(RunMode::Run), 1);
        assert_eq!(config.retry_count(RunMode::Open), 0);
        assert_eq!(config.max_attempts(RunMode::Run), 2);
        assert_eq!(config.slow_threshold(), Duration::from_secs(5));
        assert_eq!(
            config.report_path(),
            dir.path().join(DEFAULT_REPORT_FILE_NAME)
        );
        assert_eq!(config.videos_dir(), dir.path().join("cypress/videos"));
        assert_eq!(
            config.screenshots_dir(),
            dir.path().join("cypress/screenshots")
        );
        assert_eq!(
            *config.timeouts(),
            TimeoutsConfig {
                command: Duration::from_secs(10),
                page_load: Duration::from_secs(30),
                request: Duration::from_secs(10),
            }
        );
    }

    #[test]
    fn user_config_overrides_per_key() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(
            &dir,
            indoc::indoc! {r#"
                [retries]
                run-mode = 2

                [report]
                slow-threshold = "2500ms"
            "#},
        );

        let config = FlaketrackConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(config.retry_count(RunMode::Run), 2);
        assert_eq!(config.retry_count(RunMode::Open), 0, "default preserved");
        assert_eq!(config.slow_threshold(), Duration::from_millis(2500));
        assert_eq!(
            config.report_path(),
            dir.path().join(DEFAULT_REPORT_FILE_NAME)
        );
    }

    #[test]
    fn unknown_keys_are_reported() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(
            &dir,
            indoc::indoc! {r#"
                [retries]
                run-mode = 1
                max = 3

                [video]
                enabled = true
            "#},
        );

        let mut warnings = TestConfigWarnings::default();
        FlaketrackConfig::from_sources_with_warnings(dir.path(), None, &mut warnings).unwrap();
        assert_eq!(
            warnings.unknown_keys,
            vec![(
                path,
                BTreeSet::from(["retries.max".to_owned(), "video".to_owned()])
            )]
        );
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = Utf8TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        let error = FlaketrackConfig::from_sources(dir.path(), Some(&missing)).unwrap_err();
        assert_eq!(error.config_file(), &missing);
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::NotFound),
            "unexpected error kind: {:?}",
            error.kind()
        );
    }

    #[test_case(
        "[retries]\nrun-mode = -1\n" ; "negative retries"
    )]
    #[test_case(
        "[report]\nslow-threshold = \"soon\"\n" ; "bad duration"
    )]
    #[test_case(
        "[report\n" ; "invalid toml"
    )]
    fn invalid_config(contents: &str) {
        let dir = Utf8TempDir::new().unwrap();
        write_config(&dir, contents);
        let error = FlaketrackConfig::from_sources(dir.path(), None).unwrap_err();
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::Deserialize(_)),
            "unexpected error kind: {:?}",
            error.kind()
        );
    }

    #[test]
    fn empty_report_path_is_rejected() {
        let dir = Utf8TempDir::new().unwrap();
        write_config(&dir, "[report]\npath = \"\"\n");
        let error = FlaketrackConfig::from_sources(dir.path(), None).unwrap_err();
        assert!(
            matches!(
                error.kind(),
                ConfigParseErrorKind::InvalidValue {
                    key: "report.path",
                    ..
                }
            ),
            "unexpected error kind: {:?}",
            error.kind()
        );
    }
}
