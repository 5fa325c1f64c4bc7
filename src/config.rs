//! Runtime configuration.
//!
//! Values come from `SANDBRIDGE_*` environment variables, with defaults for
//! everything except the sandbox URL and token. The binary loads an
//! optional `.env` file first and lets command-line flags override.

use crate::core::{SandboxError, SandboxResult};
use crate::pipeline::{PollerConfig, ScanLoopConfig};

use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "cuckoo")]
use crate::backends::CuckooConfig;

/// Environment variable names.
pub mod vars {
    /// Base URL of the Cuckoo REST API.
    pub const API_URL: &str = "SANDBRIDGE_API_URL";
    /// Bearer token for the Cuckoo REST API.
    pub const API_TOKEN: &str = "SANDBRIDGE_API_TOKEN";
    /// Directory to watch.
    pub const WATCH_DIR: &str = "SANDBRIDGE_WATCH_DIR";
    /// Comma-separated extensions that are never submitted.
    pub const DISALLOWED_EXTENSIONS: &str = "SANDBRIDGE_DISALLOWED_EXTENSIONS";
    /// Seconds allowed for a report to carry a score.
    pub const ANALYSIS_TIMEOUT_SECS: &str = "SANDBRIDGE_ANALYSIS_TIMEOUT_SECS";
    /// Scores at or above this are flagged.
    pub const SCORE_THRESHOLD: &str = "SANDBRIDGE_SCORE_THRESHOLD";
    /// Seconds between two polls.
    pub const POLL_INTERVAL_SECS: &str = "SANDBRIDGE_POLL_INTERVAL_SECS";
    /// Seconds between two cycles.
    pub const CYCLE_INTERVAL_SECS: &str = "SANDBRIDGE_CYCLE_INTERVAL_SECS";
    /// Seconds a task may stay pending; unset waits forever.
    pub const PENDING_TIMEOUT_SECS: &str = "SANDBRIDGE_PENDING_TIMEOUT_SECS";
    /// Per-request HTTP timeout in seconds.
    pub const REQUEST_TIMEOUT_SECS: &str = "SANDBRIDGE_REQUEST_TIMEOUT_SECS";
    /// Number of files processed at the same time.
    pub const MAX_CONCURRENT_FILES: &str = "SANDBRIDGE_MAX_CONCURRENT_FILES";
}

/// Complete daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Cuckoo REST API, e.g. `http://10.0.0.5:8090`.
    pub api_url: String,
    /// Bearer token for the API.
    pub api_token: SecretString,
    /// Directory the network monitor extracts files into.
    pub watch_dir: PathBuf,
    /// Extensions that are never submitted.
    pub disallowed_extensions: Vec<String>,
    /// Time allowed for a report to carry a score.
    pub analysis_timeout: Duration,
    /// Scores at or above this are flagged in the logs.
    pub score_threshold: f64,
    /// Wait between two polls of a task.
    pub poll_interval: Duration,
    /// Pause between two cycles.
    pub cycle_interval: Duration,
    /// Time a task may stay pending. `None` waits indefinitely.
    pub pending_timeout: Option<Duration>,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Number of files processed at the same time.
    pub max_concurrent_files: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_token: SecretString::from(String::new()),
            watch_dir: PathBuf::from("/nsm/bro/extracted"),
            disallowed_extensions: vec!["zip".to_string()],
            analysis_timeout: Duration::from_secs(300),
            score_threshold: 4.0,
            poll_interval: Duration::from_secs(20),
            cycle_interval: Duration::from_secs(60),
            pending_timeout: None,
            request_timeout: Duration::from_secs(60),
            max_concurrent_files: 1,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> SandboxResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary lookup function.
    ///
    /// Unset or blank variables fall back to defaults; set but unparsable
    /// ones are errors.
    pub fn from_lookup<F>(lookup: F) -> SandboxResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            api_url: get(vars::API_URL).unwrap_or(defaults.api_url),
            api_token: get(vars::API_TOKEN)
                .map(SecretString::from)
                .unwrap_or(defaults.api_token),
            watch_dir: get(vars::WATCH_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.watch_dir),
            disallowed_extensions: get(vars::DISALLOWED_EXTENSIONS)
                .map(|list| parse_extensions(&list))
                .unwrap_or(defaults.disallowed_extensions),
            analysis_timeout: parse_secs(vars::ANALYSIS_TIMEOUT_SECS, get(vars::ANALYSIS_TIMEOUT_SECS))?
                .unwrap_or(defaults.analysis_timeout),
            score_threshold: parse_value(vars::SCORE_THRESHOLD, get(vars::SCORE_THRESHOLD))?
                .unwrap_or(defaults.score_threshold),
            poll_interval: parse_secs(vars::POLL_INTERVAL_SECS, get(vars::POLL_INTERVAL_SECS))?
                .unwrap_or(defaults.poll_interval),
            cycle_interval: parse_secs(vars::CYCLE_INTERVAL_SECS, get(vars::CYCLE_INTERVAL_SECS))?
                .unwrap_or(defaults.cycle_interval),
            pending_timeout: parse_secs(vars::PENDING_TIMEOUT_SECS, get(vars::PENDING_TIMEOUT_SECS))?,
            request_timeout: parse_secs(vars::REQUEST_TIMEOUT_SECS, get(vars::REQUEST_TIMEOUT_SECS))?
                .unwrap_or(defaults.request_timeout),
            max_concurrent_files: parse_value(
                vars::MAX_CONCURRENT_FILES,
                get(vars::MAX_CONCURRENT_FILES),
            )?
            .unwrap_or(defaults.max_concurrent_files),
        })
    }

    /// Checks that the configuration can drive the daemon.
    pub fn validate(&self) -> SandboxResult<()> {
        let url = self.api_url.trim();
        if url.is_empty() {
            return Err(SandboxError::configuration(format!("{} is not set", vars::API_URL)));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SandboxError::configuration(format!(
                "{} must be an http(s) URL, got {url}",
                vars::API_URL
            )));
        }
        if self.api_token.expose_secret().trim().is_empty() {
            return Err(SandboxError::configuration(format!("{} is not set", vars::API_TOKEN)));
        }

        for (name, value) in [
            (vars::ANALYSIS_TIMEOUT_SECS, self.analysis_timeout),
            (vars::POLL_INTERVAL_SECS, self.poll_interval),
            (vars::CYCLE_INTERVAL_SECS, self.cycle_interval),
            (vars::REQUEST_TIMEOUT_SECS, self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(SandboxError::configuration(format!("{name} must be positive")));
            }
        }
        if self.pending_timeout.is_some_and(|t| t.is_zero()) {
            return Err(SandboxError::configuration(format!(
                "{} must be positive when set",
                vars::PENDING_TIMEOUT_SECS
            )));
        }
        if self.max_concurrent_files == 0 {
            return Err(SandboxError::configuration(format!(
                "{} must be at least 1",
                vars::MAX_CONCURRENT_FILES
            )));
        }
        if !self.score_threshold.is_finite() || self.score_threshold < 0.0 {
            return Err(SandboxError::configuration(format!(
                "{} must be a non-negative number",
                vars::SCORE_THRESHOLD
            )));
        }

        Ok(())
    }

    /// Settings for the Cuckoo client.
    #[cfg(feature = "cuckoo")]
    pub fn cuckoo(&self) -> CuckooConfig {
        CuckooConfig::new(self.api_url.clone(), self.api_token.expose_secret())
            .with_timeout(self.request_timeout)
    }

    /// Settings for the poller.
    pub fn poller(&self) -> PollerConfig {
        PollerConfig::new()
            .with_poll_interval(self.poll_interval)
            .with_analysis_timeout(self.analysis_timeout)
            .with_pending_timeout(self.pending_timeout)
    }

    /// Settings for the scan loop.
    pub fn scan_loop(&self) -> ScanLoopConfig {
        ScanLoopConfig::new(self.watch_dir.clone())
            .with_disallowed_extensions(self.disallowed_extensions.iter().cloned())
            .with_cycle_interval(self.cycle_interval)
            .with_max_concurrent_files(self.max_concurrent_files)
            .with_score_threshold(self.score_threshold)
    }
}

/// Loads a `.env` file into the process environment.
///
/// With no explicit path, `./.env` (or the first one found in a parent
/// directory) is loaded if present. Variables already set are not
/// overwritten. Returns the file that was loaded.
pub fn load_env_file(path: Option<&Path>) -> SandboxResult<Option<PathBuf>> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map(|()| Some(path.to_path_buf()))
            .map_err(|e| {
                SandboxError::configuration(format!("failed to load {}: {e}", path.display()))
            }),
        None => Ok(dotenvy::dotenv().ok()),
    }
}

/// Splits a comma list into extensions, dropping blanks and leading dots.
pub fn parse_extensions(list: &str) -> Vec<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T>(name: &str, raw: Option<String>) -> SandboxResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value.parse::<T>().map_err(|e| {
            SandboxError::configuration(format!("invalid {name} value {value:?}: {e}"))
        })
    })
    .transpose()
}

fn parse_secs(name: &str, raw: Option<String>) -> SandboxResult<Option<Duration>> {
    Ok(parse_value::<u64>(name, raw)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> SandboxResult<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    fn valid() -> Config {
        from_pairs(&[
            (vars::API_URL, "http://10.0.0.5:8090"),
            (vars::API_TOKEN, "secret"),
        ])
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = valid();

        assert_eq!(config.watch_dir, PathBuf::from("/nsm/bro/extracted"));
        assert_eq!(config.disallowed_extensions, vec!["zip".to_string()]);
        assert_eq!(config.analysis_timeout, Duration::from_secs(300));
        assert_eq!(config.poll_interval, Duration::from_secs(20));
        assert_eq!(config.cycle_interval, Duration::from_secs(60));
        assert_eq!(config.score_threshold, 4.0);
        assert_eq!(config.pending_timeout, None);
        assert_eq!(config.max_concurrent_files, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            (vars::API_URL, "https://sandbox.local/"),
            (vars::API_TOKEN, "secret"),
            (vars::WATCH_DIR, "/data/extracted"),
            (vars::DISALLOWED_EXTENSIONS, "zip, .rar,,7z"),
            (vars::ANALYSIS_TIMEOUT_SECS, "600"),
            (vars::SCORE_THRESHOLD, "6.5"),
            (vars::PENDING_TIMEOUT_SECS, "3600"),
            (vars::MAX_CONCURRENT_FILES, "4"),
        ])
        .unwrap();

        assert_eq!(config.watch_dir, PathBuf::from("/data/extracted"));
        assert_eq!(config.disallowed_extensions, vec!["zip", "rar", "7z"]);
        assert_eq!(config.analysis_timeout, Duration::from_secs(600));
        assert_eq!(config.score_threshold, 6.5);
        assert_eq!(config.pending_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.max_concurrent_files, 4);

        let poller = config.poller();
        assert_eq!(poller.analysis_timeout, Duration::from_secs(600));
        assert_eq!(poller.pending_timeout, Some(Duration::from_secs(3600)));

        let scan = config.scan_loop();
        assert_eq!(scan.max_concurrent_files, 4);
        assert_eq!(scan.score_threshold, 6.5);
    }

    #[test]
    fn test_unparsable_value_is_an_error() {
        let err = from_pairs(&[(vars::POLL_INTERVAL_SECS, "soon")]).unwrap_err();
        assert!(matches!(err, SandboxError::Configuration { .. }));
        assert!(err.to_string().contains(vars::POLL_INTERVAL_SECS));
    }

    #[test]
    fn test_validation() {
        assert!(Config::default().validate().is_err());

        let mut config = valid();
        config.api_url = "ftp://sandbox".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.api_token = SecretString::from(" ".to_string());
        assert!(config.validate().is_err());

        let mut config = valid();
        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.max_concurrent_files = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.score_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_file_feeds_the_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbridge.env");
        std::fs::write(
            &path,
            "SANDBRIDGE_ENV_FILE_TEST_FILTER=sandbridge=trace\n",
        )
        .unwrap();

        let loaded = load_env_file(Some(&path)).unwrap();

        assert_eq!(loaded.as_deref(), Some(path.as_path()));
        assert_eq!(
            std::env::var("SANDBRIDGE_ENV_FILE_TEST_FILTER").unwrap(),
            "sandbridge=trace"
        );
    }

    #[test]
    fn test_missing_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env_file(Some(&dir.path().join("absent.env"))).unwrap_err();
        assert!(matches!(err, SandboxError::Configuration { .. }));
    }

    #[test]
    fn test_token_is_not_debug_printed() {
        let config = valid();
        assert!(!format!("{config:?}").contains("secret\""));
    }
}
