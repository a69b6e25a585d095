//! Supervisor configuration
//!
//! Tunables come from three layers, in increasing precedence: built-in
//! defaults, an optional TOML config file, and command-line/environment
//! overrides supplied by the launcher.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use tether_util::default_runtime_dir;

/// Heartbeat token cadence on the control channel
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// Run-loop poll tick; bounds worker-exit detection latency
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for the worker to connect to the control channel.
/// A configured value of 0 disables the timeout and waits forever.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no worker executable configured")]
    MissingWorker,

    #[error("no worker script configured")]
    MissingScript,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Fully resolved supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Worker executable path
    pub worker: PathBuf,
    /// Script path handed to the worker as its first argument
    pub script: PathBuf,
    /// Extra arguments appended to the worker command line
    pub worker_args: Vec<String>,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    /// `None` waits forever for the worker to connect
    pub connect_timeout: Option<Duration>,
    /// Directory holding the channel sockets
    pub runtime_dir: PathBuf,
}

impl SupervisorConfig {
    /// Configuration with built-in defaults for everything but the two
    /// required paths.
    pub fn new(worker: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            worker: worker.into(),
            script: script.into(),
            worker_args: Vec::new(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            runtime_dir: default_runtime_dir(),
        }
    }
}

/// Raw shape of the TOML config file; every field is optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub worker: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub worker_args: Option<Vec<String>>,
    pub heartbeat_interval_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub runtime_dir: Option<PathBuf>,
}

/// Load a config file from disk.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse a config file from a TOML string.
pub fn parse_config(content: &str) -> ConfigResult<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Command-line/environment overrides, highest precedence.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub worker: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub worker_args: Vec<String>,
    pub heartbeat_interval_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub runtime_dir: Option<PathBuf>,
}

/// Merge defaults, file values, and overrides into a resolved config.
///
/// The worker and script paths must be present in at least one layer.
/// Intervals must be nonzero; a connect timeout of 0 means wait forever.
pub fn resolve_config(
    file: Option<ConfigFile>,
    overrides: ConfigOverrides,
) -> ConfigResult<SupervisorConfig> {
    let file = file.unwrap_or_default();

    let worker = overrides
        .worker
        .or(file.worker)
        .ok_or(ConfigError::MissingWorker)?;
    let script = overrides
        .script
        .or(file.script)
        .ok_or(ConfigError::MissingScript)?;

    let mut config = SupervisorConfig::new(worker, script);

    config.worker_args = if overrides.worker_args.is_empty() {
        file.worker_args.unwrap_or_default()
    } else {
        overrides.worker_args
    };

    if let Some(ms) = overrides.heartbeat_interval_ms.or(file.heartbeat_interval_ms) {
        if ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be nonzero".into(),
            ));
        }
        config.heartbeat_interval = Duration::from_millis(ms);
    }

    if let Some(ms) = overrides.poll_interval_ms.or(file.poll_interval_ms) {
        if ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be nonzero".into(),
            ));
        }
        config.poll_interval = Duration::from_millis(ms);
    }

    if let Some(secs) = overrides.connect_timeout_secs.or(file.connect_timeout_secs) {
        config.connect_timeout = if secs == 0 {
            None
        } else {
            Some(Duration::from_secs(secs))
        };
    }

    if let Some(dir) = overrides.runtime_dir.or(file.runtime_dir) {
        config.runtime_dir = dir;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = SupervisorConfig::new("/usr/bin/worker", "/opt/script");
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1000));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert!(config.worker_args.is_empty());
    }

    #[test]
    fn parse_full_file() {
        let file = parse_config(
            r#"
            worker = "/usr/bin/python3"
            script = "/opt/scripts/launcher.py"
            worker_args = ["-u"]
            heartbeat_interval_ms = 500
            poll_interval_ms = 5
            connect_timeout_secs = 10
            runtime_dir = "/tmp/tether-test"
            "#,
        )
        .unwrap();

        let config = resolve_config(Some(file), ConfigOverrides::default()).unwrap();
        assert_eq!(config.worker, PathBuf::from("/usr/bin/python3"));
        assert_eq!(config.worker_args, vec!["-u".to_string()]);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.runtime_dir, PathBuf::from("/tmp/tether-test"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            parse_config("workr = \"/usr/bin/python3\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overrides_take_precedence_over_file() {
        let file = parse_config(
            r#"
            worker = "/usr/bin/python3"
            script = "/opt/a.py"
            heartbeat_interval_ms = 500
            "#,
        )
        .unwrap();

        let overrides = ConfigOverrides {
            script: Some("/opt/b.py".into()),
            heartbeat_interval_ms: Some(250),
            ..Default::default()
        };

        let config = resolve_config(Some(file), overrides).unwrap();
        assert_eq!(config.script, PathBuf::from("/opt/b.py"));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
    }

    #[test]
    fn missing_worker_or_script_is_an_error() {
        assert!(matches!(
            resolve_config(None, ConfigOverrides::default()),
            Err(ConfigError::MissingWorker)
        ));

        let overrides = ConfigOverrides {
            worker: Some("/usr/bin/worker".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_config(None, overrides),
            Err(ConfigError::MissingScript)
        ));
    }

    #[test]
    fn zero_connect_timeout_means_wait_forever() {
        let overrides = ConfigOverrides {
            worker: Some("/usr/bin/worker".into()),
            script: Some("/opt/script".into()),
            connect_timeout_secs: Some(0),
            ..Default::default()
        };
        let config = resolve_config(None, overrides).unwrap();
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn zero_intervals_are_invalid() {
        let overrides = ConfigOverrides {
            worker: Some("/usr/bin/worker".into()),
            script: Some("/opt/script".into()),
            poll_interval_ms: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            resolve_config(None, overrides),
            Err(ConfigError::Invalid(_))
        ));
    }
}
