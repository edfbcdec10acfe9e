//! Agent configuration.
//!
//! Configuration is loaded from a TOML file and deserialized into
//! [`AgentConfig`]. Every field has a sensible default, so a missing file or
//! an empty file both yield a working configuration that scans for the first
//! FTMS bike in range and posts readings to a collector on localhost.
//!
//! # Example
//!
//! ```toml
//! [collector]
//! url = "http://collector.local:8080"
//! timeout_secs = 10
//! source = "garage-trainer"
//!
//! [device]
//! name_contains = "KICKR"
//!
//! [scan]
//! attempts = 3
//! window_secs = 10
//! retry_delay_secs = 3
//!
//! [session]
//! connect_timeout_secs = 10
//! setup_attempts = 5
//! setup_retry_delay_secs = 3
//!
//! [supervisor]
//! bootstrap_attempts = 50
//! bootstrap_delay_ms = 200
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use velolink_core::pump::PumpOptions;
use velolink_core::scan::{DeviceFilter, ScanOptions};
use velolink_core::session::SessionOptions;
use velolink_core::supervisor::SupervisorOptions;

/// Shortest accepted scan window, in seconds.
pub const MIN_SCAN_WINDOW_SECS: u64 = 1;

/// Longest accepted scan window, in seconds.
pub const MAX_SCAN_WINDOW_SECS: u64 = 300;

/// Longest accepted HTTP timeout, in seconds.
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 300;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as TOML.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Path to the file that could not be parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more configuration values failed validation.
    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation failure with the offending field and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the field that failed validation.
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collector endpoint settings.
    pub collector: CollectorConfig,
    /// Device selection settings.
    pub device: DeviceConfig,
    /// Scan loop settings.
    pub scan: ScanConfig,
    /// Session establishment settings.
    pub session: SessionConfig,
    /// Supervisor settings.
    pub supervisor: SupervisorConfig,
}

/// Where readings are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Base URL of the collector, e.g. `http://localhost:8080`.
    pub url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Source tag stamped on every uploaded reading.
    pub source: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            timeout_secs: 10,
            source: "velolink-agent".to_string(),
        }
    }
}

impl CollectorConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.url.trim().is_empty() {
            errors.push(ValidationError {
                field: "collector.url".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        } else if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            errors.push(ValidationError {
                field: "collector.url".to_string(),
                message: format!("URL must start with http:// or https:// (got '{}')", self.url),
            });
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "collector.timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        } else if self.timeout_secs > MAX_HTTP_TIMEOUT_SECS {
            errors.push(ValidationError {
                field: "collector.timeout_secs".to_string(),
                message: format!(
                    "timeout must be at most {MAX_HTTP_TIMEOUT_SECS} seconds (got {})",
                    self.timeout_secs
                ),
            });
        }

        if self.source.trim().is_empty() {
            errors.push(ValidationError {
                field: "collector.source".to_string(),
                message: "source tag cannot be empty".to_string(),
            });
        }

        errors
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the pump options carrying the source tag.
    #[must_use]
    pub fn to_pump_options(&self) -> PumpOptions {
        PumpOptions::new().source(self.source.as_str())
    }
}

/// Which fitness machine to stream from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Optional case-insensitive substring the advertised name must contain.
    /// When unset, the first device advertising the FTMS service wins.
    pub name_contains: Option<String>,
}

impl DeviceConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(needle) = &self.name_contains
            && needle.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "device.name_contains".to_string(),
                message: "name filter cannot be blank (omit it to accept any device)".to_string(),
            });
        }

        errors
    }

    /// Builds the device filter for the scan loop.
    #[must_use]
    pub fn to_filter(&self) -> DeviceFilter {
        let mut filter = DeviceFilter::new();
        if let Some(needle) = &self.name_contains {
            filter = filter.name_contains(needle.as_str());
        }
        filter
    }
}

/// How the scan loop behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of scan attempts before giving up.
    pub attempts: u32,
    /// Length of each scan window in seconds.
    pub window_secs: u64,
    /// Pause between scan attempts in seconds.
    pub retry_delay_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            window_secs: 10,
            retry_delay_secs: 3,
        }
    }
}

impl ScanConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.attempts == 0 {
            errors.push(ValidationError {
                field: "scan.attempts".to_string(),
                message: "at least one scan attempt is required".to_string(),
            });
        }

        if self.window_secs < MIN_SCAN_WINDOW_SECS || self.window_secs > MAX_SCAN_WINDOW_SECS {
            errors.push(ValidationError {
                field: "scan.window_secs".to_string(),
                message: format!(
                    "scan window must be between {MIN_SCAN_WINDOW_SECS} and {MAX_SCAN_WINDOW_SECS} seconds (got {})",
                    self.window_secs
                ),
            });
        }

        errors
    }

    /// Builds the scan options for the locate stage.
    #[must_use]
    pub fn to_options(&self) -> ScanOptions {
        ScanOptions::new()
            .attempts(self.attempts)
            .window(Duration::from_secs(self.window_secs))
            .retry_delay(Duration::from_secs(self.retry_delay_secs))
    }
}

/// How sessions are established.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for the initial connection in seconds.
    pub connect_timeout_secs: u64,
    /// Number of subscription attempts before giving up.
    pub setup_attempts: u32,
    /// Pause between subscription attempts in seconds.
    pub setup_retry_delay_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            setup_attempts: 5,
            setup_retry_delay_secs: 3,
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.connect_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "session.connect_timeout_secs".to_string(),
                message: "connect timeout must be at least 1 second".to_string(),
            });
        }

        if self.setup_attempts == 0 {
            errors.push(ValidationError {
                field: "session.setup_attempts".to_string(),
                message: "at least one setup attempt is required".to_string(),
            });
        }

        errors
    }

    /// Builds the session options for the connect stage.
    #[must_use]
    pub fn to_options(&self) -> SessionOptions {
        SessionOptions::new()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .setup_attempts(self.setup_attempts)
            .setup_retry_delay(Duration::from_secs(self.setup_retry_delay_secs))
    }
}

/// How the supervisor waits for the collector at bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Number of collector probes before restarting the cycle.
    pub bootstrap_attempts: u32,
    /// Pause between collector probes in milliseconds.
    pub bootstrap_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bootstrap_attempts: 50,
            bootstrap_delay_ms: 200,
        }
    }
}

impl SupervisorConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bootstrap_attempts == 0 {
            errors.push(ValidationError {
                field: "supervisor.bootstrap_attempts".to_string(),
                message: "at least one bootstrap probe is required".to_string(),
            });
        }

        errors
    }

    /// Builds the supervisor options.
    #[must_use]
    pub fn to_options(&self) -> SupervisorOptions {
        SupervisorOptions::new()
            .bootstrap_attempts(self.bootstrap_attempts)
            .bootstrap_delay(Duration::from_millis(self.bootstrap_delay_ms))
    }
}

impl AgentConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads configuration from the default path, if the file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a TOML file and validates it.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, collecting every problem before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.collector.validate());
        errors.extend(self.device.validate());
        errors.extend(self.scan.validate());
        errors.extend(self.session.validate());
        errors.extend(self.supervisor.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Returns the default configuration file path.
///
/// Resolves to `<config dir>/velolink/agent.toml`, e.g.
/// `~/.config/velolink/agent.toml` on Linux.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("velolink")
        .join("agent.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.collector.url, "http://localhost:8080");
        assert_eq!(config.collector.source, "velolink-agent");
        assert_eq!(config.scan.attempts, 3);
        assert_eq!(config.session.setup_attempts, 5);
        assert_eq!(config.supervisor.bootstrap_attempts, 50);
        assert!(config.device.name_contains.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[collector]
url = "https://collector.local:9443"
timeout_secs = 30
source = "garage-trainer"

[device]
name_contains = "KICKR"

[scan]
attempts = 5
window_secs = 20
retry_delay_secs = 1

[session]
connect_timeout_secs = 15
setup_attempts = 3
setup_retry_delay_secs = 2

[supervisor]
bootstrap_attempts = 10
bootstrap_delay_ms = 500
"#
        )
        .unwrap();

        let config = AgentConfig::load_validated(file.path()).unwrap();
        assert_eq!(config.collector.url, "https://collector.local:9443");
        assert_eq!(config.collector.timeout_secs, 30);
        assert_eq!(config.collector.source, "garage-trainer");
        assert_eq!(config.device.name_contains.as_deref(), Some("KICKR"));
        assert_eq!(config.scan.attempts, 5);
        assert_eq!(config.scan.window_secs, 20);
        assert_eq!(config.session.connect_timeout_secs, 15);
        assert_eq!(config.supervisor.bootstrap_delay_ms, 500);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[collector]
url = "http://10.0.0.5:8080"
"#
        )
        .unwrap();

        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.collector.url, "http://10.0.0.5:8080");
        assert_eq!(config.collector.timeout_secs, 10);
        assert_eq!(config.scan.attempts, 3);
        assert_eq!(config.session.connect_timeout_secs, 10);
    }

    #[test]
    fn test_empty_config_is_default() {
        let file = NamedTempFile::new().unwrap();
        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.collector.url, AgentConfig::default().collector.url);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not [valid toml").unwrap();

        let result = AgentConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = AgentConfig::load("/nonexistent/velolink/agent.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_roundtrip() {
        let mut config = AgentConfig::default();
        config.collector.url = "http://collector:8080".to_string();
        config.device.name_contains = Some("Bike".to_string());

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: AgentConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.collector.url, config.collector.url);
        assert_eq!(parsed.device.name_contains, config.device.name_contains);
        assert_eq!(parsed.scan.attempts, config.scan.attempts);
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let mut config = AgentConfig::default();
        config.collector.url = "  ".to_string();

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "collector.url"));
    }

    #[test]
    fn test_validate_rejects_bad_scheme() {
        let mut config = AgentConfig::default();
        config.collector.url = "collector.local:8080".to_string();

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.message.contains("http://")));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = AgentConfig::default();
        config.scan.attempts = 0;
        config.session.setup_attempts = 0;
        config.supervisor.bootstrap_attempts = 0;

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "scan.attempts"));
        assert!(errors.iter().any(|e| e.field == "session.setup_attempts"));
        assert!(
            errors
                .iter()
                .any(|e| e.field == "supervisor.bootstrap_attempts")
        );
    }

    #[test]
    fn test_validate_rejects_blank_name_filter() {
        let mut config = AgentConfig::default();
        config.device.name_contains = Some("   ".to_string());

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation failure");
        };
        assert!(errors.iter().any(|e| e.field == "device.name_contains"));
    }

    #[test]
    fn test_validate_rejects_oversized_window() {
        let mut config = AgentConfig::default();
        config.scan.window_secs = MAX_SCAN_WINDOW_SECS + 1;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_error_display() {
        let error = ValidationError {
            field: "collector.url".to_string(),
            message: "URL cannot be empty".to_string(),
        };
        assert_eq!(error.to_string(), "collector.url: URL cannot be empty");
    }

    #[test]
    fn test_validation_errors_listed_in_message() {
        let mut config = AgentConfig::default();
        config.collector.url = String::new();
        config.collector.source = String::new();

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("collector.url"));
        assert!(message.contains("collector.source"));
    }

    #[test]
    fn test_default_config_path_location() {
        let path = default_config_path();
        assert!(path.ends_with("velolink/agent.toml"));
    }

    #[test]
    fn test_scan_options_conversion() {
        let config = ScanConfig {
            attempts: 7,
            window_secs: 4,
            retry_delay_secs: 2,
        };

        let options = config.to_options();
        assert_eq!(options.attempts, 7);
        assert_eq!(options.window, Duration::from_secs(4));
        assert_eq!(options.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_session_options_conversion() {
        let config = SessionConfig {
            connect_timeout_secs: 20,
            setup_attempts: 2,
            setup_retry_delay_secs: 1,
        };

        let options = config.to_options();
        assert_eq!(options.connect_timeout, Duration::from_secs(20));
        assert_eq!(options.setup_attempts, 2);
    }

    #[test]
    fn test_supervisor_options_conversion() {
        let config = SupervisorConfig {
            bootstrap_attempts: 8,
            bootstrap_delay_ms: 100,
        };

        let options = config.to_options();
        assert_eq!(options.bootstrap_attempts, 8);
        assert_eq!(options.bootstrap_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_device_filter_conversion() {
        let config = DeviceConfig {
            name_contains: Some("KICKR".to_string()),
        };

        let filter = config.to_filter();
        assert!(filter.matches(
            &[velolink_core::uuid::FITNESS_MACHINE_SERVICE],
            Some("KICKR CORE 1234"),
        ));
        assert!(!filter.matches(
            &[velolink_core::uuid::FITNESS_MACHINE_SERVICE],
            Some("Treadmill"),
        ));
    }

    #[test]
    fn test_pump_options_carry_source() {
        let config = CollectorConfig {
            source: "basement".to_string(),
            ..CollectorConfig::default()
        };

        let options = config.to_pump_options();
        assert_eq!(options.source, "basement");
    }
}
