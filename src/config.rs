//! Configuration for the sampler.
//!
//! Loaded once at startup from JSON and shared read-only afterwards:
//!
//! ```json
//! {
//!   "interval_seconds": 5,
//!   "enable_console_output": true,
//!   "sinks": {
//!     "csv_log": { "enabled": true, "parameters": { "path": "usage.csv" } }
//!   }
//! }
//! ```

use crate::error::{PulseError, Result};
use crate::reader::ReaderMode;
use crate::sample::Zone;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Per-sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Whether the sink takes part in dispatch.
    #[serde(default)]
    pub enabled: bool,

    /// Whether a failure to initialize this sink aborts startup.
    #[serde(default)]
    pub required: bool,

    /// Sink-specific parameters, opaque to the core.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl SinkConfig {
    /// Creates an enabled sink configuration with the given parameters.
    #[must_use]
    pub fn enabled(parameters: Map<String, Value>) -> Self {
        Self { enabled: true, required: false, parameters }
    }

    /// Marks this sink as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between two polls.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Print one line per tick to stdout.
    #[serde(default = "default_console")]
    pub enable_console_output: bool,

    /// Seconds to back off after a failed sample before retrying.
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// Zone samples are stamped in.
    #[serde(default)]
    pub timezone: Zone,

    /// Which reader variant to use.
    #[serde(default)]
    pub reader: ReaderMode,

    /// Sink configurations keyed by sink name.
    #[serde(default)]
    pub sinks: BTreeMap<String, SinkConfig>,
}

fn default_interval_seconds() -> u64 {
    5
}
fn default_console() -> bool {
    true
}
fn default_retry_delay_seconds() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            enable_console_output: default_console(),
            retry_delay_seconds: default_retry_delay_seconds(),
            timezone: Zone::default(),
            reader: ReaderMode::default(),
            sinks: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and validates configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PulseError::ConfigNotFound(path.display().to_string()));
            }
            Err(e) => return Err(PulseError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parses and validates configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error with line number if parsing fails.
    pub fn parse(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PulseError::ConfigParse { line: e.line(), message: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::ConfigInvalid`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.interval_seconds == 0 {
            return Err(PulseError::ConfigInvalid {
                key: "interval_seconds".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }
        if self.retry_delay_seconds == 0 {
            return Err(PulseError::ConfigInvalid {
                key: "retry_delay_seconds".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }
        if let Some(name) = self.sinks.keys().find(|name| name.trim().is_empty()) {
            return Err(PulseError::ConfigInvalid {
                key: format!("sinks.{name:?}"),
                message: "sink name must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the poll interval as a Duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Returns the reader backoff as a Duration.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_default() {
        let config = Config::new();

        assert_eq!(config.interval_seconds, 5);
        assert!(config.enable_console_output);
        assert_eq!(config.retry_delay_seconds, 5);
        assert_eq!(config.timezone, Zone::Local);
        assert_eq!(config.reader, ReaderMode::Universal);
        assert!(config.sinks.is_empty());
    }

    #[test]
    fn test_config_parse_minimal() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_parse_full() {
        let json = r#"
{
  "interval_seconds": 2,
  "enable_console_output": false,
  "retry_delay_seconds": 7,
  "timezone": "+08:00",
  "reader": "native",
  "sinks": {
    "csv_log": { "enabled": true, "parameters": { "path": "/tmp/usage.csv" } },
    "http_post": { "enabled": false, "required": true, "parameters": { "url": "http://localhost" } }
  }
}
"#;

        let config = Config::parse(json).unwrap();

        assert_eq!(config.interval(), Duration::from_secs(2));
        assert_eq!(config.retry_delay(), Duration::from_secs(7));
        assert!(!config.enable_console_output);
        assert_eq!(config.timezone.to_string(), "+08:00");
        assert_eq!(config.reader, ReaderMode::Native);

        let csv = &config.sinks["csv_log"];
        assert!(csv.enabled);
        assert!(!csv.required);
        assert_eq!(csv.parameters["path"], json!("/tmp/usage.csv"));

        let http = &config.sinks["http_post"];
        assert!(!http.enabled);
        assert!(http.required);
    }

    #[test]
    fn test_config_sink_defaults_to_disabled() {
        let config = Config::parse(r#"{ "sinks": { "csv_log": {} } }"#).unwrap();
        let sink = &config.sinks["csv_log"];

        assert!(!sink.enabled);
        assert!(sink.parameters.is_empty());
    }

    #[test]
    fn test_config_parse_error_includes_line() {
        let json = "{\n  \"interval_seconds\": 5,\n  \"enable_console_output\": maybe\n}";

        let err = Config::parse(json).unwrap_err();
        assert!(matches!(err, PulseError::ConfigParse { line: 3, .. }), "got {err:?}");
        assert!(err.to_string().contains('3'), "Error should include line number");
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let err = Config::parse(r#"{ "interval_seconds": 0 }"#).unwrap_err();
        assert!(
            matches!(&err, PulseError::ConfigInvalid { key, .. } if key == "interval_seconds"),
            "got {err:?}"
        );
    }

    #[test]
    fn test_config_rejects_negative_interval() {
        assert!(matches!(
            Config::parse(r#"{ "interval_seconds": -1 }"#),
            Err(PulseError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_config_rejects_bad_timezone() {
        assert!(Config::parse(r#"{ "timezone": "Mars/Olympus" }"#).is_err());
    }

    #[test]
    fn test_config_load_missing_file() {
        let err = Config::load("/nonexistent/trueno-pulse.json").unwrap_err();
        assert!(matches!(err, PulseError::ConfigNotFound(_)));
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "interval_seconds": 9 }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.interval_seconds, 9);
    }

    #[test]
    fn test_config_load_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, PulseError::Io(_)), "got {err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn test_config_load_invalid_utf8_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, [0xff, 0xfe, b'{', b'}']).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, PulseError::Io(_)), "got {err:?}");
    }

    #[test]
    fn test_sink_config_builders() {
        let sink = SinkConfig::enabled(Map::new()).required();
        assert!(sink.enabled);
        assert!(sink.required);
    }
}
