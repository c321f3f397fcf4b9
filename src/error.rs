//! Error types for the sampling and dispatch pipeline.
//!
//! The taxonomy mirrors how failures are handled at runtime:
//!
//! - [`ReaderError::Init`] is fatal and aborts `Scheduler::start`.
//! - [`ReaderError::Collection`] is transient; the poll loop backs off and retries.
//! - [`SinkError`] is isolated to the failing sink and phase.
//! - [`PulseError`] is what callers of the crate see.

use std::io;
use thiserror::Error;

/// Error raised by a resource reader.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// A platform prerequisite (pseudo-file, command, counter) is missing.
    #[error("reader '{reader}' cannot initialize: {message}")]
    Init {
        /// The reader that failed.
        reader: &'static str,
        /// Error message describing the missing facility.
        message: String,
    },

    /// A transient OS query failure while taking a sample.
    #[error("reader '{reader}' failed to collect a sample: {message}")]
    Collection {
        /// The reader that failed.
        reader: &'static str,
        /// Error message describing the failure.
        message: String,
    },
}

impl ReaderError {
    /// Returns true if this error must abort startup.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Init { .. })
    }
}

/// Error raised by a sink during one phase of its lifecycle.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A required parameter is missing or has the wrong shape.
    #[error("sink '{sink}' is misconfigured: {message}")]
    Config {
        /// The sink name.
        sink: String,
        /// What is wrong with the parameters.
        message: String,
    },

    /// Setting up the sink's resources failed.
    #[error("sink '{sink}' failed to initialize: {message}")]
    Init {
        /// The sink name.
        sink: String,
        /// Error message describing the failure.
        message: String,
    },

    /// Writing or transmitting a sample failed.
    #[error("sink '{sink}' failed to write sample: {message}")]
    Write {
        /// The sink name.
        sink: String,
        /// Error message describing the failure.
        message: String,
    },

    /// Releasing the sink's resources failed.
    #[error("sink '{sink}' failed to shut down: {message}")]
    Shutdown {
        /// The sink name.
        sink: String,
        /// Error message describing the failure.
        message: String,
    },
}

impl SinkError {
    /// Creates a configuration error.
    pub fn config(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { sink: sink.into(), message: message.into() }
    }

    /// Creates an initialization error.
    pub fn init(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Init { sink: sink.into(), message: message.into() }
    }

    /// Creates a write error.
    pub fn write(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write { sink: sink.into(), message: message.into() }
    }

    /// Creates a shutdown error.
    pub fn shutdown(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shutdown { sink: sink.into(), message: message.into() }
    }

    /// Returns the name of the sink that raised this error.
    #[must_use]
    pub fn sink(&self) -> &str {
        match self {
            Self::Config { sink, .. }
            | Self::Init { sink, .. }
            | Self::Write { sink, .. }
            | Self::Shutdown { sink, .. } => sink,
        }
    }
}

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    ConfigNotFound(String),

    /// Configuration parsing error with line number.
    #[error("configuration error at line {line}: {message}")]
    ConfigParse {
        /// Line number where the error occurred (1-indexed).
        line: usize,
        /// Error message describing the issue.
        message: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    ConfigInvalid {
        /// The configuration key with invalid value.
        key: String,
        /// Error message describing why the value is invalid.
        message: String,
    },

    /// The resource reader could not start.
    #[error(transparent)]
    Reader(#[from] ReaderError),

    /// A sink marked `required` failed to initialize.
    #[error("required sink '{sink}' failed: {source}")]
    RequiredSink {
        /// The sink name.
        sink: String,
        /// The underlying sink failure.
        #[source]
        source: SinkError,
    },

    /// A sink marked `required` has no registered implementation.
    #[error("required sink '{0}' is not registered")]
    UnknownRequiredSink(String),

    /// I/O failure outside of any sink or reader.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, PulseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_init_is_fatal() {
        let err = ReaderError::Init { reader: "proc", message: "/proc/stat missing".to_string() };
        assert!(err.is_fatal());

        let err = ReaderError::Collection { reader: "proc", message: "EINTR".to_string() };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_reader_error_includes_reader_and_message() {
        let err = ReaderError::Collection {
            reader: "darwin",
            message: "vm_stat timed out".to_string(),
        };
        let display = err.to_string();

        assert!(display.contains("darwin"), "Error should include reader: {}", display);
        assert!(display.contains("vm_stat"), "Error should include message: {}", display);
    }

    #[test]
    fn test_sink_error_reports_sink_name() {
        let errors = [
            SinkError::config("csv_log", "missing 'path'"),
            SinkError::init("csv_log", "permission denied"),
            SinkError::write("http_post", "timeout"),
            SinkError::shutdown("http_post", "flush failed"),
        ];

        assert_eq!(errors[0].sink(), "csv_log");
        assert_eq!(errors[3].sink(), "http_post");
        for err in &errors {
            assert!(err.to_string().contains(err.sink()));
        }
    }

    #[test]
    fn test_required_sink_keeps_source() {
        use std::error::Error as _;

        let err = PulseError::RequiredSink {
            sink: "csv_log".to_string(),
            source: SinkError::config("csv_log", "missing 'path'"),
        };

        assert!(err.to_string().contains("csv_log"));
        assert!(err.source().is_some(), "source chain should be preserved");
    }

    #[test]
    fn test_config_parse_error_includes_line_number() {
        let err = PulseError::ConfigParse { line: 42, message: "expected value".to_string() };
        let display = err.to_string();

        assert!(display.contains("42"), "Error should include line number: {}", display);
    }

    #[test]
    fn test_reader_error_converts_transparently() {
        let err: PulseError =
            ReaderError::Init { reader: "universal", message: "no clock".to_string() }.into();

        assert!(matches!(err, PulseError::Reader(_)));
        assert!(err.to_string().contains("universal"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PulseError>();
        assert_send_sync::<SinkError>();
        assert_send_sync::<ReaderError>();
    }
}
