//! Sample sinks.
//!
//! A [`Sink`] consumes samples and performs one external side effect per
//! sample. Built-in sinks:
//!
//! - [`CsvLogSink`] (`csv_log`): appends rows to a CSV file
//! - [`HttpPostSink`] (`http_post`): posts a JSON body to a URL
//!
//! Sinks are looked up by name through a [`SinkRegistry`].
//!
//! # Concurrency
//!
//! Sinks are shared as `Arc<dyn Sink>` and take `&self`; each sink serializes
//! access to its own resource internally. The scheduler never overlaps two
//! `on_sample` calls to the same sink, but different sinks run concurrently.

pub mod csv_log;
pub mod http_post;
pub mod registry;

pub use csv_log::CsvLogSink;
pub use http_post::HttpPostSink;
pub use registry::{ResolvedSink, SinkFactory, SinkRegistry};

use crate::error::SinkError;
use crate::sample::Sample;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Trait for sample sinks.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable name used for configuration lookup and log attribution.
    fn name(&self) -> &str;

    /// Validates parameters and acquires resources.
    ///
    /// A second call before `shutdown` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if a required parameter is missing or
    /// malformed, [`SinkError::Init`] if resources cannot be acquired.
    async fn initialize(&self, params: &SinkParams) -> Result<(), SinkError>;

    /// Consumes one sample.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if the sample could not be persisted or
    /// transmitted. The scheduler logs it and carries on.
    async fn on_sample(&self, sample: &Sample) -> Result<(), SinkError>;

    /// Releases resources and returns a human-readable summary.
    ///
    /// Returns `Ok(None)` if the sink was never initialized.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Shutdown`] if resources could not be released cleanly.
    async fn shutdown(&self) -> Result<Option<String>, SinkError>;
}

/// A shared sink for dynamic dispatch.
pub type SharedSink = Arc<dyn Sink>;

/// Typed access to a sink's opaque parameter map.
///
/// Every accessor reports failures as [`SinkError::Config`] naming the sink
/// and the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkParams {
    sink: String,
    values: Map<String, Value>,
}

impl SinkParams {
    /// Wraps the parameters configured for `sink`.
    pub fn new(sink: impl Into<String>, values: Map<String, Value>) -> Self {
        Self { sink: sink.into(), values }
    }

    /// Name of the sink these parameters belong to.
    #[must_use]
    pub fn sink(&self) -> &str {
        &self.sink
    }

    /// Raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Non-empty string parameter that must be present.
    ///
    /// # Errors
    ///
    /// Returns a config error if the key is missing, not a string, or blank.
    pub fn required_str(&self, key: &str) -> Result<&str, SinkError> {
        match self.optional_str(key)? {
            Some(value) => Ok(value),
            None => Err(self.invalid(key, "is required")),
        }
    }

    /// Non-empty string parameter that may be absent.
    ///
    /// # Errors
    ///
    /// Returns a config error if the key is present but not a string.
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, SinkError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(key, "must be a string")),
        }
    }

    /// Unsigned integer parameter with a default.
    ///
    /// # Errors
    ///
    /// Returns a config error if the key is present but not a non-negative integer.
    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, SinkError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => {
                value.as_u64().ok_or_else(|| self.invalid(key, "must be a non-negative integer"))
            }
        }
    }

    /// Numeric parameter with a default.
    ///
    /// # Errors
    ///
    /// Returns a config error if the key is present but not a number.
    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, SinkError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| self.invalid(key, "must be a number")),
        }
    }

    /// Boolean parameter with a default.
    ///
    /// # Errors
    ///
    /// Returns a config error if the key is present but not a boolean.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, SinkError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| self.invalid(key, "must be a boolean")),
        }
    }

    fn invalid(&self, key: &str, problem: &str) -> SinkError {
        SinkError::config(&self.sink, format!("parameter '{key}' {problem}"))
    }
}
