//! Resource readers.
//!
//! A [`ResourceReader`] produces one [`Sample`] on demand. Variants:
//!
//! - [`ProcReader`]: Linux `/proc` pseudo-files plus `statvfs`
//! - [`DarwinReader`]: macOS command-line utilities (`top`, `vm_stat`, `df`)
//! - [`UniversalReader`]: `sysinfo`, available everywhere
//!
//! [`select`] picks a variant from a [`Platform`] and a [`ReaderMode`].
//!
//! # Failure policy
//!
//! `initialize` fails only when a required facility is entirely absent.
//! Inside `sample`, a failed OS query degrades that sub-metric to `(0, 0)`
//! instead of failing the whole sample.

pub mod darwin;
pub mod proc;
pub mod selector;
pub mod universal;
pub mod volume;

pub use darwin::DarwinReader;
pub use proc::ProcReader;
pub use selector::{select, Platform};
pub use universal::UniversalReader;

use crate::error::ReaderError;
use crate::sample::Sample;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trait for resource readers.
///
/// Readers are owned by the poll loop and called from one task at a time,
/// so they take `&mut self` and only need to be `Send`.
///
/// # Example
///
/// ```rust,ignore
/// use trueno_pulse::reader::ResourceReader;
/// use trueno_pulse::{ReaderError, Sample, Usage};
///
/// struct FixedReader;
///
/// #[async_trait::async_trait]
/// impl ResourceReader for FixedReader {
///     fn id(&self) -> &'static str {
///         "fixed"
///     }
///
///     async fn initialize(&mut self) -> Result<(), ReaderError> {
///         Ok(())
///     }
///
///     async fn sample(&mut self) -> Result<Sample, ReaderError> {
///         Ok(Sample::now(12.0, Usage::new(512, 1024), Usage::UNKNOWN))
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceReader: Send {
    /// Returns the unique identifier for this reader.
    ///
    /// This is used for log attribution and error messages.
    fn id(&self) -> &'static str;

    /// Checks platform prerequisites and establishes any baselines.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Init`] if a required facility is unavailable.
    async fn initialize(&mut self) -> Result<(), ReaderError>;

    /// Takes one sample.
    ///
    /// Delta-based readers return 0% CPU on the first call after
    /// `initialize` and never sleep to synthesize a delta.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Collection`] on a transient failure that
    /// affects the whole sample.
    async fn sample(&mut self) -> Result<Sample, ReaderError>;

    /// Returns a human-readable name for this reader.
    fn display_name(&self) -> &'static str {
        self.id()
    }
}

/// A boxed reader for dynamic dispatch.
pub type BoxedReader = Box<dyn ResourceReader>;

/// Which reader variant to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderMode {
    /// Always use the universal reader.
    #[default]
    Universal,
    /// Use the platform's native reader.
    Native,
    /// Native reader where one exists, universal otherwise.
    Auto,
}

impl FromStr for ReaderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "universal" | "fallback" => Ok(Self::Universal),
            "native" => Ok(Self::Native),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown reader mode '{other}' (expected universal, native or auto)")),
        }
    }
}

impl fmt::Display for ReaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Universal => "universal",
            Self::Native => "native",
            Self::Auto => "auto",
        })
    }
}

/// CPU utilization from two cumulative busy/total counter readings.
///
/// Returns 0 when there is no elapsed time; the result is clamped to `[0, 100]`.
#[must_use]
pub fn cpu_delta_percent(prev_busy: u64, prev_total: u64, busy: u64, total: u64) -> f64 {
    let total_delta = total.saturating_sub(prev_total);
    if total_delta == 0 {
        return 0.0;
    }
    let busy_delta = busy.saturating_sub(prev_busy);
    ((busy_delta as f64 / total_delta as f64) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Usage;
    use proptest::prelude::*;

    struct TestReader {
        calls: u32,
    }

    #[async_trait]
    impl ResourceReader for TestReader {
        fn id(&self) -> &'static str {
            "test"
        }

        async fn initialize(&mut self) -> Result<(), ReaderError> {
            Ok(())
        }

        async fn sample(&mut self) -> Result<Sample, ReaderError> {
            self.calls += 1;
            Ok(Sample::now(f64::from(self.calls), Usage::new(1, 2), Usage::UNKNOWN))
        }
    }

    #[tokio::test]
    async fn test_boxed_reader_dispatch() {
        let mut reader: BoxedReader = Box::new(TestReader { calls: 0 });

        reader.initialize().await.expect("init should succeed");
        let first = reader.sample().await.expect("sample should succeed");
        let second = reader.sample().await.expect("sample should succeed");

        assert_eq!(reader.id(), "test");
        assert_eq!(reader.display_name(), "test");
        assert_eq!(first.cpu_percent(), 1.0);
        assert_eq!(second.cpu_percent(), 2.0);
    }

    #[test]
    fn test_reader_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<BoxedReader>();
    }

    #[test]
    fn test_reader_mode_parse() {
        assert_eq!("universal".parse::<ReaderMode>(), Ok(ReaderMode::Universal));
        assert_eq!("Native".parse::<ReaderMode>(), Ok(ReaderMode::Native));
        assert_eq!(" auto ".parse::<ReaderMode>(), Ok(ReaderMode::Auto));
        assert!("wmi".parse::<ReaderMode>().is_err());
    }

    #[test]
    fn test_reader_mode_serde() {
        let mode: ReaderMode = serde_json::from_str("\"auto\"").expect("valid mode");
        assert_eq!(mode, ReaderMode::Auto);
        assert_eq!(serde_json::to_string(&ReaderMode::Native).expect("serializable"), "\"native\"");
    }

    #[test]
    fn test_cpu_delta_no_elapsed_time() {
        assert_eq!(cpu_delta_percent(10, 100, 10, 100), 0.0);
    }

    #[test]
    fn test_cpu_delta_half_busy() {
        assert!((cpu_delta_percent(0, 0, 50, 100) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cpu_delta_counter_reset() {
        assert_eq!(cpu_delta_percent(500, 1000, 10, 20), 0.0);
    }

    proptest! {
        #[test]
        fn prop_cpu_delta_clamped(a in any::<u64>(), b in any::<u64>(), c in any::<u64>(), d in any::<u64>()) {
            let pct = cpu_delta_percent(a, b, c, d);
            prop_assert!((0.0..=100.0).contains(&pct));
        }

        #[test]
        fn prop_cpu_delta_monotonic_in_busy(total in 1u64..1_000_000, busy_lo in 0u64..1_000_000, extra in 0u64..1_000_000) {
            let busy_lo = busy_lo.min(total);
            let busy_hi = (busy_lo + extra).min(total);
            prop_assert!(cpu_delta_percent(0, 0, busy_lo, total) <= cpu_delta_percent(0, 0, busy_hi, total));
        }
    }
}
