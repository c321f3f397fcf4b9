//! # Trueno-Pulse
//!
//! Host resource sampler: polls CPU, memory and disk utilization on a fixed
//! interval and fans every sample out to pluggable sinks.
//!
//! ## Features
//!
//! - **Platform readers**: Linux `/proc`, macOS command-line utilities, and a
//!   universal `sysinfo` reader that works everywhere
//! - **Sinks**: CSV log and HTTP POST built in; custom sinks register by name
//! - **Fault isolation**: a failing sink never stops the loop or its siblings
//! - **Graceful lifecycle**: cooperative cancellation, ordered sink shutdown
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trueno_pulse::prelude::*;
//!
//! let config = Config::load("trueno-pulse.json")?;
//! let scheduler = Scheduler::new(config, SinkRegistry::with_builtin());
//!
//! scheduler.start().await?;
//! tokio::signal::ctrl_c().await?;
//! scheduler.stop().await;
//! ```

#![warn(missing_docs)]
// Allow unwrap() in tests only - banned in production code (Cloudflare incident 2025-11-18)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Core Modules
// ============================================================================

/// Runtime configuration.
pub mod config;

/// Point-in-time utilization readings.
pub mod sample;

/// Console line format.
pub mod console;

/// Failure streak tracking for log suppression.
pub mod streak;

/// Subprocess execution with timeout.
pub mod subprocess;

// ============================================================================
// Pipeline Modules
// ============================================================================

/// Platform resource readers.
pub mod reader;

/// Sample sinks and their registry.
pub mod sink;

/// Poll loop and dispatch.
pub mod scheduler;

// ============================================================================
// Error Types
// ============================================================================

/// Error types for trueno-pulse operations.
pub mod error;

pub use error::{PulseError, ReaderError, Result, SinkError};

// ============================================================================
// Prelude
// ============================================================================

/// Commonly used types and traits for convenient imports.
///
/// ```rust,ignore
/// use trueno_pulse::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, SinkConfig};
    pub use crate::error::{PulseError, ReaderError, SinkError};
    pub use crate::reader::{select, BoxedReader, Platform, ReaderMode, ResourceReader};
    pub use crate::sample::{Sample, Usage, Zone};
    pub use crate::scheduler::{Scheduler, SchedulerState};
    pub use crate::sink::{SharedSink, Sink, SinkParams, SinkRegistry};
}
