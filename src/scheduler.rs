//! Poll loop and sink dispatch.
//!
//! The [`Scheduler`] owns one reader and the set of active sinks. It moves
//! through `Stopped → Starting → Running → Stopping → Stopped`:
//!
//! - `start` initializes a fresh reader and every enabled sink, then spawns
//!   the poll loop as a background task
//! - each tick takes one sample and fans it out to all sinks concurrently,
//!   waiting for every sink before the next tick
//! - `stop` cancels the loop, waits for it to exit, then shuts sinks down in
//!   registration order
//!
//! Cancellation is observed during the inter-tick sleep. An in-flight sample
//! or sink call is never interrupted; readers and sinks bound their own I/O.

use crate::config::Config;
use crate::console;
use crate::error::{PulseError, Result};
use crate::reader::{select, BoxedReader, Platform};
use crate::sample::{Sample, Zone};
use crate::sink::{SharedSink, SinkRegistry};
use crate::streak::FailureStreak;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Constructor for a fresh, uninitialized reader.
pub type ReaderFactory = Arc<dyn Fn() -> BoxedReader + Send + Sync>;

/// Lifecycle state of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Not running; `start` is allowed.
    Stopped,
    /// Reader and sinks are being initialized.
    Starting,
    /// The poll loop is active.
    Running,
    /// The poll loop is winding down and sinks are being shut down.
    Stopping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        })
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// A sink that initialized successfully for the current run.
#[derive(Clone)]
struct ActiveSink {
    name: String,
    sink: SharedSink,
}

/// Everything owned by one `start`/`stop` cycle.
struct Run {
    cancel: CancellationToken,
    task: JoinHandle<BoxedReader>,
    sinks: Vec<ActiveSink>,
}

/// Drives a reader on a fixed interval and dispatches samples to sinks.
pub struct Scheduler {
    config: Arc<Config>,
    registry: SinkRegistry,
    reader_factory: ReaderFactory,
    state: Mutex<SchedulerState>,
    run: tokio::sync::Mutex<Option<Run>>,
}

impl Scheduler {
    /// Creates a scheduler whose reader is chosen for the running platform
    /// and the configured reader mode.
    pub fn new(config: impl Into<Arc<Config>>, registry: SinkRegistry) -> Self {
        let config = config.into();
        let (platform, mode) = (Platform::detect(), config.reader);
        Self::with_reader_factory(config, registry, move || select(platform, mode))
    }

    /// Creates a scheduler with a custom reader constructor.
    ///
    /// The factory is called on every `start`, so each run gets a fresh reader.
    pub fn with_reader_factory<F>(config: impl Into<Arc<Config>>, registry: SinkRegistry, factory: F) -> Self
    where
        F: Fn() -> BoxedReader + Send + Sync + 'static,
    {
        Self {
            config: config.into(),
            registry,
            reader_factory: Arc::new(factory),
            state: Mutex::new(SchedulerState::Stopped),
            run: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while the poll loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Configuration this scheduler runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        debug!(%state, "scheduler state changed");
    }

    /// Initializes the reader and sinks and spawns the poll loop.
    ///
    /// Does nothing (with a warning) if already running. A sink that fails
    /// to initialize is left out of the run unless it is marked required.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the scheduler stopped, if the reader cannot
    /// initialize or a required sink is unknown or fails to initialize.
    pub async fn start(&self) -> Result<()> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            warn!("scheduler is already running; start ignored");
            return Ok(());
        }

        self.set_state(SchedulerState::Starting);
        match self.launch().await {
            Ok(launched) => {
                *run = Some(launched);
                self.set_state(SchedulerState::Running);
                Ok(())
            }
            Err(e) => {
                self.set_state(SchedulerState::Stopped);
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<Run> {
        let mut reader = (self.reader_factory)();
        reader.initialize().await?;
        info!(reader = reader.id(), source = reader.display_name(), "reader initialized");

        let mut sinks: Vec<ActiveSink> = Vec::new();
        for resolved in self.registry.resolve(&self.config.sinks)? {
            match resolved.sink.initialize(&resolved.params()).await {
                Ok(()) => {
                    debug!(sink = %resolved.name, "sink initialized");
                    sinks.push(ActiveSink { name: resolved.name, sink: resolved.sink });
                }
                Err(e) if resolved.config.required => {
                    shutdown_sinks(&sinks).await;
                    return Err(PulseError::RequiredSink { sink: resolved.name, source: e });
                }
                Err(e) => warn!(sink = %resolved.name, "sink left out of this run: {e}"),
            }
        }

        let cancel = CancellationToken::new();
        let poll = PollLoop {
            interval: self.config.interval(),
            retry_delay: self.config.retry_delay(),
            zone: self.config.timezone,
            console: self.config.enable_console_output,
            sinks: sinks.clone(),
        };

        info!(
            reader = reader.id(),
            sinks = sinks.len(),
            interval_secs = self.config.interval_seconds,
            "scheduler running"
        );
        let task = tokio::spawn(poll.run(reader, cancel.clone()));

        Ok(Run { cancel, task, sinks })
    }

    /// Stops the poll loop and shuts every active sink down.
    ///
    /// Does nothing if not running. Returns once the loop has exited and all
    /// sinks have been shut down, in registration order.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(active) = run.take() else {
            debug!("scheduler is not running; stop ignored");
            return;
        };

        self.set_state(SchedulerState::Stopping);
        active.cancel.cancel();

        let reader = match active.task.await {
            Ok(reader) => Some(reader),
            Err(e) => {
                error!("poll loop terminated abnormally: {e}");
                None
            }
        };

        shutdown_sinks(&active.sinks).await;
        drop(reader);

        self.set_state(SchedulerState::Stopped);
        info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.cancel.cancel();
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Shuts sinks down one at a time, isolating each failure.
async fn shutdown_sinks(sinks: &[ActiveSink]) {
    for active in sinks {
        let sink = Arc::clone(&active.sink);
        match tokio::spawn(async move { sink.shutdown().await }).await {
            Ok(Ok(Some(summary))) => info!(sink = %active.name, "{summary}"),
            Ok(Ok(None)) => debug!(sink = %active.name, "sink shut down"),
            Ok(Err(e)) => warn!(sink = %active.name, "{e}"),
            Err(e) => error!(sink = %active.name, "sink shutdown panicked: {e}"),
        }
    }
}

// ============================================================================
// Poll loop
// ============================================================================

struct PollLoop {
    interval: Duration,
    retry_delay: Duration,
    zone: Zone,
    console: bool,
    sinks: Vec<ActiveSink>,
}

impl PollLoop {
    /// Runs until cancelled and hands the reader back.
    async fn run(self, mut reader: BoxedReader, cancel: CancellationToken) -> BoxedReader {
        let mut reader_failures = FailureStreak::new();
        let mut sink_failures = vec![FailureStreak::new(); self.sinks.len()];
        let mut wait = self.interval;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }

            let sample = match reader.sample().await {
                Ok(sample) => {
                    if let Some(failed) = reader_failures.record_success() {
                        info!(reader = reader.id(), failed, "sampling recovered");
                    }
                    sample.in_zone(self.zone)
                }
                Err(e) => {
                    if reader_failures.record_failure() {
                        warn!(reader = reader.id(), retry_secs = self.retry_delay.as_secs(), "{e}");
                    } else {
                        debug!(reader = reader.id(), consecutive = reader_failures.consecutive(), "{e}");
                    }
                    wait = self.retry_delay;
                    continue;
                }
            };

            if self.console {
                println!("{}", console::format_line(&sample));
            }

            self.dispatch(sample, &mut sink_failures).await;
            wait = self.interval;
        }

        debug!(reader = reader.id(), reader_failures = reader_failures.total(), "poll loop exited");
        reader
    }

    /// Sends `sample` to every sink concurrently and waits for all of them.
    async fn dispatch(&self, sample: Sample, failures: &mut [FailureStreak]) {
        let handles: Vec<_> = self
            .sinks
            .iter()
            .map(|active| {
                let sink = Arc::clone(&active.sink);
                tokio::spawn(async move { sink.on_sample(&sample).await })
            })
            .collect();

        for ((active, handle), streak) in self.sinks.iter().zip(handles).zip(failures.iter_mut()) {
            let failure = match handle.await {
                Ok(Ok(())) => {
                    if let Some(failed) = streak.record_success() {
                        info!(sink = %active.name, failed, "sink recovered");
                    }
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("sink panicked: {e}"),
            };

            if streak.record_failure() {
                warn!(sink = %active.name, "{failure}");
            } else {
                debug!(sink = %active.name, consecutive = streak.consecutive(), "{failure}");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
