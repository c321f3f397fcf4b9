//! Name-to-factory mapping for sinks.
//!
//! Sinks are registered explicitly at startup; there is no runtime discovery.
//! Registration order is the order sinks are initialized, dispatched and shut
//! down.

use super::{CsvLogSink, HttpPostSink, SharedSink, SinkParams};
use crate::config::SinkConfig;
use crate::error::{PulseError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Constructor for a fresh, uninitialized sink.
pub type SinkFactory = Arc<dyn Fn() -> SharedSink + Send + Sync>;

/// A sink selected for a run, with the configuration it was enabled by.
pub struct ResolvedSink {
    /// Registered name.
    pub name: String,
    /// Fresh instance from the factory.
    pub sink: SharedSink,
    /// Configuration entry that enabled it.
    pub config: SinkConfig,
}

impl ResolvedSink {
    /// Parameters to initialize the sink with.
    #[must_use]
    pub fn params(&self) -> SinkParams {
        SinkParams::new(&self.name, self.config.parameters.clone())
    }
}

impl fmt::Debug for ResolvedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSink")
            .field("name", &self.name)
            .field("required", &self.config.required)
            .finish_non_exhaustive()
    }
}

/// Ordered registry of sink factories.
#[derive(Clone, Default)]
pub struct SinkRegistry {
    entries: Vec<(String, SinkFactory)>,
}

impl SinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in sinks.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(CsvLogSink::NAME, || Arc::new(CsvLogSink::new()) as SharedSink);
        registry.register(HttpPostSink::NAME, || Arc::new(HttpPostSink::new()) as SharedSink);
        registry
    }

    /// Registers a factory under `name`.
    ///
    /// Registering an existing name replaces its factory in place.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> SharedSink + Send + Sync + 'static,
    {
        let name = name.into();
        let factory: SinkFactory = Arc::new(factory);

        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name, factory)),
        }
        self
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a fresh instance of the sink registered as `name`.
    #[must_use]
    pub fn create(&self, name: &str) -> Option<SharedSink> {
        self.entries.iter().find(|(existing, _)| existing == name).map(|(_, factory)| factory())
    }

    /// Instantiates every enabled sink in `configs`, in registration order.
    ///
    /// Enabled names with no registered factory are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::UnknownRequiredSink`] if such a name is marked required.
    pub fn resolve(&self, configs: &BTreeMap<String, SinkConfig>) -> Result<Vec<ResolvedSink>> {
        for (name, config) in configs.iter().filter(|(_, config)| config.enabled) {
            if self.contains(name) {
                continue;
            }
            if config.required {
                return Err(PulseError::UnknownRequiredSink(name.clone()));
            }
            warn!(sink = %name, "no sink registered under this name; skipping");
        }

        Ok(self
            .entries
            .iter()
            .filter_map(|(name, factory)| {
                let config = configs.get(name).filter(|config| config.enabled)?;
                Some(ResolvedSink { name: name.clone(), sink: factory(), config: config.clone() })
            })
            .collect())
    }
}

impl fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
