//! ManagerBuilder - wiring and startup validation.
//!
//! Fail-fast: an invalid configuration is rejected by `build()`, before any
//! task is accepted.

use std::sync::Arc;

use tracing::debug;

use super::config::{ConfigError, ManagerConfig};
use super::manager::ConcurrencyManager;
use crate::ports::{Clock, EventBus, EventSink, IdGenerator, SystemClock, UlidGenerator};

/// Builds a [`ConcurrencyManager`].
///
/// # Example
/// ```ignore
/// let manager = ManagerBuilder::new()
///     .max_concurrency(8)
///     .event_sink(Arc::new(TracingEventSink))
///     .build()?;
/// ```
pub struct ManagerBuilder {
    config: ManagerConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            clock: None,
            ids: None,
            sinks: Vec::new(),
        }
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    /// Clock for timestamps. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Id generator. Defaults to a [`UlidGenerator`] on the builder's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Add an event sink. May be called repeatedly.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Result<ConcurrencyManager, ConfigError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let events = EventBus::new(self.sinks);
        debug!(
            max_concurrency = self.config.max_concurrency,
            sinks = events.len(),
            "concurrency manager built"
        );

        Ok(ConcurrencyManager::from_parts(self.config, clock, ids, events))
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrencyManager {
    /// Manager with the given config, system clock and no event sinks.
    pub fn new(config: ManagerConfig) -> Result<Self, ConfigError> {
        ManagerBuilder::new().config(config).build()
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }
}
