//! App - the concurrency manager and its wiring.

pub mod builder;
pub mod composite;
pub mod config;
pub mod handle;
pub mod manager;
pub mod metrics;
pub mod pipeline;
mod runner;


pub use builder::ManagerBuilder;
pub use config::{ConfigError, ManagerConfig};
pub use handle::TaskHandle;
pub use manager::ConcurrencyManager;
pub use metrics::ConcurrencyMetrics;
pub use pipeline::Pipeline;
