//! Impls - ports の実装
//!
//! - **TracingEventSink**: structured logs via `tracing`
//! - **BroadcastEventSink**: tokio broadcast fan-out
//! - **MemoryEventSink**: in-memory recording (development and tests)

pub mod broadcast_sink;
pub mod memory_sink;
pub mod tracing_sink;

pub use self::broadcast_sink::BroadcastEventSink;
pub use self::memory_sink::MemoryEventSink;
pub use self::tracing_sink::TracingEventSink;
