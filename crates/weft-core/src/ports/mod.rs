//! Ports - abstraction layer.
//!
//! Each trait is a seam to something outside the scheduler's own logic
//! (time, id generation, observability), so tests and embedders can swap the
//! implementation.

pub mod clock;
pub mod event_sink;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink};
pub(crate) use self::event_sink::EventBus;
pub use self::id_generator::{IdGenerator, UlidGenerator};
