//! Observability
//!
//! Progress events emitted by the pipeline and the sinks that render them.

pub mod events;

pub use events::{EventSink, FanoutSink, JsonlSink, LogSink, MemorySink, NullSink, ProgressEvent};
