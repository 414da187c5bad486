//! Dispatch layer: provider resolution, fallback, batching, observability.

pub mod dispatcher;
pub mod events;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use events::{DispatchEvent, EventSink};
