//! Event sink adapters.

mod in_memory;

pub use in_memory::InMemoryEventSink;
