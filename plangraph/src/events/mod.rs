//! Event log publishing.

mod publisher;

pub use publisher::EventLogPublisher;
