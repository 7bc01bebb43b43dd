//! Persistence and transport adapters implementing the application layer's
//! [`Store`](orbitflow_application::Store) and port traits.

#![forbid(unsafe_code)]

mod in_memory_store;
mod null_ports;
mod pagination;
mod postgres_queue;
mod postgres_store;

pub use in_memory_store::InMemoryStore;
pub use null_ports::{NullQueuePublisher, NullWebhookSynchronizer, RecordingWebhookSynchronizer, TracingAuditSink};
pub use postgres_queue::{ClaimedJob, PostgresQueuePublisher};
pub use postgres_store::PostgresStore;
