//! Queue integration: NATS JetStream transport, the inbound worker loop, and
//! claim-check storage.

pub mod client;
pub mod events;
pub mod store;
pub mod worker;

pub use client::{QueueClient, QueueConfig};
pub use events::{tracing_observer, EventObserver, SystemEvent};
pub use store::{EnvelopeStore, InMemoryEnvelopeStore, StoreError};
pub use worker::{ProcessOutcome, QueueWorker, WorkerError};
