//! # Parcel: Envelope Codec and Dispatch for Queue-Based Messaging
//!
//! Parcel is the core of a queue-based CQRS messaging transport: it turns
//! in-memory application messages into a versioned binary wire format (and
//! back), supports claim-check indirection for oversized payloads, and
//! routes decoded messages to registered consumers under transactional
//! guarantees.
//!
//! ## Features
//!
//! - **Envelope codec**: fixed binary header, envelope metadata block, and
//!   payload framing with per-item sizes; unknown message types survive
//!   decode as raw bytes for forward compatibility
//! - **Claim-check references**: signature-prefixed wide-text pointers that
//!   share the byte channel with data messages
//! - **Explicit contract registry**: bidirectional name/type mapping built
//!   at startup, no runtime reflection
//! - **Transactional dispatch**: per-item consumer resolution, pluggable
//!   context factory, scoped commit/rollback semantics
//! - **Queue integration**: NATS JetStream client and worker loop with
//!   deferred delivery and acknowledgment events
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use parcel::envelope::{MessageEnvelope, MessageItem};
//! use parcel::codec::EnvelopeStreamer;
//! use parcel::serializer::MessageRegistry;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct OrderPlaced { id: u64 }
//!
//! let registry = Arc::new(MessageRegistry::new().with::<OrderPlaced>("orders/placed"));
//! let streamer = EnvelopeStreamer::with_registry(registry);
//!
//! let envelope = MessageEnvelope::new("E1")
//!     .with_item(MessageItem::typed(OrderPlaced { id: 7 }));
//!
//! let bytes = streamer.encode(&envelope).unwrap();
//! let decoded = streamer.decode(&bytes).unwrap();
//! assert_eq!(decoded.items()[0].get::<OrderPlaced>(), Some(&OrderPlaced { id: 7 }));
//! ```

// Core modules
pub mod codec;
pub mod envelope;
pub mod serializer;

// Dispatch engine
pub mod dispatch;

// NATS JetStream integration
pub mod queue;

// Configuration loading
pub mod config;

// Re-export key types
pub use envelope::{
    attribute_keys, AttributeValue, EnvelopeReference, ItemContent, MessageEnvelope, MessageItem,
};
pub use codec::{
    AttributeError, CodecError, EnvelopeStreamer, MessageHeader, DATA_FORMAT_VERSION,
    REFERENCE_SIGNATURE,
};
pub use serializer::{
    DataSerializer, EnvelopeSerializer, JsonEnvelopeSerializer, MessageRegistry,
    SerializationError,
};
pub use dispatch::{
    AutoCommitManager, Consume, DispatchError, DispatchStrategy, HandlerError, IsolationLevel,
    MessageContext, MessageDirectory, TransactionManager, TransactionOptions, TransactionScope,
    TransactionalDispatcher,
};
pub use queue::{
    EnvelopeStore, InMemoryEnvelopeStore, ProcessOutcome, QueueClient, QueueConfig, QueueWorker,
    SystemEvent, WorkerError,
};
pub use config::TransportConfig;
