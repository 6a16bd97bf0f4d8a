//! System events emitted by the queue consumer for observability.

use tracing::{info, warn};

/// Notification about the end-to-end outcome of one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// The envelope was dispatched successfully and acknowledged.
    MessageAcked { queue_name: String, envelope_id: String },
    /// Dispatch failed; the envelope goes back to the transport for
    /// redelivery.
    MessageDispatchFailed { queue_name: String, envelope_id: String },
}

/// Observer invoked for every emitted event.
pub type EventObserver = dyn Fn(&SystemEvent) + Send + Sync;

/// The default observer: log each event through `tracing`.
pub fn tracing_observer() -> Box<EventObserver> {
    Box::new(|event| match event {
        SystemEvent::MessageAcked { queue_name, envelope_id } => {
            info!(queue = %queue_name, envelope_id = %envelope_id, "message acked");
        }
        SystemEvent::MessageDispatchFailed { queue_name, envelope_id } => {
            warn!(queue = %queue_name, envelope_id = %envelope_id, "message dispatch failed");
        }
    })
}
