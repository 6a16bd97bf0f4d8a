//! Inbound processing loop: pull buffers off a queue, resolve claim-checks,
//! decode, dispatch, and acknowledge.
//!
//! The interesting part is [`QueueWorker::process`], which is synchronous and
//! broker-free so the whole pipeline can be exercised without a running NATS
//! server; [`QueueWorker::run`] is the thin JetStream pull loop around it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::{consumer, AckKind};
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::codec::{CodecError, EnvelopeStreamer};
use crate::dispatch::{DispatchError, DispatchStrategy};
use crate::queue::client::QueueClient;
use crate::queue::events::{tracing_observer, EventObserver, SystemEvent};
use crate::queue::store::{EnvelopeStore, StoreError};

/// Error type for queue-side envelope processing.
#[derive(Debug)]
pub enum WorkerError {
    Codec(CodecError),
    Dispatch(DispatchError),
    Store(StoreError),
    Transport(String),
}

impl From<CodecError> for WorkerError {
    fn from(err: CodecError) -> Self {
        WorkerError::Codec(err)
    }
}

impl From<DispatchError> for WorkerError {
    fn from(err: DispatchError) -> Self {
        WorkerError::Dispatch(err)
    }
}

impl From<StoreError> for WorkerError {
    fn from(err: StoreError) -> Self {
        WorkerError::Store(err)
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Codec(e) => write!(f, "codec failure: {}", e),
            WorkerError::Dispatch(e) => write!(f, "dispatch failure: {}", e),
            WorkerError::Store(e) => write!(f, "claim-check failure: {}", e),
            WorkerError::Transport(reason) => write!(f, "transport failure: {}", reason),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Codec(e) => Some(e),
            WorkerError::Dispatch(e) => Some(e),
            WorkerError::Store(e) => Some(e),
            WorkerError::Transport(_) => None,
        }
    }
}

/// Result of processing one buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Dispatched and acknowledged.
    Acked { envelope_id: String },
    /// The envelope's delivery time has not arrived yet; retry after
    /// `ready_in`.
    Deferred { envelope_id: String, ready_in: Duration },
}

/// Drives decoded envelopes from a queue into the dispatcher.
pub struct QueueWorker {
    queue_name: String,
    streamer: EnvelopeStreamer,
    dispatcher: Arc<dyn DispatchStrategy>,
    store: Arc<dyn EnvelopeStore>,
    observer: Box<EventObserver>,
}

impl QueueWorker {
    pub fn new(
        queue_name: impl Into<String>,
        streamer: EnvelopeStreamer,
        dispatcher: Arc<dyn DispatchStrategy>,
        store: Arc<dyn EnvelopeStore>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            streamer,
            dispatcher,
            store,
            observer: tracing_observer(),
        }
    }

    /// Replace the default tracing observer, e.g. to fan events out to a
    /// monitoring channel.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&SystemEvent) + Send + Sync + 'static,
    {
        self.observer = Box::new(observer);
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Process one received buffer end to end.
    ///
    /// Reference messages are resolved through the claim-check store first;
    /// everything else is decoded directly. Envelopes whose `deliver_on` is
    /// still in the future are deferred, not dispatched.
    pub fn process(&self, buffer: &[u8]) -> Result<ProcessOutcome, WorkerError> {
        let stored;
        let data: &[u8] = match self.streamer.try_decode_reference(buffer)? {
            Some(reference) => {
                debug!(
                    envelope_id = %reference.envelope_id,
                    container = %reference.storage_container,
                    "resolving claim-check reference"
                );
                stored = self
                    .store
                    .fetch(&reference.storage_container, &reference.storage_reference)?;
                &stored
            }
            None => buffer,
        };

        let envelope = self.streamer.decode(data)?;
        let envelope_id = envelope.envelope_id().to_string();

        if let Some(deliver_on) = envelope.deliver_on() {
            let now = Utc::now();
            if deliver_on > now {
                let ready_in = (deliver_on - now).to_std().unwrap_or_default();
                debug!(envelope_id = %envelope_id, ?ready_in, "envelope is not ready yet");
                return Ok(ProcessOutcome::Deferred { envelope_id, ready_in });
            }
        }

        match self.dispatcher.dispatch(&envelope) {
            Ok(()) => {
                (self.observer)(&SystemEvent::MessageAcked {
                    queue_name: self.queue_name.clone(),
                    envelope_id: envelope_id.clone(),
                });
                Ok(ProcessOutcome::Acked { envelope_id })
            }
            Err(err) => {
                (self.observer)(&SystemEvent::MessageDispatchFailed {
                    queue_name: self.queue_name.clone(),
                    envelope_id,
                });
                Err(WorkerError::Dispatch(err))
            }
        }
    }

    /// Pull messages for this worker's queue until the subscription ends.
    ///
    /// Successful envelopes are acked; deferred ones are nacked with their
    /// remaining delay; dispatch and storage failures are nacked for
    /// broker-side redelivery; undecodable buffers are terminated so a
    /// poison message cannot loop forever.
    pub async fn run(&self, client: &QueueClient) -> Result<(), WorkerError> {
        let stream = client
            .jetstream()
            .get_stream(client.stream_name())
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;

        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                &self.queue_name,
                consumer::pull::Config {
                    durable_name: Some(self.queue_name.clone()),
                    filter_subject: format!("envelopes.{}", self.queue_name),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| WorkerError::Transport(e.to_string()))?;

        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| WorkerError::Transport(e.to_string()))?;

            match self.process(&message.payload) {
                Ok(ProcessOutcome::Acked { .. }) => {
                    message
                        .ack()
                        .await
                        .map_err(|e| WorkerError::Transport(e.to_string()))?;
                }
                Ok(ProcessOutcome::Deferred { ready_in, .. }) => {
                    message
                        .ack_with(AckKind::Nak(Some(ready_in)))
                        .await
                        .map_err(|e| WorkerError::Transport(e.to_string()))?;
                }
                Err(WorkerError::Codec(err)) => {
                    // Malformed bytes will not improve on redelivery.
                    warn!(queue = %self.queue_name, error = %err, "terminating undecodable message");
                    message
                        .ack_with(AckKind::Term)
                        .await
                        .map_err(|e| WorkerError::Transport(e.to_string()))?;
                }
                Err(err) => {
                    warn!(queue = %self.queue_name, error = %err, "message failed, requesting redelivery");
                    message
                        .ack_with(AckKind::Nak(None))
                        .await
                        .map_err(|e| WorkerError::Transport(e.to_string()))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{
        AutoCommitManager, Consume, HandlerError, MessageContext, MessageDirectory,
        TransactionalDispatcher,
    };
    use crate::envelope::{EnvelopeReference, MessageEnvelope, MessageItem};
    use crate::queue::store::InMemoryEnvelopeStore;
    use crate::serializer::MessageRegistry;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        id: u64,
    }

    struct CountingConsumer {
        handled: Arc<AtomicUsize>,
    }

    impl Consume<OrderPlaced> for CountingConsumer {
        fn consume(
            &mut self,
            _message: &OrderPlaced,
            _context: &MessageContext,
        ) -> Result<(), HandlerError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn worker_fixture() -> (QueueWorker, Arc<AtomicUsize>, Arc<InMemoryEnvelopeStore>, EnvelopeStreamer) {
        let registry =
            Arc::new(MessageRegistry::new().with::<OrderPlaced>("orders/placed"));
        let streamer = EnvelopeStreamer::with_registry(Arc::clone(&registry));

        let handled = Arc::new(AtomicUsize::new(0));
        let handled_clone = Arc::clone(&handled);
        let directory = MessageDirectory::builder()
            .register::<OrderPlaced, _, _>(move || CountingConsumer {
                handled: Arc::clone(&handled_clone),
            })
            .build();
        let dispatcher =
            Arc::new(TransactionalDispatcher::new(directory, Arc::new(AutoCommitManager)));

        let store = Arc::new(InMemoryEnvelopeStore::new());
        let worker = QueueWorker::new(
            "orders",
            EnvelopeStreamer::with_registry(registry),
            dispatcher,
            Arc::clone(&store) as Arc<dyn EnvelopeStore>,
        );
        (worker, handled, store, streamer)
    }

    #[test]
    fn test_process_data_message_acks() {
        let (worker, handled, _store, streamer) = worker_fixture();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let worker = worker.with_observer(move |event| {
            events_clone.lock().unwrap().push(event.clone());
        });

        let envelope =
            MessageEnvelope::new("E1").with_item(MessageItem::typed(OrderPlaced { id: 7 }));
        let buffer = streamer.encode(&envelope).unwrap();

        let outcome = worker.process(&buffer).unwrap();
        assert_eq!(outcome, ProcessOutcome::Acked { envelope_id: "E1".to_string() });
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec![SystemEvent::MessageAcked {
                queue_name: "orders".to_string(),
                envelope_id: "E1".to_string()
            }]
        );
    }

    #[test]
    fn test_process_reference_message_resolves_claim_check() {
        let (worker, handled, store, streamer) = worker_fixture();

        let envelope =
            MessageEnvelope::new("E2").with_item(MessageItem::typed(OrderPlaced { id: 9 }));
        store.put("overflow", "2024/E2.bin", streamer.encode(&envelope).unwrap());

        let reference = EnvelopeReference::new("E2", "overflow", "2024/E2.bin");
        let buffer = streamer.encode_reference(&reference);

        let outcome = worker.process(&buffer).unwrap();
        assert_eq!(outcome, ProcessOutcome::Acked { envelope_id: "E2".to_string() });
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_process_missing_claim_check_fails() {
        let (worker, _handled, _store, streamer) = worker_fixture();
        let reference = EnvelopeReference::new("E3", "overflow", "missing");
        let buffer = streamer.encode_reference(&reference);

        assert!(matches!(worker.process(&buffer).unwrap_err(), WorkerError::Store(_)));
    }

    #[test]
    fn test_process_defers_future_deliver_on() {
        let (worker, handled, _store, streamer) = worker_fixture();
        let envelope = MessageEnvelope::new("E4")
            .with_item(MessageItem::typed(OrderPlaced { id: 1 }))
            .with_deliver_on(Utc::now() + chrono::Duration::minutes(5));
        let buffer = streamer.encode(&envelope).unwrap();

        match worker.process(&buffer).unwrap() {
            ProcessOutcome::Deferred { envelope_id, ready_in } => {
                assert_eq!(envelope_id, "E4");
                assert!(ready_in > Duration::from_secs(200));
            }
            other => panic!("expected deferred outcome, got {:?}", other),
        }
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_process_undecodable_buffer_is_a_codec_error() {
        let (worker, _handled, _store, _streamer) = worker_fixture();
        assert!(matches!(
            worker.process(&[0xFF; 4]).unwrap_err(),
            WorkerError::Codec(_)
        ));
    }
}
