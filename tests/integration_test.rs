//! Integration tests for the parcel codec and dispatch pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use parcel::envelope::{attribute_keys, AttributeValue, EnvelopeReference, MessageEnvelope, MessageItem};
use parcel::{
    AutoCommitManager, Consume, DispatchStrategy, EnvelopeStore, EnvelopeStreamer, HandlerError,
    InMemoryEnvelopeStore, MessageContext, MessageDirectory, MessageRegistry, ProcessOutcome,
    QueueWorker, SystemEvent, TransactionalDispatcher,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct OrderPlaced {
    id: u64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct InvoiceIssued {
    order_id: u64,
    amount_cents: i64,
}

struct OrderConsumer {
    seen: Arc<Mutex<Vec<(u64, MessageContext)>>>,
}

impl Consume<OrderPlaced> for OrderConsumer {
    fn consume(&mut self, message: &OrderPlaced, context: &MessageContext) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push((message.id, context.clone()));
        Ok(())
    }
}

fn registry() -> Arc<MessageRegistry> {
    Arc::new(
        MessageRegistry::new()
            .with::<OrderPlaced>("orders/placed")
            .with::<InvoiceIssued>("billing/invoice-issued"),
    )
}

#[test]
fn test_encode_decode_dispatch_end_to_end() {
    let registry = registry();
    let streamer = EnvelopeStreamer::with_registry(Arc::clone(&registry));

    let envelope = MessageEnvelope::new("E1")
        .with_attribute(attribute_keys::SENDER, "svc-a")
        .with_item(MessageItem::typed(OrderPlaced { id: 7 }));
    let bytes = streamer.encode(&envelope).unwrap();

    let decoded = streamer.decode(&bytes).unwrap();
    assert_eq!(decoded.envelope_id(), "E1");
    assert_eq!(decoded.sender(), Some("svc-a"));
    assert_eq!(decoded.items()[0].get::<OrderPlaced>(), Some(&OrderPlaced { id: 7 }));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let directory = MessageDirectory::builder()
        .register::<OrderPlaced, _, _>(move || OrderConsumer { seen: Arc::clone(&seen_clone) })
        .build();
    let dispatcher = TransactionalDispatcher::new(directory, Arc::new(AutoCommitManager));
    dispatcher.dispatch(&decoded).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 7);
    assert_eq!(seen[0].1.envelope_id, "E1");
    assert_eq!(seen[0].1.item_index, 0);
}

#[test]
fn test_attribute_dictionary_round_trips_exactly() {
    let registry = registry();
    let streamer = EnvelopeStreamer::with_registry(registry);

    let created = chrono::Utc::now();
    let envelope = MessageEnvelope::new("E2")
        .with_attribute(attribute_keys::CREATED_UTC, created)
        .with_attribute(attribute_keys::SENDER, "svc-b")
        .with_attribute("region", "eu-west")
        .with_attribute("attempt", 2i32)
        .with_item(MessageItem::typed(OrderPlaced { id: 1 }));

    let decoded = streamer.decode(&streamer.encode(&envelope).unwrap()).unwrap();

    assert_eq!(decoded.attributes(), envelope.attributes());
    assert_eq!(decoded.created_utc(), Some(created));
    assert_eq!(
        decoded.attribute("attempt"),
        Some(&AttributeValue::Number(2))
    );
}

#[test]
fn test_multi_item_order_is_preserved() {
    let registry = registry();
    let streamer = EnvelopeStreamer::with_registry(registry);

    let envelope = MessageEnvelope::new("E3")
        .with_item(MessageItem::typed(OrderPlaced { id: 1 }))
        .with_item(MessageItem::typed(InvoiceIssued { order_id: 1, amount_cents: 1250 }))
        .with_item(MessageItem::typed(OrderPlaced { id: 2 }));

    let decoded = streamer.decode(&streamer.encode(&envelope).unwrap()).unwrap();

    assert_eq!(decoded.items().len(), 3);
    assert_eq!(decoded.items()[0].get::<OrderPlaced>(), Some(&OrderPlaced { id: 1 }));
    assert_eq!(
        decoded.items()[1].get::<InvoiceIssued>(),
        Some(&InvoiceIssued { order_id: 1, amount_cents: 1250 })
    );
    assert_eq!(decoded.items()[2].get::<OrderPlaced>(), Some(&OrderPlaced { id: 2 }));
}

#[test]
fn test_worker_resolves_claim_check_and_emits_ack() {
    let registry = registry();
    let streamer = EnvelopeStreamer::with_registry(Arc::clone(&registry));

    // Store the real envelope out-of-line and enqueue only a reference.
    let envelope = MessageEnvelope::new("E4").with_item(MessageItem::typed(OrderPlaced { id: 4 }));
    let store = Arc::new(InMemoryEnvelopeStore::new());
    store.put("overflow", "2024/E4.bin", streamer.encode(&envelope).unwrap());
    let reference_bytes =
        streamer.encode_reference(&EnvelopeReference::new("E4", "overflow", "2024/E4.bin"));

    let handled = Arc::new(AtomicUsize::new(0));
    let handled_clone = Arc::clone(&handled);

    struct CountingConsumer {
        handled: Arc<AtomicUsize>,
    }
    impl Consume<OrderPlaced> for CountingConsumer {
        fn consume(&mut self, _m: &OrderPlaced, _c: &MessageContext) -> Result<(), HandlerError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let directory = MessageDirectory::builder()
        .register::<OrderPlaced, _, _>(move || CountingConsumer { handled: Arc::clone(&handled_clone) })
        .build();
    let dispatcher = Arc::new(TransactionalDispatcher::new(directory, Arc::new(AutoCommitManager)));

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    let worker = QueueWorker::new(
        "orders",
        EnvelopeStreamer::with_registry(registry),
        dispatcher,
        store as Arc<dyn EnvelopeStore>,
    )
    .with_observer(move |event| events_clone.lock().unwrap().push(event.clone()));

    let outcome = worker.process(&reference_bytes).unwrap();
    assert_eq!(outcome, ProcessOutcome::Acked { envelope_id: "E4".to_string() });
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(
        *events.lock().unwrap(),
        vec![SystemEvent::MessageAcked {
            queue_name: "orders".to_string(),
            envelope_id: "E4".to_string()
        }]
    );
}

#[test]
fn test_unknown_item_passes_through_untouched() {
    let full_registry = registry();
    let sender = EnvelopeStreamer::with_registry(full_registry);

    let envelope = MessageEnvelope::new("E5")
        .with_item(MessageItem::typed(OrderPlaced { id: 5 }))
        .with_item(MessageItem::typed(InvoiceIssued { order_id: 5, amount_cents: 999 }));
    let bytes = sender.encode(&envelope).unwrap();

    // An older reader that only knows about orders still decodes and
    // dispatches the order, with the invoice carried along as raw bytes.
    let old_registry = Arc::new(MessageRegistry::new().with::<OrderPlaced>("orders/placed"));
    let receiver = EnvelopeStreamer::with_registry(old_registry);
    let decoded = receiver.decode(&bytes).unwrap();

    assert!(decoded.items()[0].get::<OrderPlaced>().is_some());
    assert_eq!(
        decoded.items()[1].content().as_raw(),
        Some(
            serde_json::to_vec(&InvoiceIssued { order_id: 5, amount_cents: 999 })
                .unwrap()
                .as_slice()
        )
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let directory = MessageDirectory::builder()
        .register::<OrderPlaced, _, _>(move || OrderConsumer { seen: Arc::clone(&seen_clone) })
        .build();
    let dispatcher = TransactionalDispatcher::new(directory, Arc::new(AutoCommitManager));
    dispatcher.dispatch(&decoded).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}
