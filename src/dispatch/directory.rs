//! Consumer directory: the mapping from message types to the consumers that
//! handle them.
//!
//! There is no assembly scanning or container magic here: consumers are
//! registered explicitly at startup, each with a factory so that a fresh
//! instance is resolved per invocation (consumer instances are not assumed
//! safe for reuse across items).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::dispatch::context::MessageContext;

/// Error returned by a consumer's handling method.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// The handling contract every consumer satisfies: one message type, one
/// context type.
pub trait Consume<M, Ctx = MessageContext>: Send {
    fn consume(&mut self, message: &M, context: &Ctx) -> Result<(), HandlerError>;
}

/// Object-safe view of a consumer, used by the dispatcher.
pub(crate) trait ErasedConsumer<Ctx>: Send {
    fn consume(
        &mut self,
        message: &(dyn Any + Send + Sync),
        context: &Ctx,
    ) -> Result<(), HandlerError>;
}

struct TypedConsumer<M, Ctx, C> {
    inner: C,
    _marker: PhantomData<fn(M, Ctx)>,
}

impl<M, Ctx, C> ErasedConsumer<Ctx> for TypedConsumer<M, Ctx, C>
where
    M: Any + Send + Sync,
    C: Consume<M, Ctx>,
{
    fn consume(
        &mut self,
        message: &(dyn Any + Send + Sync),
        context: &Ctx,
    ) -> Result<(), HandlerError> {
        let typed = message
            .downcast_ref::<M>()
            .ok_or_else(|| HandlerError::from("message payload does not match consumer type"))?;
        self.inner.consume(typed, context)
    }
}

/// How to obtain and invoke one consumer for one message type.
pub struct ConsumerDescriptor<Ctx> {
    consumer_name: &'static str,
    resolve: Box<dyn Fn() -> Box<dyn ErasedConsumer<Ctx>> + Send + Sync>,
}

impl<Ctx> ConsumerDescriptor<Ctx> {
    /// Type name of the consumer, for logs and error reports.
    pub fn consumer_name(&self) -> &'static str {
        self.consumer_name
    }

    pub(crate) fn resolve(&self) -> Box<dyn ErasedConsumer<Ctx>> {
        (self.resolve)()
    }
}

/// Immutable mapping from message runtime types to consumer descriptors.
pub struct MessageDirectory<Ctx = MessageContext> {
    consumers: HashMap<TypeId, Vec<ConsumerDescriptor<Ctx>>>,
}

impl<Ctx> MessageDirectory<Ctx> {
    pub fn builder() -> MessageDirectoryBuilder<Ctx> {
        MessageDirectoryBuilder {
            consumers: HashMap::new(),
        }
    }

    /// Descriptors registered for a message type; empty when the type is
    /// unhandled.
    pub fn consumers_for(&self, type_id: TypeId) -> &[ConsumerDescriptor<Ctx>] {
        self.consumers.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of message types with at least one consumer.
    pub fn message_type_count(&self) -> usize {
        self.consumers.len()
    }
}

/// Builder assembling a [`MessageDirectory`] at startup.
pub struct MessageDirectoryBuilder<Ctx = MessageContext> {
    consumers: HashMap<TypeId, Vec<ConsumerDescriptor<Ctx>>>,
}

impl<Ctx: 'static> MessageDirectoryBuilder<Ctx> {
    /// Register a consumer factory for a message type. The factory runs once
    /// per invocation, yielding a fresh consumer instance each time.
    pub fn register<M, C, F>(mut self, factory: F) -> Self
    where
        M: Any + Send + Sync,
        C: Consume<M, Ctx> + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let descriptor = ConsumerDescriptor {
            consumer_name: std::any::type_name::<C>(),
            resolve: Box::new(move || {
                Box::new(TypedConsumer {
                    inner: factory(),
                    _marker: PhantomData,
                })
            }),
        };
        self.consumers
            .entry(TypeId::of::<M>())
            .or_default()
            .push(descriptor);
        self
    }

    pub fn build(self) -> MessageDirectory<Ctx> {
        MessageDirectory {
            consumers: self.consumers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    struct PingConsumer;

    impl Consume<Ping> for PingConsumer {
        fn consume(&mut self, _message: &Ping, _context: &MessageContext) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let directory: MessageDirectory = MessageDirectory::builder()
            .register::<Ping, _, _>(|| PingConsumer)
            .build();

        assert_eq!(directory.message_type_count(), 1);

        let descriptors = directory.consumers_for(TypeId::of::<Ping>());
        assert_eq!(descriptors.len(), 1);
        assert!(descriptors[0].consumer_name().contains("PingConsumer"));

        let context = MessageContext {
            envelope_id: "env-1".to_string(),
            item_index: 0,
            created_utc: None,
        };
        let mut consumer = descriptors[0].resolve();
        let message = Ping;
        assert!(consumer
            .consume(&message as &(dyn Any + Send + Sync), &context)
            .is_ok());
    }

    #[test]
    fn test_unregistered_type_has_no_consumers() {
        let directory: MessageDirectory = MessageDirectory::builder()
            .register::<Ping, _, _>(|| PingConsumer)
            .build();
        assert!(directory.consumers_for(TypeId::of::<u64>()).is_empty());
    }

    #[test]
    fn test_mismatched_payload_is_a_handler_error() {
        let directory: MessageDirectory = MessageDirectory::builder()
            .register::<Ping, _, _>(|| PingConsumer)
            .build();
        let descriptors = directory.consumers_for(TypeId::of::<Ping>());
        let context = MessageContext {
            envelope_id: "env-1".to_string(),
            item_index: 0,
            created_utc: None,
        };

        let mut consumer = descriptors[0].resolve();
        let wrong = 7u64;
        assert!(consumer
            .consume(&wrong as &(dyn Any + Send + Sync), &context)
            .is_err());
    }
}
