//! The dispatch protocol: resolve, contextualize, invoke in scope, then
//! commit or roll back, independently for every item of a decoded envelope.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::dispatch::context::{default_context_factory, ContextFactory, MessageContext};
use crate::dispatch::directory::{HandlerError, MessageDirectory};
use crate::dispatch::transaction::{TransactionError, TransactionManager, TransactionOptions};
use crate::envelope::{MessageEnvelope, MessageItem};

/// Error type for envelope dispatch.
#[derive(Debug)]
pub enum DispatchError {
    Transaction(TransactionError),
    /// A consumer's handling method failed; its scope was rolled back.
    Handler { consumer: String, source: HandlerError },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Transaction(e) => write!(f, "transaction failure: {}", e),
            DispatchError::Handler { consumer, source } => {
                write!(f, "consumer {} failed: {}", consumer, source)
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Transaction(e) => Some(e),
            DispatchError::Handler { source, .. } => Some(source.as_ref()),
        }
    }
}

/// The policy for resolving and invoking consumers for a decoded envelope.
pub trait DispatchStrategy: Send + Sync {
    fn dispatch(&self, envelope: &MessageEnvelope) -> Result<(), DispatchError>;
}

/// Dispatcher that invokes each item's consumers inside their own
/// transactional scope.
///
/// Per item: skip silently when the payload is undecoded or no consumer is
/// registered; otherwise build a context, and for each registered consumer
/// open a scope, resolve a fresh instance, invoke it, and complete the scope.
/// A handler failure drops the scope (rollback) and propagates. The
/// dispatcher never swallows or retries; redelivery belongs to the transport.
pub struct TransactionalDispatcher<Ctx = MessageContext> {
    directory: MessageDirectory<Ctx>,
    transactions: Arc<dyn TransactionManager>,
    options: TransactionOptions,
    context_factory: Box<ContextFactory<Ctx>>,
}

impl TransactionalDispatcher<MessageContext> {
    /// Dispatcher with the default context and default transaction options.
    pub fn new(
        directory: MessageDirectory<MessageContext>,
        transactions: Arc<dyn TransactionManager>,
    ) -> Self {
        Self {
            directory,
            transactions,
            options: TransactionOptions::default(),
            context_factory: default_context_factory(),
        }
    }
}

impl<Ctx> TransactionalDispatcher<Ctx> {
    /// Dispatcher with a caller-supplied context factory, for hosts exposing
    /// a richer context type to their consumers.
    pub fn with_context_factory<F>(
        directory: MessageDirectory<Ctx>,
        transactions: Arc<dyn TransactionManager>,
        context_factory: F,
    ) -> Self
    where
        F: Fn(&MessageEnvelope, &MessageItem, usize) -> Ctx + Send + Sync + 'static,
    {
        Self {
            directory,
            transactions,
            options: TransactionOptions::default(),
            context_factory: Box::new(context_factory),
        }
    }

    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }
}

impl<Ctx: 'static> DispatchStrategy for TransactionalDispatcher<Ctx> {
    fn dispatch(&self, envelope: &MessageEnvelope) -> Result<(), DispatchError> {
        for (index, item) in envelope.items().iter().enumerate() {
            let Some(type_id) = item.mapped_type() else {
                debug!(
                    envelope_id = %envelope.envelope_id(),
                    item_index = index,
                    "item payload is undecoded, skipping dispatch"
                );
                continue;
            };
            let descriptors = self.directory.consumers_for(type_id);
            if descriptors.is_empty() {
                debug!(
                    envelope_id = %envelope.envelope_id(),
                    item_index = index,
                    "no consumer registered for item, skipping dispatch"
                );
                continue;
            }
            let Some(payload) = item.payload_any() else {
                continue;
            };

            let context = (self.context_factory)(envelope, item, index);
            for descriptor in descriptors {
                let scope = self
                    .transactions
                    .begin(&self.options)
                    .map_err(DispatchError::Transaction)?;
                let mut consumer = descriptor.resolve();
                match consumer.consume(payload, &context) {
                    Ok(()) => scope.complete().map_err(DispatchError::Transaction)?,
                    Err(source) => {
                        // Dropping the scope rolls it back.
                        drop(scope);
                        return Err(DispatchError::Handler {
                            consumer: descriptor.consumer_name().to_string(),
                            source,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
