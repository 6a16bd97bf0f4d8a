//! Dispatch engine: consumer resolution, per-message context, and
//! transactional invocation for decoded envelopes.

pub mod context;
pub mod directory;
pub mod strategy;
pub mod transaction;

pub use context::{default_context_factory, ContextFactory, MessageContext};
pub use directory::{
    Consume, ConsumerDescriptor, HandlerError, MessageDirectory, MessageDirectoryBuilder,
};
pub use strategy::{DispatchError, DispatchStrategy, TransactionalDispatcher};
pub use transaction::{
    AutoCommitManager, IsolationLevel, TransactionError, TransactionManager, TransactionOptions,
    TransactionScope,
};
