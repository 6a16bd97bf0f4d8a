//! Scoped transactional boundary wrapped around each consumer invocation.
//!
//! A scope is acquired, used for exactly one invocation, and then either
//! completed (commit) or dropped (rollback). Dropping on every other exit
//! path (early return, propagated error, panic) is what guarantees rollback,
//! so implementations put their rollback in `Drop`.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Isolation level requested for a transactional scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
}

/// Options for opening a transactional scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation: IsolationLevel,
    /// `None` disables the timeout entirely, the documented override for
    /// interactive sessions where a wall-clock limit only gets in the way.
    pub timeout: Option<Duration>,
}

impl TransactionOptions {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
            timeout: Some(Self::DEFAULT_TIMEOUT),
        }
    }
}

/// Error type for transaction lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    BeginFailed(String),
    CommitFailed(String),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::BeginFailed(reason) => {
                write!(f, "failed to open transaction scope: {}", reason)
            }
            TransactionError::CommitFailed(reason) => {
                write!(f, "failed to commit transaction scope: {}", reason)
            }
        }
    }
}

impl std::error::Error for TransactionError {}

/// A live transactional scope. Call [`complete`](Self::complete) to commit;
/// dropping an incomplete scope rolls back.
pub trait TransactionScope: Send {
    fn complete(self: Box<Self>) -> Result<(), TransactionError>;
}

/// Opens transactional scopes for the dispatcher.
pub trait TransactionManager: Send + Sync {
    fn begin(&self, options: &TransactionOptions)
        -> Result<Box<dyn TransactionScope>, TransactionError>;
}

/// Manager whose scopes carry no resources of their own: commit and rollback
/// are no-ops. The right default when consumers manage their own resources
/// and the host only wants the dispatch protocol's sequencing.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoCommitManager;

struct AutoCommitScope;

impl TransactionScope for AutoCommitScope {
    fn complete(self: Box<Self>) -> Result<(), TransactionError> {
        Ok(())
    }
}

impl TransactionManager for AutoCommitManager {
    fn begin(
        &self,
        _options: &TransactionOptions,
    ) -> Result<Box<dyn TransactionScope>, TransactionError> {
        Ok(Box::new(AutoCommitScope))
    }
}
