//! Claim-check storage seam.
//!
//! When an envelope is too large for the queue, the sending side stores it
//! out-of-line and enqueues a reference message instead. The receiving side
//! resolves the reference through an [`EnvelopeStore`]. The policy deciding
//! *when* to store out-of-line lives with the transport, not here.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Error type for claim-check storage lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound { container: String, reference: String },
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { container, reference } => {
                write!(f, "no stored envelope at {}/{}", container, reference)
            }
            StoreError::Backend(reason) => write!(f, "storage backend failure: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

/// Fetches out-of-line envelope bytes by container and reference.
pub trait EnvelopeStore: Send + Sync {
    fn fetch(&self, container: &str, reference: &str) -> Result<Vec<u8>, StoreError>;
}

/// In-memory store for tests and embedded setups.
#[derive(Default)]
pub struct InMemoryEnvelopeStore {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryEnvelopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, container: impl Into<String>, reference: impl Into<String>, bytes: Vec<u8>) {
        self.blobs
            .write()
            .expect("envelope store lock poisoned")
            .insert((container.into(), reference.into()), bytes);
    }
}

impl EnvelopeStore for InMemoryEnvelopeStore {
    fn fetch(&self, container: &str, reference: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .map_err(|_| StoreError::Backend("envelope store lock poisoned".to_string()))?
            .get(&(container.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                reference: reference.to_string(),
            })
    }
}
