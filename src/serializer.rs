//! Serializer seams consumed by the envelope codec.
//!
//! [`DataSerializer`] maps runtime payload types to stable contract names and
//! turns payloads into bytes and back. [`EnvelopeSerializer`] handles the
//! envelope-metadata record independently of payload bytes. Both ship with
//! JSON-backed defaults; swapping in another encoding only touches these
//! seams, never the codec.
//!
//! There is no runtime reflection here: [`MessageRegistry`] is an explicit
//! bidirectional name/type registry built at startup.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::contract::EnvelopeContract;

/// Error type for payload and metadata serialization.
#[derive(Debug)]
pub enum SerializationError {
    JsonError(serde_json::Error),
    IoError(std::io::Error),
    /// A contract name with no registered type was asked to deserialize.
    UnknownContract(String),
    /// A payload whose runtime type was never registered was asked to
    /// serialize.
    UnknownType(std::any::TypeId),
    /// A payload's dynamic type did not match its registered serializer.
    PayloadTypeMismatch { contract_name: String },
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        SerializationError::JsonError(err)
    }
}

impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        SerializationError::IoError(err)
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::JsonError(e) => write!(f, "JSON error: {}", e),
            SerializationError::IoError(e) => write!(f, "IO error: {}", e),
            SerializationError::UnknownContract(name) => {
                write!(f, "no type registered for contract '{}'", name)
            }
            SerializationError::UnknownType(type_id) => {
                write!(f, "no contract registered for payload type {:?}", type_id)
            }
            SerializationError::PayloadTypeMismatch { contract_name } => {
                write!(f, "payload does not match registered type for contract '{}'", contract_name)
            }
        }
    }
}

impl std::error::Error for SerializationError {}

/// Maps payload types to stable contract names and serializes payload bytes.
///
/// Implementations must be safe for concurrent use; the codec shares one
/// instance across all encode/decode calls.
pub trait DataSerializer: Send + Sync {
    /// Stable contract name for a registered payload type, if any.
    fn contract_name_by_type(&self, type_id: TypeId) -> Option<String>;

    /// Registered payload type for a contract name, if any.
    fn contract_type_by_name(&self, contract_name: &str) -> Option<TypeId>;

    /// Append the payload's serialized bytes to `out`.
    fn serialize(
        &self,
        payload: &(dyn Any + Send + Sync),
        out: &mut Vec<u8>,
    ) -> Result<(), SerializationError>;

    /// Deserialize payload bytes for the given contract name into a typed
    /// instance.
    fn deserialize(
        &self,
        bytes: &[u8],
        contract_name: &str,
    ) -> Result<Box<dyn Any + Send + Sync>, SerializationError>;
}

/// Serializes the envelope-metadata record to and from a byte stream.
pub trait EnvelopeSerializer: Send + Sync {
    fn serialize_envelope(
        &self,
        out: &mut Vec<u8>,
        contract: &EnvelopeContract,
    ) -> Result<(), SerializationError>;

    fn deserialize_envelope(&self, bytes: &[u8]) -> Result<EnvelopeContract, SerializationError>;
}

/// JSON envelope-metadata serializer, the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEnvelopeSerializer;

impl EnvelopeSerializer for JsonEnvelopeSerializer {
    fn serialize_envelope(
        &self,
        out: &mut Vec<u8>,
        contract: &EnvelopeContract,
    ) -> Result<(), SerializationError> {
        serde_json::to_writer(out, contract)?;
        Ok(())
    }

    fn deserialize_envelope(&self, bytes: &[u8]) -> Result<EnvelopeContract, SerializationError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

type SerializeFn =
    Box<dyn Fn(&(dyn Any + Send + Sync), &mut Vec<u8>) -> Result<(), SerializationError> + Send + Sync>;
type DeserializeFn =
    Box<dyn Fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>, SerializationError> + Send + Sync>;

struct ContractEntry {
    type_id: TypeId,
    deserialize: DeserializeFn,
}

/// Explicit bidirectional registry of contract names and payload types,
/// serializing payloads as JSON.
///
/// # Example
/// ```
/// use parcel::serializer::MessageRegistry;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct OrderPlaced { id: u64 }
///
/// let mut registry = MessageRegistry::new();
/// registry.register::<OrderPlaced>("orders/placed");
/// assert!(registry.is_registered("orders/placed"));
/// ```
#[derive(Default)]
pub struct MessageRegistry {
    names_by_type: HashMap<TypeId, String>,
    serializers_by_type: HashMap<TypeId, SerializeFn>,
    entries_by_name: HashMap<String, ContractEntry>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload type under a stable contract name.
    ///
    /// Re-registering a name or type replaces the previous mapping.
    pub fn register<T>(&mut self, contract_name: impl Into<String>)
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        let name = contract_name.into();
        let type_id = TypeId::of::<T>();

        let serialize_name = name.clone();
        self.names_by_type.insert(type_id, name.clone());
        self.serializers_by_type.insert(
            type_id,
            Box::new(move |payload, out| {
                let typed = payload.downcast_ref::<T>().ok_or_else(|| {
                    SerializationError::PayloadTypeMismatch {
                        contract_name: serialize_name.clone(),
                    }
                })?;
                serde_json::to_writer(out, typed)?;
                Ok(())
            }),
        );
        self.entries_by_name.insert(
            name,
            ContractEntry {
                type_id,
                deserialize: Box::new(|bytes| {
                    let value: T = serde_json::from_slice(bytes)?;
                    Ok(Box::new(value) as Box<dyn Any + Send + Sync>)
                }),
            },
        );
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T>(mut self, contract_name: impl Into<String>) -> Self
    where
        T: Serialize + DeserializeOwned + Any + Send + Sync,
    {
        self.register::<T>(contract_name);
        self
    }

    pub fn is_registered(&self, contract_name: &str) -> bool {
        self.entries_by_name.contains_key(contract_name)
    }

    pub fn len(&self) -> usize {
        self.entries_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries_by_name.is_empty()
    }
}

impl DataSerializer for MessageRegistry {
    fn contract_name_by_type(&self, type_id: TypeId) -> Option<String> {
        self.names_by_type.get(&type_id).cloned()
    }

    fn contract_type_by_name(&self, contract_name: &str) -> Option<TypeId> {
        self.entries_by_name.get(contract_name).map(|e| e.type_id)
    }

    fn serialize(
        &self,
        payload: &(dyn Any + Send + Sync),
        out: &mut Vec<u8>,
    ) -> Result<(), SerializationError> {
        let serializer = self
            .serializers_by_type
            .get(&payload.type_id())
            .ok_or_else(|| SerializationError::UnknownType(payload.type_id()))?;
        serializer(payload, out)
    }

    fn deserialize(
        &self,
        bytes: &[u8],
        contract_name: &str,
    ) -> Result<Box<dyn Any + Send + Sync>, SerializationError> {
        let entry = self
            .entries_by_name
            .get(contract_name)
            .ok_or_else(|| SerializationError::UnknownContract(contract_name.to_string()))?;
        (entry.deserialize)(bytes)
    }
}
