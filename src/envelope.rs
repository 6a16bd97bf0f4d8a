//! Runtime message model: envelopes, items, attributes, and claim-check
//! references.
//!
//! An envelope is the unit of transport. It carries one or more payload items
//! plus envelope-level attributes and an optional delivery time. Envelopes are
//! built once by the sending side, encoded, and reconstructed fresh on decode;
//! they are never mutated after encoding.

use std::any::{Any, TypeId};
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

/// Well-known envelope attribute keys with dedicated wire representations.
pub mod attribute_keys {
    /// Creation time of the envelope, carried as a round-trippable timestamp.
    pub const CREATED_UTC: &str = "created-utc";
    /// Logical name of the sending party.
    pub const SENDER: &str = "sender";
}

/// Runtime value of a single attribute.
///
/// Only strings, 64-bit integers, and the `created-utc` timestamp are
/// representable on the wire. `Float` exists so an application can still put
/// one in the dictionary; encoding it is a hard error
/// ([`AttributeError::UnsupportedValueType`](crate::codec::AttributeError)).
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Number(i64),
    Timestamp(DateTime<Utc>),
    Float(f64),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i16> for AttributeValue {
    fn from(value: i16) -> Self {
        AttributeValue::Number(i64::from(value))
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Number(i64::from(value))
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::Timestamp(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

/// Payload of a single item: a decoded typed instance, or the raw undecoded
/// bytes when the contract name could not be resolved.
pub enum ItemContent {
    Typed(Box<dyn Any + Send + Sync>),
    Raw(Vec<u8>),
}

impl ItemContent {
    /// Downcast a typed payload to a concrete message type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            ItemContent::Typed(any) => any.downcast_ref::<T>(),
            ItemContent::Raw(_) => None,
        }
    }

    /// Raw payload bytes for items whose contract name was unresolvable.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            ItemContent::Raw(bytes) => Some(bytes),
            ItemContent::Typed(_) => None,
        }
    }
}

impl fmt::Debug for ItemContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemContent::Typed(_) => f.write_str("ItemContent::Typed(..)"),
            ItemContent::Raw(bytes) => write!(f, "ItemContent::Raw({} bytes)", bytes.len()),
        }
    }
}

/// One payload within an envelope.
#[derive(Debug)]
pub struct MessageItem {
    mapped_type: Option<TypeId>,
    type_name: Option<&'static str>,
    content: ItemContent,
    attributes: IndexMap<String, AttributeValue>,
}

impl MessageItem {
    /// Create an item from a typed payload.
    pub fn typed<T: Any + Send + Sync>(payload: T) -> Self {
        Self {
            mapped_type: Some(TypeId::of::<T>()),
            type_name: Some(std::any::type_name::<T>()),
            content: ItemContent::Typed(Box::new(payload)),
            attributes: IndexMap::new(),
        }
    }

    /// Create an item from raw bytes with no resolvable payload type.
    pub fn raw(bytes: Vec<u8>) -> Self {
        Self {
            mapped_type: None,
            type_name: None,
            content: ItemContent::Raw(bytes),
            attributes: IndexMap::new(),
        }
    }

    pub(crate) fn decoded_typed(
        mapped_type: TypeId,
        content: Box<dyn Any + Send + Sync>,
        attributes: IndexMap<String, AttributeValue>,
    ) -> Self {
        Self {
            mapped_type: Some(mapped_type),
            type_name: None,
            content: ItemContent::Typed(content),
            attributes,
        }
    }

    pub(crate) fn decoded_raw(
        bytes: Vec<u8>,
        attributes: IndexMap<String, AttributeValue>,
    ) -> Self {
        Self {
            mapped_type: None,
            type_name: None,
            content: ItemContent::Raw(bytes),
            attributes,
        }
    }

    /// Attach an item-scoped attribute (builder style).
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Runtime type of the payload, absent when the payload could not be
    /// resolved on decode.
    pub fn mapped_type(&self) -> Option<TypeId> {
        self.mapped_type
    }

    pub(crate) fn type_name(&self) -> Option<&'static str> {
        self.type_name
    }

    pub fn content(&self) -> &ItemContent {
        &self.content
    }

    /// Typed payload as a dynamic value, for type-erased dispatch.
    pub fn payload_any(&self) -> Option<&(dyn Any + Send + Sync)> {
        match &self.content {
            ItemContent::Typed(any) => Some(any.as_ref()),
            ItemContent::Raw(_) => None,
        }
    }

    /// Downcast the payload to a concrete message type.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.content.downcast_ref::<T>()
    }

    pub fn attributes(&self) -> &IndexMap<String, AttributeValue> {
        &self.attributes
    }
}

/// A unit of transport carrying one or more application messages plus
/// metadata.
#[derive(Debug)]
pub struct MessageEnvelope {
    envelope_id: String,
    attributes: IndexMap<String, AttributeValue>,
    items: Vec<MessageItem>,
    deliver_on: Option<DateTime<Utc>>,
}

impl MessageEnvelope {
    /// Create an envelope with an explicit id.
    pub fn new(envelope_id: impl Into<String>) -> Self {
        Self {
            envelope_id: envelope_id.into(),
            attributes: IndexMap::new(),
            items: Vec::new(),
            deliver_on: None,
        }
    }

    /// Create an envelope with a generated UUID v4 id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub(crate) fn assemble(
        envelope_id: String,
        attributes: IndexMap<String, AttributeValue>,
        items: Vec<MessageItem>,
        deliver_on: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            envelope_id,
            attributes,
            items,
            deliver_on,
        }
    }

    pub fn envelope_id(&self) -> &str {
        &self.envelope_id
    }

    pub fn with_item(mut self, item: MessageItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn add_item(&mut self, item: MessageItem) {
        self.items.push(item);
    }

    /// Items in wire order. Order is significant and preserved on round-trip.
    pub fn items(&self) -> &[MessageItem] {
        &self.items
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &IndexMap<String, AttributeValue> {
        &self.attributes
    }

    /// Mark the envelope as not ready for processing before the given instant.
    pub fn with_deliver_on(mut self, deliver_on: DateTime<Utc>) -> Self {
        self.deliver_on = Some(deliver_on);
        self
    }

    pub fn deliver_on(&self) -> Option<DateTime<Utc>> {
        self.deliver_on
    }

    /// Creation time from the `created-utc` well-known attribute, if present.
    pub fn created_utc(&self) -> Option<DateTime<Utc>> {
        self.attributes
            .get(attribute_keys::CREATED_UTC)
            .and_then(AttributeValue::as_timestamp)
    }

    /// Sender name from the `sender` well-known attribute, if present.
    pub fn sender(&self) -> Option<&str> {
        self.attributes
            .get(attribute_keys::SENDER)
            .and_then(AttributeValue::as_str)
    }
}

/// Claim-check pointer substituted for an envelope stored out-of-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeReference {
    pub envelope_id: String,
    pub storage_container: String,
    pub storage_reference: String,
}

impl EnvelopeReference {
    pub fn new(
        envelope_id: impl Into<String>,
        storage_container: impl Into<String>,
        storage_reference: impl Into<String>,
    ) -> Self {
        Self {
            envelope_id: envelope_id.into(),
            storage_container: storage_container.into(),
            storage_reference: storage_reference.into(),
        }
    }
}
