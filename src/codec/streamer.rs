//! The envelope codec: the only component that touches raw wire bytes.
//!
//! Two protocols share one byte channel:
//!
//! - **Data messages**: fixed binary header, envelope-metadata block, then
//!   all item payloads concatenated in item order.
//! - **Reference messages** (claim-checks): a short UTF-16LE text blob with a
//!   literal signature prefix, pointing at an envelope stored out-of-line.
//!
//! Callers discriminate by an exact byte-prefix comparison against the
//! reference signature; a data message's header can never collide with it.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::codec::contract::{EnvelopeContract, ItemContract};
use crate::codec::convert::{self, AttributeError};
use crate::codec::header::{MessageHeader, DATA_FORMAT_VERSION};
use crate::envelope::{EnvelopeReference, ItemContent, MessageEnvelope, MessageItem};
use crate::serializer::{
    DataSerializer, EnvelopeSerializer, JsonEnvelopeSerializer, MessageRegistry,
    SerializationError,
};

/// Signature literal opening every reference message, encoded as UTF-16LE on
/// the wire.
pub const REFERENCE_SIGNATURE: &str = "[cqrs-ref-r1]";

/// Error type for envelope encoding and decoding.
#[derive(Debug)]
pub enum CodecError {
    /// The buffer ended before a complete header, metadata block, or item
    /// payload.
    Truncated { needed: usize, available: usize },
    /// The header's schema tag is not the single supported value. Fatal; no
    /// partial decode is attempted.
    UnsupportedFormatVersion { found: u32 },
    /// A payload's runtime type has no registered contract name.
    UnmappedContractType { type_name: String },
    /// A buffer with the reference signature did not carry all three fields.
    MalformedReference,
    Attribute(AttributeError),
    Serialization(SerializationError),
}

impl From<AttributeError> for CodecError {
    fn from(err: AttributeError) -> Self {
        CodecError::Attribute(err)
    }
}

impl From<SerializationError> for CodecError {
    fn from(err: SerializationError) -> Self {
        CodecError::Serialization(err)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Truncated { needed, available } => {
                write!(f, "buffer truncated: needed {} bytes, got {}", needed, available)
            }
            CodecError::UnsupportedFormatVersion { found } => {
                write!(
                    f,
                    "unsupported message format version {} (expected {})",
                    found, DATA_FORMAT_VERSION
                )
            }
            CodecError::UnmappedContractType { type_name } => {
                write!(f, "failed to find contract name for {}", type_name)
            }
            CodecError::MalformedReference => {
                write!(f, "reference message is missing fields")
            }
            CodecError::Attribute(e) => write!(f, "attribute conversion failed: {}", e),
            CodecError::Serialization(e) => write!(f, "serialization failed: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Attribute(e) => Some(e),
            CodecError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

fn decode_utf16le(buffer: &[u8]) -> Result<String, CodecError> {
    if buffer.len() % 2 != 0 {
        return Err(CodecError::MalformedReference);
    }
    let units: Vec<u16> = buffer
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| CodecError::MalformedReference)
}

/// Encodes and decodes full wire messages, orchestrating the envelope
/// serializer, data serializer, and attribute converter.
///
/// Purely functional over its input/output buffers; safe to share across
/// threads as long as the injected serializers are.
pub struct EnvelopeStreamer {
    envelope_serializer: Arc<dyn EnvelopeSerializer>,
    data_serializer: Arc<dyn DataSerializer>,
}

impl EnvelopeStreamer {
    pub fn new(
        envelope_serializer: Arc<dyn EnvelopeSerializer>,
        data_serializer: Arc<dyn DataSerializer>,
    ) -> Self {
        Self {
            envelope_serializer,
            data_serializer,
        }
    }

    /// Streamer over a message registry with the default JSON metadata
    /// serializer.
    pub fn with_registry(registry: Arc<MessageRegistry>) -> Self {
        Self::new(Arc::new(JsonEnvelopeSerializer), registry)
    }

    /// Encode an envelope into a full data message, header first.
    pub fn encode(&self, envelope: &MessageEnvelope) -> Result<Vec<u8>, CodecError> {
        let mut content = Vec::new();
        let mut item_contracts = Vec::with_capacity(envelope.items().len());

        for item in envelope.items() {
            let payload = match item.content() {
                ItemContent::Typed(payload) => payload.as_ref(),
                ItemContent::Raw(_) => {
                    return Err(CodecError::UnmappedContractType {
                        type_name: "undecoded raw payload".to_string(),
                    })
                }
            };
            let contract_name = item
                .mapped_type()
                .and_then(|type_id| self.data_serializer.contract_name_by_type(type_id))
                .ok_or_else(|| CodecError::UnmappedContractType {
                    type_name: item.type_name().unwrap_or("unregistered payload type").to_string(),
                })?;

            // Item size is the serializer's position delta, not a length
            // prefix inside the payload bytes.
            let start = content.len();
            self.data_serializer.serialize(payload, &mut content)?;
            let content_size = (content.len() - start) as u64;

            let attributes = convert::item_attributes_to_contract(item.attributes())?;
            item_contracts.push(ItemContract::new(contract_name, content_size, attributes));
        }

        let envelope_attributes = convert::envelope_attributes_to_contract(envelope.attributes())?;
        let contract = EnvelopeContract::new(
            envelope.envelope_id(),
            envelope_attributes,
            item_contracts,
            envelope.deliver_on(),
        );

        // Reserve the header region, write metadata after it, then backpatch.
        let mut out = vec![0u8; MessageHeader::FIXED_SIZE];
        self.envelope_serializer.serialize_envelope(&mut out, &contract)?;
        let envelope_bytes = (out.len() - MessageHeader::FIXED_SIZE) as u64;
        out.extend_from_slice(&content);

        let header = MessageHeader::new(DATA_FORMAT_VERSION, envelope_bytes, 0);
        header.write_to(&mut out[..MessageHeader::FIXED_SIZE]);
        Ok(out)
    }

    /// Decode a full data message back into an envelope.
    ///
    /// Items whose contract name resolves to a registered type come back
    /// typed; unknown contract names are preserved as raw bytes so newer
    /// message types can roll out without breaking older readers. The input
    /// buffer is never mutated.
    pub fn decode(&self, buffer: &[u8]) -> Result<MessageEnvelope, CodecError> {
        let header = MessageHeader::read_from(buffer).ok_or(CodecError::Truncated {
            needed: MessageHeader::FIXED_SIZE,
            available: buffer.len(),
        })?;
        if header.message_format_version != DATA_FORMAT_VERSION {
            return Err(CodecError::UnsupportedFormatVersion {
                found: header.message_format_version,
            });
        }

        let metadata_end = MessageHeader::FIXED_SIZE + header.envelope_bytes as usize;
        if buffer.len() < metadata_end {
            return Err(CodecError::Truncated {
                needed: metadata_end,
                available: buffer.len(),
            });
        }
        let contract = self
            .envelope_serializer
            .deserialize_envelope(&buffer[MessageHeader::FIXED_SIZE..metadata_end])?;

        let mut items = Vec::with_capacity(contract.items.len());
        let mut offset = metadata_end;
        for item_contract in &contract.items {
            let end = offset + item_contract.content_size as usize;
            if buffer.len() < end {
                return Err(CodecError::Truncated {
                    needed: end,
                    available: buffer.len(),
                });
            }
            let payload = &buffer[offset..end];
            let attributes = convert::item_attributes_from_contract(&item_contract.attributes)?;

            match self.data_serializer.contract_type_by_name(&item_contract.contract_name) {
                Some(type_id) => {
                    let instance = self
                        .data_serializer
                        .deserialize(payload, &item_contract.contract_name)?;
                    items.push(MessageItem::decoded_typed(type_id, instance, attributes));
                }
                None => {
                    // Unknown message type: keep the bytes instead of failing
                    // the whole envelope.
                    debug!(
                        contract_name = %item_contract.contract_name,
                        size = item_contract.content_size,
                        "contract name is not registered, keeping payload as raw bytes"
                    );
                    items.push(MessageItem::decoded_raw(payload.to_vec(), attributes));
                }
            }
            offset = end;
        }

        let attributes = convert::attributes_from_contract(&contract.attributes)?;
        Ok(MessageEnvelope::assemble(
            contract.envelope_id,
            attributes,
            items,
            contract.deliver_on_utc,
        ))
    }

    /// Encode a claim-check reference as a signature-prefixed UTF-16LE text
    /// blob. CRLF separators are part of the wire contract.
    pub fn encode_reference(&self, reference: &EnvelopeReference) -> Vec<u8> {
        let text = format!(
            "{}\r\n{}\r\n{}\r\n{}",
            REFERENCE_SIGNATURE,
            reference.envelope_id,
            reference.storage_container,
            reference.storage_reference
        );
        encode_utf16le(&text)
    }

    /// Check whether a buffer is a reference message and decode it if so.
    ///
    /// Returns `Ok(None)` for any buffer that does not start with the exact
    /// signature bytes, including empty, truncated, and full data-message
    /// buffers. This is the discriminator callers use to route a received
    /// buffer. A buffer that matches the signature but lacks the three
    /// fields fails with [`CodecError::MalformedReference`].
    pub fn try_decode_reference(
        &self,
        buffer: &[u8],
    ) -> Result<Option<EnvelopeReference>, CodecError> {
        let signature = encode_utf16le(REFERENCE_SIGNATURE);
        if buffer.len() < signature.len() || buffer[..signature.len()] != signature[..] {
            return Ok(None);
        }

        let text = decode_utf16le(buffer)?;
        let fields: Vec<&str> = text.split("\r\n").filter(|s| !s.is_empty()).collect();
        if fields.len() < 4 {
            return Err(CodecError::MalformedReference);
        }
        Ok(Some(EnvelopeReference::new(fields[1], fields[2], fields[3])))
    }
}
