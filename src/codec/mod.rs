//! Envelope codec: binary framing, wire contracts, attribute conversion, and
//! the claim-check reference protocol.

pub mod contract;
pub mod convert;
pub mod header;
pub mod streamer;

pub use contract::{
    EnvelopeAttributeContract, EnvelopeAttributeKind, EnvelopeContract, ItemAttributeContract,
    ItemAttributeKind, ItemContract,
};
pub use convert::AttributeError;
pub use header::{MessageHeader, DATA_FORMAT_VERSION};
pub use streamer::{CodecError, EnvelopeStreamer, REFERENCE_SIGNATURE};
