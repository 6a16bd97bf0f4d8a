//! On-wire metadata contracts for the envelope section of a data message.
//!
//! These records describe everything about an envelope except the payload
//! bytes themselves: id, attributes, per-item contract names and sizes, and
//! the optional delivery time. They are what the envelope serializer writes
//! between the fixed header and the payload section.
//!
//! Attribute kinds travel as small integer tags. A tag added by a newer
//! writer decodes into the metadata record just fine and is rejected with a
//! precise error at conversion time, instead of failing the whole metadata
//! block inside the serializer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope-scoped attribute kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeAttributeKind {
    CreatedUtc,
    Sender,
    CustomString,
    CustomNumber,
}

impl EnvelopeAttributeKind {
    pub fn tag(self) -> u8 {
        match self {
            EnvelopeAttributeKind::CreatedUtc => 0,
            EnvelopeAttributeKind::Sender => 1,
            EnvelopeAttributeKind::CustomString => 2,
            EnvelopeAttributeKind::CustomNumber => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EnvelopeAttributeKind::CreatedUtc),
            1 => Some(EnvelopeAttributeKind::Sender),
            2 => Some(EnvelopeAttributeKind::CustomString),
            3 => Some(EnvelopeAttributeKind::CustomNumber),
            _ => None,
        }
    }
}

/// Item-scoped attribute kinds. Tags are shared with the envelope scope so
/// the custom kinds read the same everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAttributeKind {
    CustomString,
    CustomNumber,
}

impl ItemAttributeKind {
    pub fn tag(self) -> u8 {
        match self {
            ItemAttributeKind::CustomString => 2,
            ItemAttributeKind::CustomNumber => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            2 => Some(ItemAttributeKind::CustomString),
            3 => Some(ItemAttributeKind::CustomNumber),
            _ => None,
        }
    }
}

/// One envelope-scoped attribute on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeAttributeContract {
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_value: Option<i64>,
}

/// One item-scoped attribute on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributeContract {
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_value: Option<i64>,
}

/// Metadata for one payload item: contract name, payload byte count, and
/// item-scoped attributes. The size is the only way item boundaries are
/// recovered on decode; payload bytes carry no length prefix of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemContract {
    pub contract_name: String,
    pub content_size: u64,
    #[serde(default)]
    pub attributes: Vec<ItemAttributeContract>,
}

impl ItemContract {
    pub fn new(
        contract_name: impl Into<String>,
        content_size: u64,
        attributes: Vec<ItemAttributeContract>,
    ) -> Self {
        Self {
            contract_name: contract_name.into(),
            content_size,
            attributes,
        }
    }
}

/// The full envelope-metadata record written between header and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeContract {
    pub envelope_id: String,
    #[serde(default)]
    pub attributes: Vec<EnvelopeAttributeContract>,
    #[serde(default)]
    pub items: Vec<ItemContract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliver_on_utc: Option<DateTime<Utc>>,
}

impl EnvelopeContract {
    pub fn new(
        envelope_id: impl Into<String>,
        attributes: Vec<EnvelopeAttributeContract>,
        items: Vec<ItemContract>,
        deliver_on_utc: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            envelope_id: envelope_id.into(),
            attributes,
            items,
            deliver_on_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_kind_tags_round_trip() {
        for kind in [
            EnvelopeAttributeKind::CreatedUtc,
            EnvelopeAttributeKind::Sender,
            EnvelopeAttributeKind::CustomString,
            EnvelopeAttributeKind::CustomNumber,
        ] {
            assert_eq!(EnvelopeAttributeKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EnvelopeAttributeKind::from_tag(200), None);
    }

    #[test]
    fn test_item_kind_tags_match_envelope_custom_tags() {
        assert_eq!(
            ItemAttributeKind::CustomString.tag(),
            EnvelopeAttributeKind::CustomString.tag()
        );
        assert_eq!(
            ItemAttributeKind::CustomNumber.tag(),
            EnvelopeAttributeKind::CustomNumber.tag()
        );
        // The envelope-only kinds are invalid at item scope.
        assert_eq!(ItemAttributeKind::from_tag(0), None);
        assert_eq!(ItemAttributeKind::from_tag(1), None);
    }

    #[test]
    fn test_contract_serde_round_trip() {
        let contract = EnvelopeContract::new(
            "env-1",
            vec![EnvelopeAttributeContract {
                kind: EnvelopeAttributeKind::Sender.tag(),
                custom_name: None,
                string_value: Some("svc-a".to_string()),
                number_value: None,
            }],
            vec![ItemContract::new("orders/placed", 17, Vec::new())],
            None,
        );

        let bytes = serde_json::to_vec(&contract).unwrap();
        let decoded: EnvelopeContract = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, contract);
    }
}
