//! Bidirectional conversion between runtime attribute dictionaries and their
//! on-wire discriminated contracts.
//!
//! Pure and total: no I/O, every input either converts or fails with a
//! precise error. Both directions match exhaustively on the kind enums, so a
//! kind added to the contract module without a matching arm here fails to
//! compile.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;

use crate::codec::contract::{
    EnvelopeAttributeContract, EnvelopeAttributeKind, ItemAttributeContract, ItemAttributeKind,
};
use crate::envelope::{attribute_keys, AttributeValue};

/// Error type for attribute conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeError {
    /// The wire carried a kind tag this implementation does not know.
    UnrecognizedKind(u8),
    /// The runtime value under `key` has no wire representation.
    UnsupportedValueType { key: String },
    /// A timestamp string on the wire did not parse as RFC 3339.
    MalformedTimestamp(String),
    /// A contract was missing a field its kind requires.
    MissingField { kind: &'static str, field: &'static str },
    /// The operation is deliberately unimplemented.
    NotSupported(&'static str),
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeError::UnrecognizedKind(tag) => {
                write!(f, "unrecognized attribute kind tag {}", tag)
            }
            AttributeError::UnsupportedValueType { key } => {
                write!(f, "attribute '{}' has a value type with no wire representation", key)
            }
            AttributeError::MalformedTimestamp(value) => {
                write!(f, "malformed attribute timestamp '{}'", value)
            }
            AttributeError::MissingField { kind, field } => {
                write!(f, "attribute contract of kind {} is missing {}", kind, field)
            }
            AttributeError::NotSupported(what) => write!(f, "{} is not supported", what),
        }
    }
}

impl std::error::Error for AttributeError {}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    // AutoSi keeps exactly the sub-second digits the value has, so the string
    // parses back to the identical instant.
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AttributeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AttributeError::MalformedTimestamp(value.to_string()))
}

/// Decode envelope-scoped attribute contracts into the runtime dictionary.
pub fn attributes_from_contract(
    contracts: &[EnvelopeAttributeContract],
) -> Result<IndexMap<String, AttributeValue>, AttributeError> {
    let mut dict = IndexMap::with_capacity(contracts.len());

    for contract in contracts {
        let kind = EnvelopeAttributeKind::from_tag(contract.kind)
            .ok_or(AttributeError::UnrecognizedKind(contract.kind))?;
        match kind {
            EnvelopeAttributeKind::CreatedUtc => {
                let value = contract.string_value.as_deref().ok_or(
                    AttributeError::MissingField { kind: "created-utc", field: "string_value" },
                )?;
                dict.insert(
                    attribute_keys::CREATED_UTC.to_string(),
                    AttributeValue::Timestamp(parse_timestamp(value)?),
                );
            }
            EnvelopeAttributeKind::Sender => {
                let value = contract.string_value.clone().ok_or(
                    AttributeError::MissingField { kind: "sender", field: "string_value" },
                )?;
                dict.insert(attribute_keys::SENDER.to_string(), AttributeValue::String(value));
            }
            EnvelopeAttributeKind::CustomString => {
                let name = contract.custom_name.clone().ok_or(
                    AttributeError::MissingField { kind: "custom-string", field: "custom_name" },
                )?;
                let value = contract.string_value.clone().ok_or(
                    AttributeError::MissingField { kind: "custom-string", field: "string_value" },
                )?;
                dict.insert(name, AttributeValue::String(value));
            }
            EnvelopeAttributeKind::CustomNumber => {
                let name = contract.custom_name.clone().ok_or(
                    AttributeError::MissingField { kind: "custom-number", field: "custom_name" },
                )?;
                let value = contract.number_value.ok_or(
                    AttributeError::MissingField { kind: "custom-number", field: "number_value" },
                )?;
                dict.insert(name, AttributeValue::Number(value));
            }
        }
    }
    Ok(dict)
}

/// Decode item-scoped attribute contracts into the runtime dictionary.
pub fn item_attributes_from_contract(
    contracts: &[ItemAttributeContract],
) -> Result<IndexMap<String, AttributeValue>, AttributeError> {
    let mut dict = IndexMap::with_capacity(contracts.len());

    for contract in contracts {
        let kind = ItemAttributeKind::from_tag(contract.kind)
            .ok_or(AttributeError::UnrecognizedKind(contract.kind))?;
        match kind {
            ItemAttributeKind::CustomString => {
                let name = contract.custom_name.clone().ok_or(
                    AttributeError::MissingField { kind: "custom-string", field: "custom_name" },
                )?;
                let value = contract.string_value.clone().ok_or(
                    AttributeError::MissingField { kind: "custom-string", field: "string_value" },
                )?;
                dict.insert(name, AttributeValue::String(value));
            }
            ItemAttributeKind::CustomNumber => {
                let name = contract.custom_name.clone().ok_or(
                    AttributeError::MissingField { kind: "custom-number", field: "custom_name" },
                )?;
                let value = contract.number_value.ok_or(
                    AttributeError::MissingField { kind: "custom-number", field: "number_value" },
                )?;
                dict.insert(name, AttributeValue::Number(value));
            }
        }
    }
    Ok(dict)
}

/// Encode the envelope-level attribute dictionary to wire contracts.
///
/// The well-known `created-utc` and `sender` keys get their dedicated kinds;
/// everything else becomes a custom string or custom number. Any other value
/// type fails with [`AttributeError::UnsupportedValueType`].
pub fn envelope_attributes_to_contract(
    attributes: &IndexMap<String, AttributeValue>,
) -> Result<Vec<EnvelopeAttributeContract>, AttributeError> {
    let mut contracts = Vec::with_capacity(attributes.len());

    for (key, value) in attributes {
        let contract = match key.as_str() {
            attribute_keys::CREATED_UTC => match value {
                AttributeValue::Timestamp(t) => EnvelopeAttributeContract {
                    kind: EnvelopeAttributeKind::CreatedUtc.tag(),
                    custom_name: None,
                    string_value: Some(format_timestamp(*t)),
                    number_value: None,
                },
                _ => return Err(AttributeError::UnsupportedValueType { key: key.clone() }),
            },
            attribute_keys::SENDER => match value {
                AttributeValue::String(s) => EnvelopeAttributeContract {
                    kind: EnvelopeAttributeKind::Sender.tag(),
                    custom_name: None,
                    string_value: Some(s.clone()),
                    number_value: None,
                },
                _ => return Err(AttributeError::UnsupportedValueType { key: key.clone() }),
            },
            _ => match value {
                AttributeValue::String(s) => EnvelopeAttributeContract {
                    kind: EnvelopeAttributeKind::CustomString.tag(),
                    custom_name: Some(key.clone()),
                    string_value: Some(s.clone()),
                    number_value: None,
                },
                AttributeValue::Number(n) => EnvelopeAttributeContract {
                    kind: EnvelopeAttributeKind::CustomNumber.tag(),
                    custom_name: Some(key.clone()),
                    string_value: None,
                    number_value: Some(*n),
                },
                AttributeValue::Timestamp(_) | AttributeValue::Float(_) => {
                    return Err(AttributeError::UnsupportedValueType { key: key.clone() })
                }
            },
        };
        contracts.push(contract);
    }
    Ok(contracts)
}

/// Encode item-level custom attributes to wire contracts.
///
/// Known limitation carried over from the wire format's reference behavior:
/// only the decode direction is implemented. A non-empty item attribute set
/// fails with [`AttributeError::NotSupported`].
pub fn item_attributes_to_contract(
    attributes: &IndexMap<String, AttributeValue>,
) -> Result<Vec<ItemAttributeContract>, AttributeError> {
    if attributes.is_empty() {
        return Ok(Vec::new());
    }
    Err(AttributeError::NotSupported("encoding item attributes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_envelope_attributes_round_trip() {
        let created = Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);

        let mut attributes = IndexMap::new();
        attributes.insert(
            attribute_keys::CREATED_UTC.to_string(),
            AttributeValue::Timestamp(created),
        );
        attributes.insert(
            attribute_keys::SENDER.to_string(),
            AttributeValue::String("svc-a".to_string()),
        );
        attributes.insert("x".to_string(), AttributeValue::String("hello".to_string()));
        attributes.insert("n".to_string(), AttributeValue::Number(42));

        let contracts = envelope_attributes_to_contract(&attributes).unwrap();
        assert_eq!(contracts.len(), 4);

        let decoded = attributes_from_contract(&contracts).unwrap();
        assert_eq!(decoded, attributes);
    }

    #[test]
    fn test_timestamp_precision_is_preserved() {
        let precise = Utc.timestamp_opt(1_700_000_000, 987_654_321).unwrap();
        let formatted = format_timestamp(precise);
        assert_eq!(parse_timestamp(&formatted).unwrap(), precise);

        // Whole-second timestamps survive too.
        let whole = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let formatted = format_timestamp(whole);
        assert_eq!(parse_timestamp(&formatted).unwrap(), whole);
    }

    #[test]
    fn test_float_value_is_rejected() {
        let mut attributes = IndexMap::new();
        attributes.insert("ratio".to_string(), AttributeValue::Float(0.5));

        let err = envelope_attributes_to_contract(&attributes).unwrap_err();
        assert_eq!(err, AttributeError::UnsupportedValueType { key: "ratio".to_string() });
    }

    #[test]
    fn test_timestamp_under_custom_key_is_rejected() {
        let mut attributes = IndexMap::new();
        attributes.insert("seen-at".to_string(), AttributeValue::Timestamp(Utc::now()));

        let err = envelope_attributes_to_contract(&attributes).unwrap_err();
        assert_eq!(err, AttributeError::UnsupportedValueType { key: "seen-at".to_string() });
    }

    #[test]
    fn test_well_known_keys_never_use_custom_kinds() {
        let mut attributes = IndexMap::new();
        attributes.insert(
            attribute_keys::SENDER.to_string(),
            AttributeValue::String("svc-a".to_string()),
        );
        let contracts = envelope_attributes_to_contract(&attributes).unwrap();
        assert_eq!(contracts[0].kind, EnvelopeAttributeKind::Sender.tag());
        assert_eq!(contracts[0].custom_name, None);
    }

    #[test]
    fn test_unknown_kind_tag_is_an_error() {
        let contracts = vec![EnvelopeAttributeContract {
            kind: 9,
            custom_name: None,
            string_value: None,
            number_value: None,
        }];
        assert_eq!(
            attributes_from_contract(&contracts).unwrap_err(),
            AttributeError::UnrecognizedKind(9)
        );

        let item_contracts = vec![ItemAttributeContract {
            kind: 0, // created-utc tag is envelope-only
            custom_name: None,
            string_value: None,
            number_value: None,
        }];
        assert_eq!(
            item_attributes_from_contract(&item_contracts).unwrap_err(),
            AttributeError::UnrecognizedKind(0)
        );
    }

    #[test]
    fn test_item_attribute_decode_direction() {
        let contracts = vec![
            ItemAttributeContract {
                kind: ItemAttributeKind::CustomString.tag(),
                custom_name: Some("origin".to_string()),
                string_value: Some("edge".to_string()),
                number_value: None,
            },
            ItemAttributeContract {
                kind: ItemAttributeKind::CustomNumber.tag(),
                custom_name: Some("weight".to_string()),
                string_value: None,
                number_value: Some(12),
            },
        ];

        let dict = item_attributes_from_contract(&contracts).unwrap();
        assert_eq!(dict.get("origin"), Some(&AttributeValue::String("edge".to_string())));
        assert_eq!(dict.get("weight"), Some(&AttributeValue::Number(12)));
    }

    #[test]
    fn test_item_attribute_encode_is_not_supported() {
        let empty = IndexMap::new();
        assert!(item_attributes_to_contract(&empty).unwrap().is_empty());

        let mut attributes = IndexMap::new();
        attributes.insert("origin".to_string(), AttributeValue::String("edge".to_string()));
        assert_eq!(
            item_attributes_to_contract(&attributes).unwrap_err(),
            AttributeError::NotSupported("encoding item attributes")
        );
    }

    #[test]
    fn test_malformed_timestamp_is_an_error() {
        let contracts = vec![EnvelopeAttributeContract {
            kind: EnvelopeAttributeKind::CreatedUtc.tag(),
            custom_name: None,
            string_value: Some("not-a-timestamp".to_string()),
            number_value: None,
        }];
        assert!(matches!(
            attributes_from_contract(&contracts).unwrap_err(),
            AttributeError::MalformedTimestamp(_)
        ));
    }
}
