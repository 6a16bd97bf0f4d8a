//! Per-invocation context handed to consumers alongside the decoded message.

use chrono::{DateTime, Utc};

use crate::envelope::{MessageEnvelope, MessageItem};

/// Default context type: transport-level facts about the message being
/// handled. Callers needing more substitute their own context type through
/// the dispatcher's context factory.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    /// Id of the envelope the message arrived in.
    pub envelope_id: String,
    /// Position of the message within the envelope's items.
    pub item_index: usize,
    /// Envelope creation time, when the sender recorded one.
    pub created_utc: Option<DateTime<Utc>>,
}

/// Builds a context value from the envelope, the item, and the item's index.
pub type ContextFactory<Ctx> =
    dyn Fn(&MessageEnvelope, &MessageItem, usize) -> Ctx + Send + Sync;

/// The default factory producing [`MessageContext`].
pub fn default_context_factory() -> Box<ContextFactory<MessageContext>> {
    Box::new(|envelope, _item, index| MessageContext {
        envelope_id: envelope.envelope_id().to_string(),
        item_index: index,
        created_utc: envelope.created_utc(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::attribute_keys;

    #[test]
    fn test_default_factory_carries_envelope_facts() {
        let created = Utc::now();
        let envelope = MessageEnvelope::new("env-1")
            .with_attribute(attribute_keys::CREATED_UTC, created)
            .with_item(crate::envelope::MessageItem::typed(1u8));

        let factory = default_context_factory();
        let context = factory(&envelope, &envelope.items()[0], 0);

        assert_eq!(context.envelope_id, "env-1");
        assert_eq!(context.item_index, 0);
        assert_eq!(context.created_utc, Some(created));
    }
}
