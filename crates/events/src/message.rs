//! Messages as they sit in (and leave) a queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use eventrelay_core::EventId;

/// Queue-local delivery identifier.
///
/// A fresh tag is assigned every time a message enters a queue (first publish
/// and every requeue), so a verdict can only ever settle the delivery it was
/// issued for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What a publisher hands to an exchange.
///
/// The payload is opaque to the broker; `event_type` and `correlation_id`
/// let consumers tie a delivery back to its ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<EventId>,
    pub payload: JsonValue,
}

impl MessageBody {
    pub fn new(event_type: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            event_type: event_type.into(),
            correlation_id: None,
            payload,
        }
    }

    pub fn with_correlation(mut self, event_id: EventId) -> Self {
        self.correlation_id = Some(event_id);
        self
    }
}

/// A message delivered (or deliverable) from a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub delivery_tag: DeliveryTag,
    pub routing_key: String,
    pub body: MessageBody,
    /// How many times this message has been rejected and requeued.
    pub redelivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Message {
    pub fn is_redelivery(&self) -> bool {
        self.redelivery_count > 0
    }

    pub fn correlation_id(&self) -> Option<EventId> {
        self.body.correlation_id
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.payload.clone())
    }
}
