//! Message bus port: topic based publish/subscribe with JSON envelopes.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use metahub_domain::error::MetaError;
use metahub_domain::event::API_VERSION;

/// Content type of every envelope this service emits.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Unit of transport on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub content_type: String,
    /// Non-zero when the sender reports a failure.
    #[serde(default)]
    pub error_code: u8,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// JSON envelope around `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Storage`] if `payload` cannot be serialized.
    pub fn json<T: Serialize>(
        correlation_id: impl Into<String>,
        request_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, MetaError> {
        Ok(Self {
            api_version: API_VERSION.to_string(),
            correlation_id: correlation_id.into(),
            request_id: request_id.into(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            error_code: 0,
            payload: serde_json::to_value(payload).map_err(MetaError::storage)?,
        })
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }

    /// Human readable rendering of the payload, used for remote error messages.
    #[must_use]
    pub fn payload_text(&self) -> String {
        match &self.payload {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map_or_else(|| self.payload.to_string(), str::to_string),
            other => other.to_string(),
        }
    }
}

/// Stream of envelopes received on one topic.
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<MessageEnvelope>,
}

impl Subscription {
    #[must_use]
    pub fn new(topic: impl Into<String>, receiver: broadcast::Receiver<MessageEnvelope>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next envelope. `None` once the topic is closed.
    pub async fn recv(&mut self) -> Option<MessageEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publish/subscribe transport.
pub trait MessageBus: Send + Sync + 'static {
    /// Publish one envelope to `topic`.
    fn publish(
        &self,
        topic: &str,
        envelope: MessageEnvelope,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    /// Start receiving envelopes published to `topic` from now on.
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<Subscription, MetaError>> + Send;

    /// Stop routing `topic`; open subscriptions observe a closed stream.
    ///
    /// A topic has a single owner: unsubscribing closes every local
    /// subscription to it, not only the caller's. Reply topics carry the
    /// request id, so concurrent round trips never share one.
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), MetaError>> + Send;
}

impl<T: MessageBus> MessageBus for Arc<T> {
    fn publish(
        &self,
        topic: &str,
        envelope: MessageEnvelope,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).publish(topic, envelope)
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<Subscription, MetaError>> + Send {
        (**self).subscribe(topic)
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).unsubscribe(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_prefer_message_field_when_rendering_payload() {
        let envelope = MessageEnvelope {
            error_code: 1,
            payload: serde_json::json!({"message": "unsupported protocol"}),
            ..MessageEnvelope::json("c", "r", &()).unwrap()
        };
        assert!(envelope.is_error());
        assert_eq!(envelope.payload_text(), "unsupported protocol");
    }

    #[test]
    fn should_fall_back_to_raw_payload_text() {
        let envelope = MessageEnvelope {
            payload: serde_json::json!("bad address"),
            ..MessageEnvelope::json("c", "r", &()).unwrap()
        };
        assert_eq!(envelope.payload_text(), "bad address");
    }

    #[test]
    fn should_default_missing_envelope_fields() {
        let envelope: MessageEnvelope = serde_json::from_str(r#"{"requestId":"abc"}"#).unwrap();
        assert_eq!(envelope.request_id, "abc");
        assert!(!envelope.is_error());
        assert!(envelope.payload.is_null());
    }
}
