//! Request/reply over publish/subscribe.
//!
//! The caller subscribes to a reply topic unique to the request, publishes the
//! request, then waits for exactly one envelope or the deadline. The reply
//! subscription is always torn down, whichever way the exchange ends.

use std::time::Duration;

use metahub_domain::error::MetaError;

use crate::ports::{MessageBus, MessageEnvelope};

/// Why a request did not get a reply.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The bus refused to subscribe or publish.
    #[error("transport failure")]
    Transport(#[source] MetaError),

    /// Nothing arrived before the deadline.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The reply topic was closed before anything arrived.
    #[error("reply channel closed")]
    Closed,
}

/// Typed request/reply client layered on a [`MessageBus`].
pub struct RequestReply<B> {
    bus: B,
    timeout: Duration,
}

impl<B: MessageBus> RequestReply<B> {
    pub fn new(bus: B, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Publish `request` on `request_topic` and wait for one envelope on
    /// `reply_topic`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the bus fails, [`RpcError::Timeout`]
    /// when the deadline passes and [`RpcError::Closed`] when the reply topic
    /// closes first.
    pub async fn call(
        &self,
        request_topic: &str,
        reply_topic: &str,
        request: MessageEnvelope,
    ) -> Result<MessageEnvelope, RpcError> {
        let mut subscription = self
            .bus
            .subscribe(reply_topic)
            .await
            .map_err(RpcError::Transport)?;

        let exchange = async {
            self.bus
                .publish(request_topic, request)
                .await
                .map_err(RpcError::Transport)?;
            subscription.recv().await.ok_or(RpcError::Closed)
        };
        let outcome = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(self.timeout)),
        };

        if let Err(err) = self.bus.unsubscribe(reply_topic).await {
            tracing::warn!(topic = reply_topic, error = %err, "failed to unsubscribe reply topic");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::message_bus::InProcessMessageBus;
    use crate::testing::RecordingBus;

    fn request() -> MessageEnvelope {
        MessageEnvelope::json("corr-1", "req-1", &serde_json::json!({"ping": true})).unwrap()
    }

    #[tokio::test]
    async fn should_return_reply_published_on_reply_topic() {
        let bus = Arc::new(InProcessMessageBus::new(8));
        let mut requests = bus.subscribe("svc/request").await.unwrap();
        let responder = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                let incoming = requests.recv().await.unwrap();
                let reply = MessageEnvelope {
                    payload: serde_json::json!("pong"),
                    ..incoming
                };
                bus.publish("svc/reply/req-1", reply).await.unwrap();
            })
        };

        let rpc = RequestReply::new(Arc::clone(&bus), Duration::from_secs(1));
        let reply = rpc
            .call("svc/request", "svc/reply/req-1", request())
            .await
            .unwrap();

        assert_eq!(reply.payload_text(), "pong");
        assert_eq!(reply.correlation_id, "corr-1");
        responder.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_when_nobody_answers() {
        let bus = Arc::new(InProcessMessageBus::new(8));
        let rpc = RequestReply::new(Arc::clone(&bus), Duration::from_millis(250));

        let result = rpc.call("svc/request", "svc/reply/x", request()).await;

        assert!(matches!(result, Err(RpcError::Timeout(d)) if d == Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_unsubscribe_reply_topic_after_timeout() {
        let bus = Arc::new(RecordingBus::default());
        let rpc = RequestReply::new(Arc::clone(&bus), Duration::from_millis(10));

        let _ = rpc.call("svc/request", "svc/reply/y", request()).await;

        assert_eq!(bus.unsubscribed(), vec!["svc/reply/y".to_string()]);
        assert_eq!(bus.published_topics(), vec!["svc/request".to_string()]);
    }
}
