//! In-process message bus backed by tokio broadcast channels, one per topic.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::broadcast;

use metahub_domain::error::MetaError;

use crate::ports::{MessageBus, MessageEnvelope, Subscription};

/// Topic router living inside the process.
///
/// Publishing succeeds even when nobody listens on the topic (the envelope is
/// simply dropped). Topics are matched exactly, without wildcards.
pub struct InProcessMessageBus {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<MessageEnvelope>>>,
}

impl InProcessMessageBus {
    /// Create a bus whose per-topic channels hold `capacity` envelopes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, topic: &str) -> Option<broadcast::Sender<MessageEnvelope>> {
        self.topics
            .lock()
            .ok()
            .and_then(|topics| topics.get(topic).cloned())
    }
}

impl Default for InProcessMessageBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MessageBus for InProcessMessageBus {
    fn publish(
        &self,
        topic: &str,
        envelope: MessageEnvelope,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        if let Some(sender) = self.sender(topic) {
            // fails only without receivers
            let _ = sender.send(envelope);
        }
        async { Ok(()) }
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<Subscription, MetaError>> + Send {
        let result = self
            .topics
            .lock()
            .map_err(|_| MetaError::storage("message bus topic table poisoned"))
            .map(|mut topics| {
                let receiver = topics
                    .entry(topic.to_string())
                    .or_insert_with(|| broadcast::channel(self.capacity).0)
                    .subscribe();
                Subscription::new(topic, receiver)
            });
        async { result }
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), MetaError>> + Send {
        if let Ok(mut topics) = self.topics.lock() {
            topics.remove(topic);
        }
        async { Ok(()) }
    }
}
