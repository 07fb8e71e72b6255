//! [`MessageBus`] over an MQTT broker.
//!
//! Incoming publishes are decoded as [`MessageEnvelope`] JSON and fanned out
//! to local subscribers through one broadcast channel per exact topic, the
//! same routing the in-process bus uses.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use metahub_app::ports::{MessageBus, MessageEnvelope, Subscription};
use metahub_domain::error::MetaError;

use crate::config::MqttConfig;
use crate::error::MqttError;

/// Requests the client may queue before `publish` waits on the event loop.
const REQUEST_CAPACITY: usize = 64;
/// Pause after a connection error before polling again.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type Topics = HashMap<String, broadcast::Sender<MessageEnvelope>>;

/// Local fan-out of broker messages, keyed by exact topic.
#[derive(Clone)]
struct Routes {
    capacity: usize,
    topics: Arc<Mutex<Topics>>,
}

impl Routes {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Topics> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn receiver(&self, topic: &str) -> broadcast::Receiver<MessageEnvelope> {
        self.lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    fn remove(&self, topic: &str) {
        self.lock().remove(topic);
    }

    fn topics(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn dispatch(&self, topic: &str, payload: &[u8]) {
        let Some(sender) = self.lock().get(topic).cloned() else {
            tracing::trace!(topic, "no local subscriber");
            return;
        };
        match serde_json::from_slice::<MessageEnvelope>(payload) {
            Ok(envelope) => {
                // fails only without receivers
                let _ = sender.send(envelope);
            }
            Err(err) => tracing::warn!(topic, %err, "dropping malformed envelope"),
        }
    }
}

/// MQTT backed message bus.
pub struct MqttMessageBus {
    client: AsyncClient,
    routes: Routes,
}

impl MqttMessageBus {
    /// Create the client and the event loop that drives it.
    ///
    /// Nothing touches the network until the event loop is polled, see
    /// [`MqttMessageBus::connect`].
    #[must_use]
    pub fn new(config: &MqttConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(config.keep_alive());
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let bus = Self {
            client,
            routes: Routes::new(config.channel_capacity),
        };
        (bus, eventloop)
    }

    /// Create the bus and spawn the task polling the broker connection.
    ///
    /// The task reconnects on error and restores subscriptions after every
    /// connection acknowledgement. Abort the handle to disconnect.
    #[must_use]
    pub fn connect(config: &MqttConfig) -> (Self, JoinHandle<()>) {
        let (bus, eventloop) = Self::new(config);
        let handle = tokio::spawn(drive(eventloop, bus.client.clone(), bus.routes.clone()));
        tracing::info!(
            host = %config.broker_host,
            port = config.broker_port,
            client_id = %config.client_id,
            "MQTT message bus started"
        );
        (bus, handle)
    }

    async fn publish_inner(&self, topic: &str, envelope: MessageEnvelope) -> Result<(), MqttError> {
        let payload = serde_json::to_vec(&envelope).map_err(MqttError::Encode)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn subscribe_inner(&self, topic: &str) -> Result<Subscription, MqttError> {
        let receiver = self.routes.receiver(topic);
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(Subscription::new(topic, receiver))
    }

    async fn unsubscribe_inner(&self, topic: &str) -> Result<(), MqttError> {
        self.routes.remove(topic);
        self.client.unsubscribe(topic).await?;
        Ok(())
    }
}

impl MessageBus for MqttMessageBus {
    fn publish(
        &self,
        topic: &str,
        envelope: MessageEnvelope,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        async move { Ok(self.publish_inner(topic, envelope).await?) }
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<Subscription, MetaError>> + Send {
        async move { Ok(self.subscribe_inner(topic).await?) }
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), MetaError>> + Send {
        async move { Ok(self.unsubscribe_inner(topic).await?) }
    }
}

async fn drive(mut eventloop: EventLoop, client: AsyncClient, routes: Routes) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let topic = String::from_utf8_lossy(publish.topic.as_ref());
                routes.dispatch(&topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("connected to MQTT broker");
                for topic in routes.topics() {
                    if let Err(err) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        tracing::warn!(%topic, %err, "failed to restore MQTT subscription");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%err, "MQTT connection error, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(request_id: &str) -> MessageEnvelope {
        MessageEnvelope::json("corr", request_id, &serde_json::json!({"ok": true})).unwrap()
    }

    #[tokio::test]
    async fn should_route_decoded_envelope_to_subscribers() {
        let routes = Routes::new(4);
        let mut receiver = routes.receiver("edgex/response/ds/1");

        let payload = serde_json::to_vec(&envelope("1")).unwrap();
        routes.dispatch("edgex/response/ds/1", &payload);

        assert_eq!(receiver.recv().await.unwrap().request_id, "1");
    }

    #[tokio::test]
    async fn should_drop_malformed_payload() {
        let routes = Routes::new(4);
        let mut receiver = routes.receiver("t");

        routes.dispatch("t", b"not json");
        routes.dispatch("t", &serde_json::to_vec(&envelope("2")).unwrap());

        assert_eq!(receiver.recv().await.unwrap().request_id, "2");
    }

    #[test]
    fn should_ignore_topics_without_subscriber() {
        let routes = Routes::new(4);
        routes.dispatch("nobody/listens", b"{}");
        assert!(routes.topics().is_empty());
    }

    #[tokio::test]
    async fn should_register_and_forget_local_routes() {
        let (bus, _eventloop) = MqttMessageBus::new(&MqttConfig::default());

        let subscription = bus.subscribe("edgex/response/ds/9").await.unwrap();
        assert_eq!(subscription.topic(), "edgex/response/ds/9");
        assert_eq!(bus.routes.topics(), vec!["edgex/response/ds/9".to_string()]);

        bus.unsubscribe("edgex/response/ds/9").await.unwrap();
        assert!(bus.routes.topics().is_empty());
    }
}
