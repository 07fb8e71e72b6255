//! MQTT broker configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the MQTT message bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Prefix of every topic this service publishes or subscribes to.
    pub base_topic: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Envelopes buffered per subscribed topic before slow readers lag.
    pub channel_capacity: usize,
}

impl MqttConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "core-metadata".to_string(),
            base_topic: "edgex".to_string(),
            keep_alive_secs: 30,
            channel_capacity: 64,
        }
    }
}
