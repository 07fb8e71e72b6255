//! MQTT adapter error types.

use metahub_domain::error::MetaError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client rejected the request (event loop gone or full).
    #[error("MQTT client error")]
    Client(#[from] rumqttc::ClientError),

    /// Failed to encode an outgoing envelope.
    #[error("failed to encode MQTT payload")]
    Encode(#[source] serde_json::Error),
}

impl From<MqttError> for MetaError {
    fn from(err: MqttError) -> Self {
        Self::Storage(Box::new(err))
    }
}
