//! Remote validation handshake.
//!
//! Before a device is created or its protocols change, the owning device
//! service is asked over the bus whether it accepts the configuration. A
//! rejection or silence aborts the write; there is no retry here.

use std::time::Duration;

use serde::Serialize;

use metahub_domain::device::Device;
use metahub_domain::error::{MetaError, RemoteError};
use metahub_domain::event::API_VERSION;
use metahub_domain::id::RequestId;

use crate::ports::{MessageBus, MessageEnvelope};
use crate::rpc::{RequestReply, RpcError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateDeviceRequest<'a> {
    api_version: &'static str,
    request_id: String,
    device: &'a Device,
}

/// Topic a device service listens on for validation requests.
#[must_use]
pub fn request_topic(base: &str, service_name: &str) -> String {
    join_topic(base, &[service_name, "validatedevice"])
}

/// Topic the reply to request `request_id` is expected on.
#[must_use]
pub fn reply_topic(base: &str, service_name: &str, request_id: &str) -> String {
    join_topic(base, &["response", service_name, request_id])
}

fn join_topic(base: &str, levels: &[&str]) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        levels.join("/")
    } else {
        format!("{base}/{}", levels.join("/"))
    }
}

/// Asks owning device services to approve device protocol settings.
pub struct DeviceValidator<B> {
    rpc: Option<RequestReply<B>>,
    base_topic: String,
}

impl<B: MessageBus> DeviceValidator<B> {
    /// Validator using `bus`; `None` means every validation fails as unavailable.
    pub fn new(bus: Option<B>, base_topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            rpc: bus.map(|bus| RequestReply::new(bus, timeout)),
            base_topic: base_topic.into(),
        }
    }

    /// Ask `device.service_name` whether it accepts `device`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Remote`] when the service answers with an error and
    /// [`MetaError::Unavailable`] when there is no bus, the transport fails or
    /// the request times out.
    #[tracing::instrument(skip(self, device), fields(device = %device.name, service = %device.service_name))]
    pub async fn validate(&self, device: &Device, correlation_id: &str) -> Result<(), MetaError> {
        let service = device.service_name.as_str();
        let Some(rpc) = &self.rpc else {
            return Err(unavailable(service, "no message bus configured"));
        };

        let request_id = RequestId::new().to_string();
        let request = ValidateDeviceRequest {
            api_version: API_VERSION,
            request_id: request_id.clone(),
            device,
        };
        let envelope = MessageEnvelope::json(correlation_id, request_id.as_str(), &request)?;

        let reply = rpc
            .call(
                &request_topic(&self.base_topic, service),
                &reply_topic(&self.base_topic, service, &request_id),
                envelope,
            )
            .await
            .map_err(|err| {
                let reason = match &err {
                    RpcError::Transport(source) => format!("{err}: {source}"),
                    RpcError::Timeout(_) | RpcError::Closed => err.to_string(),
                };
                unavailable(service, &reason)
            })?;

        if reply.is_error() {
            return Err(RemoteError {
                service: service.to_string(),
                message: reply.payload_text(),
            }
            .into());
        }
        tracing::debug!(%request_id, "device accepted by its service");
        Ok(())
    }
}

fn unavailable(service: &str, reason: &str) -> MetaError {
    MetaError::Unavailable {
        service: service.to_string(),
        reason: reason.to_string(),
    }
}
