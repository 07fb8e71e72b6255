//! [`DeviceServiceCallback`] over HTTP.
//!
//! Each device service exposes callback routes under
//! `<base_address>/api/v3/callback`. Additions are `POST`ed, updates `PUT`
//! and removals `DELETE`d by name.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::Serialize;

use metahub_app::ports::DeviceServiceCallback;
use metahub_domain::device::Device;
use metahub_domain::device_service::DeviceService;
use metahub_domain::error::MetaError;
use metahub_domain::event::API_VERSION;
use metahub_domain::id::RequestId;
use metahub_domain::profile::DeviceProfile;
use metahub_domain::provision_watcher::ProvisionWatcher;

use crate::error::CallbackError;

const CALLBACK_ROOT: &str = "/api/v3/callback";

/// Versioned request body, carrying exactly one entity.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackRequest<'a> {
    api_version: &'static str,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<&'a Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<&'a DeviceProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provision_watcher: Option<&'a ProvisionWatcher>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<&'a DeviceService>,
}

impl CallbackRequest<'_> {
    fn new() -> Self {
        Self {
            api_version: API_VERSION,
            request_id: RequestId::new().to_string(),
            ..Self::default()
        }
    }
}

/// Join a service base address and a callback path.
fn endpoint(base_address: &str, path: &str) -> String {
    format!("{}{CALLBACK_ROOT}{path}", base_address.trim_end_matches('/'))
}

/// HTTP client calling device services back.
#[derive(Debug, Clone)]
pub struct HttpCallbacks {
    client: Client,
}

impl HttpCallbacks {
    /// Build a client whose every request gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError::Http`] when the TLS backend cannot be
    /// initialised.
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        method: Method,
        service: &DeviceService,
        path: &str,
        body: Option<CallbackRequest<'_>>,
    ) -> Result<(), CallbackError> {
        let url = endpoint(&service.base_address, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = &body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::Status { url, status });
        }
        tracing::debug!(service = %service.name, %method, %url, "callback delivered");
        Ok(())
    }
}

impl DeviceServiceCallback for HttpCallbacks {
    fn device_added(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let body = CallbackRequest {
            device: Some(device),
            ..CallbackRequest::new()
        };
        async move { Ok(self.send(Method::POST, service, "/device", Some(body)).await?) }
    }

    fn device_updated(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let body = CallbackRequest {
            device: Some(device),
            ..CallbackRequest::new()
        };
        async move { Ok(self.send(Method::PUT, service, "/device", Some(body)).await?) }
    }

    fn device_removed(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let path = format!("/device/name/{}", device.name);
        async move { Ok(self.send(Method::DELETE, service, &path, None).await?) }
    }

    fn profile_updated(
        &self,
        service: &DeviceService,
        profile: &DeviceProfile,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let body = CallbackRequest {
            profile: Some(profile),
            ..CallbackRequest::new()
        };
        async move { Ok(self.send(Method::PUT, service, "/profile", Some(body)).await?) }
    }

    fn watcher_added(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let body = CallbackRequest {
            provision_watcher: Some(watcher),
            ..CallbackRequest::new()
        };
        async move { Ok(self.send(Method::POST, service, "/watcher", Some(body)).await?) }
    }

    fn watcher_updated(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let body = CallbackRequest {
            provision_watcher: Some(watcher),
            ..CallbackRequest::new()
        };
        async move { Ok(self.send(Method::PUT, service, "/watcher", Some(body)).await?) }
    }

    fn watcher_removed(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let path = format!("/watcher/name/{}", watcher.name);
        async move { Ok(self.send(Method::DELETE, service, &path, None).await?) }
    }

    fn service_updated(
        &self,
        service: &DeviceService,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let body = CallbackRequest {
            service: Some(service),
            ..CallbackRequest::new()
        };
        async move { Ok(self.send(Method::PUT, service, "/service", Some(body)).await?) }
    }
}
