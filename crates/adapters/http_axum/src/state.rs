//! Shared application state for axum handlers.

use std::sync::Arc;

use metahub_app::ports::{MessageBus, MetadataStore};
use metahub_app::registries::{
    DeviceProfileRegistry, DeviceRegistry, DeviceServiceRegistry, ProvisionWatcherRegistry,
};

/// Application state shared across all axum handlers.
///
/// Generic over the store and the message bus to avoid dynamic dispatch.
/// `Clone` is implemented manually so the underlying types themselves do not
/// need to be `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<S, B> {
    pub device_services: Arc<DeviceServiceRegistry<S>>,
    pub device_profiles: Arc<DeviceProfileRegistry<S>>,
    pub devices: Arc<DeviceRegistry<S, B>>,
    pub provision_watchers: Arc<ProvisionWatcherRegistry<S>>,
}

impl<S, B> Clone for AppState<S, B> {
    fn clone(&self) -> Self {
        Self {
            device_services: Arc::clone(&self.device_services),
            device_profiles: Arc::clone(&self.device_profiles),
            devices: Arc::clone(&self.devices),
            provision_watchers: Arc::clone(&self.provision_watchers),
        }
    }
}

impl<S, B> AppState<S, B>
where
    S: MetadataStore,
    B: MessageBus,
{
    /// Create a new application state from registry instances.
    pub fn new(
        device_services: DeviceServiceRegistry<S>,
        device_profiles: DeviceProfileRegistry<S>,
        devices: DeviceRegistry<S, B>,
        provision_watchers: ProvisionWatcherRegistry<S>,
    ) -> Self {
        Self {
            device_services: Arc::new(device_services),
            device_profiles: Arc::new(device_profiles),
            devices: Arc::new(devices),
            provision_watchers: Arc::new(provision_watchers),
        }
    }
}
