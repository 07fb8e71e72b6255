//! Device service callback port: tells an owning service what changed.
//!
//! Every call is best effort: the propagator logs failures and moves on.

use std::future::Future;
use std::sync::Arc;

use metahub_domain::device::Device;
use metahub_domain::device_service::DeviceService;
use metahub_domain::error::MetaError;
use metahub_domain::profile::DeviceProfile;
use metahub_domain::provision_watcher::ProvisionWatcher;

/// Outbound notifications addressed to one device service.
///
/// `service` is the stored record of the callee, resolved at call time so the
/// latest base address is used.
pub trait DeviceServiceCallback: Send + Sync + 'static {
    fn device_added(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn device_updated(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn device_removed(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn profile_updated(
        &self,
        service: &DeviceService,
        profile: &DeviceProfile,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn watcher_added(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn watcher_updated(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn watcher_removed(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn service_updated(
        &self,
        service: &DeviceService,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;
}

impl<T: DeviceServiceCallback> DeviceServiceCallback for Arc<T> {
    fn device_added(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).device_added(service, device)
    }

    fn device_updated(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).device_updated(service, device)
    }

    fn device_removed(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).device_removed(service, device)
    }

    fn profile_updated(
        &self,
        service: &DeviceService,
        profile: &DeviceProfile,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).profile_updated(service, profile)
    }

    fn watcher_added(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).watcher_added(service, watcher)
    }

    fn watcher_updated(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).watcher_updated(service, watcher)
    }

    fn watcher_removed(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).watcher_removed(service, watcher)
    }

    fn service_updated(
        &self,
        service: &DeviceService,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        (**self).service_updated(service)
    }
}
