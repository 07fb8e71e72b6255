//! Storage port: row-level repository traits for the catalog.
//!
//! The datastore offers single-row reads and writes only. Nothing here spans
//! several rows atomically, which is why aggregate ceilings are enforced by
//! the admission guard rather than by the store.

use std::future::Future;

use metahub_domain::device::Device;
use metahub_domain::device_service::DeviceService;
use metahub_domain::error::MetaError;
use metahub_domain::id::{DeviceId, DeviceProfileId, DeviceServiceId, ProvisionWatcherId};
use metahub_domain::profile::DeviceProfile;
use metahub_domain::provision_watcher::ProvisionWatcher;

/// Window into a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    /// Single-row probe used by "is anything still referencing this" checks.
    pub const PROBE: Self = Self {
        offset: 0,
        limit: 1,
    };

    #[must_use]
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }
}

/// One page of results plus the size of the whole listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Paged<T> {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Repository for [`DeviceService`]s.
pub trait DeviceServiceRepository {
    /// Insert a new service. Fails with a duplicate-name validation error when
    /// the name is taken.
    fn add_device_service(
        &self,
        service: DeviceService,
    ) -> impl Future<Output = Result<DeviceService, MetaError>> + Send;

    fn device_service_by_id(
        &self,
        id: DeviceServiceId,
    ) -> impl Future<Output = Result<Option<DeviceService>, MetaError>> + Send;

    fn device_service_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<DeviceService>, MetaError>> + Send;

    /// List services carrying every label in `labels`, ordered by name.
    fn device_services(
        &self,
        page: Page,
        labels: &[String],
    ) -> impl Future<Output = Result<Paged<DeviceService>, MetaError>> + Send;

    fn update_device_service(
        &self,
        service: DeviceService,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn delete_device_service(&self, name: &str)
    -> impl Future<Output = Result<(), MetaError>> + Send;
}

/// Repository for [`DeviceProfile`]s.
pub trait DeviceProfileRepository {
    fn add_device_profile(
        &self,
        profile: DeviceProfile,
    ) -> impl Future<Output = Result<DeviceProfile, MetaError>> + Send;

    fn device_profile_by_id(
        &self,
        id: DeviceProfileId,
    ) -> impl Future<Output = Result<Option<DeviceProfile>, MetaError>> + Send;

    fn device_profile_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<DeviceProfile>, MetaError>> + Send;

    fn device_profiles(
        &self,
        page: Page,
        labels: &[String],
    ) -> impl Future<Output = Result<Paged<DeviceProfile>, MetaError>> + Send;

    fn device_profiles_by_manufacturer(
        &self,
        page: Page,
        manufacturer: &str,
    ) -> impl Future<Output = Result<Paged<DeviceProfile>, MetaError>> + Send;

    fn device_profiles_by_model(
        &self,
        page: Page,
        model: &str,
    ) -> impl Future<Output = Result<Paged<DeviceProfile>, MetaError>> + Send;

    fn update_device_profile(
        &self,
        profile: DeviceProfile,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn delete_device_profile(&self, name: &str)
    -> impl Future<Output = Result<(), MetaError>> + Send;
}

/// Repository for [`Device`]s.
pub trait DeviceRepository {
    fn add_device(&self, device: Device)
    -> impl Future<Output = Result<Device, MetaError>> + Send;

    fn device_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, MetaError>> + Send;

    fn device_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Device>, MetaError>> + Send;

    fn devices(
        &self,
        page: Page,
        labels: &[String],
    ) -> impl Future<Output = Result<Paged<Device>, MetaError>> + Send;

    fn devices_by_service(
        &self,
        page: Page,
        service_name: &str,
    ) -> impl Future<Output = Result<Paged<Device>, MetaError>> + Send;

    fn devices_by_profile(
        &self,
        page: Page,
        profile_name: &str,
    ) -> impl Future<Output = Result<Paged<Device>, MetaError>> + Send;

    /// Total number of devices.
    fn device_count(&self) -> impl Future<Output = Result<u64, MetaError>> + Send;

    /// Distinct non-empty profile names referenced by at least one device.
    fn profile_names_in_use(&self) -> impl Future<Output = Result<Vec<String>, MetaError>> + Send;

    /// Distinct service names owning a device of `profile_name`.
    fn service_names_by_profile(
        &self,
        profile_name: &str,
    ) -> impl Future<Output = Result<Vec<String>, MetaError>> + Send;

    fn update_device(&self, device: Device) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn delete_device(&self, name: &str) -> impl Future<Output = Result<(), MetaError>> + Send;
}

/// Repository for [`ProvisionWatcher`]s.
pub trait ProvisionWatcherRepository {
    fn add_provision_watcher(
        &self,
        watcher: ProvisionWatcher,
    ) -> impl Future<Output = Result<ProvisionWatcher, MetaError>> + Send;

    fn provision_watcher_by_id(
        &self,
        id: ProvisionWatcherId,
    ) -> impl Future<Output = Result<Option<ProvisionWatcher>, MetaError>> + Send;

    fn provision_watcher_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ProvisionWatcher>, MetaError>> + Send;

    fn provision_watchers(
        &self,
        page: Page,
        labels: &[String],
    ) -> impl Future<Output = Result<Paged<ProvisionWatcher>, MetaError>> + Send;

    fn provision_watchers_by_service(
        &self,
        page: Page,
        service_name: &str,
    ) -> impl Future<Output = Result<Paged<ProvisionWatcher>, MetaError>> + Send;

    fn provision_watchers_by_profile(
        &self,
        page: Page,
        profile_name: &str,
    ) -> impl Future<Output = Result<Paged<ProvisionWatcher>, MetaError>> + Send;

    fn update_provision_watcher(
        &self,
        watcher: ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;

    fn delete_provision_watcher(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<(), MetaError>> + Send;
}

/// Everything the registries need from the datastore.
///
/// Implementations are cheap to clone (a pool handle or an `Arc`).
pub trait MetadataStore:
    DeviceServiceRepository
    + DeviceProfileRepository
    + DeviceRepository
    + ProvisionWatcherRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> MetadataStore for T where
    T: DeviceServiceRepository
        + DeviceProfileRepository
        + DeviceRepository
        + ProvisionWatcherRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}
