//! Device registry.
//!
//! Writes run in a fixed order: reference checks, the remote validation
//! handshake, then the admission permit around the single datastore write.
//! The permit is never held while waiting on a device service.

use metahub_domain::device::{Device, DevicePatch};
use metahub_domain::error::{MetaError, ValidationError};
use metahub_domain::event::SystemEventAction;

use super::{ensure_same_name, not_found, page, require_name};
use crate::guards::{CapacityGuard, IntegrityGuard};
use crate::ports::{MessageBus, MetadataStore, Paged};
use crate::propagation::{Change, ChangeNotifier};
use crate::validation::DeviceValidator;

/// Application service for devices.
pub struct DeviceRegistry<S, B> {
    store: S,
    integrity: IntegrityGuard<S>,
    capacity: CapacityGuard<S>,
    validator: DeviceValidator<B>,
    notifier: ChangeNotifier,
    max_result_count: u32,
}

impl<S: MetadataStore, B: MessageBus> DeviceRegistry<S, B> {
    pub fn new(
        store: S,
        integrity: IntegrityGuard<S>,
        capacity: CapacityGuard<S>,
        validator: DeviceValidator<B>,
        notifier: ChangeNotifier,
        max_result_count: u32,
    ) -> Self {
        Self {
            store,
            integrity,
            capacity,
            validator,
            notifier,
            max_result_count,
        }
    }

    /// Register a new device after its service accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] for a malformed device, a missing
    /// service or profile, a taken name or a capacity ceiling,
    /// [`MetaError::Remote`] or [`MetaError::Unavailable`] when the handshake
    /// fails, or a storage error.
    #[tracing::instrument(skip(self, device), fields(device = %device.name, service = %device.service_name))]
    pub async fn add(&self, device: Device, correlation_id: &str) -> Result<Device, MetaError> {
        device.validate()?;
        self.integrity.require_service(&device.service_name).await?;
        if device.has_profile() {
            self.integrity.require_profile(&device.profile_name).await?;
        }
        if self.store.device_by_name(&device.name).await?.is_some() {
            return Err(ValidationError::DuplicateName {
                entity: "device",
                name: device.name,
            }
            .into());
        }

        self.validator.validate(&device, correlation_id).await?;

        let permit = self.capacity.admission().await;
        if device.has_profile() {
            self.integrity.require_profile(&device.profile_name).await?;
        }
        self.capacity.check_new_device(&permit, &device).await?;
        let added = self.store.add_device(device).await?;
        drop(permit);

        tracing::debug!(id = %added.id, %correlation_id, "device created");
        self.notifier.submit(
            correlation_id,
            Change::Device {
                action: SystemEventAction::Add,
                device: added.clone(),
                previous_service: None,
            },
        );
        Ok(added)
    }

    /// Apply a partial update to the device designated by `patch.id` or
    /// `patch.name`.
    ///
    /// The owning service is asked again when protocols change or the device
    /// moves to another service; in the latter case the new service decides.
    ///
    /// # Errors
    ///
    /// Same as [`DeviceRegistry::add`], plus [`MetaError::NotFound`] when the
    /// device does not exist.
    #[tracing::instrument(skip(self, patch))]
    pub async fn patch(&self, patch: DevicePatch, correlation_id: &str) -> Result<(), MetaError> {
        if let Some(service_name) = patch.service_name.as_deref() {
            self.integrity.require_service(service_name).await?;
        }
        if let Some(profile_name) = patch.profile_name.as_deref().filter(|p| !p.is_empty()) {
            self.integrity.require_profile(profile_name).await?;
        }

        let device = match (patch.id, patch.name.as_deref()) {
            (Some(id), _) => self
                .store
                .device_by_id(id)
                .await?
                .ok_or_else(|| not_found("device", id))?,
            (None, Some(name)) => self.get_by_name(name).await?,
            (None, None) => {
                return Err(ValidationError::EmptyField {
                    field: "id or name",
                }
                .into());
            }
        };
        ensure_same_name("device", patch.name.as_deref(), &device.name)?;

        if patch.needs_remote_validation(&device) {
            let mut candidate = device.clone();
            patch.clone().apply_to(&mut candidate);
            candidate.validate()?;
            self.validator.validate(&candidate, correlation_id).await?;
        }

        // the handshake ran outside the section; apply the patch again to
        // whatever is stored now
        let permit = self.capacity.admission().await;
        let mut device = self
            .store
            .device_by_id(device.id)
            .await?
            .ok_or_else(|| not_found("device", device.id))?;
        if let Some(profile_name) = patch.profile_name.as_deref().filter(|p| !p.is_empty()) {
            self.integrity.require_profile(profile_name).await?;
        }
        let previous_profile = device.profile_name.clone();
        let previous_service = device.service_name.clone();
        patch.apply_to(&mut device);
        device.validate()?;
        self.capacity
            .check_profile_swap(&permit, &previous_profile, &device.profile_name)
            .await?;
        self.store.update_device(device.clone()).await?;
        drop(permit);

        tracing::debug!(device = %device.name, %correlation_id, "device patched");
        let previous_service = (previous_service != device.service_name).then_some(previous_service);
        self.notifier.submit(
            correlation_id,
            Change::Device {
                action: SystemEventAction::Update,
                device,
                previous_service,
            },
        );
        Ok(())
    }

    /// Look up a device by name.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when no such device exists.
    pub async fn get_by_name(&self, name: &str) -> Result<Device, MetaError> {
        require_name(name)?;
        self.store
            .device_by_name(name)
            .await?
            .ok_or_else(|| not_found("device", name))
    }

    /// Whether a device called `name` exists.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn name_exists(&self, name: &str) -> Result<bool, MetaError> {
        require_name(name)?;
        Ok(self.store.device_by_name(name).await?.is_some())
    }

    /// List devices carrying all `labels`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list(
        &self,
        offset: u32,
        limit: i32,
        labels: &[String],
    ) -> Result<Paged<Device>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store.devices(page, labels).await
    }

    /// List devices owned by `service_name`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list_by_service(
        &self,
        service_name: &str,
        offset: u32,
        limit: i32,
    ) -> Result<Paged<Device>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store.devices_by_service(page, service_name).await
    }

    /// List devices using profile `profile_name`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list_by_profile(
        &self,
        profile_name: &str,
        offset: u32,
        limit: i32,
    ) -> Result<Paged<Device>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store.devices_by_profile(page, profile_name).await
    }

    /// Delete a device. Nothing references devices, so no guard applies.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when missing, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_name(&self, name: &str, correlation_id: &str) -> Result<(), MetaError> {
        let device = self.get_by_name(name).await?;
        self.store.delete_device(name).await?;
        tracing::debug!(device = name, %correlation_id, "device deleted");

        self.notifier.submit(
            correlation_id,
            Change::Device {
                action: SystemEventAction::Delete,
                device,
                previous_service: None,
            },
        );
        Ok(())
    }
}
