//! Device service registry.

use metahub_domain::device_service::{DeviceService, DeviceServicePatch};
use metahub_domain::error::{MetaError, ValidationError};
use metahub_domain::event::SystemEventAction;

use super::{ensure_same_name, not_found, page, require_name};
use crate::guards::IntegrityGuard;
use crate::ports::{MetadataStore, Paged};
use crate::propagation::{Change, ChangeNotifier};

/// Application service for device service CRUD.
pub struct DeviceServiceRegistry<S> {
    store: S,
    integrity: IntegrityGuard<S>,
    notifier: ChangeNotifier,
    max_result_count: u32,
}

impl<S: MetadataStore> DeviceServiceRegistry<S> {
    pub fn new(
        store: S,
        integrity: IntegrityGuard<S>,
        notifier: ChangeNotifier,
        max_result_count: u32,
    ) -> Self {
        Self {
            store,
            integrity,
            notifier,
            max_result_count,
        }
    }

    /// Register a new device service.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] if invariants fail or the name is
    /// taken, or a storage error.
    #[tracing::instrument(skip(self, service), fields(service = %service.name))]
    pub async fn add(
        &self,
        service: DeviceService,
        correlation_id: &str,
    ) -> Result<DeviceService, MetaError> {
        service.validate()?;
        let added = self.store.add_device_service(service).await?;
        tracing::debug!(id = %added.id, %correlation_id, "device service created");
        self.notifier.submit(
            correlation_id,
            Change::Service {
                action: SystemEventAction::Add,
                service: added.clone(),
            },
        );
        Ok(added)
    }

    /// Look up a device service by name.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when no such service exists.
    pub async fn get_by_name(&self, name: &str) -> Result<DeviceService, MetaError> {
        require_name(name)?;
        self.store
            .device_service_by_name(name)
            .await?
            .ok_or_else(|| not_found("device service", name))
    }

    /// Whether a service called `name` exists.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn name_exists(&self, name: &str) -> Result<bool, MetaError> {
        require_name(name)?;
        Ok(self.store.device_service_by_name(name).await?.is_some())
    }

    /// List services carrying all `labels`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list(
        &self,
        offset: u32,
        limit: i32,
        labels: &[String],
    ) -> Result<Paged<DeviceService>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store.device_services(page, labels).await
    }

    /// Apply a partial update to the service designated by `patch.id` or
    /// `patch.name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when the target is missing,
    /// [`MetaError::Validation`] when id and name disagree or the result is
    /// invalid, or a storage error.
    #[tracing::instrument(skip(self, patch))]
    pub async fn patch(
        &self,
        patch: DeviceServicePatch,
        correlation_id: &str,
    ) -> Result<(), MetaError> {
        let mut service = match (patch.id, patch.name.as_deref()) {
            (Some(id), _) => self
                .store
                .device_service_by_id(id)
                .await?
                .ok_or_else(|| not_found("device service", id))?,
            (None, Some(name)) => self.get_by_name(name).await?,
            (None, None) => {
                return Err(ValidationError::EmptyField {
                    field: "id or name",
                }
                .into());
            }
        };
        ensure_same_name("device service", patch.name.as_deref(), &service.name)?;

        patch.apply_to(&mut service);
        service.validate()?;
        self.store.update_device_service(service.clone()).await?;
        tracing::debug!(service = %service.name, %correlation_id, "device service patched");

        self.notifier.submit(
            correlation_id,
            Change::Service {
                action: SystemEventAction::Update,
                service,
            },
        );
        Ok(())
    }

    /// Delete a service no device or provision watcher references.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when missing, [`MetaError::Conflict`]
    /// while something still references it, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_name(&self, name: &str, correlation_id: &str) -> Result<(), MetaError> {
        let service = self.get_by_name(name).await?;
        self.integrity.ensure_service_unreferenced(name).await?;
        self.store.delete_device_service(name).await?;
        tracing::debug!(service = name, %correlation_id, "device service deleted");

        self.notifier.submit(
            correlation_id,
            Change::Service {
                action: SystemEventAction::Delete,
                service,
            },
        );
        Ok(())
    }
}
