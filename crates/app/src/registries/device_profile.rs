//! Device profile registry.
//!
//! Structural edits (resources and commands) pass the strict change policy
//! first, then the capacity guard when the profile is in use. Descriptive
//! edits through [`ProfileBasicInfoPatch`] skip both.
//!
//! Every rewrite of a stored profile reads it inside the admission section
//! and writes it back before leaving, so a concurrent edit is never
//! overwritten with a stale copy.

use metahub_domain::error::{MetaError, ValidationError};
use metahub_domain::event::SystemEventAction;
use metahub_domain::profile::{DeviceCommand, DeviceProfile, DeviceResource, ProfileBasicInfoPatch};

use super::{ensure_same_name, not_found, page, require_name};
use crate::guards::{AdmissionPermit, CapacityGuard, IntegrityGuard};
use crate::ports::{MetadataStore, Paged};
use crate::propagation::{Change, ChangeNotifier};

/// Application service for device profiles and their resources and commands.
pub struct DeviceProfileRegistry<S> {
    store: S,
    integrity: IntegrityGuard<S>,
    capacity: CapacityGuard<S>,
    notifier: ChangeNotifier,
    max_result_count: u32,
}

impl<S: MetadataStore> DeviceProfileRegistry<S> {
    pub fn new(
        store: S,
        integrity: IntegrityGuard<S>,
        capacity: CapacityGuard<S>,
        notifier: ChangeNotifier,
        max_result_count: u32,
    ) -> Self {
        Self {
            store,
            integrity,
            capacity,
            notifier,
            max_result_count,
        }
    }

    /// Register a new profile. A fresh profile is unused, so no capacity
    /// check applies.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] if the profile is malformed or its
    /// name is taken, or a storage error.
    #[tracing::instrument(skip(self, profile), fields(profile = %profile.name))]
    pub async fn add(
        &self,
        profile: DeviceProfile,
        correlation_id: &str,
    ) -> Result<DeviceProfile, MetaError> {
        profile.validate()?;
        let added = self.store.add_device_profile(profile).await?;
        tracing::debug!(id = %added.id, %correlation_id, "device profile created");
        self.notify(correlation_id, SystemEventAction::Add, added.clone());
        Ok(added)
    }

    /// Replace the whole definition of the profile named `profile.name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Locked`] under the strict change policy,
    /// [`MetaError::NotFound`] when the profile does not exist, a capacity
    /// validation error when the in-use resource ceiling would be passed, or
    /// a storage error.
    #[tracing::instrument(skip(self, profile), fields(profile = %profile.name))]
    pub async fn update(&self, mut profile: DeviceProfile, correlation_id: &str) -> Result<(), MetaError> {
        self.integrity.ensure_profile_changes_allowed()?;
        profile.validate()?;

        let permit = self.capacity.admission().await;
        let existing = self.get_by_name(&profile.name).await?;
        profile.id = existing.id;
        profile.created = existing.created;
        profile.modified = metahub_domain::time::now();
        self.capacity
            .check_profile_resource_edit(&permit, &profile)
            .await?;
        self.persist(permit, profile, correlation_id).await
    }

    /// Apply a descriptive patch (description, manufacturer, model, labels).
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when the target is missing,
    /// [`MetaError::Validation`] when id and name disagree, or a storage error.
    #[tracing::instrument(skip(self, patch))]
    pub async fn patch_basic_info(
        &self,
        patch: ProfileBasicInfoPatch,
        correlation_id: &str,
    ) -> Result<(), MetaError> {
        let permit = self.capacity.admission().await;
        let mut profile = match (patch.id, patch.name.as_deref()) {
            (Some(id), _) => self
                .store
                .device_profile_by_id(id)
                .await?
                .ok_or_else(|| not_found("device profile", id))?,
            (None, Some(name)) => self.get_by_name(name).await?,
            (None, None) => {
                return Err(ValidationError::EmptyField {
                    field: "id or name",
                }
                .into());
            }
        };
        ensure_same_name("device profile", patch.name.as_deref(), &profile.name)?;

        patch.apply_to(&mut profile);
        self.persist(permit, profile, correlation_id).await
    }

    /// Look up a profile by name.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when no such profile exists.
    pub async fn get_by_name(&self, name: &str) -> Result<DeviceProfile, MetaError> {
        require_name(name)?;
        self.store
            .device_profile_by_name(name)
            .await?
            .ok_or_else(|| not_found("device profile", name))
    }

    /// List profiles carrying all `labels`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list(
        &self,
        offset: u32,
        limit: i32,
        labels: &[String],
    ) -> Result<Paged<DeviceProfile>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store.device_profiles(page, labels).await
    }

    /// List profiles from one manufacturer.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list_by_manufacturer(
        &self,
        manufacturer: &str,
        offset: u32,
        limit: i32,
    ) -> Result<Paged<DeviceProfile>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store
            .device_profiles_by_manufacturer(page, manufacturer)
            .await
    }

    /// List profiles of one model.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list_by_model(
        &self,
        model: &str,
        offset: u32,
        limit: i32,
    ) -> Result<Paged<DeviceProfile>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store.device_profiles_by_model(page, model).await
    }

    /// Delete a profile nothing references.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Locked`] under the strict delete policy,
    /// [`MetaError::NotFound`] when missing, [`MetaError::Conflict`] while a
    /// device or provision watcher references it, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_name(&self, name: &str, correlation_id: &str) -> Result<(), MetaError> {
        self.integrity.ensure_profile_deletes_allowed()?;
        // devices are admitted inside the section, so none can start using
        // the profile between the reference check and the delete
        let permit = self.capacity.admission().await;
        let profile = self.get_by_name(name).await?;
        self.integrity.ensure_profile_unreferenced(name).await?;
        self.store.delete_device_profile(name).await?;
        drop(permit);
        tracing::debug!(profile = name, %correlation_id, "device profile deleted");
        self.notify(correlation_id, SystemEventAction::Delete, profile);
        Ok(())
    }

    /// Append `resource` to profile `profile_name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Locked`] under the strict change policy,
    /// [`MetaError::NotFound`] for an unknown profile,
    /// [`ValidationError::DuplicateName`] when the resource exists, a capacity
    /// validation error, or a storage error.
    #[tracing::instrument(skip(self, resource), fields(resource = %resource.name))]
    pub async fn add_resource(
        &self,
        profile_name: &str,
        resource: DeviceResource,
        correlation_id: &str,
    ) -> Result<(), MetaError> {
        self.integrity.ensure_profile_changes_allowed()?;

        let permit = self.capacity.admission().await;
        let mut profile = self.get_by_name(profile_name).await?;
        if profile.resource(&resource.name).is_some() {
            return Err(ValidationError::DuplicateName {
                entity: "device resource",
                name: resource.name,
            }
            .into());
        }
        self.capacity
            .check_new_profile_resource(&permit, profile_name, &resource)
            .await?;
        profile.device_resources.push(resource);
        profile.validate()?;
        profile.modified = metahub_domain::time::now();
        self.persist(permit, profile, correlation_id).await
    }

    /// Remove resource `resource_name` from profile `profile_name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Locked`] under the strict change policy,
    /// [`MetaError::NotFound`] for an unknown profile or resource,
    /// [`MetaError::Conflict`] while devices use the profile,
    /// [`MetaError::Validation`] when a command still references the resource,
    /// or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_resource(
        &self,
        profile_name: &str,
        resource_name: &str,
        correlation_id: &str,
    ) -> Result<(), MetaError> {
        self.integrity.ensure_profile_changes_allowed()?;

        let permit = self.capacity.admission().await;
        let mut profile = self.get_by_name(profile_name).await?;
        self.integrity
            .ensure_profile_unused_by_devices(profile_name, "delete resource of")
            .await?;
        profile.remove_resource(resource_name)?;
        profile.validate()?;
        profile.modified = metahub_domain::time::now();
        self.persist(permit, profile, correlation_id).await
    }

    /// Append `command` to profile `profile_name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Locked`] under the strict change policy,
    /// [`MetaError::NotFound`] for an unknown profile,
    /// [`MetaError::Validation`] when the command is a duplicate or references
    /// an unknown resource, or a storage error.
    #[tracing::instrument(skip(self, command), fields(command = %command.name))]
    pub async fn add_command(
        &self,
        profile_name: &str,
        command: DeviceCommand,
        correlation_id: &str,
    ) -> Result<(), MetaError> {
        self.integrity.ensure_profile_changes_allowed()?;

        let permit = self.capacity.admission().await;
        let mut profile = self.get_by_name(profile_name).await?;
        if profile.command(&command.name).is_some() {
            return Err(ValidationError::DuplicateName {
                entity: "device command",
                name: command.name,
            }
            .into());
        }
        profile.device_commands.push(command);
        profile.validate()?;
        profile.modified = metahub_domain::time::now();
        self.capacity
            .check_profile_resource_edit(&permit, &profile)
            .await?;
        self.persist(permit, profile, correlation_id).await
    }

    /// Remove command `command_name` from profile `profile_name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Locked`] under the strict change policy,
    /// [`MetaError::NotFound`] for an unknown profile or command, or a storage
    /// error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_command(
        &self,
        profile_name: &str,
        command_name: &str,
        correlation_id: &str,
    ) -> Result<(), MetaError> {
        self.integrity.ensure_profile_changes_allowed()?;

        let permit = self.capacity.admission().await;
        let mut profile = self.get_by_name(profile_name).await?;
        profile.remove_command(command_name)?;
        profile.validate()?;
        profile.modified = metahub_domain::time::now();
        self.capacity
            .check_profile_resource_edit(&permit, &profile)
            .await?;
        self.persist(permit, profile, correlation_id).await
    }

    /// Write `profile` back, leave the admission section, then notify.
    async fn persist(
        &self,
        permit: AdmissionPermit,
        profile: DeviceProfile,
        correlation_id: &str,
    ) -> Result<(), MetaError> {
        self.store.update_device_profile(profile.clone()).await?;
        drop(permit);

        tracing::debug!(profile = %profile.name, %correlation_id, "device profile updated");
        self.notify(correlation_id, SystemEventAction::Update, profile);
        Ok(())
    }

    fn notify(&self, correlation_id: &str, action: SystemEventAction, profile: DeviceProfile) {
        self.notifier
            .submit(correlation_id, Change::Profile { action, profile });
    }
}
