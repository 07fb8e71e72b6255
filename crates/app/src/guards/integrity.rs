//! Referential integrity guard.
//!
//! Read-then-decide checks without any lock: a dependent created right after
//! the check is a tolerated race, since no aggregate ceiling is at stake.

use metahub_domain::device_service::DeviceService;
use metahub_domain::error::{ConflictError, LockedError, MetaError, ValidationError};
use metahub_domain::profile::DeviceProfile;

use crate::ports::{MetadataStore, Page};
use crate::settings::WritableReceiver;

/// Guards against dangling references and strict-policy violations.
#[derive(Clone)]
pub struct IntegrityGuard<S> {
    store: S,
    writable: WritableReceiver,
}

impl<S: MetadataStore> IntegrityGuard<S> {
    pub fn new(store: S, writable: WritableReceiver) -> Self {
        Self { store, writable }
    }

    /// Fail when structural profile edits are forbidden.
    ///
    /// # Errors
    ///
    /// Returns [`LockedError::ProfileChanges`] while the strict change policy is on.
    pub fn ensure_profile_changes_allowed(&self) -> Result<(), MetaError> {
        if self
            .writable
            .borrow()
            .profile_change
            .strict_device_profile_changes
        {
            return Err(LockedError::ProfileChanges.into());
        }
        Ok(())
    }

    /// Fail when profile deletion is forbidden.
    ///
    /// # Errors
    ///
    /// Returns [`LockedError::ProfileDeletes`] while the strict delete policy is on.
    pub fn ensure_profile_deletes_allowed(&self) -> Result<(), MetaError> {
        if self
            .writable
            .borrow()
            .profile_change
            .strict_device_profile_deletes
        {
            return Err(LockedError::ProfileDeletes.into());
        }
        Ok(())
    }

    /// Resolve the service a new or moved entity points at.
    ///
    /// # Errors
    ///
    /// A missing service is a contract violation of the incoming request, not
    /// a lookup miss, and is reported as [`ValidationError::MissingReference`].
    pub async fn require_service(&self, name: &str) -> Result<DeviceService, MetaError> {
        self.store
            .device_service_by_name(name)
            .await?
            .ok_or_else(|| {
                ValidationError::MissingReference {
                    entity: "device service",
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Resolve the profile a new or changed entity points at.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingReference`] when it does not exist.
    pub async fn require_profile(&self, name: &str) -> Result<DeviceProfile, MetaError> {
        self.store
            .device_profile_by_name(name)
            .await?
            .ok_or_else(|| {
                ValidationError::MissingReference {
                    entity: "device profile",
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Fail when any device still uses profile `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConflictError`] naming `action` when a device is found.
    pub async fn ensure_profile_unused_by_devices(
        &self,
        name: &str,
        action: &'static str,
    ) -> Result<(), MetaError> {
        let devices = self.store.devices_by_profile(Page::PROBE, name).await?;
        if devices.total > 0 {
            return Err(ConflictError {
                action,
                entity: "device profile",
                name: name.to_string(),
                dependent: "device",
            }
            .into());
        }
        Ok(())
    }

    /// Fail when a device or provision watcher still references profile `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConflictError`] naming the first dependent kind found.
    pub async fn ensure_profile_unreferenced(&self, name: &str) -> Result<(), MetaError> {
        self.ensure_profile_unused_by_devices(name, "delete").await?;
        let watchers = self
            .store
            .provision_watchers_by_profile(Page::PROBE, name)
            .await?;
        if watchers.total > 0 {
            return Err(ConflictError {
                action: "delete",
                entity: "device profile",
                name: name.to_string(),
                dependent: "provision watcher",
            }
            .into());
        }
        Ok(())
    }

    /// Fail when a device or provision watcher still references service `name`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConflictError`] naming the first dependent kind found.
    pub async fn ensure_service_unreferenced(&self, name: &str) -> Result<(), MetaError> {
        let devices = self.store.devices_by_service(Page::PROBE, name).await?;
        let dependent = if devices.total > 0 {
            Some("device")
        } else {
            let watchers = self
                .store
                .provision_watchers_by_service(Page::PROBE, name)
                .await?;
            (watchers.total > 0).then_some("provision watcher")
        };
        match dependent {
            Some(dependent) => Err(ConflictError {
                action: "delete",
                entity: "device service",
                name: name.to_string(),
                dependent,
            }
            .into()),
            None => Ok(()),
        }
    }
}
