//! Device service: the remote process that owns and talks to devices.

use serde::{Deserialize, Serialize};

use crate::error::{MetaError, ValidationError};
use crate::id::DeviceServiceId;
use crate::state::AdminState;
use crate::time::{Timestamp, now};

/// A device service registered in the catalog.
///
/// Devices and provision watchers point at a service by `name`; removing a
/// service never cascades to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceService {
    #[serde(default)]
    pub id: DeviceServiceId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Network base address used for HTTP callbacks (e.g. `http://ds-modbus:59901`).
    pub base_address: String,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default = "now")]
    pub created: Timestamp,
    #[serde(default = "now")]
    pub modified: Timestamp,
}

impl DeviceService {
    /// Create a builder for constructing a [`DeviceService`].
    #[must_use]
    pub fn builder() -> DeviceServiceBuilder {
        DeviceServiceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] when `name` or `base_address` is empty.
    pub fn validate(&self) -> Result<(), MetaError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.base_address.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "baseAddress",
            }
            .into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`DeviceService`].
#[derive(Debug, Default)]
pub struct DeviceServiceBuilder {
    id: Option<DeviceServiceId>,
    name: Option<String>,
    description: Option<String>,
    labels: Vec<String>,
    base_address: Option<String>,
    admin_state: AdminState,
}

impl DeviceServiceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceServiceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    #[must_use]
    pub fn base_address(mut self, base_address: impl Into<String>) -> Self {
        self.base_address = Some(base_address.into());
        self
    }

    #[must_use]
    pub fn admin_state(mut self, admin_state: AdminState) -> Self {
        self.admin_state = admin_state;
        self
    }

    /// Consume the builder, validate, and return a [`DeviceService`].
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] if `name` or `base_address` is missing.
    pub fn build(self) -> Result<DeviceService, MetaError> {
        let ts = now();
        let service = DeviceService {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            labels: self.labels,
            base_address: self.base_address.unwrap_or_default(),
            admin_state: self.admin_state,
            created: ts,
            modified: ts,
        };
        service.validate()?;
        Ok(service)
    }
}

/// Partial update of a [`DeviceService`], targeted by `id` or `name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceServicePatch {
    pub id: Option<DeviceServiceId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub labels: Option<Vec<String>>,
    pub base_address: Option<String>,
    pub admin_state: Option<AdminState>,
}

impl DeviceServicePatch {
    /// Overwrite the fields present in the patch.
    pub fn apply_to(self, service: &mut DeviceService) {
        if let Some(description) = self.description {
            service.description = description;
        }
        if let Some(labels) = self.labels {
            service.labels = labels;
        }
        if let Some(base_address) = self.base_address {
            service.base_address = base_address;
        }
        if let Some(admin_state) = self.admin_state {
            service.admin_state = admin_state;
        }
        service.modified = now();
    }
}
