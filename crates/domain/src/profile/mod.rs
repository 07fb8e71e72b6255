//! Device profile: a reusable capability template for a class of device.
//!
//! A profile lists the [`DeviceResource`]s a device exposes and the
//! [`DeviceCommand`]s that group them. Devices and provision watchers refer
//! to a profile by name; the profile is never embedded into them.

pub mod command;
pub mod resource;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use command::{DeviceCommand, ResourceOperation};
pub use resource::{DeviceResource, ReadWrite, ResourceProperties, ValueType};

use crate::error::{MetaError, NotFoundError, ValidationError};
use crate::id::DeviceProfileId;
use crate::time::{Timestamp, now};

/// Capability template shared by every device of the same kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    #[serde(default)]
    pub id: DeviceProfileId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub device_resources: Vec<DeviceResource>,
    #[serde(default)]
    pub device_commands: Vec<DeviceCommand>,
    #[serde(default = "now")]
    pub created: Timestamp,
    #[serde(default = "now")]
    pub modified: Timestamp,
}

impl DeviceProfile {
    /// Create a builder for constructing a [`DeviceProfile`].
    #[must_use]
    pub fn builder() -> DeviceProfileBuilder {
        DeviceProfileBuilder::default()
    }

    /// Number of device resources, the unit the resource ceiling counts in.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.device_resources.len()
    }

    /// Find a resource by exact name, first match in list order.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&DeviceResource> {
        self.device_resources.iter().find(|r| r.name == name)
    }

    /// Find a command by exact name, first match in list order.
    #[must_use]
    pub fn command(&self, name: &str) -> Option<&DeviceCommand> {
        self.device_commands.iter().find(|c| c.name == name)
    }

    /// Remove the resource called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when the profile has no such resource.
    pub fn remove_resource(&mut self, name: &str) -> Result<DeviceResource, MetaError> {
        let index = self
            .device_resources
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| NotFoundError {
                entity: "device resource",
                id: name.to_string(),
            })?;
        Ok(self.device_resources.remove(index))
    }

    /// Remove the command called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when the profile has no such command.
    pub fn remove_command(&mut self, name: &str) -> Result<DeviceCommand, MetaError> {
        let index = self
            .device_commands
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| NotFoundError {
                entity: "device command",
                id: name.to_string(),
            })?;
        Ok(self.device_commands.remove(index))
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] when the name is empty, resource or
    /// command names repeat, a command shares a resource's name, or a
    /// resource operation points at a resource the profile does not define.
    pub fn validate(&self) -> Result<(), MetaError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }

        let mut resources = HashSet::with_capacity(self.device_resources.len());
        for resource in &self.device_resources {
            if resource.name.trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: "deviceResources.name",
                }
                .into());
            }
            if !resources.insert(resource.name.as_str()) {
                return Err(ValidationError::DuplicateName {
                    entity: "device resource",
                    name: resource.name.clone(),
                }
                .into());
            }
        }

        let mut commands = HashSet::with_capacity(self.device_commands.len());
        for command in &self.device_commands {
            if command.name.trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: "deviceCommands.name",
                }
                .into());
            }
            if !commands.insert(command.name.as_str()) {
                return Err(ValidationError::DuplicateName {
                    entity: "device command",
                    name: command.name.clone(),
                }
                .into());
            }
            if resources.contains(command.name.as_str()) {
                return Err(ValidationError::CommandShadowsResource(command.name.clone()).into());
            }
            if let Some(missing) = command.resource_names().find(|r| !resources.contains(r)) {
                return Err(ValidationError::UnknownResource {
                    command: command.name.clone(),
                    resource: missing.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Step-by-step builder for [`DeviceProfile`].
#[derive(Debug, Default)]
pub struct DeviceProfileBuilder {
    id: Option<DeviceProfileId>,
    name: Option<String>,
    description: Option<String>,
    manufacturer: Option<String>,
    model: Option<String>,
    labels: Vec<String>,
    device_resources: Vec<DeviceResource>,
    device_commands: Vec<DeviceCommand>,
}

impl DeviceProfileBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceProfileId) -> Self {
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
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    #[must_use]
    pub fn resource(mut self, resource: DeviceResource) -> Self {
        self.device_resources.push(resource);
        self
    }

    #[must_use]
    pub fn command(mut self, command: DeviceCommand) -> Self {
        self.device_commands.push(command);
        self
    }

    /// Consume the builder, validate, and return a [`DeviceProfile`].
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] if the profile breaks an invariant
    /// (see [`DeviceProfile::validate`]).
    pub fn build(self) -> Result<DeviceProfile, MetaError> {
        let ts = now();
        let profile = DeviceProfile {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            manufacturer: self.manufacturer.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            labels: self.labels,
            device_resources: self.device_resources,
            device_commands: self.device_commands,
            created: ts,
            modified: ts,
        };
        profile.validate()?;
        Ok(profile)
    }
}

/// Partial update of the descriptive fields of a profile.
///
/// Resources and commands are never touched by this patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBasicInfoPatch {
    pub id: Option<DeviceProfileId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub labels: Option<Vec<String>>,
}

impl ProfileBasicInfoPatch {
    /// Overwrite the fields present in the patch.
    pub fn apply_to(self, profile: &mut DeviceProfile) {
        if let Some(description) = self.description {
            profile.description = description;
        }
        if let Some(manufacturer) = self.manufacturer {
            profile.manufacturer = manufacturer;
        }
        if let Some(model) = self.model {
            profile.model = model;
        }
        if let Some(labels) = self.labels {
            profile.labels = labels;
        }
        profile.modified = now();
    }
}
