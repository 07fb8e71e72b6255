//! Device command: a composite read/write over several device resources.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resource::ReadWrite;

/// One step of a [`DeviceCommand`]: which resource it touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOperation {
    /// Must name a [`DeviceResource`](super::resource::DeviceResource) of the same profile.
    pub device_resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_value: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mappings: BTreeMap<String, String>,
}

impl ResourceOperation {
    #[must_use]
    pub fn on(device_resource: impl Into<String>) -> Self {
        Self {
            device_resource: device_resource.into(),
            default_value: String::new(),
            mappings: BTreeMap::new(),
        }
    }
}

/// A named group of resource operations executed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCommand {
    pub name: String,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub read_write: ReadWrite,
    pub resource_operations: Vec<ResourceOperation>,
}

impl DeviceCommand {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        read_write: ReadWrite,
        resource_operations: Vec<ResourceOperation>,
    ) -> Self {
        Self {
            name: name.into(),
            is_hidden: false,
            read_write,
            resource_operations,
        }
    }

    /// Names of the resources this command touches, in order.
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resource_operations
            .iter()
            .map(|op| op.device_resource.as_str())
    }
}
