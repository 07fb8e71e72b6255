//! Provision watcher: an auto-discovery rule run by a device service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::device::AutoEvent;
use crate::error::{MetaError, ValidationError};
use crate::id::ProvisionWatcherId;
use crate::state::AdminState;
use crate::time::{Timestamp, now};

/// Template applied to every device the watcher discovers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    /// Profile assigned to discovered devices, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub auto_events: Vec<AutoEvent>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Matching rule for discovered devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionWatcher {
    #[serde(default)]
    pub id: ProvisionWatcherId,
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub service_name: String,
    /// Attribute name to regular expression a candidate must match.
    pub identifiers: BTreeMap<String, String>,
    /// Attribute name to values that exclude a candidate.
    #[serde(default)]
    pub blocking_identifiers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub discovered_device: DiscoveredDevice,
    #[serde(default = "now")]
    pub created: Timestamp,
    #[serde(default = "now")]
    pub modified: Timestamp,
}

impl ProvisionWatcher {
    /// Profile name discovered devices will use, empty-string aware.
    #[must_use]
    pub fn profile_name(&self) -> Option<&str> {
        self.discovered_device
            .profile_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] when the name or service name is
    /// empty, or when there are no identifiers to match on.
    pub fn validate(&self) -> Result<(), MetaError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.service_name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "serviceName",
            }
            .into());
        }
        if self.identifiers.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "identifiers",
            }
            .into());
        }
        Ok(())
    }
}

/// Partial update of a [`ProvisionWatcher`], targeted by `id` or `name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionWatcherPatch {
    pub id: Option<ProvisionWatcherId>,
    pub name: Option<String>,
    pub labels: Option<Vec<String>>,
    pub service_name: Option<String>,
    pub identifiers: Option<BTreeMap<String, String>>,
    pub blocking_identifiers: Option<BTreeMap<String, Vec<String>>>,
    pub admin_state: Option<AdminState>,
    pub discovered_device: Option<DiscoveredDevice>,
}

impl ProvisionWatcherPatch {
    /// Overwrite the fields present in the patch.
    pub fn apply_to(self, watcher: &mut ProvisionWatcher) {
        if let Some(labels) = self.labels {
            watcher.labels = labels;
        }
        if let Some(service_name) = self.service_name {
            watcher.service_name = service_name;
        }
        if let Some(identifiers) = self.identifiers {
            watcher.identifiers = identifiers;
        }
        if let Some(blocking) = self.blocking_identifiers {
            watcher.blocking_identifiers = blocking;
        }
        if let Some(admin_state) = self.admin_state {
            watcher.admin_state = admin_state;
        }
        if let Some(discovered_device) = self.discovered_device {
            watcher.discovered_device = discovered_device;
        }
        watcher.modified = now();
    }
}
