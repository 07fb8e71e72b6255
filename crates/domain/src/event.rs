//! System events: ephemeral change notices published after a commit.
//!
//! Events are never persisted. They are built here and shipped by the
//! application layer's change propagator.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::{now, unix_nanos};

/// Name this service publishes events under.
pub const SOURCE: &str = "core-metadata";

/// Version tag carried by every payload.
pub const API_VERSION: &str = "v3";

/// Kind of entity an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemEventType {
    Device,
    DeviceProfile,
    DeviceService,
    ProvisionWatcher,
}

impl SystemEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::DeviceProfile => "device-profile",
            Self::DeviceService => "device-service",
            Self::ProvisionWatcher => "provision-watcher",
        }
    }
}

impl fmt::Display for SystemEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemEventAction {
    Add,
    Update,
    Delete,
}

impl SystemEventAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SystemEventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notice for one entity, addressed to one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
    pub api_version: String,
    #[serde(rename = "type")]
    pub event_type: SystemEventType,
    pub action: SystemEventAction,
    pub source: String,
    pub owner: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Snapshot of the entity after (or, for deletes, before) the change.
    pub details: serde_json::Value,
    /// Unix epoch, nanoseconds.
    pub timestamp: i64,
}

impl SystemEvent {
    /// Build an event stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if `details` cannot be serialized.
    pub fn new<T: Serialize>(
        event_type: SystemEventType,
        action: SystemEventAction,
        owner: impl Into<String>,
        details: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            api_version: API_VERSION.to_string(),
            event_type,
            action,
            source: SOURCE.to_string(),
            owner: owner.into(),
            tags: BTreeMap::new(),
            details: serde_json::to_value(details)?,
            timestamp: unix_nanos(now()),
        })
    }

    /// Topic this event is published on.
    ///
    /// `<base>/system-events/<source>/<type>/<action>/<owner>[/<suffix>]`,
    /// where the suffix is usually a profile name.
    #[must_use]
    pub fn topic(&self, base: &str, suffix: Option<&str>) -> String {
        let mut levels: Vec<&str> = Vec::with_capacity(7);
        if !base.is_empty() {
            levels.push(base.trim_end_matches('/'));
        }
        levels.extend([
            "system-events",
            self.source.as_str(),
            self.event_type.as_str(),
            self.action.as_str(),
            self.owner.as_str(),
        ]);
        if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
            levels.push(suffix);
        }
        levels.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(owner: &str) -> SystemEvent {
        SystemEvent::new(
            SystemEventType::Device,
            SystemEventAction::Add,
            owner,
            &serde_json::json!({"name": "sensor-01"}),
        )
        .unwrap()
    }

    #[test]
    fn should_build_topic_with_profile_suffix() {
        assert_eq!(
            event("device-modbus").topic("edgex", Some("thermostat")),
            "edgex/system-events/core-metadata/device/add/device-modbus/thermostat"
        );
    }

    #[test]
    fn should_omit_empty_suffix_and_base() {
        assert_eq!(
            event("device-modbus").topic("", Some("")),
            "system-events/core-metadata/device/add/device-modbus"
        );
    }

    #[test]
    fn should_serialize_with_type_field_and_kebab_case_values() {
        let json = serde_json::to_value(SystemEvent::new(
            SystemEventType::DeviceProfile,
            SystemEventAction::Update,
            "device-virtual",
            &serde_json::json!({}),
        )
        .unwrap())
        .unwrap();
        assert_eq!(json["type"], "device-profile");
        assert_eq!(json["action"], "update");
        assert_eq!(json["source"], "core-metadata");
        assert_eq!(json["apiVersion"], "v3");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }
}
