//! Device: a concrete instance of a profile, owned by a device service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MetaError, ValidationError};
use crate::id::DeviceId;
use crate::state::{AdminState, OperatingState};
use crate::time::{Timestamp, now};

/// Named blocks of protocol settings, e.g. `{"modbus-tcp": {"Address": "10.0.0.1"}}`.
///
/// The content is opaque to this service; only the owning device service
/// knows how to validate it.
pub type ProtocolProperties = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Periodic or on-change reading the device service schedules on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoEvent {
    /// Duration string understood by the device service (`"10s"`).
    pub interval: String,
    #[serde(default)]
    pub on_change: bool,
    /// Resource or command the reading comes from.
    pub source_name: String,
}

/// A single field device registered in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub operating_state: OperatingState,
    pub service_name: String,
    /// Empty while the device has no profile yet.
    #[serde(default)]
    pub profile_name: String,
    pub protocols: ProtocolProperties,
    #[serde(default)]
    pub auto_events: Vec<AutoEvent>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub location: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default = "now")]
    pub created: Timestamp,
    #[serde(default = "now")]
    pub modified: Timestamp,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Whether a profile has been assigned.
    #[must_use]
    pub fn has_profile(&self) -> bool {
        !self.profile_name.is_empty()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] when the name or service name is
    /// empty, or when no protocol block is configured.
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
        if self.protocols.is_empty() {
            return Err(ValidationError::EmptyField { field: "protocols" }.into());
        }
        if let Some(event) = self
            .auto_events
            .iter()
            .find(|e| e.source_name.trim().is_empty() || e.interval.trim().is_empty())
        {
            return Err(ValidationError::Invalid {
                field: "autoEvents",
                reason: format!(
                    "interval '{}' and sourceName '{}' must both be set",
                    event.interval, event.source_name
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    name: Option<String>,
    description: Option<String>,
    labels: Vec<String>,
    admin_state: AdminState,
    service_name: Option<String>,
    profile_name: Option<String>,
    protocols: ProtocolProperties,
    auto_events: Vec<AutoEvent>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
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
    pub fn admin_state(mut self, admin_state: AdminState) -> Self {
        self.admin_state = admin_state;
        self
    }

    #[must_use]
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    #[must_use]
    pub fn profile_name(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_name = Some(profile_name.into());
        self
    }

    /// Set one property of a protocol block, creating the block if needed.
    #[must_use]
    pub fn protocol(
        mut self,
        block: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.protocols
            .entry(block.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn auto_event(mut self, auto_event: AutoEvent) -> Self {
        self.auto_events.push(auto_event);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] if the device breaks an invariant
    /// (see [`Device::validate`]).
    pub fn build(self) -> Result<Device, MetaError> {
        let ts = now();
        let device = Device {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            labels: self.labels,
            admin_state: self.admin_state,
            operating_state: OperatingState::default(),
            service_name: self.service_name.unwrap_or_default(),
            profile_name: self.profile_name.unwrap_or_default(),
            protocols: self.protocols,
            auto_events: self.auto_events,
            location: serde_json::Value::Null,
            tags: BTreeMap::new(),
            properties: BTreeMap::new(),
            created: ts,
            modified: ts,
        };
        device.validate()?;
        Ok(device)
    }
}

/// Partial update of a [`Device`], targeted by `id` or `name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    pub id: Option<DeviceId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub labels: Option<Vec<String>>,
    pub admin_state: Option<AdminState>,
    pub operating_state: Option<OperatingState>,
    pub service_name: Option<String>,
    pub profile_name: Option<String>,
    pub protocols: Option<ProtocolProperties>,
    pub auto_events: Option<Vec<AutoEvent>>,
    pub location: Option<serde_json::Value>,
    pub tags: Option<BTreeMap<String, serde_json::Value>>,
    pub properties: Option<BTreeMap<String, serde_json::Value>>,
}

impl DevicePatch {
    /// Whether applying this patch requires the owning service to re-validate.
    ///
    /// True when protocols change or the device moves to another service.
    #[must_use]
    pub fn needs_remote_validation(&self, current: &Device) -> bool {
        let protocols_changed = self
            .protocols
            .as_ref()
            .is_some_and(|p| *p != current.protocols);
        let service_changed = self
            .service_name
            .as_ref()
            .is_some_and(|s| *s != current.service_name);
        protocols_changed || service_changed
    }

    /// Overwrite the fields present in the patch.
    pub fn apply_to(self, device: &mut Device) {
        if let Some(description) = self.description {
            device.description = description;
        }
        if let Some(labels) = self.labels {
            device.labels = labels;
        }
        if let Some(admin_state) = self.admin_state {
            device.admin_state = admin_state;
        }
        if let Some(operating_state) = self.operating_state {
            device.operating_state = operating_state;
        }
        if let Some(service_name) = self.service_name {
            device.service_name = service_name;
        }
        if let Some(profile_name) = self.profile_name {
            device.profile_name = profile_name;
        }
        if let Some(protocols) = self.protocols {
            device.protocols = protocols;
        }
        if let Some(auto_events) = self.auto_events {
            device.auto_events = auto_events;
        }
        if let Some(location) = self.location {
            device.location = location;
        }
        if let Some(tags) = self.tags {
            device.tags = tags;
        }
        if let Some(properties) = self.properties {
            device.properties = properties;
        }
        device.modified = now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor() -> DeviceBuilder {
        Device::builder()
            .name("sensor-01")
            .service_name("device-modbus")
            .profile_name("thermostat")
            .protocol("modbus-tcp", "Address", "10.0.0.7")
            .protocol("modbus-tcp", "Port", 502)
    }

    #[test]
    fn should_build_device_with_grouped_protocol_properties() {
        let device = sensor().build().unwrap();
        assert_eq!(device.protocols.len(), 1);
        assert_eq!(device.protocols["modbus-tcp"].len(), 2);
        assert!(device.has_profile());
    }

    #[test]
    fn should_reject_device_without_protocols() {
        let result = Device::builder()
            .name("sensor-02")
            .service_name("device-modbus")
            .build();
        assert!(matches!(
            result,
            Err(MetaError::Validation(ValidationError::EmptyField {
                field: "protocols"
            }))
        ));
    }

    #[test]
    fn should_reject_device_without_service() {
        let result = Device::builder()
            .name("sensor-03")
            .protocol("rest", "Host", "x")
            .build();
        assert!(matches!(
            result,
            Err(MetaError::Validation(ValidationError::EmptyField {
                field: "serviceName"
            }))
        ));
    }

    #[test]
    fn should_allow_device_without_profile() {
        let device = Device::builder()
            .name("unprovisioned")
            .service_name("device-onvif")
            .protocol("onvif", "Address", "cam.local")
            .build()
            .unwrap();
        assert!(!device.has_profile());
    }

    #[test]
    fn should_reject_auto_event_without_source() {
        let result = sensor()
            .auto_event(AutoEvent {
                interval: "10s".into(),
                on_change: false,
                source_name: String::new(),
            })
            .build();
        assert!(matches!(
            result,
            Err(MetaError::Validation(ValidationError::Invalid {
                field: "autoEvents",
                ..
            }))
        ));
    }

    #[test]
    fn should_require_remote_validation_when_protocols_change() {
        let device = sensor().build().unwrap();
        let mut protocols = device.protocols.clone();
        protocols
            .entry("modbus-tcp".into())
            .or_default()
            .insert("Port".into(), 1502.into());

        let patch = DevicePatch {
            protocols: Some(protocols),
            ..DevicePatch::default()
        };
        assert!(patch.needs_remote_validation(&device));
    }

    #[test]
    fn should_skip_remote_validation_when_only_labels_change() {
        let device = sensor().build().unwrap();
        let patch = DevicePatch {
            labels: Some(vec!["floor-2".into()]),
            protocols: Some(device.protocols.clone()),
            service_name: Some(device.service_name.clone()),
            ..DevicePatch::default()
        };
        assert!(!patch.needs_remote_validation(&device));
    }

    #[test]
    fn should_apply_service_and_profile_changes() {
        let mut device = sensor().build().unwrap();
        DevicePatch {
            service_name: Some("device-virtual".into()),
            profile_name: Some(String::new()),
            ..DevicePatch::default()
        }
        .apply_to(&mut device);
        assert_eq!(device.service_name, "device-virtual");
        assert!(!device.has_profile());
    }

    #[test]
    fn should_round_trip_through_camel_case_json() {
        let device = sensor().build().unwrap();
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["serviceName"], "device-modbus");
        assert_eq!(json["adminState"], "UNLOCKED");
        assert_eq!(json["operatingState"], "UNKNOWN");
        let parsed: Device = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, device);
    }
}
