//! Device resource: a single readable and/or writable value exposed by a device.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Data type of a device resource value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    String,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Binary,
    Object,
    BoolArray,
    Uint8Array,
    Int32Array,
    Int64Array,
    Float32Array,
    Float64Array,
    StringArray,
}

/// Access mode of a resource or command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadWrite {
    #[serde(rename = "R")]
    Read,
    #[serde(rename = "W")]
    Write,
    #[default]
    #[serde(rename = "RW")]
    ReadWrite,
    #[serde(rename = "WR")]
    WriteRead,
}

/// Value description of a [`DeviceResource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProperties {
    pub value_type: ValueType,
    #[serde(default)]
    pub read_write: ReadWrite,
    /// Unit of measure; checked against reference data outside this service.
    #[serde(default)]
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_value: String,
}

impl ResourceProperties {
    /// Properties with the given type and every other field defaulted.
    #[must_use]
    pub fn of(value_type: ValueType) -> Self {
        Self {
            value_type,
            read_write: ReadWrite::default(),
            units: String::new(),
            minimum: None,
            maximum: None,
            default_value: String::new(),
        }
    }
}

/// A named value a device can read or write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResource {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_hidden: bool,
    pub properties: ResourceProperties,
    /// Protocol specific attributes interpreted only by the device service.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl DeviceResource {
    /// Resource with default properties for `value_type`.
    #[must_use]
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            is_hidden: false,
            properties: ResourceProperties::of(value_type),
            attributes: BTreeMap::new(),
        }
    }

    /// Override the read/write mode.
    #[must_use]
    pub fn with_read_write(mut self, read_write: ReadWrite) -> Self {
        self.properties.read_write = read_write;
        self
    }

    /// Override the unit of measure.
    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.properties.units = units.into();
        self
    }
}
