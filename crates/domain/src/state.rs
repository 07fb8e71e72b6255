//! Administrative and operating states shared by catalog entities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether an operator allows the entity to be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdminState {
    Locked,
    #[default]
    Unlocked,
}

/// Whether the device is currently reachable by its service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperatingState {
    Up,
    Down,
    #[default]
    Unknown,
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => f.write_str("LOCKED"),
            Self::Unlocked => f.write_str("UNLOCKED"),
        }
    }
}
