//! Runtime-adjustable settings shared by the guards.
//!
//! The daemon owns the [`watch::Sender`]; every guard holds a receiver and
//! reads the latest value at the start of each check.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use metahub_domain::capacity::CapacityLimits;

/// Strict profile policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileChange {
    pub strict_device_profile_changes: bool,
    pub strict_device_profile_deletes: bool,
}

/// Hot-reloadable section of the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Writable {
    /// `0` means unlimited.
    pub max_devices: u32,
    /// `0` means unlimited.
    pub max_resources: u32,
    pub profile_change: ProfileChange,
}

impl Writable {
    #[must_use]
    pub fn limits(&self) -> CapacityLimits {
        CapacityLimits {
            max_devices: self.max_devices,
            max_resources: self.max_resources,
        }
    }
}

/// Read side of the hot-reloadable settings.
pub type WritableReceiver = watch::Receiver<Writable>;

/// Create the channel carrying [`Writable`] updates.
#[must_use]
pub fn channel(initial: Writable) -> (watch::Sender<Writable>, WritableReceiver) {
    watch::channel(initial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_deserialize_partial_writable_with_defaults() {
        let writable: Writable = serde_json::from_value(serde_json::json!({
            "max_devices": 10,
            "profile_change": {"strict_device_profile_deletes": true}
        }))
        .unwrap();
        assert_eq!(writable.max_devices, 10);
        assert_eq!(writable.max_resources, 0);
        assert!(writable.profile_change.strict_device_profile_deletes);
        assert!(!writable.profile_change.strict_device_profile_changes);
    }

    #[test]
    fn should_observe_latest_value_after_reload() {
        let (tx, rx) = channel(Writable::default());
        tx.send_replace(Writable {
            max_resources: 5,
            ..Writable::default()
        });
        assert_eq!(rx.borrow().limits().max_resources, 5);
    }
}
