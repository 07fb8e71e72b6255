//! Fleet-wide ceilings and the arithmetic of admitting a write under them.
//!
//! Counting lives in the application layer; this module only decides.

use serde::{Deserialize, Serialize};

use crate::error::{Limit, ValidationError};

/// Configured ceilings. `0` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CapacityLimits {
    #[serde(default)]
    pub max_devices: u32,
    #[serde(default)]
    pub max_resources: u32,
}

impl CapacityLimits {
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    fn ceiling(self, limit: Limit) -> u32 {
        match limit {
            Limit::MaxDevices => self.max_devices,
            Limit::MaxResources => self.max_resources,
        }
    }

    /// Whether `limit` is enforced at all.
    #[must_use]
    pub fn is_enforced(self, limit: Limit) -> bool {
        self.ceiling(limit) > 0
    }

    /// Admit a change of `delta` on top of `current`.
    ///
    /// A write that does not grow the aggregate is always admitted, even when
    /// `current` is already above a ceiling lowered at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CapacityExceeded`] when `current + delta`
    /// is above the enforced ceiling.
    pub fn admit(self, limit: Limit, current: u64, delta: i64) -> Result<(), ValidationError> {
        let allowed = self.ceiling(limit);
        if allowed == 0 || delta <= 0 {
            return Ok(());
        }
        let attempted = i64::try_from(current)
            .unwrap_or(i64::MAX)
            .saturating_add(delta);
        if attempted > i64::from(allowed) {
            return Err(ValidationError::CapacityExceeded {
                limit,
                attempted,
                allowed,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_devices: u32, max_resources: u32) -> CapacityLimits {
        CapacityLimits {
            max_devices,
            max_resources,
        }
    }

    #[test]
    fn should_admit_anything_when_unlimited() {
        let limits = CapacityLimits::unlimited();
        assert!(limits.admit(Limit::MaxDevices, u64::MAX, 1).is_ok());
        assert!(limits.admit(Limit::MaxResources, 10_000, 500).is_ok());
    }

    #[test]
    fn should_admit_up_to_the_ceiling_inclusive() {
        let limits = limits(0, 5);
        assert!(limits.admit(Limit::MaxResources, 3, 1).is_ok());
        assert!(limits.admit(Limit::MaxResources, 4, 1).is_ok());
    }

    #[test]
    fn should_report_attempted_and_allowed_when_exceeded() {
        let err = limits(0, 5)
            .admit(Limit::MaxResources, 5, 1)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::CapacityExceeded {
                limit: Limit::MaxResources,
                attempted: 6,
                allowed: 5,
            }
        );
        assert!(err.to_string().contains("6 > 5"));
    }

    #[test]
    fn should_admit_shrinking_change_when_already_over_ceiling() {
        let limits = limits(2, 2);
        assert!(limits.admit(Limit::MaxDevices, 7, 0).is_ok());
        assert!(limits.admit(Limit::MaxResources, 9, -3).is_ok());
    }

    #[test]
    fn should_check_each_limit_independently() {
        let limits = limits(1, 0);
        assert!(limits.admit(Limit::MaxDevices, 1, 1).is_err());
        assert!(limits.admit(Limit::MaxResources, 1_000, 1).is_ok());
        assert!(limits.is_enforced(Limit::MaxDevices));
        assert!(!limits.is_enforced(Limit::MaxResources));
    }
}
