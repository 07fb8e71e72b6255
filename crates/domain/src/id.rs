//! Identifiers.
//!
//! Catalog entities carry a random UUID assigned on creation. Names are what
//! clients usually address an entity by; the id only survives renames.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Fresh random (v4) identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        /// A default id is a fresh one, so entities decoded without an `id`
        /// field get assigned one.
        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

uuid_newtype!(
    /// Id of a [`DeviceService`](crate::device_service::DeviceService).
    DeviceServiceId
);
uuid_newtype!(
    /// Id of a [`DeviceProfile`](crate::profile::DeviceProfile).
    DeviceProfileId
);
uuid_newtype!(
    /// Id of a [`Device`](crate::device::Device).
    DeviceId
);
uuid_newtype!(
    /// Id of a [`ProvisionWatcher`](crate::provision_watcher::ProvisionWatcher).
    ProvisionWatcherId
);
uuid_newtype!(
    /// Correlates a bus reply or callback with the request that caused it.
    RequestId
);
