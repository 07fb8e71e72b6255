//! Capacity admission guard.
//!
//! Aggregates are recomputed from the store on every check; nothing is cached.
//! Callers enter the critical section with [`CapacityGuard::admission`] before
//! reading the entity they are about to rewrite, run the check against that
//! fresh copy, and keep the [`AdmissionPermit`] until the datastore write is
//! done. Every check demands the permit, so none can run outside the section.
//! Two writers can therefore never both observe "room for one more", nor
//! write back a copy read before the other one committed.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use metahub_domain::capacity::CapacityLimits;
use metahub_domain::device::Device;
use metahub_domain::error::{Limit, MetaError, NotFoundError};
use metahub_domain::profile::{DeviceProfile, DeviceResource};

use crate::ports::{MetadataStore, Page};
use crate::settings::WritableReceiver;

/// Mutual exclusion shared by every admission check.
///
/// Created once by whoever composes the guard and cloned into it.
#[derive(Debug, Clone, Default)]
pub struct AdmissionLock(Arc<Mutex<()>>);

impl AdmissionLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn acquire(&self) -> AdmissionPermit {
        AdmissionPermit {
            _guard: Arc::clone(&self.0).lock_owned().await,
        }
    }
}

/// Exclusive hold on the admission section. Dropping it lets the next
/// writer in.
#[must_use = "the checked write must happen while the permit is held"]
#[derive(Debug)]
pub struct AdmissionPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Enforces the device and in-use resource ceilings.
#[derive(Clone)]
pub struct CapacityGuard<S> {
    store: S,
    lock: AdmissionLock,
    writable: WritableReceiver,
}

impl<S: MetadataStore> CapacityGuard<S> {
    pub fn new(store: S, lock: AdmissionLock, writable: WritableReceiver) -> Self {
        Self {
            store,
            lock,
            writable,
        }
    }

    /// Enter the admission section, waiting for any writer inside it.
    pub async fn admission(&self) -> AdmissionPermit {
        self.lock.acquire().await
    }

    fn limits(&self) -> CapacityLimits {
        self.writable.borrow().limits()
    }

    /// Resource count of the persisted profile; `0` for an empty name.
    async fn resource_count_of(&self, profile_name: &str) -> Result<u64, MetaError> {
        if profile_name.is_empty() {
            return Ok(0);
        }
        let profile = self
            .store
            .device_profile_by_name(profile_name)
            .await?
            .ok_or_else(|| NotFoundError {
                entity: "device profile",
                id: profile_name.to_string(),
            })?;
        Ok(profile.resource_count() as u64)
    }

    /// Sum of resource counts over profiles referenced by at least one device.
    async fn in_use_resource_count(&self) -> Result<u64, MetaError> {
        let mut total = 0;
        for name in self.store.profile_names_in_use().await? {
            total += self.resource_count_of(&name).await?;
        }
        Ok(total)
    }

    async fn is_in_use(&self, profile_name: &str) -> Result<bool, MetaError> {
        let devices = self
            .store
            .devices_by_profile(Page::PROBE, profile_name)
            .await?;
        Ok(devices.total > 0)
    }

    async fn admit_resources(&self, limits: CapacityLimits, delta: i64) -> Result<(), MetaError> {
        let current = self.in_use_resource_count().await?;
        limits.admit(Limit::MaxResources, current, delta)?;
        Ok(())
    }

    /// Admit a brand new device.
    ///
    /// # Errors
    ///
    /// Returns a capacity validation error when the device count or the
    /// in-use resource count would pass its ceiling, or any lookup error.
    #[tracing::instrument(skip(self, _permit, device), fields(device = %device.name, profile = %device.profile_name))]
    pub async fn check_new_device(
        &self,
        _permit: &AdmissionPermit,
        device: &Device,
    ) -> Result<(), MetaError> {
        let limits = self.limits();
        if limits.is_enforced(Limit::MaxDevices) {
            let count = self.store.device_count().await?;
            limits.admit(Limit::MaxDevices, count, 1)?;
        }
        if limits.is_enforced(Limit::MaxResources) {
            let added = self.resource_count_of(&device.profile_name).await?;
            self.admit_resources(limits, delta(added, 0)).await?;
        }
        Ok(())
    }

    /// Admit a device moving from profile `old` to profile `new`.
    ///
    /// Always admitted when both names are equal.
    ///
    /// # Errors
    ///
    /// Returns a capacity validation error when the in-use resource count
    /// would pass its ceiling, or any lookup error.
    #[tracing::instrument(skip(self, _permit))]
    pub async fn check_profile_swap(
        &self,
        _permit: &AdmissionPermit,
        old: &str,
        new: &str,
    ) -> Result<(), MetaError> {
        let limits = self.limits();
        if old == new || !limits.is_enforced(Limit::MaxResources) {
            return Ok(());
        }
        let added = self.resource_count_of(new).await?;
        let removed = self.resource_count_of(old).await?;
        self.admit_resources(limits, delta(added, removed)).await
    }

    /// Admit replacing the resource list of a persisted profile with the one
    /// carried by `profile`. Only relevant while the profile is in use.
    ///
    /// # Errors
    ///
    /// Returns a capacity validation error when the in-use resource count
    /// would pass its ceiling, or any lookup error.
    #[tracing::instrument(skip(self, _permit, profile), fields(profile = %profile.name))]
    pub async fn check_profile_resource_edit(
        &self,
        _permit: &AdmissionPermit,
        profile: &DeviceProfile,
    ) -> Result<(), MetaError> {
        let limits = self.limits();
        if !limits.is_enforced(Limit::MaxResources) || !self.is_in_use(&profile.name).await? {
            return Ok(());
        }
        let persisted = self.resource_count_of(&profile.name).await?;
        let edited = profile.resource_count() as u64;
        self.admit_resources(limits, delta(edited, persisted)).await
    }

    /// Admit one more resource on profile `profile_name`.
    ///
    /// # Errors
    ///
    /// Returns a capacity validation error when the in-use resource count
    /// would pass its ceiling, or any lookup error.
    #[tracing::instrument(skip(self, _permit, resource), fields(resource = %resource.name))]
    pub async fn check_new_profile_resource(
        &self,
        _permit: &AdmissionPermit,
        profile_name: &str,
        resource: &DeviceResource,
    ) -> Result<(), MetaError> {
        let limits = self.limits();
        if !limits.is_enforced(Limit::MaxResources) || !self.is_in_use(profile_name).await? {
            return Ok(());
        }
        self.admit_resources(limits, 1).await
    }
}

fn delta(added: u64, removed: u64) -> i64 {
    let added = i64::try_from(added).unwrap_or(i64::MAX);
    let removed = i64::try_from(removed).unwrap_or(i64::MAX);
    added - removed
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ports::{DeviceProfileRepository, DeviceRepository};
    use crate::settings::{self, Writable};
    use crate::testing::InMemoryStore;
    use metahub_domain::error::{ErrorKind, ValidationError};
    use metahub_domain::profile::ValueType;

    fn profile(name: &str, resources: usize) -> DeviceProfile {
        let mut builder = DeviceProfile::builder().name(name);
        for i in 0..resources {
            builder = builder.resource(DeviceResource::new(format!("r{i}"), ValueType::Int32));
        }
        builder.build().unwrap()
    }

    fn device(name: &str, profile: &str) -> Device {
        Device::builder()
            .name(name)
            .service_name("device-virtual")
            .profile_name(profile)
            .protocol("other", "Address", "x")
            .build()
            .unwrap()
    }

    fn guard(store: &InMemoryStore, max_devices: u32, max_resources: u32) -> CapacityGuard<InMemoryStore> {
        let (tx, rx) = settings::channel(Writable {
            max_devices,
            max_resources,
            ..Writable::default()
        });
        // the receiver keeps the last value once the sender is gone
        drop(tx);
        CapacityGuard::new(store.clone(), AdmissionLock::new(), rx)
    }

    #[tokio::test]
    async fn should_admit_everything_when_limits_are_zero() {
        let store = InMemoryStore::new();
        store.insert_profile(profile("P", 50));
        for i in 0..10 {
            store.insert_device(device(&format!("d{i}"), "P"));
        }
        let guard = guard(&store, 0, 0);

        let permit = guard.admission().await;
        assert!(guard.check_new_device(&permit, &device("new", "P")).await.is_ok());
    }

    #[tokio::test]
    async fn should_reject_new_device_beyond_max_devices() {
        let store = InMemoryStore::new();
        store.insert_device(device("d1", ""));
        let guard = guard(&store, 1, 0);

        let permit = guard.admission().await;
        let err = guard
            .check_new_device(&permit, &device("d2", ""))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ContractInvalid);
        assert!(err.to_string().contains("2 > 1"), "{err}");
    }

    #[tokio::test]
    async fn should_count_new_device_profile_resources_against_max_resources() {
        let store = InMemoryStore::new();
        store.insert_profile(profile("P", 3));
        store.insert_profile(profile("Q", 3));
        store.insert_device(device("d1", "P"));
        let guard = guard(&store, 0, 5);

        let permit = guard.admission().await;
        let err = guard
            .check_new_device(&permit, &device("d2", "Q"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MetaError::Validation(ValidationError::CapacityExceeded {
                limit: Limit::MaxResources,
                attempted: 6,
                allowed: 5,
            })
        ));
    }

    #[tokio::test]
    async fn should_propagate_missing_profile_lookup() {
        let store = InMemoryStore::new();
        let guard = guard(&store, 0, 5);

        let permit = guard.admission().await;
        let err = guard
            .check_new_device(&permit, &device("d1", "ghost"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EntityDoesNotExist);
    }

    #[tokio::test]
    async fn should_admit_swap_to_same_profile_regardless_of_limits() {
        let store = InMemoryStore::new();
        store.insert_profile(profile("A", 10));
        store.insert_device(device("d1", "A"));
        let guard = guard(&store, 1, 1);

        let permit = guard.admission().await;
        assert!(guard.check_profile_swap(&permit, "A", "A").await.is_ok());
    }

    #[tokio::test]
    async fn should_apply_resource_delta_when_swapping_profiles() {
        let store = InMemoryStore::new();
        store.insert_profile(profile("small", 1));
        store.insert_profile(profile("large", 4));
        store.insert_device(device("d1", "small"));
        let guard = guard(&store, 0, 4);

        // 1 + (4 - 1) = 4
        let permit = guard.admission().await;
        assert!(guard.check_profile_swap(&permit, "small", "large").await.is_ok());
        drop(permit);
        let tight = self::guard(&store, 0, 3);
        let permit = tight.admission().await;
        let err = tight
            .check_profile_swap(&permit, "small", "large")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("4 > 3"), "{err}");
    }

    #[tokio::test]
    async fn should_ignore_resource_edit_of_unused_profile() {
        let store = InMemoryStore::new();
        store.insert_profile(profile("P", 1));
        let guard = guard(&store, 0, 1);

        let permit = guard.admission().await;
        assert!(guard.check_profile_resource_edit(&permit, &profile("P", 20)).await.is_ok());
    }

    #[tokio::test]
    async fn should_reject_growing_resource_edit_of_used_profile() {
        let store = InMemoryStore::new();
        store.insert_profile(profile("P", 2));
        store.insert_device(device("d1", "P"));
        let guard = guard(&store, 0, 3);

        let permit = guard.admission().await;
        assert!(guard.check_profile_resource_edit(&permit, &profile("P", 3)).await.is_ok());
        let err = guard
            .check_profile_resource_edit(&permit, &profile("P", 4))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("4 > 3"), "{err}");
    }

    #[tokio::test]
    async fn should_admit_new_resources_up_to_max_then_reject() {
        let store = InMemoryStore::new();
        store.insert_profile(profile("P", 3));
        store.insert_device(device("D1", "P"));
        let guard = guard(&store, 0, 5);

        for name in ["r4", "r5"] {
            let resource = DeviceResource::new(name, ValueType::Bool);
            let permit = guard.admission().await;
            guard
                .check_new_profile_resource(&permit, "P", &resource)
                .await
                .unwrap();
            let mut stored = store.device_profile_by_name("P").await.unwrap().unwrap();
            stored.device_resources.push(resource);
            store.update_device_profile(stored).await.unwrap();
            drop(permit);
        }

        let permit = guard.admission().await;
        let err = guard
            .check_new_profile_resource(&permit, "P", &DeviceResource::new("r6", ValueType::Bool))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractInvalid);
        assert!(err.to_string().contains("6 > 5"), "{err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_admit_exactly_one_of_two_concurrent_devices_when_one_slot_left() {
        let store = InMemoryStore::new();
        let guard = Arc::new(guard(&store, 1, 0));

        let attempt = |name: &'static str| {
            let guard = Arc::clone(&guard);
            let store = store.clone();
            tokio::spawn(async move {
                let candidate = device(name, "");
                let permit = guard.admission().await;
                guard.check_new_device(&permit, &candidate).await?;
                // widen the window between check and write
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.add_device(candidate).await?;
                drop(permit);
                Ok::<_, MetaError>(())
            })
        };

        let (first, second) = tokio::join!(attempt("a"), attempt("b"));
        let outcomes = [first.unwrap(), second.unwrap()];

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.device_count().await.unwrap(), 1);
    }
}
