//! Provision watcher registry.

use metahub_domain::error::{MetaError, ValidationError};
use metahub_domain::event::SystemEventAction;
use metahub_domain::provision_watcher::{ProvisionWatcher, ProvisionWatcherPatch};

use super::{ensure_same_name, not_found, page, require_name};
use crate::guards::IntegrityGuard;
use crate::ports::{MetadataStore, Paged};
use crate::propagation::{Change, ChangeNotifier};

/// Application service for provision watchers.
pub struct ProvisionWatcherRegistry<S> {
    store: S,
    integrity: IntegrityGuard<S>,
    notifier: ChangeNotifier,
    max_result_count: u32,
}

impl<S: MetadataStore> ProvisionWatcherRegistry<S> {
    pub fn new(
        store: S,
        integrity: IntegrityGuard<S>,
        notifier: ChangeNotifier,
        max_result_count: u32,
    ) -> Self {
        Self {
            store,
            integrity,
            notifier,
            max_result_count,
        }
    }

    async fn require_references(&self, watcher: &ProvisionWatcher) -> Result<(), MetaError> {
        self.integrity.require_service(&watcher.service_name).await?;
        if let Some(profile_name) = watcher.profile_name() {
            self.integrity.require_profile(profile_name).await?;
        }
        Ok(())
    }

    /// Register a new provision watcher.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Validation`] for a malformed watcher, a missing
    /// service or profile, or a taken name; or a storage error.
    #[tracing::instrument(skip(self, watcher), fields(watcher = %watcher.name))]
    pub async fn add(
        &self,
        watcher: ProvisionWatcher,
        correlation_id: &str,
    ) -> Result<ProvisionWatcher, MetaError> {
        watcher.validate()?;
        self.require_references(&watcher).await?;
        let added = self.store.add_provision_watcher(watcher).await?;
        tracing::debug!(id = %added.id, %correlation_id, "provision watcher created");

        self.notifier.submit(
            correlation_id,
            Change::Watcher {
                action: SystemEventAction::Add,
                watcher: added.clone(),
                previous_service: None,
            },
        );
        Ok(added)
    }

    /// Apply a partial update to the watcher designated by `patch.id` or
    /// `patch.name`.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when the target is missing,
    /// [`MetaError::Validation`] when id and name disagree, a reference is
    /// missing or the result is invalid; or a storage error.
    #[tracing::instrument(skip(self, patch))]
    pub async fn patch(
        &self,
        patch: ProvisionWatcherPatch,
        correlation_id: &str,
    ) -> Result<(), MetaError> {
        let mut watcher = match (patch.id, patch.name.as_deref()) {
            (Some(id), _) => self
                .store
                .provision_watcher_by_id(id)
                .await?
                .ok_or_else(|| not_found("provision watcher", id))?,
            (None, Some(name)) => self.get_by_name(name).await?,
            (None, None) => {
                return Err(ValidationError::EmptyField {
                    field: "id or name",
                }
                .into());
            }
        };
        ensure_same_name("provision watcher", patch.name.as_deref(), &watcher.name)?;

        let previous_service = watcher.service_name.clone();
        patch.apply_to(&mut watcher);
        watcher.validate()?;
        self.require_references(&watcher).await?;
        self.store.update_provision_watcher(watcher.clone()).await?;
        tracing::debug!(watcher = %watcher.name, %correlation_id, "provision watcher patched");

        let previous_service =
            (previous_service != watcher.service_name).then_some(previous_service);
        self.notifier.submit(
            correlation_id,
            Change::Watcher {
                action: SystemEventAction::Update,
                watcher,
                previous_service,
            },
        );
        Ok(())
    }

    /// Look up a provision watcher by name.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when no such watcher exists.
    pub async fn get_by_name(&self, name: &str) -> Result<ProvisionWatcher, MetaError> {
        require_name(name)?;
        self.store
            .provision_watcher_by_name(name)
            .await?
            .ok_or_else(|| not_found("provision watcher", name))
    }

    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list(
        &self,
        offset: u32,
        limit: i32,
        labels: &[String],
    ) -> Result<Paged<ProvisionWatcher>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store.provision_watchers(page, labels).await
    }

    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list_by_service(
        &self,
        service_name: &str,
        offset: u32,
        limit: i32,
    ) -> Result<Paged<ProvisionWatcher>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store
            .provision_watchers_by_service(page, service_name)
            .await
    }

    /// # Errors
    ///
    /// Returns a validation error for a bad `limit`, or a storage error.
    pub async fn list_by_profile(
        &self,
        profile_name: &str,
        offset: u32,
        limit: i32,
    ) -> Result<Paged<ProvisionWatcher>, MetaError> {
        let page = page(offset, limit, self.max_result_count)?;
        self.store
            .provision_watchers_by_profile(page, profile_name)
            .await
    }

    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`] when missing, or a storage error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_by_name(&self, name: &str, correlation_id: &str) -> Result<(), MetaError> {
        let watcher = self.get_by_name(name).await?;
        self.store.delete_provision_watcher(name).await?;
        tracing::debug!(watcher = name, %correlation_id, "provision watcher deleted");

        self.notifier.submit(
            correlation_id,
            Change::Watcher {
                action: SystemEventAction::Delete,
                watcher,
                previous_service: None,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::propagation::Notice;
    use crate::settings::{self, Writable};
    use crate::testing::InMemoryStore;
    use metahub_domain::device_service::DeviceService;
    use metahub_domain::error::ErrorKind;
    use metahub_domain::id::ProvisionWatcherId;
    use metahub_domain::profile::DeviceProfile;
    use metahub_domain::provision_watcher::DiscoveredDevice;
    use metahub_domain::state::AdminState;
    use metahub_domain::time::now;
    use tokio::sync::mpsc;

    fn registry() -> (
        InMemoryStore,
        ProvisionWatcherRegistry<InMemoryStore>,
        mpsc::Receiver<Notice>,
    ) {
        let store = InMemoryStore::new();
        for name in ["ds-a", "ds-b"] {
            store.insert_service(
                DeviceService::builder()
                    .name(name)
                    .base_address("http://localhost:59900")
                    .build()
                    .unwrap(),
            );
        }
        store.insert_profile(DeviceProfile::builder().name("P").build().unwrap());
        let (_tx, rx) = settings::channel(Writable::default());
        let (notifier, notices) = ChangeNotifier::channel(16);
        let registry =
            ProvisionWatcherRegistry::new(store.clone(), IntegrityGuard::new(store.clone(), rx), notifier, 1024);
        (store, registry, notices)
    }

    fn watcher(name: &str, service: &str, profile: Option<&str>) -> ProvisionWatcher {
        ProvisionWatcher {
            id: ProvisionWatcherId::new(),
            name: name.to_string(),
            labels: vec![],
            service_name: service.to_string(),
            identifiers: BTreeMap::from([("Address".to_string(), "10\\..*".to_string())]),
            blocking_identifiers: BTreeMap::new(),
            admin_state: AdminState::Unlocked,
            discovered_device: DiscoveredDevice {
                profile_name: profile.map(str::to_string),
                ..DiscoveredDevice::default()
            },
            created: now(),
            modified: now(),
        }
    }

    #[tokio::test]
    async fn should_add_watcher_without_profile() {
        let (_store, registry, mut notices) = registry();

        registry.add(watcher("w1", "ds-a", None), "c").await.unwrap();

        assert_eq!(registry.get_by_name("w1").await.unwrap().service_name, "ds-a");
        assert!(notices.recv().await.is_some());
    }

    #[tokio::test]
    async fn should_reject_watcher_with_unknown_profile() {
        let (_store, registry, _notices) = registry();

        let err = registry
            .add(watcher("w1", "ds-a", Some("missing")), "c")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ContractInvalid);
    }

    #[tokio::test]
    async fn should_remember_previous_service_when_watcher_moves() {
        let (store, registry, mut notices) = registry();
        store.insert_watcher(watcher("w1", "ds-a", Some("P")));

        registry
            .patch(
                ProvisionWatcherPatch {
                    name: Some("w1".into()),
                    service_name: Some("ds-b".into()),
                    ..ProvisionWatcherPatch::default()
                },
                "c",
            )
            .await
            .unwrap();

        match notices.recv().await.unwrap().change {
            Change::Watcher {
                watcher,
                previous_service,
                ..
            } => {
                assert_eq!(watcher.service_name, "ds-b");
                assert_eq!(previous_service.as_deref(), Some("ds-a"));
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_list_watchers_by_service_and_profile() {
        let (store, registry, _notices) = registry();
        store.insert_watcher(watcher("w1", "ds-a", Some("P")));
        store.insert_watcher(watcher("w2", "ds-b", None));

        assert_eq!(registry.list_by_service("ds-a", 0, -1).await.unwrap().total, 1);
        assert_eq!(registry.list_by_profile("P", 0, -1).await.unwrap().total, 1);
        assert_eq!(registry.list(0, -1, &[]).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn should_delete_watcher() {
        let (store, registry, _notices) = registry();
        store.insert_watcher(watcher("w1", "ds-a", None));

        registry.delete_by_name("w1", "c").await.unwrap();

        assert_eq!(
            registry.get_by_name("w1").await.unwrap_err().kind(),
            ErrorKind::EntityDoesNotExist
        );
    }
}
