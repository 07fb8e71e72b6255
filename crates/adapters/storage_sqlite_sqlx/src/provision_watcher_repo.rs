//! `SQLite` implementation of [`ProvisionWatcherRepository`].

use metahub_app::ports::{Page, Paged, ProvisionWatcherRepository};
use metahub_domain::error::MetaError;
use metahub_domain::id::ProvisionWatcherId;
use metahub_domain::provision_watcher::ProvisionWatcher;

use crate::error::StorageError;
use crate::store::{self, Filter, SqliteStore, encode};

const TABLE: &str = "provision_watchers";
const ENTITY: &str = "provision watcher";

const INSERT: &str = r"
    INSERT INTO provision_watchers (id, name, service_name, profile_name, labels, body)
    VALUES (?, ?, ?, ?, ?, ?)
";

const UPDATE: &str = r"
    UPDATE provision_watchers
    SET service_name = ?, profile_name = ?, labels = ?, body = ?
    WHERE name = ?
";

impl ProvisionWatcherRepository for SqliteStore {
    async fn add_provision_watcher(
        &self,
        watcher: ProvisionWatcher,
    ) -> Result<ProvisionWatcher, MetaError> {
        sqlx::query(INSERT)
            .bind(watcher.id.to_string())
            .bind(&watcher.name)
            .bind(&watcher.service_name)
            .bind(watcher.profile_name().unwrap_or_default())
            .bind(encode(&watcher.labels)?)
            .bind(encode(&watcher)?)
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::on_insert(ENTITY, &watcher.name, err))?;

        Ok(watcher)
    }

    async fn provision_watcher_by_id(
        &self,
        id: ProvisionWatcherId,
    ) -> Result<Option<ProvisionWatcher>, MetaError> {
        Ok(store::find(&self.pool, TABLE, "id", id.to_string()).await?)
    }

    async fn provision_watcher_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ProvisionWatcher>, MetaError> {
        Ok(store::find(&self.pool, TABLE, "name", name.to_string()).await?)
    }

    async fn provision_watchers(
        &self,
        page: Page,
        labels: &[String],
    ) -> Result<Paged<ProvisionWatcher>, MetaError> {
        Ok(store::fetch_page(&self.pool, TABLE, Filter::Labels(labels), page).await?)
    }

    async fn provision_watchers_by_service(
        &self,
        page: Page,
        service_name: &str,
    ) -> Result<Paged<ProvisionWatcher>, MetaError> {
        let filter = Filter::Column("service_name", service_name);
        Ok(store::fetch_page(&self.pool, TABLE, filter, page).await?)
    }

    async fn provision_watchers_by_profile(
        &self,
        page: Page,
        profile_name: &str,
    ) -> Result<Paged<ProvisionWatcher>, MetaError> {
        let filter = Filter::Column("profile_name", profile_name);
        Ok(store::fetch_page(&self.pool, TABLE, filter, page).await?)
    }

    async fn update_provision_watcher(&self, watcher: ProvisionWatcher) -> Result<(), MetaError> {
        let result = sqlx::query(UPDATE)
            .bind(&watcher.service_name)
            .bind(watcher.profile_name().unwrap_or_default())
            .bind(encode(&watcher.labels)?)
            .bind(encode(&watcher)?)
            .bind(&watcher.name)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(store::ensure_affected(result.rows_affected(), ENTITY, &watcher.name)?)
    }

    async fn delete_provision_watcher(&self, name: &str) -> Result<(), MetaError> {
        Ok(store::delete_named(&self.pool, TABLE, ENTITY, name).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::store::memory_store;
    use metahub_domain::provision_watcher::DiscoveredDevice;
    use metahub_domain::state::AdminState;
    use metahub_domain::time::now;

    fn watcher(name: &str, profile: Option<&str>) -> ProvisionWatcher {
        ProvisionWatcher {
            id: ProvisionWatcherId::new(),
            name: name.to_string(),
            labels: vec!["discovery".to_string()],
            service_name: "ds-a".to_string(),
            identifiers: BTreeMap::from([("Address".to_string(), "10\\..*".to_string())]),
            blocking_identifiers: BTreeMap::from([(
                "Address".to_string(),
                vec!["10.0.0.1".to_string()],
            )]),
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
    async fn should_preserve_identifiers_through_roundtrip() {
        let store = memory_store().await;
        let added = store.add_provision_watcher(watcher("w1", Some("P"))).await.unwrap();

        let fetched = store.provision_watcher_by_name("w1").await.unwrap().unwrap();

        assert_eq!(fetched, added);
    }

    #[tokio::test]
    async fn should_index_watchers_by_discovered_profile() {
        let store = memory_store().await;
        store.add_provision_watcher(watcher("w1", Some("P"))).await.unwrap();
        store.add_provision_watcher(watcher("w2", None)).await.unwrap();

        let by_profile = store
            .provision_watchers_by_profile(Page::PROBE, "P")
            .await
            .unwrap();
        let by_service = store
            .provision_watchers_by_service(Page::new(0, 10), "ds-a")
            .await
            .unwrap();

        assert_eq!(by_profile.total, 1);
        assert_eq!(by_service.total, 2);
    }

    #[tokio::test]
    async fn should_delete_watcher_when_exists() {
        let store = memory_store().await;
        store.add_provision_watcher(watcher("w1", None)).await.unwrap();

        store.delete_provision_watcher("w1").await.unwrap();

        assert!(store.provision_watcher_by_name("w1").await.unwrap().is_none());
    }
}
