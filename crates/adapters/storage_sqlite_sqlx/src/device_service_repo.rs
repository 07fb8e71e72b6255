//! `SQLite` implementation of [`DeviceServiceRepository`].

use metahub_app::ports::{DeviceServiceRepository, Page, Paged};
use metahub_domain::device_service::DeviceService;
use metahub_domain::error::MetaError;
use metahub_domain::id::DeviceServiceId;

use crate::error::StorageError;
use crate::store::{self, Filter, SqliteStore, encode};

const TABLE: &str = "device_services";
const ENTITY: &str = "device service";

const INSERT: &str = "INSERT INTO device_services (id, name, labels, body) VALUES (?, ?, ?, ?)";
const UPDATE: &str = "UPDATE device_services SET labels = ?, body = ? WHERE name = ?";

impl DeviceServiceRepository for SqliteStore {
    async fn add_device_service(&self, service: DeviceService) -> Result<DeviceService, MetaError> {
        sqlx::query(INSERT)
            .bind(service.id.to_string())
            .bind(&service.name)
            .bind(encode(&service.labels)?)
            .bind(encode(&service)?)
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::on_insert(ENTITY, &service.name, err))?;

        Ok(service)
    }

    async fn device_service_by_id(
        &self,
        id: DeviceServiceId,
    ) -> Result<Option<DeviceService>, MetaError> {
        Ok(store::find(&self.pool, TABLE, "id", id.to_string()).await?)
    }

    async fn device_service_by_name(&self, name: &str) -> Result<Option<DeviceService>, MetaError> {
        Ok(store::find(&self.pool, TABLE, "name", name.to_string()).await?)
    }

    async fn device_services(
        &self,
        page: Page,
        labels: &[String],
    ) -> Result<Paged<DeviceService>, MetaError> {
        Ok(store::fetch_page(&self.pool, TABLE, Filter::Labels(labels), page).await?)
    }

    async fn update_device_service(&self, service: DeviceService) -> Result<(), MetaError> {
        let result = sqlx::query(UPDATE)
            .bind(encode(&service.labels)?)
            .bind(encode(&service)?)
            .bind(&service.name)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(store::ensure_affected(result.rows_affected(), ENTITY, &service.name)?)
    }

    async fn delete_device_service(&self, name: &str) -> Result<(), MetaError> {
        Ok(store::delete_named(&self.pool, TABLE, ENTITY, name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory_store;
    use metahub_domain::error::ErrorKind;
    use metahub_domain::state::AdminState;

    fn service(name: &str) -> DeviceService {
        DeviceService::builder()
            .name(name)
            .base_address("http://localhost:59900")
            .label("modbus")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_create_and_retrieve_service_by_id_and_name() {
        let store = memory_store().await;
        let added = store.add_device_service(service("ds-a")).await.unwrap();

        let by_id = store.device_service_by_id(added.id).await.unwrap().unwrap();
        let by_name = store.device_service_by_name("ds-a").await.unwrap().unwrap();

        assert_eq!(by_id, added);
        assert_eq!(by_name.base_address, "http://localhost:59900");
    }

    #[tokio::test]
    async fn should_reject_duplicate_name_as_contract_invalid() {
        let store = memory_store().await;
        store.add_device_service(service("ds-a")).await.unwrap();

        let err = store.add_device_service(service("ds-a")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ContractInvalid);
    }

    #[tokio::test]
    async fn should_update_service_when_exists() {
        let store = memory_store().await;
        let mut svc = store.add_device_service(service("ds-a")).await.unwrap();

        svc.admin_state = AdminState::Locked;
        store.update_device_service(svc).await.unwrap();

        let fetched = store.device_service_by_name("ds-a").await.unwrap().unwrap();
        assert_eq!(fetched.admin_state, AdminState::Locked);
    }

    #[tokio::test]
    async fn should_report_not_found_when_deleting_missing_service() {
        let store = memory_store().await;

        let err = store.delete_device_service("nope").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EntityDoesNotExist);
    }

    #[tokio::test]
    async fn should_filter_services_by_label_and_page() {
        let store = memory_store().await;
        store.add_device_service(service("ds-a")).await.unwrap();
        store.add_device_service(service("ds-b")).await.unwrap();
        let mut unlabelled = service("ds-c");
        unlabelled.labels.clear();
        store.add_device_service(unlabelled).await.unwrap();

        let labelled = store
            .device_services(Page::new(0, 1), &["modbus".to_string()])
            .await
            .unwrap();
        let all = store.device_services(Page::new(1, 10), &[]).await.unwrap();

        assert_eq!(labelled.total, 2);
        assert_eq!(labelled.items.len(), 1);
        assert_eq!(labelled.items[0].name, "ds-a");
        assert_eq!(all.total, 3);
        assert_eq!(all.items.len(), 2);
    }
}
