//! `SQLite` implementation of [`DeviceRepository`].

use metahub_app::ports::{DeviceRepository, Page, Paged};
use metahub_domain::device::Device;
use metahub_domain::error::MetaError;
use metahub_domain::id::DeviceId;

use crate::error::StorageError;
use crate::store::{self, Filter, SqliteStore, encode};

const TABLE: &str = "devices";
const ENTITY: &str = "device";

const INSERT: &str = r"
    INSERT INTO devices (id, name, service_name, profile_name, labels, body)
    VALUES (?, ?, ?, ?, ?, ?)
";

const UPDATE: &str = r"
    UPDATE devices
    SET service_name = ?, profile_name = ?, labels = ?, body = ?
    WHERE name = ?
";

const COUNT: &str = "SELECT COUNT(*) FROM devices";
const PROFILES_IN_USE: &str =
    "SELECT DISTINCT profile_name FROM devices WHERE profile_name != '' ORDER BY profile_name";
const SERVICES_BY_PROFILE: &str =
    "SELECT DISTINCT service_name FROM devices WHERE profile_name = ? ORDER BY service_name";

impl DeviceRepository for SqliteStore {
    async fn add_device(&self, device: Device) -> Result<Device, MetaError> {
        sqlx::query(INSERT)
            .bind(device.id.to_string())
            .bind(&device.name)
            .bind(&device.service_name)
            .bind(&device.profile_name)
            .bind(encode(&device.labels)?)
            .bind(encode(&device)?)
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::on_insert(ENTITY, &device.name, err))?;

        Ok(device)
    }

    async fn device_by_id(&self, id: DeviceId) -> Result<Option<Device>, MetaError> {
        Ok(store::find(&self.pool, TABLE, "id", id.to_string()).await?)
    }

    async fn device_by_name(&self, name: &str) -> Result<Option<Device>, MetaError> {
        Ok(store::find(&self.pool, TABLE, "name", name.to_string()).await?)
    }

    async fn devices(&self, page: Page, labels: &[String]) -> Result<Paged<Device>, MetaError> {
        Ok(store::fetch_page(&self.pool, TABLE, Filter::Labels(labels), page).await?)
    }

    async fn devices_by_service(
        &self,
        page: Page,
        service_name: &str,
    ) -> Result<Paged<Device>, MetaError> {
        let filter = Filter::Column("service_name", service_name);
        Ok(store::fetch_page(&self.pool, TABLE, filter, page).await?)
    }

    async fn devices_by_profile(
        &self,
        page: Page,
        profile_name: &str,
    ) -> Result<Paged<Device>, MetaError> {
        let filter = Filter::Column("profile_name", profile_name);
        Ok(store::fetch_page(&self.pool, TABLE, filter, page).await?)
    }

    async fn device_count(&self) -> Result<u64, MetaError> {
        let (count,): (i64,) = sqlx::query_as(COUNT)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn profile_names_in_use(&self) -> Result<Vec<String>, MetaError> {
        let rows: Vec<(String,)> = sqlx::query_as(PROFILES_IN_USE)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn service_names_by_profile(&self, profile_name: &str) -> Result<Vec<String>, MetaError> {
        let rows: Vec<(String,)> = sqlx::query_as(SERVICES_BY_PROFILE)
            .bind(profile_name)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn update_device(&self, device: Device) -> Result<(), MetaError> {
        let result = sqlx::query(UPDATE)
            .bind(&device.service_name)
            .bind(&device.profile_name)
            .bind(encode(&device.labels)?)
            .bind(encode(&device)?)
            .bind(&device.name)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(store::ensure_affected(result.rows_affected(), ENTITY, &device.name)?)
    }

    async fn delete_device(&self, name: &str) -> Result<(), MetaError> {
        Ok(store::delete_named(&self.pool, TABLE, ENTITY, name).await?)
    }
}
