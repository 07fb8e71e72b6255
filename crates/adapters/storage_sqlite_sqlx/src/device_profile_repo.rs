//! `SQLite` implementation of [`DeviceProfileRepository`].

use metahub_app::ports::{DeviceProfileRepository, Page, Paged};
use metahub_domain::error::MetaError;
use metahub_domain::id::DeviceProfileId;
use metahub_domain::profile::DeviceProfile;

use crate::error::StorageError;
use crate::store::{self, Filter, SqliteStore, encode};

const TABLE: &str = "device_profiles";
const ENTITY: &str = "device profile";

const INSERT: &str = r"
    INSERT INTO device_profiles (id, name, manufacturer, model, labels, body)
    VALUES (?, ?, ?, ?, ?, ?)
";

const UPDATE: &str = r"
    UPDATE device_profiles
    SET manufacturer = ?, model = ?, labels = ?, body = ?
    WHERE name = ?
";

impl DeviceProfileRepository for SqliteStore {
    async fn add_device_profile(&self, profile: DeviceProfile) -> Result<DeviceProfile, MetaError> {
        sqlx::query(INSERT)
            .bind(profile.id.to_string())
            .bind(&profile.name)
            .bind(&profile.manufacturer)
            .bind(&profile.model)
            .bind(encode(&profile.labels)?)
            .bind(encode(&profile)?)
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::on_insert(ENTITY, &profile.name, err))?;

        Ok(profile)
    }

    async fn device_profile_by_id(
        &self,
        id: DeviceProfileId,
    ) -> Result<Option<DeviceProfile>, MetaError> {
        Ok(store::find(&self.pool, TABLE, "id", id.to_string()).await?)
    }

    async fn device_profile_by_name(&self, name: &str) -> Result<Option<DeviceProfile>, MetaError> {
        Ok(store::find(&self.pool, TABLE, "name", name.to_string()).await?)
    }

    async fn device_profiles(
        &self,
        page: Page,
        labels: &[String],
    ) -> Result<Paged<DeviceProfile>, MetaError> {
        Ok(store::fetch_page(&self.pool, TABLE, Filter::Labels(labels), page).await?)
    }

    async fn device_profiles_by_manufacturer(
        &self,
        page: Page,
        manufacturer: &str,
    ) -> Result<Paged<DeviceProfile>, MetaError> {
        let filter = Filter::Column("manufacturer", manufacturer);
        Ok(store::fetch_page(&self.pool, TABLE, filter, page).await?)
    }

    async fn device_profiles_by_model(
        &self,
        page: Page,
        model: &str,
    ) -> Result<Paged<DeviceProfile>, MetaError> {
        Ok(store::fetch_page(&self.pool, TABLE, Filter::Column("model", model), page).await?)
    }

    async fn update_device_profile(&self, profile: DeviceProfile) -> Result<(), MetaError> {
        let result = sqlx::query(UPDATE)
            .bind(&profile.manufacturer)
            .bind(&profile.model)
            .bind(encode(&profile.labels)?)
            .bind(encode(&profile)?)
            .bind(&profile.name)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(store::ensure_affected(result.rows_affected(), ENTITY, &profile.name)?)
    }

    async fn delete_device_profile(&self, name: &str) -> Result<(), MetaError> {
        Ok(store::delete_named(&self.pool, TABLE, ENTITY, name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory_store;
    use metahub_domain::profile::{
        DeviceCommand, DeviceResource, ReadWrite, ResourceOperation, ValueType,
    };

    fn profile(name: &str, manufacturer: &str) -> DeviceProfile {
        DeviceProfile::builder()
            .name(name)
            .manufacturer(manufacturer)
            .model("T-1000")
            .resource(DeviceResource::new("Temperature", ValueType::Float32).with_units("C"))
            .command(DeviceCommand::new(
                "read",
                ReadWrite::Read,
                vec![ResourceOperation::on("Temperature")],
            ))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_preserve_resources_and_commands_through_roundtrip() {
        let store = memory_store().await;
        let added = store.add_device_profile(profile("P", "Acme")).await.unwrap();

        let fetched = store.device_profile_by_id(added.id).await.unwrap().unwrap();

        assert_eq!(fetched, added);
        assert_eq!(
            fetched.resource("Temperature").unwrap().properties.units,
            "C"
        );
        assert!(fetched.command("read").is_some());
    }

    #[tokio::test]
    async fn should_filter_profiles_by_manufacturer_and_model() {
        let store = memory_store().await;
        store.add_device_profile(profile("P", "Acme")).await.unwrap();
        store.add_device_profile(profile("Q", "Globex")).await.unwrap();

        let acme = store
            .device_profiles_by_manufacturer(Page::new(0, 10), "Acme")
            .await
            .unwrap();
        let model = store
            .device_profiles_by_model(Page::new(0, 10), "T-1000")
            .await
            .unwrap();

        assert_eq!(acme.total, 1);
        assert_eq!(acme.items[0].name, "P");
        assert_eq!(model.total, 2);
    }

    #[tokio::test]
    async fn should_update_filter_columns_with_body() {
        let store = memory_store().await;
        let mut stored = store.add_device_profile(profile("P", "Acme")).await.unwrap();

        stored.manufacturer = "Initech".to_string();
        store.update_device_profile(stored).await.unwrap();

        let initech = store
            .device_profiles_by_manufacturer(Page::new(0, 10), "Initech")
            .await
            .unwrap();
        assert_eq!(initech.total, 1);
    }

    #[tokio::test]
    async fn should_delete_profile_when_exists() {
        let store = memory_store().await;
        store.add_device_profile(profile("P", "Acme")).await.unwrap();

        store.delete_device_profile("P").await.unwrap();

        assert!(store.device_profile_by_name("P").await.unwrap().is_none());
    }
}
