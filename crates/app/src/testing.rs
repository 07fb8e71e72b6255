//! In-memory fakes of the ports, shared with adapter and daemon tests.
//!
//! Enabled for this crate's own tests and, downstream, through the `testing`
//! feature.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use metahub_domain::device::Device;
use metahub_domain::device_service::DeviceService;
use metahub_domain::error::{MetaError, NotFoundError, ValidationError};
use metahub_domain::id::{DeviceId, DeviceProfileId, DeviceServiceId, ProvisionWatcherId};
use metahub_domain::profile::DeviceProfile;
use metahub_domain::provision_watcher::ProvisionWatcher;

use crate::message_bus::InProcessMessageBus;
use crate::ports::{
    DeviceProfileRepository, DeviceRepository, DeviceServiceCallback, DeviceServiceRepository,
    MessageBus, MessageEnvelope, Page, Paged, ProvisionWatcherRepository, Subscription,
};
use crate::validation;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn paginate<'a, T: Clone + 'a>(items: impl Iterator<Item = &'a T>, page: Page) -> Paged<T> {
    let matching: Vec<&T> = items.collect();
    Paged {
        total: matching.len() as u64,
        items: matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect(),
    }
}

fn has_labels(own: &[String], wanted: &[String]) -> bool {
    wanted.iter().all(|label| own.contains(label))
}

fn insert_unique<T>(
    table: &mut BTreeMap<String, T>,
    entity: &'static str,
    name: &str,
    value: T,
) -> Result<(), MetaError> {
    if table.contains_key(name) {
        return Err(ValidationError::DuplicateName {
            entity,
            name: name.to_string(),
        }
        .into());
    }
    table.insert(name.to_string(), value);
    Ok(())
}

fn replace_by<T>(
    table: &mut BTreeMap<String, T>,
    entity: &'static str,
    name: &str,
    matches: impl Fn(&T) -> bool,
    value: T,
) -> Result<(), MetaError> {
    let key = table
        .iter()
        .find(|(_, row)| matches(row))
        .map(|(key, _)| key.clone())
        .ok_or_else(|| NotFoundError {
            entity,
            id: name.to_string(),
        })?;
    table.remove(&key);
    table.insert(name.to_string(), value);
    Ok(())
}

fn remove_named<T>(
    table: &mut BTreeMap<String, T>,
    entity: &'static str,
    name: &str,
) -> Result<(), MetaError> {
    table.remove(name).map(|_| ()).ok_or_else(|| {
        NotFoundError {
            entity,
            id: name.to_string(),
        }
        .into()
    })
}

#[derive(Default)]
struct Tables {
    services: BTreeMap<String, DeviceService>,
    profiles: BTreeMap<String, DeviceProfile>,
    devices: BTreeMap<String, Device>,
    watchers: BTreeMap<String, ProvisionWatcher>,
}

/// Datastore fake keeping every table in a name-ordered map.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a service without going through the registry.
    pub fn insert_service(&self, service: DeviceService) {
        lock(&self.tables)
            .services
            .insert(service.name.clone(), service);
    }

    /// Seed a profile without going through the registry.
    pub fn insert_profile(&self, profile: DeviceProfile) {
        lock(&self.tables)
            .profiles
            .insert(profile.name.clone(), profile);
    }

    /// Seed a device without going through the registry.
    pub fn insert_device(&self, device: Device) {
        lock(&self.tables)
            .devices
            .insert(device.name.clone(), device);
    }

    /// Seed a provision watcher without going through the registry.
    pub fn insert_watcher(&self, watcher: ProvisionWatcher) {
        lock(&self.tables)
            .watchers
            .insert(watcher.name.clone(), watcher);
    }

    #[must_use]
    pub fn device_names(&self) -> Vec<String> {
        lock(&self.tables).devices.keys().cloned().collect()
    }
}

impl DeviceServiceRepository for InMemoryStore {
    fn add_device_service(
        &self,
        service: DeviceService,
    ) -> impl Future<Output = Result<DeviceService, MetaError>> + Send {
        let result = insert_unique(
            &mut lock(&self.tables).services,
            "device service",
            &service.name,
            service.clone(),
        )
        .map(|()| service);
        async { result }
    }

    fn device_service_by_id(
        &self,
        id: DeviceServiceId,
    ) -> impl Future<Output = Result<Option<DeviceService>, MetaError>> + Send {
        let found = lock(&self.tables)
            .services
            .values()
            .find(|s| s.id == id)
            .cloned();
        async { Ok(found) }
    }

    fn device_service_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<DeviceService>, MetaError>> + Send {
        let found = lock(&self.tables).services.get(name).cloned();
        async { Ok(found) }
    }

    fn device_services(
        &self,
        page: Page,
        labels: &[String],
    ) -> impl Future<Output = Result<Paged<DeviceService>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .services
                .values()
                .filter(|s| has_labels(&s.labels, labels)),
            page,
        );
        async { Ok(paged) }
    }

    fn update_device_service(
        &self,
        service: DeviceService,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let id = service.id;
        let name = service.name.clone();
        let result = replace_by(
            &mut lock(&self.tables).services,
            "device service",
            &name,
            |row| row.id == id,
            service,
        );
        async { result }
    }

    fn delete_device_service(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let result = remove_named(&mut lock(&self.tables).services, "device service", name);
        async { result }
    }
}

impl DeviceProfileRepository for InMemoryStore {
    fn add_device_profile(
        &self,
        profile: DeviceProfile,
    ) -> impl Future<Output = Result<DeviceProfile, MetaError>> + Send {
        let result = insert_unique(
            &mut lock(&self.tables).profiles,
            "device profile",
            &profile.name,
            profile.clone(),
        )
        .map(|()| profile);
        async { result }
    }

    fn device_profile_by_id(
        &self,
        id: DeviceProfileId,
    ) -> impl Future<Output = Result<Option<DeviceProfile>, MetaError>> + Send {
        let found = lock(&self.tables)
            .profiles
            .values()
            .find(|p| p.id == id)
            .cloned();
        async { Ok(found) }
    }

    fn device_profile_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<DeviceProfile>, MetaError>> + Send {
        let found = lock(&self.tables).profiles.get(name).cloned();
        async { Ok(found) }
    }

    fn device_profiles(
        &self,
        page: Page,
        labels: &[String],
    ) -> impl Future<Output = Result<Paged<DeviceProfile>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .profiles
                .values()
                .filter(|p| has_labels(&p.labels, labels)),
            page,
        );
        async { Ok(paged) }
    }

    fn device_profiles_by_manufacturer(
        &self,
        page: Page,
        manufacturer: &str,
    ) -> impl Future<Output = Result<Paged<DeviceProfile>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .profiles
                .values()
                .filter(|p| p.manufacturer == manufacturer),
            page,
        );
        async { Ok(paged) }
    }

    fn device_profiles_by_model(
        &self,
        page: Page,
        model: &str,
    ) -> impl Future<Output = Result<Paged<DeviceProfile>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables.profiles.values().filter(|p| p.model == model),
            page,
        );
        async { Ok(paged) }
    }

    fn update_device_profile(
        &self,
        profile: DeviceProfile,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let id = profile.id;
        let name = profile.name.clone();
        let result = replace_by(
            &mut lock(&self.tables).profiles,
            "device profile",
            &name,
            |row| row.id == id,
            profile,
        );
        async { result }
    }

    fn delete_device_profile(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let result = remove_named(&mut lock(&self.tables).profiles, "device profile", name);
        async { result }
    }
}

impl DeviceRepository for InMemoryStore {
    fn add_device(
        &self,
        device: Device,
    ) -> impl Future<Output = Result<Device, MetaError>> + Send {
        let result = insert_unique(
            &mut lock(&self.tables).devices,
            "device",
            &device.name,
            device.clone(),
        )
        .map(|()| device);
        async { result }
    }

    fn device_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, MetaError>> + Send {
        let found = lock(&self.tables)
            .devices
            .values()
            .find(|d| d.id == id)
            .cloned();
        async { Ok(found) }
    }

    fn device_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Device>, MetaError>> + Send {
        let found = lock(&self.tables).devices.get(name).cloned();
        async { Ok(found) }
    }

    fn devices(
        &self,
        page: Page,
        labels: &[String],
    ) -> impl Future<Output = Result<Paged<Device>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .devices
                .values()
                .filter(|d| has_labels(&d.labels, labels)),
            page,
        );
        async { Ok(paged) }
    }

    fn devices_by_service(
        &self,
        page: Page,
        service_name: &str,
    ) -> impl Future<Output = Result<Paged<Device>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .devices
                .values()
                .filter(|d| d.service_name == service_name),
            page,
        );
        async { Ok(paged) }
    }

    fn devices_by_profile(
        &self,
        page: Page,
        profile_name: &str,
    ) -> impl Future<Output = Result<Paged<Device>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .devices
                .values()
                .filter(|d| d.profile_name == profile_name),
            page,
        );
        async { Ok(paged) }
    }

    fn device_count(&self) -> impl Future<Output = Result<u64, MetaError>> + Send {
        let count = lock(&self.tables).devices.len() as u64;
        async move { Ok(count) }
    }

    fn profile_names_in_use(&self) -> impl Future<Output = Result<Vec<String>, MetaError>> + Send {
        let mut names: Vec<String> = lock(&self.tables)
            .devices
            .values()
            .filter(|d| d.has_profile())
            .map(|d| d.profile_name.clone())
            .collect();
        names.sort();
        names.dedup();
        async { Ok(names) }
    }

    fn service_names_by_profile(
        &self,
        profile_name: &str,
    ) -> impl Future<Output = Result<Vec<String>, MetaError>> + Send {
        let mut names: Vec<String> = lock(&self.tables)
            .devices
            .values()
            .filter(|d| d.profile_name == profile_name)
            .map(|d| d.service_name.clone())
            .collect();
        names.sort();
        names.dedup();
        async { Ok(names) }
    }

    fn update_device(&self, device: Device) -> impl Future<Output = Result<(), MetaError>> + Send {
        let id = device.id;
        let name = device.name.clone();
        let result = replace_by(
            &mut lock(&self.tables).devices,
            "device",
            &name,
            |row| row.id == id,
            device,
        );
        async { result }
    }

    fn delete_device(&self, name: &str) -> impl Future<Output = Result<(), MetaError>> + Send {
        let result = remove_named(&mut lock(&self.tables).devices, "device", name);
        async { result }
    }
}

impl ProvisionWatcherRepository for InMemoryStore {
    fn add_provision_watcher(
        &self,
        watcher: ProvisionWatcher,
    ) -> impl Future<Output = Result<ProvisionWatcher, MetaError>> + Send {
        let result = insert_unique(
            &mut lock(&self.tables).watchers,
            "provision watcher",
            &watcher.name,
            watcher.clone(),
        )
        .map(|()| watcher);
        async { result }
    }

    fn provision_watcher_by_id(
        &self,
        id: ProvisionWatcherId,
    ) -> impl Future<Output = Result<Option<ProvisionWatcher>, MetaError>> + Send {
        let found = lock(&self.tables)
            .watchers
            .values()
            .find(|w| w.id == id)
            .cloned();
        async { Ok(found) }
    }

    fn provision_watcher_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ProvisionWatcher>, MetaError>> + Send {
        let found = lock(&self.tables).watchers.get(name).cloned();
        async { Ok(found) }
    }

    fn provision_watchers(
        &self,
        page: Page,
        labels: &[String],
    ) -> impl Future<Output = Result<Paged<ProvisionWatcher>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .watchers
                .values()
                .filter(|w| has_labels(&w.labels, labels)),
            page,
        );
        async { Ok(paged) }
    }

    fn provision_watchers_by_service(
        &self,
        page: Page,
        service_name: &str,
    ) -> impl Future<Output = Result<Paged<ProvisionWatcher>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .watchers
                .values()
                .filter(|w| w.service_name == service_name),
            page,
        );
        async { Ok(paged) }
    }

    fn provision_watchers_by_profile(
        &self,
        page: Page,
        profile_name: &str,
    ) -> impl Future<Output = Result<Paged<ProvisionWatcher>, MetaError>> + Send {
        let tables = lock(&self.tables);
        let paged = paginate(
            tables
                .watchers
                .values()
                .filter(|w| w.profile_name() == Some(profile_name)),
            page,
        );
        async { Ok(paged) }
    }

    fn update_provision_watcher(
        &self,
        watcher: ProvisionWatcher,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let id = watcher.id;
        let name = watcher.name.clone();
        let result = replace_by(
            &mut lock(&self.tables).watchers,
            "provision watcher",
            &name,
            |row| row.id == id,
            watcher,
        );
        async { result }
    }

    fn delete_provision_watcher(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        let result = remove_named(&mut lock(&self.tables).watchers, "provision watcher", name);
        async { result }
    }
}

/// In-process bus that also remembers what went through it.
#[derive(Default)]
pub struct RecordingBus {
    inner: InProcessMessageBus,
    published: Mutex<Vec<(String, MessageEnvelope)>>,
    unsubscribed: Mutex<Vec<String>>,
}

impl RecordingBus {
    #[must_use]
    pub fn published(&self) -> Vec<(String, MessageEnvelope)> {
        lock(&self.published).clone()
    }

    #[must_use]
    pub fn published_topics(&self) -> Vec<String> {
        lock(&self.published)
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    #[must_use]
    pub fn unsubscribed(&self) -> Vec<String> {
        lock(&self.unsubscribed).clone()
    }
}

impl MessageBus for RecordingBus {
    fn publish(
        &self,
        topic: &str,
        envelope: MessageEnvelope,
    ) -> impl Future<Output = Result<(), MetaError>> + Send {
        lock(&self.published).push((topic.to_string(), envelope.clone()));
        self.inner.publish(topic, envelope)
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<Subscription, MetaError>> + Send {
        self.inner.subscribe(topic)
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), MetaError>> + Send {
        lock(&self.unsubscribed).push(topic.to_string());
        self.inner.unsubscribe(topic)
    }
}

/// Play the part of device service `service`: answer every validation
/// request on `bus` with `error_code`, echoing the request ids.
///
/// # Errors
///
/// Returns the bus error when subscribing to the request topic fails.
pub async fn spawn_validation_responder<B>(
    bus: Arc<B>,
    base_topic: &str,
    service: &str,
    error_code: u8,
) -> Result<JoinHandle<()>, MetaError>
where
    B: MessageBus + Send + Sync + 'static,
{
    let mut requests = bus
        .subscribe(&validation::request_topic(base_topic, service))
        .await?;
    let base_topic = base_topic.to_string();
    let service = service.to_string();
    Ok(tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let reply = MessageEnvelope {
                error_code,
                payload: if error_code == 0 {
                    serde_json::Value::Null
                } else {
                    serde_json::json!({ "message": format!("{service} rejects the device") })
                },
                ..request.clone()
            };
            let topic = validation::reply_topic(&base_topic, &service, &request.request_id);
            if let Err(err) = bus.publish(&topic, reply).await {
                tracing::warn!(%err, "fake device service could not reply");
            }
        }
    }))
}

/// Callback fake recording `"<call> <service> <subject>"` lines.
#[derive(Default)]
pub struct RecordingCallbacks {
    calls: Mutex<Vec<String>>,
}

impl RecordingCallbacks {
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: &str, service: &DeviceService, subject: &str) {
        lock(&self.calls).push(format!("{call} {} {subject}", service.name));
    }
}

impl DeviceServiceCallback for RecordingCallbacks {
    async fn device_added(&self, service: &DeviceService, device: &Device) -> Result<(), MetaError> {
        self.record("device_added", service, &device.name);
        Ok(())
    }

    async fn device_updated(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> Result<(), MetaError> {
        self.record("device_updated", service, &device.name);
        Ok(())
    }

    async fn device_removed(
        &self,
        service: &DeviceService,
        device: &Device,
    ) -> Result<(), MetaError> {
        self.record("device_removed", service, &device.name);
        Ok(())
    }

    async fn profile_updated(
        &self,
        service: &DeviceService,
        profile: &DeviceProfile,
    ) -> Result<(), MetaError> {
        self.record("profile_updated", service, &profile.name);
        Ok(())
    }

    async fn watcher_added(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> Result<(), MetaError> {
        self.record("watcher_added", service, &watcher.name);
        Ok(())
    }

    async fn watcher_updated(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> Result<(), MetaError> {
        self.record("watcher_updated", service, &watcher.name);
        Ok(())
    }

    async fn watcher_removed(
        &self,
        service: &DeviceService,
        watcher: &ProvisionWatcher,
    ) -> Result<(), MetaError> {
        self.record("watcher_removed", service, &watcher.name);
        Ok(())
    }

    async fn service_updated(&self, service: &DeviceService) -> Result<(), MetaError> {
        self.record("service_updated", service, &service.name);
        Ok(())
    }
}
