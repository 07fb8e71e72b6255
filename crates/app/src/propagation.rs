//! Change propagator.
//!
//! After a commit, registries hand a [`Change`] to the [`ChangeNotifier`].
//! The notifier never blocks: when the bounded queue is full the notice is
//! dropped with a warning. Worker tasks drain the queue, call back the owning
//! device services and publish system events. Failures are logged and
//! swallowed since the write they describe is already durable.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use metahub_domain::device::Device;
use metahub_domain::device_service::DeviceService;
use metahub_domain::error::MetaError;
use metahub_domain::event::{SOURCE, SystemEvent, SystemEventAction, SystemEventType};
use metahub_domain::id::RequestId;
use metahub_domain::profile::DeviceProfile;
use metahub_domain::provision_watcher::ProvisionWatcher;

use crate::ports::{DeviceServiceCallback, MessageBus, MessageEnvelope, MetadataStore};

/// A committed write worth telling the world about.
#[derive(Debug, Clone)]
pub enum Change {
    Device {
        action: SystemEventAction,
        device: Device,
        /// Set when an update moved the device away from this service.
        previous_service: Option<String>,
    },
    Profile {
        action: SystemEventAction,
        profile: DeviceProfile,
    },
    Service {
        action: SystemEventAction,
        service: DeviceService,
    },
    Watcher {
        action: SystemEventAction,
        watcher: ProvisionWatcher,
        previous_service: Option<String>,
    },
}

impl Change {
    fn label(&self) -> &'static str {
        match self {
            Self::Device { .. } => "device",
            Self::Profile { .. } => "device profile",
            Self::Service { .. } => "device service",
            Self::Watcher { .. } => "provision watcher",
        }
    }
}

/// A queued [`Change`] with the correlation id of the request that made it.
#[derive(Debug, Clone)]
pub struct Notice {
    pub correlation_id: String,
    pub change: Change,
}

/// Submission side of the propagation queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: mpsc::Sender<Notice>,
}

impl ChangeNotifier {
    /// Queue `change` without waiting. Drops it with a warning when the queue
    /// is full or the workers are gone.
    pub fn submit(&self, correlation_id: &str, change: Change) {
        let kind = change.label();
        let notice = Notice {
            correlation_id: correlation_id.to_string(),
            change,
        };
        match self.sender.try_send(notice) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%correlation_id, kind, "propagation queue full, change notification dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(%correlation_id, kind, "propagation workers stopped, change notification dropped");
            }
        }
    }

    /// Notifier wired to a plain channel, for callers that inspect notices
    /// themselves.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

/// Delivers notices to device services and to the message bus.
pub struct ChangePropagator<S, B, C> {
    store: S,
    bus: Option<B>,
    callbacks: C,
    base_topic: String,
    warned_no_bus: AtomicBool,
}

impl<S, B, C> ChangePropagator<S, B, C>
where
    S: MetadataStore,
    B: MessageBus,
    C: DeviceServiceCallback,
{
    pub fn new(store: S, bus: Option<B>, callbacks: C, base_topic: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            callbacks,
            base_topic: base_topic.into(),
            warned_no_bus: AtomicBool::new(false),
        }
    }

    /// Start `workers` tasks draining a queue of `capacity` notices.
    ///
    /// Workers stop once every [`ChangeNotifier`] clone is dropped and the
    /// queue is empty.
    pub fn spawn(self, capacity: usize, workers: usize) -> (ChangeNotifier, Vec<JoinHandle<()>>) {
        let (notifier, receiver) = ChangeNotifier::channel(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let this = Arc::new(self);
        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let this = Arc::clone(&this);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(notice) = next else { break };
                        this.handle(notice).await;
                    }
                    tracing::debug!(worker, "propagation worker stopped");
                })
            })
            .collect();
        (notifier, handles)
    }

    /// Deliver one notice: callbacks first, then system events.
    #[tracing::instrument(skip(self, notice), fields(correlation_id = %notice.correlation_id))]
    pub async fn handle(&self, notice: Notice) {
        let correlation_id = notice.correlation_id.as_str();
        match &notice.change {
            Change::Device {
                action,
                device,
                previous_service,
            } => {
                self.device_callbacks(*action, device, previous_service.as_deref())
                    .await;
                let mut owners = vec![device.service_name.as_str()];
                if let Some(previous) = moved_from(previous_service.as_deref(), &device.service_name) {
                    owners.insert(0, previous);
                }
                for owner in owners {
                    self.publish(
                        correlation_id,
                        SystemEventType::Device,
                        *action,
                        owner,
                        Some(&device.profile_name),
                        device,
                    )
                    .await;
                }
            }
            Change::Profile { action, profile } => {
                self.profile_change(correlation_id, *action, profile).await;
            }
            Change::Service { action, service } => {
                if *action == SystemEventAction::Update {
                    log_callback(
                        self.callbacks.service_updated(service).await,
                        "service_updated",
                        &service.name,
                    );
                }
                self.publish(
                    correlation_id,
                    SystemEventType::DeviceService,
                    *action,
                    &service.name,
                    None,
                    service,
                )
                .await;
            }
            Change::Watcher {
                action,
                watcher,
                previous_service,
            } => {
                self.watcher_callbacks(*action, watcher, previous_service.as_deref())
                    .await;
                self.publish(
                    correlation_id,
                    SystemEventType::ProvisionWatcher,
                    *action,
                    &watcher.service_name,
                    watcher.profile_name(),
                    watcher,
                )
                .await;
            }
        }
    }

    async fn profile_change(
        &self,
        correlation_id: &str,
        action: SystemEventAction,
        profile: &DeviceProfile,
    ) {
        if action != SystemEventAction::Update {
            self.publish(
                correlation_id,
                SystemEventType::DeviceProfile,
                action,
                SOURCE,
                Some(&profile.name),
                profile,
            )
            .await;
            return;
        }

        let owners: BTreeSet<String> = match self.store.service_names_by_profile(&profile.name).await
        {
            Ok(owners) => owners.into_iter().collect(),
            Err(err) => {
                tracing::error!(profile = %profile.name, error = %err, "failed to list services using device profile");
                return;
            }
        };
        for owner in &owners {
            if let Some(service) = self.resolve_service(owner).await {
                log_callback(
                    self.callbacks.profile_updated(&service, profile).await,
                    "profile_updated",
                    &profile.name,
                );
            }
        }
        if owners.is_empty() {
            self.publish(
                correlation_id,
                SystemEventType::DeviceProfile,
                action,
                SOURCE,
                Some(&profile.name),
                profile,
            )
            .await;
        }
        for owner in &owners {
            self.publish(
                correlation_id,
                SystemEventType::DeviceProfile,
                action,
                owner,
                Some(&profile.name),
                profile,
            )
            .await;
        }
    }

    async fn device_callbacks(
        &self,
        action: SystemEventAction,
        device: &Device,
        previous_service: Option<&str>,
    ) {
        if let Some(previous) = moved_from(previous_service, &device.service_name) {
            if let Some(old) = self.resolve_service(previous).await {
                log_callback(
                    self.callbacks.device_removed(&old, device).await,
                    "device_removed",
                    &device.name,
                );
            }
            if let Some(new) = self.resolve_service(&device.service_name).await {
                log_callback(
                    self.callbacks.device_added(&new, device).await,
                    "device_added",
                    &device.name,
                );
            }
            return;
        }

        let Some(service) = self.resolve_service(&device.service_name).await else {
            return;
        };
        let (result, call) = match action {
            SystemEventAction::Add => (
                self.callbacks.device_added(&service, device).await,
                "device_added",
            ),
            SystemEventAction::Update => (
                self.callbacks.device_updated(&service, device).await,
                "device_updated",
            ),
            SystemEventAction::Delete => (
                self.callbacks.device_removed(&service, device).await,
                "device_removed",
            ),
        };
        log_callback(result, call, &device.name);
    }

    async fn watcher_callbacks(
        &self,
        action: SystemEventAction,
        watcher: &ProvisionWatcher,
        previous_service: Option<&str>,
    ) {
        if let Some(previous) = moved_from(previous_service, &watcher.service_name) {
            if let Some(old) = self.resolve_service(previous).await {
                log_callback(
                    self.callbacks.watcher_removed(&old, watcher).await,
                    "watcher_removed",
                    &watcher.name,
                );
            }
        }

        let Some(service) = self.resolve_service(&watcher.service_name).await else {
            return;
        };
        let (result, call) = match action {
            SystemEventAction::Add => (
                self.callbacks.watcher_added(&service, watcher).await,
                "watcher_added",
            ),
            SystemEventAction::Update => (
                self.callbacks.watcher_updated(&service, watcher).await,
                "watcher_updated",
            ),
            SystemEventAction::Delete => (
                self.callbacks.watcher_removed(&service, watcher).await,
                "watcher_removed",
            ),
        };
        log_callback(result, call, &watcher.name);
    }

    /// Latest stored record of the callee, so its current base address is used.
    async fn resolve_service(&self, name: &str) -> Option<DeviceService> {
        match self.store.device_service_by_name(name).await {
            Ok(Some(service)) => Some(service),
            Ok(None) => {
                tracing::error!(service = name, "device service for callback not found");
                None
            }
            Err(err) => {
                tracing::error!(service = name, error = %err, "failed to look up device service for callback");
                None
            }
        }
    }

    async fn publish<T: Serialize>(
        &self,
        correlation_id: &str,
        event_type: SystemEventType,
        action: SystemEventAction,
        owner: &str,
        suffix: Option<&str>,
        details: &T,
    ) {
        let Some(bus) = &self.bus else {
            if !self.warned_no_bus.swap(true, Ordering::Relaxed) {
                tracing::warn!("no message bus configured, system events will not be published");
            }
            return;
        };

        let outcome = async {
            let event = SystemEvent::new(event_type, action, owner, details)
                .map_err(MetaError::storage)?;
            let topic = event.topic(&self.base_topic, suffix);
            let envelope =
                MessageEnvelope::json(correlation_id, RequestId::new().to_string(), &event)?;
            bus.publish(&topic, envelope).await?;
            Ok::<_, MetaError>(topic)
        }
        .await;

        match outcome {
            Ok(topic) => tracing::debug!(%topic, "system event published"),
            Err(err) => tracing::error!(
                event_type = %event_type,
                action = %action,
                owner,
                error = %err,
                "failed to publish system event"
            ),
        }
    }
}

fn moved_from<'a>(previous: Option<&'a str>, current: &str) -> Option<&'a str> {
    previous.filter(|previous| *previous != current)
}

fn log_callback(result: Result<(), MetaError>, call: &'static str, subject: &str) {
    if let Err(err) = result {
        tracing::error!(call, subject, error = %err, "device service callback failed");
    }
}
