//! # metahubd: metahub daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Connect the MQTT message bus when messaging is enabled
//! - Construct the guards, the validation handshake and the change propagator
//! - Construct the registries, injecting the store and the bus via port traits
//! - Build the axum router, bind to a TCP port and serve
//! - Reload the `[writable]` section on `SIGHUP`
//! - Handle graceful shutdown (SIGTERM/SIGINT), draining pending change notices
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use metahub_adapter_callback_reqwest::HttpCallbacks;
use metahub_adapter_http_axum::state::AppState;
use metahub_adapter_mqtt::MqttMessageBus;
use metahub_adapter_storage_sqlite_sqlx::Config as StorageConfig;
use metahub_app::guards::{AdmissionLock, CapacityGuard, IntegrityGuard};
use metahub_app::propagation::ChangePropagator;
use metahub_app::registries::{
    DeviceProfileRegistry, DeviceRegistry, DeviceServiceRegistry, ProvisionWatcherRegistry,
};
use metahub_app::settings::{self, Writable};
use metahub_app::validation::DeviceValidator;

use crate::config::Config;

/// How long shutdown waits for queued change notices to be delivered.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = Config::path();
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_tracing(&config.logging.filter);
    let request_timeout = config.service.request_timeout()?;
    let max_result_count = config.service.max_result_count;
    let base_topic = config.messaging.mqtt.base_topic.clone();

    // Database
    let db = StorageConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("initialising database")?;
    let store = db.store();

    // Message bus
    let (bus, bus_task) = if config.messaging.enabled {
        let (bus, task) = MqttMessageBus::connect(&config.messaging.mqtt);
        (Some(Arc::new(bus)), Some(task))
    } else {
        tracing::warn!("messaging disabled: device validation will fail and system events are skipped");
        (None, None)
    };

    // Change propagation
    let callbacks = HttpCallbacks::new(request_timeout).context("building callback client")?;
    let (notifier, workers) = ChangePropagator::new(store.clone(), bus.clone(), callbacks, &base_topic)
        .spawn(config.propagation.queue_capacity, config.propagation.workers);

    // Guards
    let (writable_tx, writable_rx) = settings::channel(config.writable);
    let integrity = IntegrityGuard::new(store.clone(), writable_rx.clone());
    let capacity = CapacityGuard::new(store.clone(), AdmissionLock::new(), writable_rx);
    let validator = DeviceValidator::new(bus, &base_topic, request_timeout);

    // Registries
    let state = AppState::new(
        DeviceServiceRegistry::new(
            store.clone(),
            integrity.clone(),
            notifier.clone(),
            max_result_count,
        ),
        DeviceProfileRegistry::new(
            store.clone(),
            integrity.clone(),
            capacity.clone(),
            notifier.clone(),
            max_result_count,
        ),
        DeviceRegistry::new(
            store.clone(),
            integrity.clone(),
            capacity,
            validator,
            notifier.clone(),
            max_result_count,
        ),
        ProvisionWatcherRegistry::new(store, integrity, notifier, max_result_count),
    );
    let app = metahub_adapter_http_axum::router::build(state);

    let reload = tokio::spawn(reload_on_hangup(config_path, writable_tx));

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(%bind_addr, "metahubd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned every notifier; workers exit once the queue is drained.
    reload.abort();
    let drain = async {
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::error!(%err, "propagation worker panicked");
            }
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("pending change notices dropped at shutdown");
    }
    if let Some(task) = bus_task {
        task.abort();
    }
    tracing::info!("metahubd stopped");
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter '{filter}' ({err}), falling back to 'info'");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown requested");
}

/// Re-read the `[writable]` section whenever the process receives `SIGHUP`.
#[cfg(unix)]
async fn reload_on_hangup(path: PathBuf, writable: watch::Sender<Writable>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            tracing::warn!(%err, "configuration reload unavailable");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        match Config::reload_writable(&path) {
            Ok(next) => {
                writable.send_replace(next);
                tracing::info!(
                    max_devices = next.max_devices,
                    max_resources = next.max_resources,
                    strict_changes = next.profile_change.strict_device_profile_changes,
                    strict_deletes = next.profile_change.strict_device_profile_deletes,
                    "writable settings reloaded; other sections apply on restart"
                );
            }
            Err(err) => tracing::error!(error = %err, path = %path.display(), "failed to reload configuration"),
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_path: PathBuf, _writable: watch::Sender<Writable>) {}
