//! End-to-end tests for the full metahubd stack.
//!
//! Each test spins up the complete application (in-memory `SQLite`, the
//! guards, the validation handshake, a running change propagator and the real
//! axum router) and exercises the HTTP layer via `tower::ServiceExt::oneshot`;
//! no TCP port is bound. The device service side is played by the fakes from
//! `metahub_app::testing`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use metahub_adapter_http_axum::router;
use metahub_adapter_http_axum::state::AppState;
use metahub_adapter_storage_sqlite_sqlx::Config;
use metahub_app::guards::{AdmissionLock, CapacityGuard, IntegrityGuard};
use metahub_app::propagation::ChangePropagator;
use metahub_app::registries::{
    DeviceProfileRegistry, DeviceRegistry, DeviceServiceRegistry, ProvisionWatcherRegistry,
};
use metahub_app::settings::{self, ProfileChange, Writable};
use metahub_app::testing::{RecordingBus, RecordingCallbacks, spawn_validation_responder};
use metahub_app::validation::DeviceValidator;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;

const BASE: &str = "edgex";

struct Stack {
    app: axum::Router,
    bus: Arc<RecordingBus>,
    callbacks: Arc<RecordingCallbacks>,
    writable: watch::Sender<Writable>,
    _workers: Vec<JoinHandle<()>>,
}

/// Build a fully-wired router backed by an in-memory `SQLite` database.
async fn stack(writable: Writable) -> Stack {
    let db = Config {
        database_url: "sqlite::memory:".to_string(),
    }
    .build()
    .await
    .expect("in-memory database should initialise");
    let store = db.store();

    let bus = Arc::new(RecordingBus::default());
    let callbacks = Arc::new(RecordingCallbacks::default());
    let (notifier, workers) = ChangePropagator::new(
        store.clone(),
        Some(Arc::clone(&bus)),
        Arc::clone(&callbacks),
        BASE,
    )
    .spawn(64, 2);

    let (writable_tx, writable_rx) = settings::channel(writable);
    let integrity = IntegrityGuard::new(store.clone(), writable_rx.clone());
    let capacity = CapacityGuard::new(store.clone(), AdmissionLock::new(), writable_rx);
    let validator = DeviceValidator::new(Some(Arc::clone(&bus)), BASE, Duration::from_secs(2));

    let state = AppState::new(
        DeviceServiceRegistry::new(store.clone(), integrity.clone(), notifier.clone(), 1024),
        DeviceProfileRegistry::new(
            store.clone(),
            integrity.clone(),
            capacity.clone(),
            notifier.clone(),
            1024,
        ),
        DeviceRegistry::new(
            store.clone(),
            integrity.clone(),
            capacity,
            validator,
            notifier.clone(),
            1024,
        ),
        ProvisionWatcherRegistry::new(store, integrity, notifier, 1024),
    );

    Stack {
        app: router::build(state),
        bus,
        callbacks,
        writable: writable_tx,
        _workers: workers,
    }
}

async fn call(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Poll `check` until it holds; propagation runs on background workers.
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within two seconds");
}

async fn add_service(app: &axum::Router, name: &str) {
    let (_, body) = call(
        app,
        Method::POST,
        "/api/v3/deviceservice",
        Some(json!([{
            "apiVersion": "v3",
            "service": {"name": name, "baseAddress": format!("http://{name}:59901")}
        }])),
    )
    .await;
    assert_eq!(body[0]["statusCode"], 201, "service {name}: {body}");
}

async fn add_profile(app: &axum::Router, name: &str, resources: &[&str]) {
    let resources: Vec<Value> = resources
        .iter()
        .map(|resource| json!({"name": resource, "properties": {"valueType": "Float32"}}))
        .collect();
    let (_, body) = call(
        app,
        Method::POST,
        "/api/v3/deviceprofile",
        Some(json!([{
            "apiVersion": "v3",
            "profile": {
                "name": name,
                "manufacturer": "acme",
                "model": "t-100",
                "deviceResources": resources
            }
        }])),
    )
    .await;
    assert_eq!(body[0]["statusCode"], 201, "profile {name}: {body}");
}

fn device_request(name: &str, service: &str, profile: &str) -> Value {
    json!([{
        "apiVersion": "v3",
        "requestId": format!("req-{name}"),
        "device": {
            "name": name,
            "serviceName": service,
            "profileName": profile,
            "protocols": {"modbus-tcp": {"Address": "10.0.0.7", "Port": "502"}}
        }
    }])
}

async fn add_device(app: &axum::Router, name: &str, service: &str, profile: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v3/device",
        Some(device_request(name, service, profile)),
    )
    .await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    body[0].clone()
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_return_ok_when_health_check_called() {
    let stack = stack(Writable::default()).await;

    let resp = stack
        .app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Device onboarding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_persist_device_and_propagate_when_service_accepts_it() {
    let stack = stack(Writable::default()).await;
    add_service(&stack.app, "ds-modbus").await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;
    let _responder = spawn_validation_responder(Arc::clone(&stack.bus), BASE, "ds-modbus", 0)
        .await
        .unwrap();

    let item = add_device(&stack.app, "thermo-1", "ds-modbus", "thermo").await;

    assert_eq!(item["statusCode"], 201);
    assert_eq!(item["requestId"], "req-thermo-1");
    let (status, body) = call(&stack.app, Method::GET, "/api/v3/device/name/thermo-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device"]["serviceName"], "ds-modbus");

    let callbacks = Arc::clone(&stack.callbacks);
    eventually(|| {
        callbacks
            .calls()
            .contains(&"device_added ds-modbus thermo-1".to_string())
    })
    .await;
    let bus = Arc::clone(&stack.bus);
    eventually(|| {
        bus.published_topics().contains(
            &"edgex/system-events/core-metadata/device/add/ds-modbus/thermo".to_string(),
        )
    })
    .await;
}

#[tokio::test]
async fn should_leave_no_trace_when_service_rejects_device() {
    let stack = stack(Writable::default()).await;
    add_service(&stack.app, "ds-modbus").await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;
    let _responder = spawn_validation_responder(Arc::clone(&stack.bus), BASE, "ds-modbus", 1)
        .await
        .unwrap();

    let item = add_device(&stack.app, "thermo-1", "ds-modbus", "thermo").await;

    assert_eq!(item["statusCode"], 500);
    assert!(item["message"].as_str().unwrap().contains("ds-modbus"));
    let (status, _) = call(&stack.app, Method::GET, "/api/v3/device/check/name/thermo-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(stack.callbacks.calls().is_empty());
}

#[tokio::test]
async fn should_report_unavailable_when_no_service_answers() {
    let stack = stack(Writable::default()).await;
    add_service(&stack.app, "ds-modbus").await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;

    let item = add_device(&stack.app, "thermo-1", "ds-modbus", "thermo").await;

    assert_eq!(item["statusCode"], 503);
}

#[tokio::test]
async fn should_move_device_between_services_and_notify_both() {
    let stack = stack(Writable::default()).await;
    add_service(&stack.app, "ds-a").await;
    add_service(&stack.app, "ds-b").await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;
    let _a = spawn_validation_responder(Arc::clone(&stack.bus), BASE, "ds-a", 0)
        .await
        .unwrap();
    let _b = spawn_validation_responder(Arc::clone(&stack.bus), BASE, "ds-b", 0)
        .await
        .unwrap();
    add_device(&stack.app, "thermo-1", "ds-a", "thermo").await;

    let (_, body) = call(
        &stack.app,
        Method::PATCH,
        "/api/v3/device",
        Some(json!([{"device": {"name": "thermo-1", "serviceName": "ds-b"}}])),
    )
    .await;

    assert_eq!(body[0]["statusCode"], 200, "{body}");
    let callbacks = Arc::clone(&stack.callbacks);
    eventually(|| {
        let calls = callbacks.calls();
        calls.contains(&"device_removed ds-a thermo-1".to_string())
            && calls.contains(&"device_added ds-b thermo-1".to_string())
    })
    .await;
    let (_, body) = call(&stack.app, Method::GET, "/api/v3/device/service/name/ds-b", None).await;
    assert_eq!(body["totalCount"], 1);
}

// ---------------------------------------------------------------------------
// Capacity admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_reject_device_past_configured_maximum() {
    let stack = stack(Writable {
        max_devices: 1,
        ..Writable::default()
    })
    .await;
    add_service(&stack.app, "ds-modbus").await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;
    let _responder = spawn_validation_responder(Arc::clone(&stack.bus), BASE, "ds-modbus", 0)
        .await
        .unwrap();
    assert_eq!(
        add_device(&stack.app, "thermo-1", "ds-modbus", "thermo").await["statusCode"],
        201
    );

    let item = add_device(&stack.app, "thermo-2", "ds-modbus", "thermo").await;

    assert_eq!(item["statusCode"], 400);
    assert!(item["message"].as_str().unwrap().contains("2 > 1"), "{item}");
    let (_, body) = call(&stack.app, Method::GET, "/api/v3/device/all", None).await;
    assert_eq!(body["totalCount"], 1);
}

#[tokio::test]
async fn should_apply_reloaded_limits_to_next_request() {
    let stack = stack(Writable::default()).await;
    add_service(&stack.app, "ds-modbus").await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;
    let _responder = spawn_validation_responder(Arc::clone(&stack.bus), BASE, "ds-modbus", 0)
        .await
        .unwrap();
    add_device(&stack.app, "thermo-1", "ds-modbus", "thermo").await;

    stack.writable.send_replace(Writable {
        max_devices: 1,
        ..Writable::default()
    });
    let rejected = add_device(&stack.app, "thermo-2", "ds-modbus", "thermo").await;
    stack.writable.send_replace(Writable {
        max_devices: 2,
        ..Writable::default()
    });
    let accepted = add_device(&stack.app, "thermo-2", "ds-modbus", "thermo").await;

    assert_eq!(rejected["statusCode"], 400);
    assert_eq!(accepted["statusCode"], 201);
}

#[tokio::test]
async fn should_reject_resource_that_overflows_resource_ceiling() {
    let stack = stack(Writable {
        max_resources: 2,
        ..Writable::default()
    })
    .await;
    add_service(&stack.app, "ds-modbus").await;
    add_profile(&stack.app, "thermo", &["Temperature", "Humidity"]).await;
    let _responder = spawn_validation_responder(Arc::clone(&stack.bus), BASE, "ds-modbus", 0)
        .await
        .unwrap();
    add_device(&stack.app, "thermo-1", "ds-modbus", "thermo").await;

    let (_, body) = call(
        &stack.app,
        Method::POST,
        "/api/v3/deviceprofile/resource",
        Some(json!([{
            "profileName": "thermo",
            "resource": {"name": "Pressure", "properties": {"valueType": "Float32"}}
        }])),
    )
    .await;

    assert_eq!(body[0]["statusCode"], 400, "{body}");
    let (_, body) = call(&stack.app, Method::GET, "/api/v3/deviceprofile/name/thermo", None).await;
    assert_eq!(body["profile"]["deviceResources"].as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Referential integrity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_conflict_when_deleting_service_with_devices() {
    let stack = stack(Writable::default()).await;
    add_service(&stack.app, "ds-modbus").await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;
    let _responder = spawn_validation_responder(Arc::clone(&stack.bus), BASE, "ds-modbus", 0)
        .await
        .unwrap();
    add_device(&stack.app, "thermo-1", "ds-modbus", "thermo").await;

    let (status, body) = call(
        &stack.app,
        Method::DELETE,
        "/api/v3/deviceservice/name/ds-modbus",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["statusCode"], 409);
    let (status, _) = call(
        &stack.app,
        Method::GET,
        "/api/v3/deviceservice/name/ds-modbus",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn should_lock_profile_deletes_under_strict_policy() {
    let stack = stack(Writable {
        profile_change: ProfileChange {
            strict_device_profile_deletes: true,
            ..ProfileChange::default()
        },
        ..Writable::default()
    })
    .await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;

    let (status, body) = call(
        &stack.app,
        Method::DELETE,
        "/api/v3/deviceprofile/name/thermo",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["statusCode"], 423);
}

#[tokio::test]
async fn should_delete_unused_profile_and_announce_it() {
    let stack = stack(Writable::default()).await;
    add_profile(&stack.app, "thermo", &["Temperature"]).await;

    let (status, _) = call(
        &stack.app,
        Method::DELETE,
        "/api/v3/deviceprofile/name/thermo",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let bus = Arc::clone(&stack.bus);
    eventually(|| {
        bus.published_topics().contains(
            &"edgex/system-events/core-metadata/device-profile/delete/core-metadata/thermo"
                .to_string(),
        )
    })
    .await;
}
