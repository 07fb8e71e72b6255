//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use metahub_app::ports::{MessageBus, MetadataStore};

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// Nests the API routes under `/api/v3`. Includes a [`TraceLayer`] that logs
/// each HTTP request/response at the `DEBUG` level using the `tracing`
/// ecosystem.
pub fn build<S, B>(state: AppState<S, B>) -> Router
where
    S: MetadataStore,
    B: MessageBus,
{
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v3", crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use metahub_app::guards::{AdmissionLock, CapacityGuard, IntegrityGuard};
    use metahub_app::message_bus::InProcessMessageBus;
    use metahub_app::propagation::{ChangeNotifier, Notice};
    use metahub_app::registries::{
        DeviceProfileRegistry, DeviceRegistry, DeviceServiceRegistry, ProvisionWatcherRegistry,
    };
    use metahub_app::settings::{self, Writable};
    use metahub_app::testing::{InMemoryStore, spawn_validation_responder};
    use metahub_app::validation::DeviceValidator;
    use metahub_domain::device::Device;
    use metahub_domain::device_service::DeviceService;
    use metahub_domain::profile::{DeviceProfile, DeviceResource, ValueType};
    use serde_json::{Value, json};
    use tokio::sync::{mpsc, watch};
    use tower::ServiceExt;

    const BASE: &str = "edgex";

    struct Harness {
        store: InMemoryStore,
        bus: Arc<InProcessMessageBus>,
        app: Router,
        _writable: watch::Sender<Writable>,
        _notices: mpsc::Receiver<Notice>,
    }

    fn harness() -> Harness {
        let store = InMemoryStore::new();
        let bus = Arc::new(InProcessMessageBus::default());
        let (writable, rx) = settings::channel(Writable::default());
        let (notifier, notices) = ChangeNotifier::channel(64);
        let integrity = IntegrityGuard::new(store.clone(), rx.clone());
        let capacity = CapacityGuard::new(store.clone(), AdmissionLock::new(), rx);
        let validator =
            DeviceValidator::new(Some(Arc::clone(&bus)), BASE, Duration::from_secs(1));

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
            ProvisionWatcherRegistry::new(store.clone(), integrity, notifier, 1024),
        );

        Harness {
            store,
            bus,
            app: build(state),
            _writable: writable,
            _notices: notices,
        }
    }

    fn seed_service(store: &InMemoryStore, name: &str) {
        store.insert_service(
            DeviceService::builder()
                .name(name)
                .base_address("http://localhost:59901")
                .build()
                .unwrap(),
        );
    }

    fn seed_profile(store: &InMemoryStore, name: &str) {
        store.insert_profile(
            DeviceProfile::builder()
                .name(name)
                .manufacturer("acme")
                .resource(DeviceResource::new("Temperature", ValueType::Float32))
                .build()
                .unwrap(),
        );
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn should_return_ok_when_health_check_called() {
        let h = harness();

        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn should_answer_ping_with_service_name() {
        let h = harness();

        let (status, body) = call(&h.app, Method::GET, "/api/v3/ping", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["serviceName"], "core-metadata");
        assert_eq!(body["apiVersion"], "v3");
    }

    #[tokio::test]
    async fn should_report_each_item_of_a_service_batch() {
        let h = harness();
        let item = |request_id: &str| {
            json!({
                "apiVersion": "v3",
                "requestId": request_id,
                "service": {"name": "ds-modbus", "baseAddress": "http://ds-modbus:59901"}
            })
        };

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/api/v3/deviceservice",
            Some(json!([item("r-1"), item("r-2")])),
        )
        .await;

        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert_eq!(body[0]["requestId"], "r-1");
        assert_eq!(body[0]["statusCode"], 201);
        assert!(body[0]["id"].as_str().is_some());
        assert_eq!(body[1]["statusCode"], 400);
        assert!(
            body[1]["message"]
                .as_str()
                .unwrap()
                .contains("already exists")
        );
    }

    #[tokio::test]
    async fn should_return_not_found_when_device_missing() {
        let h = harness();

        let (status, body) = call(&h.app, Method::GET, "/api/v3/device/name/ghost", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["statusCode"], 404);
    }

    #[tokio::test]
    async fn should_add_device_after_owning_service_accepts_it() {
        let h = harness();
        seed_service(&h.store, "ds-modbus");
        seed_profile(&h.store, "thermo");
        let _responder = spawn_validation_responder(Arc::clone(&h.bus), BASE, "ds-modbus", 0)
            .await
            .unwrap();

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/api/v3/device",
            Some(json!([{
                "requestId": "r-1",
                "device": {
                    "name": "thermo-1",
                    "serviceName": "ds-modbus",
                    "profileName": "thermo",
                    "protocols": {"modbus-tcp": {"Address": "10.0.0.7"}}
                }
            }])),
        )
        .await;

        assert_eq!(status, StatusCode::MULTI_STATUS);
        assert_eq!(body[0]["statusCode"], 201);
        let (status, body) = call(&h.app, Method::GET, "/api/v3/device/name/thermo-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["device"]["profileName"], "thermo");
    }

    #[tokio::test]
    async fn should_reject_device_item_when_service_refuses() {
        let h = harness();
        seed_service(&h.store, "ds-modbus");
        let _responder = spawn_validation_responder(Arc::clone(&h.bus), BASE, "ds-modbus", 1)
            .await
            .unwrap();

        let (_, body) = call(
            &h.app,
            Method::POST,
            "/api/v3/device",
            Some(json!([{
                "requestId": "r-1",
                "device": {
                    "name": "thermo-1",
                    "serviceName": "ds-modbus",
                    "protocols": {"modbus-tcp": {"Address": "bad"}}
                }
            }])),
        )
        .await;

        assert_eq!(body[0]["statusCode"], 500);
        assert!(h.store.device_names().is_empty());
    }

    #[tokio::test]
    async fn should_conflict_when_deleting_profile_in_use() {
        let h = harness();
        seed_service(&h.store, "ds-modbus");
        seed_profile(&h.store, "thermo");
        h.store.insert_device(
            Device::builder()
                .name("thermo-1")
                .service_name("ds-modbus")
                .profile_name("thermo")
                .protocol("modbus-tcp", "Address", "10.0.0.7")
                .build()
                .unwrap(),
        );

        let (status, body) = call(
            &h.app,
            Method::DELETE,
            "/api/v3/deviceprofile/name/thermo",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["statusCode"], 409);
    }

    #[tokio::test]
    async fn should_page_profiles_and_report_total_count() {
        let h = harness();
        for name in ["p1", "p2", "p3"] {
            seed_profile(&h.store, name);
        }

        let (status, body) = call(
            &h.app,
            Method::GET,
            "/api/v3/deviceprofile/manufacturer/acme?offset=1&limit=1",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalCount"], 3);
        assert_eq!(body["profiles"].as_array().unwrap().len(), 1);
        assert_eq!(body["profiles"][0]["name"], "p2");
    }

    #[tokio::test]
    async fn should_reject_invalid_limit() {
        let h = harness();

        let (status, _) = call(&h.app, Method::GET, "/api/v3/device/all?limit=-5", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn should_check_device_name() {
        let h = harness();
        seed_service(&h.store, "ds-modbus");
        h.store.insert_device(
            Device::builder()
                .name("thermo-1")
                .service_name("ds-modbus")
                .protocol("modbus-tcp", "Address", "10.0.0.7")
                .build()
                .unwrap(),
        );

        let (found, _) = call(&h.app, Method::GET, "/api/v3/device/check/name/thermo-1", None).await;
        let (missing, _) = call(&h.app, Method::GET, "/api/v3/device/check/name/other", None).await;

        assert_eq!(found, StatusCode::OK);
        assert_eq!(missing, StatusCode::NOT_FOUND);
    }
}
