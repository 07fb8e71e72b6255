//! JSON REST API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod device_profiles;
#[allow(clippy::missing_errors_doc)]
pub mod device_services;
#[allow(clippy::missing_errors_doc)]
pub mod devices;
#[allow(clippy::missing_errors_doc)]
pub mod provision_watchers;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use serde::Serialize;

use metahub_app::ports::{MessageBus, MetadataStore};
use metahub_domain::error::MetaError;
use metahub_domain::event::{API_VERSION, SOURCE};

use crate::dto::BaseResponse;
use crate::error::{message_of, status_of};
use crate::state::AppState;

/// Answer of a batch endpoint: one [`BaseResponse`] per request item.
pub struct MultiStatus(pub Vec<BaseResponse>);

impl IntoResponse for MultiStatus {
    fn into_response(self) -> Response {
        (StatusCode::MULTI_STATUS, Json(self.0)).into_response()
    }
}

/// Report a failed batch item.
pub(crate) fn item_failure(request_id: String, err: &MetaError) -> BaseResponse {
    BaseResponse::failure(request_id, status_of(err), message_of(err))
}

/// Report a successful batch item without payload.
pub(crate) fn item_ok(request_id: String) -> BaseResponse {
    BaseResponse::success(request_id, StatusCode::OK)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub api_version: &'static str,
    pub timestamp: String,
    pub service_name: &'static str,
}

/// `GET /api/v3/ping`
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        api_version: API_VERSION,
        timestamp: metahub_domain::time::now().to_rfc3339(),
        service_name: SOURCE,
    })
}

/// Build the `/api/v3` sub-router.
pub fn routes<S, B>() -> Router<AppState<S, B>>
where
    S: MetadataStore,
    B: MessageBus,
{
    Router::new()
        .route("/ping", get(ping))
        // Device services
        .route(
            "/deviceservice",
            post(device_services::add::<S, B>).patch(device_services::patch::<S, B>),
        )
        .route("/deviceservice/all", get(device_services::all::<S, B>))
        .route(
            "/deviceservice/name/{name}",
            get(device_services::get::<S, B>).delete(device_services::delete::<S, B>),
        )
        .route(
            "/deviceservice/check/name/{name}",
            get(device_services::check::<S, B>),
        )
        // Device profiles
        .route(
            "/deviceprofile",
            post(device_profiles::add::<S, B>).put(device_profiles::update::<S, B>),
        )
        .route(
            "/deviceprofile/basicinfo",
            patch(device_profiles::patch_basic_info::<S, B>),
        )
        .route("/deviceprofile/all", get(device_profiles::all::<S, B>))
        .route(
            "/deviceprofile/name/{name}",
            get(device_profiles::get::<S, B>).delete(device_profiles::delete::<S, B>),
        )
        .route(
            "/deviceprofile/manufacturer/{manufacturer}",
            get(device_profiles::by_manufacturer::<S, B>),
        )
        .route(
            "/deviceprofile/model/{model}",
            get(device_profiles::by_model::<S, B>),
        )
        .route(
            "/deviceprofile/resource",
            post(device_profiles::add_resources::<S, B>),
        )
        .route(
            "/deviceprofile/name/{name}/resource/{resource}",
            delete(device_profiles::delete_resource::<S, B>),
        )
        .route(
            "/deviceprofile/deviceCommand",
            post(device_profiles::add_commands::<S, B>),
        )
        .route(
            "/deviceprofile/name/{name}/deviceCommand/{command}",
            delete(device_profiles::delete_command::<S, B>),
        )
        // Devices
        .route(
            "/device",
            post(devices::add::<S, B>).patch(devices::patch::<S, B>),
        )
        .route("/device/all", get(devices::all::<S, B>))
        .route(
            "/device/name/{name}",
            get(devices::get::<S, B>).delete(devices::delete::<S, B>),
        )
        .route("/device/check/name/{name}", get(devices::check::<S, B>))
        .route(
            "/device/service/name/{name}",
            get(devices::by_service::<S, B>),
        )
        .route(
            "/device/profile/name/{name}",
            get(devices::by_profile::<S, B>),
        )
        // Provision watchers
        .route(
            "/provisionwatcher",
            post(provision_watchers::add::<S, B>).patch(provision_watchers::patch::<S, B>),
        )
        .route("/provisionwatcher/all", get(provision_watchers::all::<S, B>))
        .route(
            "/provisionwatcher/name/{name}",
            get(provision_watchers::get::<S, B>).delete(provision_watchers::delete::<S, B>),
        )
        .route(
            "/provisionwatcher/service/name/{name}",
            get(provision_watchers::by_service::<S, B>),
        )
        .route(
            "/provisionwatcher/profile/name/{name}",
            get(provision_watchers::by_profile::<S, B>),
        )
}
