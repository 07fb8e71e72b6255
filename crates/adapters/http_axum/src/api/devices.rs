//! JSON REST handlers for devices.

use axum::Json;
use axum::extract::{Path, Query, State};

use metahub_app::ports::{MessageBus, MetadataStore};
use metahub_domain::error::{MetaError, NotFoundError};

use super::{MultiStatus, item_failure, item_ok};
use crate::correlation::CorrelationId;
use crate::dto::{
    BaseResponse, DeviceBody, DevicePatchRequest, DeviceRequest, Devices, EntityResponse,
    ListQuery, MultiResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/v3/device`
///
/// Items are admitted one after the other; a rejected item does not stop the
/// rest of the batch.
pub async fn add<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<DeviceRequest>>,
) -> MultiStatus
where
    S: MetadataStore,
    B: MessageBus,
{
    let mut responses = Vec::with_capacity(requests.len());
    for request in requests {
        let request_id = request.base.request_id;
        responses.push(
            match state.devices.add(request.device, correlation.as_str()).await {
                Ok(added) => BaseResponse::created(request_id, added.id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `PATCH /api/v3/device`
pub async fn patch<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<DevicePatchRequest>>,
) -> MultiStatus
where
    S: MetadataStore,
    B: MessageBus,
{
    let mut responses = Vec::with_capacity(requests.len());
    for request in requests {
        let request_id = request.base.request_id;
        responses.push(
            match state
                .devices
                .patch(request.device, correlation.as_str())
                .await
            {
                Ok(()) => item_ok(request_id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `GET /api/v3/device/all`
pub async fn all<S, B>(
    State(state): State<AppState<S, B>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Devices>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .devices
        .list(query.offset, query.limit, &query.labels())
        .await?;
    Ok(Json(MultiResponse::ok(page, |devices| Devices { devices })))
}

/// `GET /api/v3/device/service/name/{name}`
pub async fn by_service<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Devices>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .devices
        .list_by_service(&name, query.offset, query.limit)
        .await?;
    Ok(Json(MultiResponse::ok(page, |devices| Devices { devices })))
}

/// `GET /api/v3/device/profile/name/{name}`
pub async fn by_profile<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Devices>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .devices
        .list_by_profile(&name, query.offset, query.limit)
        .await?;
    Ok(Json(MultiResponse::ok(page, |devices| Devices { devices })))
}

/// `GET /api/v3/device/name/{name}`
pub async fn get<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
) -> Result<Json<EntityResponse<DeviceBody>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let device = state.devices.get_by_name(&name).await?;
    Ok(Json(EntityResponse::ok(DeviceBody { device })))
}

/// `GET /api/v3/device/check/name/{name}`
pub async fn check<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
) -> Result<Json<BaseResponse>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    if !state.devices.name_exists(&name).await? {
        return Err(MetaError::from(NotFoundError {
            entity: "device",
            id: name,
        })
        .into());
    }
    Ok(Json(item_ok(String::new())))
}

/// `DELETE /api/v3/device/name/{name}`
pub async fn delete<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Path(name): Path<String>,
) -> Result<Json<BaseResponse>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    state
        .devices
        .delete_by_name(&name, correlation.as_str())
        .await?;
    Ok(Json(item_ok(String::new())))
}
