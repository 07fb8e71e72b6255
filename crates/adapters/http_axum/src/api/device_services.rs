//! JSON REST handlers for device services.

use axum::Json;
use axum::extract::{Path, Query, State};

use metahub_app::ports::{MessageBus, MetadataStore};
use metahub_domain::error::{MetaError, NotFoundError};

use super::{MultiStatus, item_failure, item_ok};
use crate::correlation::CorrelationId;
use crate::dto::{
    BaseResponse, DeviceServicePatchRequest, DeviceServiceRequest, EntityResponse, ListQuery,
    MultiResponse, Service, Services,
};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/v3/deviceservice`
pub async fn add<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<DeviceServiceRequest>>,
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
                .device_services
                .add(request.service, correlation.as_str())
                .await
            {
                Ok(added) => BaseResponse::created(request_id, added.id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `PATCH /api/v3/deviceservice`
pub async fn patch<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<DeviceServicePatchRequest>>,
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
                .device_services
                .patch(request.service, correlation.as_str())
                .await
            {
                Ok(()) => item_ok(request_id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `GET /api/v3/deviceservice/all`
pub async fn all<S, B>(
    State(state): State<AppState<S, B>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Services>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .device_services
        .list(query.offset, query.limit, &query.labels())
        .await?;
    Ok(Json(MultiResponse::ok(page, |services| Services { services })))
}

/// `GET /api/v3/deviceservice/name/{name}`
pub async fn get<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
) -> Result<Json<EntityResponse<Service>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let service = state.device_services.get_by_name(&name).await?;
    Ok(Json(EntityResponse::ok(Service { service })))
}

/// `GET /api/v3/deviceservice/check/name/{name}`
pub async fn check<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
) -> Result<Json<BaseResponse>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    if !state.device_services.name_exists(&name).await? {
        return Err(MetaError::from(NotFoundError {
            entity: "device service",
            id: name,
        })
        .into());
    }
    Ok(Json(item_ok(String::new())))
}

/// `DELETE /api/v3/deviceservice/name/{name}`
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
        .device_services
        .delete_by_name(&name, correlation.as_str())
        .await?;
    Ok(Json(item_ok(String::new())))
}
