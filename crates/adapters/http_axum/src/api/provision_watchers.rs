//! JSON REST handlers for provision watchers.

use axum::Json;
use axum::extract::{Path, Query, State};

use metahub_app::ports::{MessageBus, MetadataStore};

use super::{MultiStatus, item_failure, item_ok};
use crate::correlation::CorrelationId;
use crate::dto::{
    BaseResponse, EntityResponse, ListQuery, MultiResponse, ProvisionWatcherPatchRequest,
    ProvisionWatcherRequest, Watcher, Watchers,
};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/v3/provisionwatcher`
pub async fn add<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<ProvisionWatcherRequest>>,
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
                .provision_watchers
                .add(request.provision_watcher, correlation.as_str())
                .await
            {
                Ok(added) => BaseResponse::created(request_id, added.id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `PATCH /api/v3/provisionwatcher`
pub async fn patch<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<ProvisionWatcherPatchRequest>>,
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
                .provision_watchers
                .patch(request.provision_watcher, correlation.as_str())
                .await
            {
                Ok(()) => item_ok(request_id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `GET /api/v3/provisionwatcher/all`
pub async fn all<S, B>(
    State(state): State<AppState<S, B>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Watchers>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .provision_watchers
        .list(query.offset, query.limit, &query.labels())
        .await?;
    Ok(Json(MultiResponse::ok(page, |provision_watchers| {
        Watchers { provision_watchers }
    })))
}

/// `GET /api/v3/provisionwatcher/service/name/{name}`
pub async fn by_service<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Watchers>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .provision_watchers
        .list_by_service(&name, query.offset, query.limit)
        .await?;
    Ok(Json(MultiResponse::ok(page, |provision_watchers| {
        Watchers { provision_watchers }
    })))
}

/// `GET /api/v3/provisionwatcher/profile/name/{name}`
pub async fn by_profile<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Watchers>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .provision_watchers
        .list_by_profile(&name, query.offset, query.limit)
        .await?;
    Ok(Json(MultiResponse::ok(page, |provision_watchers| {
        Watchers { provision_watchers }
    })))
}

/// `GET /api/v3/provisionwatcher/name/{name}`
pub async fn get<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
) -> Result<Json<EntityResponse<Watcher>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let provision_watcher = state.provision_watchers.get_by_name(&name).await?;
    Ok(Json(EntityResponse::ok(Watcher { provision_watcher })))
}

/// `DELETE /api/v3/provisionwatcher/name/{name}`
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
        .provision_watchers
        .delete_by_name(&name, correlation.as_str())
        .await?;
    Ok(Json(item_ok(String::new())))
}
