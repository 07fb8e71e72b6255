//! JSON REST handlers for device profiles and their resources and commands.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use metahub_app::ports::{MessageBus, MetadataStore};

use super::{MultiStatus, item_failure, item_ok};
use crate::correlation::CorrelationId;
use crate::dto::{
    AddCommandRequest, AddResourceRequest, BaseResponse, DeviceProfileRequest, EntityResponse,
    ListQuery, MultiResponse, Profile, ProfileBasicInfoRequest, Profiles,
};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/v3/deviceprofile`
pub async fn add<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<DeviceProfileRequest>>,
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
                .device_profiles
                .add(request.profile, correlation.as_str())
                .await
            {
                Ok(added) => BaseResponse::created(request_id, added.id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `PUT /api/v3/deviceprofile`
pub async fn update<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<DeviceProfileRequest>>,
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
                .device_profiles
                .update(request.profile, correlation.as_str())
                .await
            {
                Ok(()) => item_ok(request_id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `PATCH /api/v3/deviceprofile/basicinfo`
pub async fn patch_basic_info<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<ProfileBasicInfoRequest>>,
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
                .device_profiles
                .patch_basic_info(request.basic_info, correlation.as_str())
                .await
            {
                Ok(()) => item_ok(request_id),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `GET /api/v3/deviceprofile/all`
pub async fn all<S, B>(
    State(state): State<AppState<S, B>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Profiles>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .device_profiles
        .list(query.offset, query.limit, &query.labels())
        .await?;
    Ok(Json(MultiResponse::ok(page, |profiles| Profiles { profiles })))
}

/// `GET /api/v3/deviceprofile/manufacturer/{manufacturer}`
pub async fn by_manufacturer<S, B>(
    State(state): State<AppState<S, B>>,
    Path(manufacturer): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Profiles>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .device_profiles
        .list_by_manufacturer(&manufacturer, query.offset, query.limit)
        .await?;
    Ok(Json(MultiResponse::ok(page, |profiles| Profiles { profiles })))
}

/// `GET /api/v3/deviceprofile/model/{model}`
pub async fn by_model<S, B>(
    State(state): State<AppState<S, B>>,
    Path(model): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<MultiResponse<Profiles>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let page = state
        .device_profiles
        .list_by_model(&model, query.offset, query.limit)
        .await?;
    Ok(Json(MultiResponse::ok(page, |profiles| Profiles { profiles })))
}

/// `GET /api/v3/deviceprofile/name/{name}`
pub async fn get<S, B>(
    State(state): State<AppState<S, B>>,
    Path(name): Path<String>,
) -> Result<Json<EntityResponse<Profile>>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    let profile = state.device_profiles.get_by_name(&name).await?;
    Ok(Json(EntityResponse::ok(Profile { profile })))
}

/// `DELETE /api/v3/deviceprofile/name/{name}`
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
        .device_profiles
        .delete_by_name(&name, correlation.as_str())
        .await?;
    Ok(Json(item_ok(String::new())))
}

/// `POST /api/v3/deviceprofile/resource`
pub async fn add_resources<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<AddResourceRequest>>,
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
                .device_profiles
                .add_resource(&request.profile_name, request.resource, correlation.as_str())
                .await
            {
                Ok(()) => BaseResponse::success(request_id, StatusCode::CREATED),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `DELETE /api/v3/deviceprofile/name/{name}/resource/{resource}`
pub async fn delete_resource<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Path((name, resource)): Path<(String, String)>,
) -> Result<Json<BaseResponse>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    state
        .device_profiles
        .delete_resource(&name, &resource, correlation.as_str())
        .await?;
    Ok(Json(item_ok(String::new())))
}

/// `POST /api/v3/deviceprofile/deviceCommand`
pub async fn add_commands<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Json(requests): Json<Vec<AddCommandRequest>>,
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
                .device_profiles
                .add_command(
                    &request.profile_name,
                    request.device_command,
                    correlation.as_str(),
                )
                .await
            {
                Ok(()) => BaseResponse::success(request_id, StatusCode::CREATED),
                Err(err) => item_failure(request_id, &err),
            },
        );
    }
    MultiStatus(responses)
}

/// `DELETE /api/v3/deviceprofile/name/{name}/deviceCommand/{command}`
pub async fn delete_command<S, B>(
    State(state): State<AppState<S, B>>,
    correlation: CorrelationId,
    Path((name, command)): Path<(String, String)>,
) -> Result<Json<BaseResponse>, ApiError>
where
    S: MetadataStore,
    B: MessageBus,
{
    state
        .device_profiles
        .delete_command(&name, &command, correlation.as_str())
        .await?;
    Ok(Json(item_ok(String::new())))
}
