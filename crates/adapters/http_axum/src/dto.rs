//! Wire shapes of the REST API.
//!
//! Requests wrap one entity with an `apiVersion` and a caller chosen
//! `requestId`; batch endpoints take an array of them. Responses echo the
//! `requestId` and carry the numeric `statusCode` of the item.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use metahub_app::ports::Paged;
use metahub_domain::device::{Device, DevicePatch};
use metahub_domain::device_service::{DeviceService, DeviceServicePatch};
use metahub_domain::event::API_VERSION;
use metahub_domain::profile::{
    DeviceCommand, DeviceProfile, DeviceResource, ProfileBasicInfoPatch,
};
use metahub_domain::provision_watcher::{ProvisionWatcher, ProvisionWatcherPatch};

/// Fields common to every request item.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseRequest {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeviceServiceRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub service: DeviceService,
}

#[derive(Debug, Deserialize)]
pub struct DeviceServicePatchRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub service: DeviceServicePatch,
}

#[derive(Debug, Deserialize)]
pub struct DeviceProfileRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub profile: DeviceProfile,
}

#[derive(Debug, Deserialize)]
pub struct ProfileBasicInfoRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    #[serde(rename = "basicinfo")]
    pub basic_info: ProfileBasicInfoPatch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResourceRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub profile_name: String,
    pub resource: DeviceResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCommandRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub profile_name: String,
    pub device_command: DeviceCommand,
}

#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub device: Device,
}

#[derive(Debug, Deserialize)]
pub struct DevicePatchRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub device: DevicePatch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionWatcherRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub provision_watcher: ProvisionWatcher,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionWatcherPatchRequest {
    #[serde(flatten)]
    pub base: BaseRequest,
    pub provision_watcher: ProvisionWatcherPatch,
}

/// Status of one request item, or of a whole single-entity call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseResponse {
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub status_code: u16,
    /// Id of a freshly created entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl BaseResponse {
    #[must_use]
    pub fn success(request_id: String, status: StatusCode) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            request_id,
            message: String::new(),
            status_code: status.as_u16(),
            id: None,
        }
    }

    #[must_use]
    pub fn created(request_id: String, id: impl ToString) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::success(request_id, StatusCode::CREATED)
        }
    }

    #[must_use]
    pub fn failure(request_id: String, status: StatusCode, message: String) -> Self {
        Self {
            message,
            ..Self::success(request_id, status)
        }
    }
}

/// One entity, keyed by its kind.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResponse<T> {
    pub api_version: &'static str,
    pub status_code: u16,
    #[serde(flatten)]
    pub entity: T,
}

/// A page of entities, keyed by their kind, with the size of the listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiResponse<T> {
    pub api_version: &'static str,
    pub status_code: u16,
    pub total_count: u64,
    #[serde(flatten)]
    pub items: T,
}

impl<T> EntityResponse<T> {
    pub fn ok(entity: T) -> Self {
        Self {
            api_version: API_VERSION,
            status_code: StatusCode::OK.as_u16(),
            entity,
        }
    }
}

impl<T> MultiResponse<T> {
    pub fn ok<E>(page: Paged<E>, wrap: impl FnOnce(Vec<E>) -> T) -> Self {
        Self {
            api_version: API_VERSION,
            status_code: StatusCode::OK.as_u16(),
            total_count: page.total,
            items: wrap(page.items),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Service {
    pub service: DeviceService,
}

#[derive(Debug, Serialize)]
pub struct Services {
    pub services: Vec<DeviceService>,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub profile: DeviceProfile,
}

#[derive(Debug, Serialize)]
pub struct Profiles {
    pub profiles: Vec<DeviceProfile>,
}

#[derive(Debug, Serialize)]
pub struct DeviceBody {
    pub device: Device,
}

#[derive(Debug, Serialize)]
pub struct Devices {
    pub devices: Vec<Device>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Watcher {
    pub provision_watcher: ProvisionWatcher,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Watchers {
    pub provision_watchers: Vec<ProvisionWatcher>,
}

/// `offset`, `limit` and comma separated `labels` of list endpoints.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: i32,
    #[serde(default)]
    pub labels: Option<String>,
}

fn default_limit() -> i32 {
    20
}

impl ListQuery {
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.labels
            .as_deref()
            .map(|labels| {
                labels
                    .split(',')
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
