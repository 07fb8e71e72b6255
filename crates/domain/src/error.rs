//! Common error types used across the workspace.
//!
//! Every layer returns [`MetaError`]. Adapters wrap their own failures in
//! [`MetaError::Storage`] (or convert to a more specific variant) via `From`.
//! [`MetaError::kind`] folds the variants onto the small taxonomy that the
//! HTTP surface reports as status codes.

use std::fmt;

/// Boxed source error for infrastructure failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error returned by domain, application and adapter code.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// Malformed input, a broken uniqueness rule or a capacity ceiling.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A referenced name or id is absent.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// A destructive write is blocked by a dependent entity.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// A strict profile policy forbids the change.
    #[error(transparent)]
    Locked(#[from] LockedError),

    /// The owning device service rejected the request.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The owning device service could not be reached in time.
    #[error("device service '{service}' unavailable: {reason}")]
    Unavailable {
        /// Name of the device service that was being contacted.
        service: String,
        /// Transport level explanation (timeout, closed channel, …).
        reason: String,
    },

    /// Infrastructure failure (database, broker, serialization).
    #[error("storage error")]
    Storage(#[source] BoxError),
}

/// Error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ContractInvalid,
    EntityDoesNotExist,
    StatusConflict,
    ServiceLocked,
    ServiceUnavailable,
    ServerError,
}

impl ErrorKind {
    /// Numeric status code mirroring HTTP semantics.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::ContractInvalid => 400,
            Self::EntityDoesNotExist => 404,
            Self::StatusConflict => 409,
            Self::ServiceLocked => 423,
            Self::ServerError => 500,
            Self::ServiceUnavailable => 503,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ContractInvalid => "ContractInvalid",
            Self::EntityDoesNotExist => "EntityDoesNotExist",
            Self::StatusConflict => "StatusConflict",
            Self::ServiceLocked => "ServiceLocked",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::ServerError => "ServerError",
        };
        f.write_str(name)
    }
}

impl MetaError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ContractInvalid,
            Self::NotFound(_) => ErrorKind::EntityDoesNotExist,
            Self::Conflict(_) => ErrorKind::StatusConflict,
            Self::Locked(_) => ErrorKind::ServiceLocked,
            Self::Unavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::Remote(_) | Self::Storage(_) => ErrorKind::ServerError,
        }
    }

    /// Wrap any infrastructure error.
    pub fn storage(err: impl Into<BoxError>) -> Self {
        Self::Storage(err.into())
    }
}

/// Which fleet-wide ceiling a capacity check is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    MaxDevices,
    MaxResources,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxDevices => f.write_str("device count"),
            Self::MaxResources => f.write_str("in-use resource count"),
        }
    }
}

/// Input that breaks a domain rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name is empty")]
    EmptyName,

    #[error("{field} is empty")]
    EmptyField { field: &'static str },

    #[error("{entity} name '{name}' already exists")]
    DuplicateName { entity: &'static str, name: String },

    #[error("{entity} name '{given}' does not match the existing '{existing}'")]
    NameMismatch {
        entity: &'static str,
        given: String,
        existing: String,
    },

    #[error("{entity} '{name}' does not exist")]
    MissingReference { entity: &'static str, name: String },

    #[error("device command '{command}' references unknown device resource '{resource}'")]
    UnknownResource { command: String, resource: String },

    #[error("device command '{0}' has the same name as a device resource")]
    CommandShadowsResource(String),

    #[error("{limit} would exceed the configured maximum: {attempted} > {allowed}")]
    CapacityExceeded {
        limit: Limit,
        attempted: i64,
        allowed: u32,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Referenced entity does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} '{id}' not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A destructive write is blocked because something still points at the target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fail to {action} {entity} '{name}' when associated {dependent} exists")]
pub struct ConflictError {
    pub action: &'static str,
    pub entity: &'static str,
    pub name: String,
    pub dependent: &'static str,
}

/// A strict profile policy is active.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockedError {
    #[error("profile change is not allowed when StrictDeviceProfileChanges config is enabled")]
    ProfileChanges,

    #[error("profile deletion is not allowed when StrictDeviceProfileDeletes config is enabled")]
    ProfileDeletes,
}

/// The device service answered and said no.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device service '{service}' rejected the request: {message}")]
pub struct RemoteError {
    pub service: String,
    pub message: String,
}
