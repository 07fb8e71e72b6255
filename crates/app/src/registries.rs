//! Use-case registries: one per catalog entity.
//!
//! Every write follows the same shape: guards, optional remote validation,
//! optional admission permit, one datastore write, permit release, then a
//! change notice for the propagator.

pub mod device;
pub mod device_profile;
pub mod device_service;
pub mod provision_watcher;

pub use device::DeviceRegistry;
pub use device_profile::DeviceProfileRegistry;
pub use device_service::DeviceServiceRegistry;
pub use provision_watcher::ProvisionWatcherRegistry;

use metahub_domain::error::{MetaError, NotFoundError, ValidationError};

use crate::ports::Page;

/// `limit` value asking for every row, up to the configured maximum.
pub const LIMIT_ALL: i32 = -1;

/// Translate caller supplied paging into a store [`Page`], capped at `max`.
///
/// # Errors
///
/// Returns [`ValidationError::Invalid`] for negative limits other than
/// [`LIMIT_ALL`].
pub fn page(offset: u32, limit: i32, max: u32) -> Result<Page, MetaError> {
    match limit {
        LIMIT_ALL => Ok(Page::new(offset, max)),
        negative if negative < 0 => Err(ValidationError::Invalid {
            field: "limit",
            reason: format!("{negative} is neither -1 nor a positive number"),
        }
        .into()),
        limit => Ok(Page::new(offset, limit.unsigned_abs().min(max))),
    }
}

pub(crate) fn require_name(name: &str) -> Result<(), MetaError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    Ok(())
}

pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> MetaError {
    NotFoundError {
        entity,
        id: id.to_string(),
    }
    .into()
}

/// A patch may carry both id and name; they must designate the same entity.
pub(crate) fn ensure_same_name(
    entity: &'static str,
    given: Option<&str>,
    existing: &str,
) -> Result<(), MetaError> {
    match given {
        Some(given) if given != existing => Err(ValidationError::NameMismatch {
            entity,
            given: given.to_string(),
            existing: existing.to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}
