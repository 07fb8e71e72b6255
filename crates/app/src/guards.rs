//! Guards consulted before a write reaches the datastore.
//!
//! - [`capacity`]: fleet-wide ceilings, serialized through one admission lock
//! - [`integrity`]: existence of referenced entities, dependents blocking a
//!   destructive write, and the strict profile policies

pub mod capacity;
pub mod integrity;

pub use capacity::{AdmissionLock, AdmissionPermit, CapacityGuard};
pub use integrity::IntegrityGuard;
