//! # metahub-domain
//!
//! Pure domain model for the metahub device metadata catalog.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error taxonomy, timestamps
//! - Define **Device services** (remote processes owning devices)
//! - Define **Device profiles** (resources and commands shared by a class of device)
//! - Define **Devices** and **Provision watchers**, referring to the above by name
//! - Capacity arithmetic for the fleet-wide ceilings
//! - **System events** describing committed changes
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod capacity;
pub mod device;
pub mod device_service;
pub mod event;
pub mod profile;
pub mod provision_watcher;
pub mod state;
