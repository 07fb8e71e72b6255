//! # metahub-adapter-callback-reqwest
//!
//! HTTP adapter for the `DeviceServiceCallback` port.
//!
//! ## Responsibilities
//! - Build callback URLs from the stored base address of a device service
//! - Send versioned JSON requests (`apiVersion`, `requestId`, entity)
//! - Treat any non-success status as a failed callback
//!
//! ## Dependency rule
//! Same as other adapters: depends on `metahub-app` and `metahub-domain`.

pub mod client;
pub mod error;

pub use client::HttpCallbacks;
pub use error::CallbackError;
