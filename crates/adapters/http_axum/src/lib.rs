//! # metahub-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve the versioned JSON API under `/api/v3` for device services,
//!   device profiles, devices and provision watchers
//! - Accept **batch** writes and answer `207 Multi-Status` with one status
//!   per item
//! - Map application results into HTTP responses, folding [`MetaError`]
//!   kinds onto status codes
//! - Carry the caller's `X-Correlation-ID` into every registry call
//!
//! ## Dependency rule
//! Depends on `metahub-app` (for registries and port traits) and
//! `metahub-domain` (for types used in request/response mapping). Never leaks
//! axum types into the domain.
//!
//! [`MetaError`]: metahub_domain::error::MetaError

pub mod api;
pub mod correlation;
pub mod dto;
pub mod error;
pub mod router;
pub mod state;
