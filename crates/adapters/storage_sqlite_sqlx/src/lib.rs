//! # metahub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `metahub-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! Rows hold the whole entity as JSON next to a few indexed columns used for
//! filtering. Every operation touches a single row; there are no
//! multi-statement transactions.
//!
//! ## Dependency rule
//! Depends on `metahub-app` (for port traits) and `metahub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod pool;
pub mod store;

mod device_profile_repo;
mod device_repo;
mod device_service_repo;
mod provision_watcher_repo;

pub use pool::{Config, Database};
pub use store::SqliteStore;
