//! # metahub-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceServiceRepository`, `DeviceProfileRepository`,
//!     `DeviceRepository`, `ProvisionWatcherRepository`: row-level CRUD
//!   - `MessageBus`: publish / subscribe / unsubscribe of JSON envelopes
//!   - `DeviceServiceCallback`: tell a device service about a change
//! - Guard every write:
//!   - `CapacityGuard`: device and in-use resource ceilings, serialized
//!   - `IntegrityGuard`: dangling references and strict profile policy
//!   - `DeviceValidator`: ask the owning service before a device is written
//! - Propagate committed changes through `ChangePropagator` workers
//! - Expose one **registry** per entity as the driving port
//! - Provide **in-process infrastructure** (message bus, request/reply) that
//!   doesn't need IO
//!
//! ## Dependency rule
//! Depends on `metahub-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod guards;
pub mod message_bus;
pub mod ports;
pub mod propagation;
pub mod registries;
pub mod rpc;
pub mod settings;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
