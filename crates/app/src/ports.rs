//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod callback;
pub mod messaging;
pub mod storage;

pub use callback::DeviceServiceCallback;
pub use messaging::{MessageBus, MessageEnvelope, Subscription};
pub use storage::{
    DeviceProfileRepository, DeviceRepository, DeviceServiceRepository, MetadataStore, Page,
    Paged, ProvisionWatcherRepository,
};
