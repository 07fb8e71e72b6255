//! # metahub-adapter-mqtt
//!
//! MQTT adapter: implements the `MessageBus` port on an MQTT broker.
//!
//! ## Responsibilities
//! - Connect to an MQTT broker and keep the connection alive
//! - Publish system events and validation requests as JSON envelopes
//! - Route broker messages to local subscriptions by exact topic
//!
//! ## Dependency rule
//! Same as other adapters: depends on `metahub-app` and `metahub-domain`.

pub mod bus;
pub mod config;
pub mod error;

pub use bus::MqttMessageBus;
pub use config::MqttConfig;
