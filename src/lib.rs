//! Environmental telemetry node.
//!
//! Polls a BMP280 barometer and a DHT humidity sensor, stamps each reading
//! with SNTP time and publishes it as JSON to an MQTT broker over TLS.
//!
//! Everything outside [`esp`] is hardware independent and runs on the host
//! under `cargo test --lib`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod dht;
pub mod reading;
pub mod station;
pub mod telemetry;

#[cfg(target_os = "espidf")]
pub mod esp;

#[cfg(test)]
mod mock;

pub use clock::{TimeError, TimeSource, TimeSync, Timestamp};
pub use connectivity::{BrokerConfig, Connectivity, LinkState, MqttSession, TlsCredentials, WifiCredentials, WifiLink};
pub use reading::{Barometer, Environment, Hygrometer, Reading, SensorError};
pub use station::{CycleOutcome, StartupError, Station};
pub use telemetry::{PublishError, TelemetryMessage, TelemetryPublisher};
