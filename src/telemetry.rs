//! JSON telemetry over MQTT.

use alloc::vec::Vec;
use core::fmt;

use log::{error, info};
use serde::Serialize;

use crate::clock::Timestamp;
use crate::connectivity::MqttSession;
use crate::reading::Reading;

/// Largest payload the broker session is sized for.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// Wire shape of one telemetry document. Field order is the JSON key order.
#[derive(Debug, Serialize)]
pub struct TelemetryMessage<'a> {
    pub timestamp: &'a str,
    pub temperature: f32,
    pub pressure: f32,
    pub humidity: f32,
}

impl<'a> TelemetryMessage<'a> {
    pub fn new(reading: &Reading, timestamp: &'a Timestamp) -> Self {
        Self {
            timestamp: timestamp.as_str(),
            temperature: reading.temperature,
            pressure: reading.pressure,
            humidity: reading.humidity,
        }
    }

    /// Serializes the message, refusing anything over [`MAX_PAYLOAD_LEN`].
    pub fn to_payload(&self) -> Result<Vec<u8>, PublishError> {
        let payload = serde_json::to_vec(self).map_err(|_| PublishError::Serialize)?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PublishError::PayloadTooLarge { len: payload.len() });
        }
        Ok(payload)
    }
}

#[derive(Debug)]
pub enum PublishError {
    Serialize,
    PayloadTooLarge { len: usize },
    /// The MQTT client rejected the message.
    Transport(anyhow::Error),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize => write!(f, "failed to serialize telemetry"),
            Self::PayloadTooLarge { len } => {
                write!(f, "payload of {} bytes exceeds {} bytes", len, MAX_PAYLOAD_LEN)
            }
            Self::Transport(e) => write!(f, "publish failed: {:#}", e),
        }
    }
}

impl core::error::Error for PublishError {}

pub struct TelemetryPublisher {
    topic: &'static str,
}

impl TelemetryPublisher {
    pub fn new(topic: &'static str) -> Self {
        Self { topic }
    }

    pub fn topic(&self) -> &'static str {
        self.topic
    }

    /// Publishes one reading. Failures are reported, never retried here.
    pub fn publish<S: MqttSession>(
        &self,
        session: &mut S,
        reading: &Reading,
        timestamp: &Timestamp,
    ) -> Result<(), PublishError> {
        let payload = match TelemetryMessage::new(reading, timestamp).to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Message not published: {}", e);
                return Err(e);
            }
        };

        info!("Publishing: {}", core::str::from_utf8(&payload).unwrap_or("<non-utf8>"));

        match session.publish(self.topic, &payload) {
            Ok(()) => {
                info!("Message published successfully");
                Ok(())
            }
            Err(e) => {
                error!("Message publish failed: {:#}", e);
                Err(PublishError::Transport(e))
            }
        }
    }
}
