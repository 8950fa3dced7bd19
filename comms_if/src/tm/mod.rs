//! # Telemetry module
//!
//! Defines the telemetry packet published by the robot and the topic it is
//! published on.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Topic on which telemetry samples are published.
pub const TM_TOPIC: &str = "iot-2/evt/sample/fmt/json";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Telemetry packet that is published by the robot.
///
/// Serialises as `{"d": {"myName": ..., "dist": ..., "speed": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmPacket {
    pub d: TmData
}

/// Sensor data carried by a telemetry packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmData {
    /// Label of the device the data was sampled on.
    #[serde(rename = "myName")]
    pub my_name: String,

    /// Distance to the nearest obstacle in sensor units (cm).
    pub dist: i64,

    /// Wheel speed.
    pub speed: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TmPacket {
    pub fn new(my_name: &str, dist: i64, speed: f64) -> Self {
        Self {
            d: TmData {
                my_name: my_name.to_string(),
                dist,
                speed
            }
        }
    }

    /// Serialise the packet into its JSON wire format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
