//! Parameters structure for the ControlLoop

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::hw::PinMap;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the control loop.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {

    /// The loop stops once an obstacle is this close or closer.
    ///
    /// Units: centimeters
    pub safety_threshold: i64,

    /// Delay between two ticks of the loop.
    ///
    /// Units: seconds
    pub tick_period_s: f64,

    /// Board pins of the motors and sensors.
    #[serde(default)]
    pub pins: PinMap,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            safety_threshold: 15,
            tick_period_s: 0.15,
            pins: PinMap::default(),
        }
    }
}
