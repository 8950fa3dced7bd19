//! # Robot library.
//!
//! This library allows other crates in the workspace to access items defined inside the robot
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command dispatcher - maps received commands onto the control loop
pub mod dispatcher;

/// Control loop module - drives the motors until stopped or an obstacle is reached
pub mod control_loop;

/// Data store - state shared between the control loop and telemetry
pub mod data_store;

/// Hardware abstraction - board pins and the simulated board
pub mod hw;

/// Motor control - motor shield actuation sequences
pub mod motor_ctrl;

/// Executable parameters
pub mod params;

/// Connection profile - anonymous or registered connection to the messaging service
pub mod profile;

/// Sensor conversions
pub mod sensors;

/// Supervisor - decides when the executable stops
pub mod supervisor;

/// Telemetry publisher - periodically publishes the latest sample
pub mod tm_publisher;

#[cfg(test)]
mod mock;
