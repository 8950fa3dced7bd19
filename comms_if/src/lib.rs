//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommands received from the messaging service
pub mod tc;

/// Telemetry published to the messaging service
pub mod tm;

/// Network module
pub mod net;
