//! # Network Module
//!
//! This module provides networking abstractions over the publish/subscribe
//! messaging service used by the robot. The [`Transport`] trait is what the
//! rest of the software depends on, [`mqtt::MqttSession`] implements it over
//! MQTT.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// MQTT implementation of the transport.
pub mod mqtt;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{path::PathBuf, time::Duration};
use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A live publish/subscribe session.
///
/// Inbound messages and connection lifecycle notifications are not part of this trait, they are
/// delivered as [`NetEvent`]s on the channel returned when the session is created.
pub trait Transport: Send + Sync {
    /// Publish a message on the given topic. Publishing is fire-and-forget (QoS 0).
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NetError>;

    /// Subscribe to the given topic.
    fn subscribe(&self, topic: &str) -> Result<(), NetError>;

    /// Return if the session is connected or not.
    fn is_connected(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters, loaded from `net.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetParams {
    /// Keep alive interval of the connection.
    ///
    /// Units: seconds
    pub keep_alive_s: u64,

    /// Maximum time to wait for the first connection to be acknowledged.
    ///
    /// Units: seconds
    pub connect_timeout_s: f64,

    /// Certificate authority files trusted when connecting with TLS.
    pub ca_cert_paths: Vec<PathBuf>,

    /// Capacity of the request queue between the client and its event loop.
    pub request_capacity: usize,

    /// If set the session will reconnect after losing its connection, otherwise a lost
    /// connection is final.
    #[serde(default)]
    pub reconnect: Option<ReconnectParams>,
}

/// Parameters controlling reconnection with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectParams {
    /// Delay before the first reconnection attempt.
    ///
    /// Units: seconds
    pub initial_delay_s: f64,

    /// Upper bound on the delay between attempts.
    ///
    /// Units: seconds
    pub max_delay_s: f64,

    /// Maximum number of consecutive failed attempts, 0 for no limit.
    pub max_attempts: u32,
}

/// Credentials presented when connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub auth_token: String,
}

/// Everything needed to open a session with the messaging service.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,

    pub port: u16,

    pub client_id: String,

    pub keep_alive: Duration,

    pub connect_timeout: Duration,

    pub request_capacity: usize,

    /// Credentials, `None` for an anonymous connection.
    pub credentials: Option<Credentials>,

    /// Certificate authority files to trust, `None` for an unencrypted connection.
    pub tls_ca_paths: Option<Vec<PathBuf>>,

    pub reconnect: Option<ReconnectParams>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Notification emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    /// The session (re)connected to the server.
    Connected,

    /// A message was received on a subscribed topic.
    Message {
        topic: String,
        payload: Vec<u8>
    },

    /// The connection was lost or closed unexpectedly.
    ConnectionLost(String),
}

#[derive(thiserror::Error, Debug)]
pub enum NetError {
    #[error("The session is not connected to the server")]
    NotConnected,

    #[error("Could not publish to {0}: {1}")]
    PublishError(String, String),

    #[error("Could not subscribe to {0}: {1}")]
    SubscribeError(String, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ReconnectParams {
    /// Delay to wait before the given (1-based) reconnection attempt.
    ///
    /// The delay doubles with every attempt, starting at `initial_delay_s` and never exceeding
    /// `max_delay_s`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as i32;
        let delay_s = (self.initial_delay_s * 2f64.powi(exp)).min(self.max_delay_s);

        if delay_s.is_finite() && delay_s > 0.0 {
            Duration::from_secs_f64(delay_s)
        } else {
            Duration::from_secs(0)
        }
    }

    /// Return true if the given (1-based) reconnection attempt may be made.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }
}
