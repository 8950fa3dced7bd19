//! # Telecommand module
//!
//! This module provides telecommand functionality to the communications 
//! interface. Telecommands arrive as messages on the command topics, the
//! command name being carried by the topic and any arguments by the JSON
//! payload.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Topic on which stop commands are received.
pub const TC_STOP_TOPIC: &str = "iot-2/cmd/stop/fmt/json";

/// Topic on which move commands are received.
pub const TC_MOVE_TOPIC: &str = "iot-2/cmd/move/fmt/json";

/// All topics the device subscribes to in order to receive telecommands.
pub const TC_TOPICS: [&str; 2] = [TC_STOP_TOPIC, TC_MOVE_TOPIC];

/// Index of the topic segment naming the command.
const CMD_NAME_SEGMENT: usize = 2;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A telecommand, i.e. an instruction sent to the robot by a remote
/// application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tc {
    /// Start (or restart) the control loop driving in the given direction.
    Move(Direction),

    /// Stop the control loop at its next tick.
    Stop
}

/// Direction in which the robot is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("Topic \"{0}\" is not a command topic")]
    MalformedTopic(String),

    #[error("Unexpected command \"{0}\"")]
    UnrecognisedCommand(String),

    #[error("TC payload is not valid UTF-8")]
    NonUtf8Payload,

    #[error("TC contains an invalid payload: {0}")]
    InvalidPayload(serde_json::Error),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Payload of the move command.
#[derive(Debug, Serialize, Deserialize)]
pub struct MovePayload {
    pub direction: Direction
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {

    /// Parse a TC from the topic it arrived on and its raw payload.
    ///
    /// The stop payload is ignored, the move payload must be a JSON object
    /// with a `direction` of either `"forward"` or `"backward"`.
    pub fn from_message(topic: &str, payload: &[u8]) -> Result<Self, TcParseError> {
        let segments: Vec<&str> = topic.split('/').collect();

        if segments.len() <= CMD_NAME_SEGMENT || segments[1] != "cmd" {
            return Err(TcParseError::MalformedTopic(topic.to_string()))
        }

        match segments[CMD_NAME_SEGMENT] {
            "stop" => Ok(Tc::Stop),
            "move" => {
                let payload_str = std::str::from_utf8(payload)
                    .map_err(|_| TcParseError::NonUtf8Payload)?;

                let mv: MovePayload = serde_json::from_str(payload_str)
                    .map_err(|e| TcParseError::InvalidPayload(e))?;

                Ok(Tc::Move(mv.direction))
            },
            other => Err(TcParseError::UnrecognisedCommand(other.to_string()))
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_move() {
        assert_eq!(
            Tc::from_message(TC_MOVE_TOPIC, br#"{"direction": "forward"}"#).unwrap(),
            Tc::Move(Direction::Forward)
        );
        assert_eq!(
            Tc::from_message(TC_MOVE_TOPIC, br#"{"direction":"backward","speed":3}"#).unwrap(),
            Tc::Move(Direction::Backward)
        );
    }

    #[test]
    fn test_parse_stop_ignores_payload() {
        assert_eq!(Tc::from_message(TC_STOP_TOPIC, b"").unwrap(), Tc::Stop);
        assert_eq!(Tc::from_message(TC_STOP_TOPIC, b"\xff garbage").unwrap(), Tc::Stop);
    }

    #[test]
    fn test_parse_malformed_move() {
        for payload in [
            &br#"{}"#[..],
            &br#"{"direction": "sideways"}"#[..],
            &br#"{"direction": 1}"#[..],
            &br#"forward"#[..],
        ].iter() {
            match Tc::from_message(TC_MOVE_TOPIC, payload) {
                Err(TcParseError::InvalidPayload(_)) => (),
                r => panic!("Expected invalid payload for {:?}, got {:?}", payload, r)
            }
        }

        match Tc::from_message(TC_MOVE_TOPIC, b"\xff\xfe") {
            Err(TcParseError::NonUtf8Payload) => (),
            r => panic!("Expected non UTF-8 error, got {:?}", r)
        }
    }

    #[test]
    fn test_parse_unexpected_topics() {
        match Tc::from_message("iot-2/cmd/dance/fmt/json", b"{}") {
            Err(TcParseError::UnrecognisedCommand(c)) => assert_eq!(c, "dance"),
            r => panic!("Expected unrecognised command, got {:?}", r)
        }

        match Tc::from_message("iot-2/evt/sample/fmt/json", b"{}") {
            Err(TcParseError::MalformedTopic(_)) => (),
            r => panic!("Expected malformed topic, got {:?}", r)
        }

        match Tc::from_message("move", b"{}") {
            Err(TcParseError::MalformedTopic(_)) => (),
            r => panic!("Expected malformed topic, got {:?}", r)
        }
    }
}
