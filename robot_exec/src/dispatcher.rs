//! # Command dispatcher
//!
//! Subscribes to the command topics and turns incoming messages into control loop commands.
//! Only registered devices receive commands, an anonymous device never subscribes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};

// Internal
use comms_if::{
    net::{NetError, Transport},
    tc::{Tc, TC_TOPICS}
};
use crate::{
    control_loop::LoopCmd,
    profile::ConnectionMode
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct CommandDispatcher {
    mode: ConnectionMode,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CommandDispatcher {
    pub fn new(mode: ConnectionMode) -> Self {
        Self { mode }
    }

    /// Subscribe to the command topics.
    ///
    /// Does nothing in anonymous mode.
    pub fn subscribe(&self, transport: &dyn Transport) -> Result<(), NetError> {
        if self.mode != ConnectionMode::Registered {
            debug!("Anonymous mode, not subscribing to commands");
            return Ok(())
        }

        for topic in TC_TOPICS.iter() {
            transport.subscribe(topic)?;
            info!("Subscribed to {}", topic);
        }

        Ok(())
    }

    /// Map a received message to a loop command.
    ///
    /// Messages that can't be understood are logged and discarded, `None` is returned.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Option<LoopCmd> {
        if self.mode != ConnectionMode::Registered {
            warn!("Ignoring message on {} received in anonymous mode", topic);
            return None
        }

        match Tc::from_message(topic, payload) {
            Ok(Tc::Stop) => {
                debug!("Recieved Stop command");
                Some(LoopCmd::Stop)
            },
            Ok(Tc::Move(direction)) => {
                debug!("Recieved Move command ({})", direction);
                Some(LoopCmd::Move(direction))
            },
            Err(e) => {
                warn!("Discarding command on {}: {}", topic, e);
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        control_loop::{ControlLoop, InputData, MotionState, Params},
        hw::{sim::{SimHardware, SimParams}, PinMap},
        mock::RecordingTransport,
    };
    use comms_if::tc::{Direction, TC_MOVE_TOPIC, TC_STOP_TOPIC};
    use util::module::State;

    #[test]
    fn test_subscribe_registered_only() {
        let transport = RecordingTransport::default();
        CommandDispatcher::new(ConnectionMode::Anonymous).subscribe(&transport).unwrap();
        assert!(transport.subscriptions().is_empty());

        CommandDispatcher::new(ConnectionMode::Registered).subscribe(&transport).unwrap();
        assert_eq!(
            transport.subscriptions(), 
            vec![TC_STOP_TOPIC.to_string(), TC_MOVE_TOPIC.to_string()]
        );
    }

    #[test]
    fn test_dispatch() {
        let dispatcher = CommandDispatcher::new(ConnectionMode::Registered);

        assert_eq!(
            dispatcher.dispatch(TC_MOVE_TOPIC, br#"{"direction": "backward"}"#),
            Some(LoopCmd::Move(Direction::Backward))
        );
        assert_eq!(
            dispatcher.dispatch(TC_STOP_TOPIC, b"anything at all"),
            Some(LoopCmd::Stop)
        );
        assert_eq!(dispatcher.dispatch("iot-2/cmd/jump/fmt/json", b"{}"), None);
        assert_eq!(dispatcher.dispatch("iot-2/evt/sample/fmt/json", b"{}"), None);
    }

    #[test]
    fn test_anonymous_ignores_messages() {
        let dispatcher = CommandDispatcher::new(ConnectionMode::Anonymous);
        assert_eq!(dispatcher.dispatch(TC_STOP_TOPIC, b""), None);
    }

    #[test]
    fn test_malformed_move_leaves_loop_alone() {
        let dispatcher = CommandDispatcher::new(ConnectionMode::Registered);

        let hw = SimHardware::new(
            SimParams { closing_cm_per_actuation: 0.0, ..SimParams::default() },
            PinMap::default()
        );
        let mut ctrl = ControlLoop::new(hw, Params::default()).unwrap();
        ctrl.proc(&InputData { cmd: Some(LoopCmd::Move(Direction::Forward)), tick_due: true })
            .unwrap();
        ctrl.hw_mut().clear_writes();

        let payloads: [&[u8]; 4] = [
            br#"{"direction": "sideways"}"#,
            br#"{"dir": "forward"}"#,
            b"not json",
            &[0xff, 0xfe],
        ];

        for payload in payloads.iter() {
            let cmd = dispatcher.dispatch(TC_MOVE_TOPIC, payload);
            assert_eq!(cmd, None);

            let (output, report) = ctrl.proc(&InputData { cmd, tick_due: false }).unwrap();
            assert!(output.actuations.is_empty());
            assert_eq!(report.motion, MotionState::MovingForward);
            assert_eq!(report.generation, 1);
        }

        assert!(ctrl.hw().writes().is_empty());
    }
}
