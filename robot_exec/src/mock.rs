//! In-memory transport used by the tests.

use std::sync::Mutex;

use comms_if::net::{NetError, Transport};

/// Transport recording every publish and subscription.
#[derive(Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscriptions: Mutex<Vec<String>>,
    fail_publish: bool,
}

impl RecordingTransport {
    /// A transport on which every publish fails.
    pub fn failing() -> Self {
        Self {
            fail_publish: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NetError> {
        if self.fail_publish {
            return Err(NetError::NotConnected)
        }

        self.published.lock().unwrap().push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<(), NetError> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.fail_publish
    }
}
