//! # Telemetry publisher
//!
//! Publishes the latest telemetry sample on a fixed period. Nothing is published until the
//! control loop has recorded its first sample.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{mpsc::{self, RecvTimeoutError, Sender}, Arc},
    thread,
    time::{Duration, Instant}
};
use log::{trace, warn};

use comms_if::{net::{NetError, Transport}, tm::{TmPacket, TM_TOPIC}};

use crate::data_store::SharedDataStore;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry publisher
pub struct TmPublisher {
    transport: Arc<dyn Transport>,
    device_label: String,
}

/// Handle to a publisher running on its own thread.
pub struct TmPublisherHandle {
    stop_sender: Option<Sender<()>>,
    join_handle: Option<thread::JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmPublisherError {
    #[error("Could not publish the telemetry: {0}")]
    PublishError(NetError),

    #[error("Could not serialize the telemetry: {0}")]
    SerializationError(serde_json::Error),

    #[error("The data store lock is poisoned")]
    DataStorePoisoned,

    #[error("The publishing period must be longer than zero")]
    ZeroPeriod,

    #[error("Could not start the publisher thread: {0}")]
    SpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmPublisher {
    pub fn new(transport: Arc<dyn Transport>, device_label: &str) -> Self {
        Self {
            transport,
            device_label: device_label.to_string(),
        }
    }

    /// Publish the latest sample in the data store.
    ///
    /// Returns `false` without publishing if no sample has been recorded yet.
    pub fn publish_latest(&self, ds: &SharedDataStore) -> Result<bool, TmPublisherError> {
        // Copy the sample out so the lock isn't held while publishing
        let (sample, motion, generation) = match ds.lock() {
            Ok(ds) => (ds.latest_sample, ds.motion, ds.generation),
            Err(_) => return Err(TmPublisherError::DataStorePoisoned)
        };

        let sample = match sample {
            Some(s) => s,
            None => return Ok(false)
        };

        let packet = TmPacket::new(&self.device_label, sample.distance, sample.speed);

        let packet_string = packet.to_json()
            .map_err(TmPublisherError::SerializationError)?;

        self.transport.publish(TM_TOPIC, packet_string.as_bytes())
            .map_err(TmPublisherError::PublishError)?;

        trace!("Published {} (run {}, {:?})", packet_string, generation, motion);

        Ok(true)
    }

    /// Run the publisher on its own thread, publishing every `period`.
    pub fn spawn(
        self, 
        ds: SharedDataStore, 
        period: Duration
    ) -> Result<TmPublisherHandle, TmPublisherError> {
        if period == Duration::from_secs(0) {
            return Err(TmPublisherError::ZeroPeriod)
        }

        let (stop_sender, stop_receiver) = mpsc::channel::<()>();

        let join_handle = thread::Builder::new().name("tm_publisher".into()).spawn(move || {
            let mut next_publish = Instant::now() + period;

            loop {
                let timeout = next_publish.saturating_duration_since(Instant::now());

                match stop_receiver.recv_timeout(timeout) {
                    Err(RecvTimeoutError::Timeout) => (),
                    // Stop requested or the handle was dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break
                }

                next_publish += period;

                if let Err(e) = self.publish_latest(&ds) {
                    warn!("Telemetry not published: {}", e);
                }
            }
        }).map_err(TmPublisherError::SpawnError)?;

        Ok(TmPublisherHandle {
            stop_sender: Some(stop_sender),
            join_handle: Some(join_handle),
        })
    }
}

impl TmPublisherHandle {
    /// Stop the publisher and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(s) = self.stop_sender.take() {
            s.send(()).ok();
        }

        if let Some(jh) = self.join_handle.take() {
            if jh.join().is_err() {
                warn!("Telemetry publisher thread panicked");
            }
        }
    }
}

impl Drop for TmPublisherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        control_loop::TelemetrySample,
        data_store::DataStore,
        mock::RecordingTransport,
    };

    #[test]
    fn test_nothing_before_first_sample() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = TmPublisher::new(transport.clone(), "pcduino");
        let ds = DataStore::new_shared();

        assert!(!publisher.publish_latest(&ds).unwrap());
        assert!(transport.published().is_empty());
    }

    #[test]
    fn test_publishes_latest_sample() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = TmPublisher::new(transport.clone(), "pcduino");
        let ds = DataStore::new_shared();

        ds.lock().unwrap().record_sample(TelemetrySample { distance: 40, speed: 510.5 });
        ds.lock().unwrap().record_sample(TelemetrySample { distance: 38, speed: 0.0 });

        assert!(publisher.publish_latest(&ds).unwrap());

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, TM_TOPIC);

        let json: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(json["d"]["myName"], "pcduino");
        assert_eq!(json["d"]["dist"], 38);
        assert_eq!(json["d"]["speed"], 0.0);
    }

    #[test]
    fn test_publish_failure_reported() {
        let transport = Arc::new(RecordingTransport::failing());
        let publisher = TmPublisher::new(transport, "pcduino");
        let ds = DataStore::new_shared();
        ds.lock().unwrap().record_sample(TelemetrySample { distance: 40, speed: 0.0 });

        match publisher.publish_latest(&ds) {
            Err(TmPublisherError::PublishError(NetError::NotConnected)) => (),
            r => panic!("Unexpected {:?}", r)
        }
    }

    #[test]
    fn test_zero_period_rejected() {
        let transport = Arc::new(RecordingTransport::default());

        match TmPublisher::new(transport, "pcduino")
            .spawn(DataStore::new_shared(), Duration::from_secs(0)) 
        {
            Err(TmPublisherError::ZeroPeriod) => (),
            Err(e) => panic!("Unexpected {}", e),
            Ok(_) => panic!("Zero period accepted")
        }
    }

    #[test]
    fn test_one_packet_per_period() {
        let transport = Arc::new(RecordingTransport::default());
        let ds = DataStore::new_shared();
        let start = Instant::now();

        let sleep_until = |ms: u64| {
            thread::sleep((start + Duration::from_millis(ms)).saturating_duration_since(Instant::now()))
        };

        // Periods end at 100, 200, 300, 400 and 500 ms
        let handle = TmPublisher::new(transport.clone(), "pcduino")
            .spawn(ds.clone(), Duration::from_millis(100))
            .unwrap();

        sleep_until(250);
        assert!(transport.published().is_empty());

        ds.lock().unwrap().record_sample(TelemetrySample { distance: 40, speed: 0.0 });
        sleep_until(450);
        assert_eq!(transport.published().len(), 2);

        ds.lock().unwrap().record_sample(TelemetrySample { distance: 39, speed: 510.5 });
        sleep_until(550);
        handle.shutdown();

        let dists: Vec<i64> = transport.published()
            .iter()
            .map(|(_, payload)| {
                let json: serde_json::Value = serde_json::from_slice(payload).unwrap();
                json["d"]["dist"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(dists, vec![40, 40, 39]);
    }
}
