//! # MQTT Session
//!
//! [`Transport`] implementation over MQTT. The client's event loop is driven by a background
//! thread which tracks whether the session is connected and forwards received messages and
//! lifecycle changes as [`NetEvent`]s.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        Arc, Mutex, 
        atomic::{AtomicBool, Ordering}, 
        mpsc::{self, Receiver, RecvTimeoutError, Sender}
    },
    thread,
    time::Duration,
};
use log::{debug, error, info, trace, warn};
use rumqttc::{
    Client, Connection, Event, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration,
    Transport as MqttTransport,
};

use super::{ConnectParams, NetError, NetEvent, ReconnectParams, Transport};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum wait for the event loop to send the disconnect packet and exit.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A monitored MQTT session.
pub struct MqttSession {
    client: Client,

    join_handle: Option<thread::JoinHandle<()>>,

    /// Topics subscribed to, reissued after a reconnection.
    subscriptions: Arc<Mutex<Vec<String>>>,

    shutdown: Arc<AtomicBool>,

    connected: Arc<AtomicBool>,

    /// Disconnected once the event loop thread has exited.
    loop_exited: Mutex<Receiver<()>>,
}

/// State shared with the event loop thread.
struct EventLoopCtx {
    client: Client,
    event_sender: Sender<NetEvent>,
    first_connect_sender: Option<Sender<Result<(), String>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    reconnect: Option<ReconnectParams>,

    /// Never sent on, dropping it signals the thread has exited.
    _exit_sender: Sender<()>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MqttSessionError {
    #[error("Could not read the CA certificate {0:?}: {1}")]
    CaCertLoadError(std::path::PathBuf, std::io::Error),

    #[error("Could not connect to {0}: {1}")]
    CouldNotConnect(String, String),

    #[error("No connection acknowledgement from {0} within {1:?}")]
    ConnectTimeout(String, Duration),

    #[error("Could not start the MQTT event loop thread: {0}")]
    SpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MqttSession {
    /// Open a new session.
    ///
    /// Blocks until the server acknowledges the connection or `params.connect_timeout` elapses.
    /// On success the session and the receiving end of its event channel are returned.
    pub fn connect(params: &ConnectParams) -> Result<(Self, Receiver<NetEvent>), MqttSessionError> {
        let endpoint = format!("{}:{}", params.host, params.port);

        let options = build_options(params)?;

        let (client, connection) = Client::new(options, params.request_capacity.max(1));

        let shutdown = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));

        let (event_sender, event_receiver) = mpsc::channel();
        let (first_tx, first_rx) = mpsc::channel();
        let (exit_sender, loop_exited) = mpsc::channel();

        let ctx = EventLoopCtx {
            client: client.clone(),
            event_sender,
            first_connect_sender: Some(first_tx),
            subscriptions: subscriptions.clone(),
            shutdown: shutdown.clone(),
            connected: connected.clone(),
            reconnect: params.reconnect,
            _exit_sender: exit_sender,
        };

        info!("Connecting to {} as {}", endpoint, params.client_id);

        let join_handle = thread::Builder::new()
            .name("mqtt_event_loop".into())
            .spawn(move || event_loop(connection, ctx))
            .map_err(MqttSessionError::SpawnError)?;

        // Wait for the first connection result
        match first_rx.recv_timeout(params.connect_timeout) {
            Ok(Ok(())) => (),
            Ok(Err(e)) => return Err(MqttSessionError::CouldNotConnect(endpoint, e)),
            Err(_) => {
                shutdown.store(true, Ordering::Relaxed);
                return Err(MqttSessionError::ConnectTimeout(endpoint, params.connect_timeout))
            }
        }

        Ok((
            Self {
                client,
                join_handle: Some(join_handle),
                subscriptions,
                shutdown,
                connected,
                loop_exited: Mutex::new(loop_exited),
            },
            event_receiver
        ))
    }

    /// Cleanly disconnect from the server.
    ///
    /// Waits for the disconnect packet to be sent and the event loop thread to exit, for at most
    /// [`DISCONNECT_TIMEOUT`].
    pub fn disconnect(&mut self) {
        let join_handle = match self.join_handle.take() {
            Some(jh) => jh,
            None => return
        };

        debug!("Disconnecting MQTT session");

        if let Err(e) = self.client.try_disconnect() {
            warn!("Could not request MQTT disconnect: {}", e);
        }

        // From now on connection errors are the connection closing, not a lost connection
        self.shutdown.store(true, Ordering::Relaxed);

        let exited = match self.loop_exited.lock() {
            Ok(rx) => matches!(
                rx.recv_timeout(DISCONNECT_TIMEOUT), 
                Err(RecvTimeoutError::Disconnected)
            ),
            Err(_) => false
        };

        if !exited {
            warn!("MQTT event loop still running {:?} after disconnecting", DISCONNECT_TIMEOUT);
            return
        }

        if join_handle.join().is_err() {
            warn!("MQTT event loop thread panicked");
        }

        self.connected.store(false, Ordering::Relaxed);
    }
}

impl Transport for MqttSession {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NetError> {
        if !self.is_connected() {
            return Err(NetError::NotConnected)
        }

        self.client.try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| NetError::PublishError(topic.to_string(), e.to_string()))
    }

    fn subscribe(&self, topic: &str) -> Result<(), NetError> {
        self.client.subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| NetError::SubscribeError(topic.to_string(), e.to_string()))?;

        match self.subscriptions.lock() {
            Ok(mut s) => s.push(topic.to_string()),
            Err(_) => warn!("Couldn't get lock on subscriptions, {} won't be resubscribed", topic)
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn build_options(params: &ConnectParams) -> Result<MqttOptions, MqttSessionError> {
    let mut options = MqttOptions::new(
        params.client_id.clone(),
        params.host.clone(),
        params.port
    );
    options.set_keep_alive(params.keep_alive);

    if let Some(ref creds) = params.credentials {
        options.set_credentials(creds.username.clone(), creds.auth_token.clone());
    }

    if let Some(ref ca_paths) = params.tls_ca_paths {
        // Bundle all trusted certificates into a single PEM blob
        let mut ca = Vec::new();
        for path in ca_paths {
            let mut pem = std::fs::read(path)
                .map_err(|e| MqttSessionError::CaCertLoadError(path.clone(), e))?;
            ca.append(&mut pem);
            ca.push(b'\n');
        }

        options.set_transport(MqttTransport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));
    }

    Ok(options)
}

fn event_loop(mut connection: Connection, mut ctx: EventLoopCtx) {
    let mut num_failed_attempts: u32 = 0;

    for notification in connection.iter() {
        match notification {
            // The disconnect packet has been written out, nothing more to do
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break
            },
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                ctx.connected.store(true, Ordering::Relaxed);
                num_failed_attempts = 0;

                match ctx.first_connect_sender.take() {
                    Some(tx) => {
                        tx.send(Ok(())).ok();
                    },
                    None => {
                        info!("MQTT session reconnected");
                        resubscribe(&ctx);
                    }
                }

                if ctx.event_sender.send(NetEvent::Connected).is_err() {
                    break
                }
            },
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let event = NetEvent::Message {
                    topic: p.topic.clone(),
                    payload: p.payload.to_vec()
                };
                if ctx.event_sender.send(event).is_err() {
                    break
                }
            },
            Ok(e) => trace!("MQTT event: {:?}", e),
            Err(e) => {
                ctx.connected.store(false, Ordering::Relaxed);

                // A failure before the first acknowledgement is always final
                if let Some(tx) = ctx.first_connect_sender.take() {
                    tx.send(Err(e.to_string())).ok();
                    break
                }

                if ctx.shutdown.load(Ordering::Relaxed) {
                    break
                }

                if ctx.event_sender.send(NetEvent::ConnectionLost(e.to_string())).is_err() {
                    break
                }

                match ctx.reconnect {
                    None => break,
                    Some(r) => {
                        num_failed_attempts += 1;

                        if !r.allows_attempt(num_failed_attempts) {
                            error!(
                                "Giving up on the MQTT connection after {} attempts", 
                                num_failed_attempts - 1
                            );
                            break
                        }

                        let delay = r.delay_for_attempt(num_failed_attempts);
                        warn!(
                            "MQTT connection error ({}), reconnection attempt {} in {:.1} s",
                            e,
                            num_failed_attempts,
                            delay.as_secs_f64()
                        );
                        thread::sleep(delay);
                    }
                }
            }
        }
    }

    ctx.connected.store(false, Ordering::Relaxed);
    debug!("MQTT event loop exited");
}

fn resubscribe(ctx: &EventLoopCtx) {
    let topics = match ctx.subscriptions.lock() {
        Ok(s) => s.clone(),
        Err(_) => {
            warn!("Couldn't get lock on subscriptions, not resubscribing");
            return
        }
    };

    for topic in topics {
        match ctx.client.try_subscribe(topic.clone(), QoS::AtMostOnce) {
            Ok(_) => debug!("Resubscribed to {}", topic),
            Err(e) => warn!("Could not resubscribe to {}: {}", topic, e)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
