//! Main robot-side executable entry point.
//! 
//! # Architecture
//! 
//! Initialisation is an ordered sequence, any failure in it is fatal:
//! 
//!     - Session and logging
//!     - Parameters
//!     - Connection profile (anonymous or registered)
//!     - Hardware and control loop
//!     - Network session, command subscription (registered only)
//!     - Control loop runner and telemetry publisher threads
//! 
//! The main loop then waits on network events, dispatching received commands to the control loop
//! and handling completions of the loop's runs.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, warn};
use std::{
    path::PathBuf,
    sync::{mpsc::{self, RecvTimeoutError}, Arc},
};
use color_eyre::{Report, eyre::{WrapErr, eyre}};
use structopt::StructOpt;

// Internal
use comms_if::net::{mqtt::MqttSession, NetEvent, NetParams, Transport};
use robot_lib::{
    control_loop::{self, ControlLoop, ControlLoopHandle},
    data_store::DataStore,
    dispatcher::CommandDispatcher,
    hw::sim::SimHardware,
    params::RobotExecParams,
    profile::{ConnectionMode, ConnectionProfile, DeviceConfig},
    supervisor::{Supervisor, Verdict},
    tm_publisher::TmPublisher,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
    time::secs_to_duration,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "robot_exec", about = "Robot telemetry and control agent")]
struct Opt {
    /// Device configuration file. If the file doesn't exist the robot connects anonymously.
    #[structopt(long = "device-cfg", parse(from_os_str), default_value = "device.cfg")]
    device_cfg: PathBuf,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "robot_exec", 
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Robot Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let mut net_params: NetParams = util::params::load(
        "net.toml"
    ).wrap_err("Could not load net params")?;

    let exec_params: RobotExecParams = util::params::load(
        "robot_exec.toml"
    ).wrap_err("Could not load exec params")?;
    exec_params.validate()
        .wrap_err("Invalid exec params")?;

    let loop_params: control_loop::Params = util::params::load(
        "control_loop.toml"
    ).wrap_err("Could not load control loop params")?;

    // CA files are relative to the params directory
    let params_dir = host::get_sw_root()
        .wrap_err("Could not find the software root")?
        .join("params");
    net_params.ca_cert_paths = net_params.ca_cert_paths
        .iter()
        .map(|p| params_dir.join(p))
        .collect();

    info!("Exec parameters loaded");

    // ---- RESOLVE CONNECTION PROFILE ----

    let device_cfg = DeviceConfig::load(&opt.device_cfg)
        .wrap_err("Failed to load the device configuration")?;

    if device_cfg.is_none() {
        info!("No device configuration at {:?}", opt.device_cfg);
    }

    let profile = ConnectionProfile::resolve(device_cfg.as_ref(), host::get_mac_address)
        .wrap_err("Invalid device configuration")?;

    info!(
        "Connecting in {} mode as {} (encryption {})", 
        profile.mode, 
        profile.client_id(),
        if profile.use_encryption { "on" } else { "off" }
    );

    if let Some(url) = profile.dashboard_url() {
        info!("Telemetry can be viewed at {}", url);
    }

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let ds = DataStore::new_shared();

    let hw = SimHardware::new(exec_params.sim, loop_params.pins);

    let ctrl = ControlLoop::new(hw, loop_params)
        .wrap_err("Failed to initialise ControlLoop")?;
    info!("ControlLoop init complete");

    let dispatcher = CommandDispatcher::new(profile.mode);

    info!("Module initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let (session, net_events) = MqttSession::connect(&profile.connect_params(&net_params))
        .wrap_err("Failed to connect to the messaging service")?;
    let session = Arc::new(session);
    info!("MqttSession connected");

    dispatcher.subscribe(session.as_ref())
        .wrap_err("Failed to subscribe to commands")?;

    if profile.mode == ConnectionMode::Anonymous {
        info!("Anonymous mode, commands will not be received");
    }

    info!("Network initialisation complete");

    // ---- START THREADS ----

    let (completion_sender, completions) = mpsc::channel();

    let loop_handle = ControlLoopHandle::spawn(ctrl, ds.clone(), completion_sender)
        .wrap_err("Failed to start the ControlLoop")?;

    let tm_handle = TmPublisher::new(session.clone(), &exec_params.device_label)
        .spawn(ds.clone(), secs_to_duration(exec_params.telemetry_period_s))
        .wrap_err("Failed to start the TmPublisher")?;

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let cycle_period = secs_to_duration(exec_params.main_cycle_period_s);

    let supervisor = Supervisor::new(&exec_params, &net_params);

    loop {

        // ---- COMPLETIONS ----

        let mut verdict = Verdict::Continue;

        for completion in completions.try_iter() {
            debug!("Run complete: {:?}", completion);

            verdict = supervisor.on_completion(&completion);
            if verdict != Verdict::Continue {
                break
            }
        }

        // ---- NETWORK EVENTS ----

        if verdict == Verdict::Continue {
            verdict = match net_events.recv_timeout(cycle_period) {
                Ok(event) => {
                    if let NetEvent::Message { ref topic, ref payload } = event {
                        if let Some(cmd) = dispatcher.dispatch(topic, payload) {
                            loop_handle.send(cmd)
                                .wrap_err("Could not send command to the control loop")?;
                        }
                    }
                    else if event == NetEvent::Connected {
                        info!("Connected to the messaging service");
                    }

                    supervisor.on_net_event(&event)
                },
                Err(RecvTimeoutError::Timeout) => Verdict::Continue,
                Err(RecvTimeoutError::Disconnected) => supervisor.on_net_closed()
            };
        }

        match verdict {
            Verdict::Continue => (),
            Verdict::Exit => {
                info!("Exiting");
                break
            },
            Verdict::Fatal(reason) => {
                error!("{}", reason);
                return Err(eyre!(reason))
            }
        }
    }

    // ---- SHUTDOWN ----

    info!("Shutting down");

    tm_handle.shutdown();
    loop_handle.shutdown();

    match Arc::try_unwrap(session) {
        Ok(mut s) => s.disconnect(),
        Err(s) => warn!(
            "Network session still in use on shutdown (connected: {})", 
            s.is_connected()
        )
    }

    info!("End of execution");

    Ok(())
}
