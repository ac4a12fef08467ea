//! Main sample handler executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop:
//!         - System input acquisition:
//!             - Vision feed
//!             - Plunger force/pressure feed
//!             - Arm TCP pose and status
//!         - Safety supervision
//!         - Telecommand processing and handling
//!         - Alignment controller processing
//!         - Depth controller processing
//!         - Grip/release sequencing
//!         - Actuator demand output
//!
//! # Modules
//!
//! All cyclic modules (e.g. `align_ctrl`) shall meet the following
//! requirements:
//!     1. Provide a public struct implementing the `util::module::State`
//!        trait.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use arm_lib::{
    arm_client::ArmClient,
    data_store::{ActiveOp, DataStore},
    depth_ctrl,
    motion::MotionFacade,
    params::ArmExecParams,
    plunger_client::PlungerClient,
    safety::SafetyEvent,
    sequence::SequenceAction,
    tc_processor,
    tc_server::TcServer,
    vision_client::VisionClient,
    CYCLE_FREQUENCY_HZ, CYCLE_PERIOD_S,
};
use comms_if::net::NetParams;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{error, info, warn};
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Limit of consecutive arm client errors before the executable exits.
const MAX_ARM_ERROR_LIMIT: u64 = 50;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Sample Handler Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let exec_params: ArmExecParams =
        util::params::load("arm_exec.toml").wrap_err("Could not load exec params")?;
    let safety_params: arm_lib::safety::Params =
        util::params::load("safety.toml").wrap_err("Could not load safety params")?;
    let motion_params: arm_lib::motion::Params =
        util::params::load("motion.toml").wrap_err("Could not load motion params")?;
    let sequence_params: arm_lib::sequence::Params =
        util::params::load("sequence.toml").wrap_err("Could not load sequence params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    // ---- INITIALISE MODULES ----

    ds.align_ctrl
        .init("align_ctrl.toml", &session)
        .wrap_err("Failed to initialise AlignCtrl")?;
    info!("AlignCtrl init complete");

    ds.depth_ctrl
        .init("depth_ctrl.toml", &session)
        .wrap_err("Failed to initialise DepthCtrl")?;
    info!("DepthCtrl init complete");

    ds.safety.set_params(safety_params);
    ds.grip_verifier = arm_lib::sequence::GripVerifier::new(sequence_params.clone());
    ds.release_verifier = arm_lib::sequence::ReleaseVerifier::new(sequence_params);

    // Station geometry
    let mut station_path = host::get_handler_sw_root()
        .wrap_err("Software root environment variable not set")?;
    station_path.push(&exec_params.station_file);
    ds.station = arm_lib::station::Station::load_or_default(&station_path)
        .wrap_err("Failed to load the station geometry")?;

    // Controller status report archives
    let mut align_arch = Archiver::from_path(&session, "align_ctrl.csv")
        .map_err(|e| eyre!("Failed to create the AlignCtrl archive: {}", e))?;
    let mut depth_arch = Archiver::from_path(&session, "depth_ctrl.csv")
        .map_err(|e| eyre!("Failed to create the DepthCtrl archive: {}", e))?;

    info!("Module initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let zmq_ctx = comms_if::net::zmq::Context::new();

    let mut tc_server =
        TcServer::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise the TcServer")?;
    info!("TcServer initialised");

    let arm_client =
        ArmClient::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise the ArmClient")?;
    info!("ArmClient initialised");

    let motion = MotionFacade::new(Box::new(arm_client), motion_params);
    info!("MotionFacade initialised");

    let mut plunger_client = PlungerClient::new(&zmq_ctx, &net_params)
        .wrap_err("Failed to initialise the PlungerClient")?;
    info!("PlungerClient initialised");

    let mut vision_client =
        VisionClient::new(&net_params).wrap_err("Failed to initialise the VisionClient")?;
    info!("VisionClient initialised");

    info!("Network initialisation complete");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(CYCLE_FREQUENCY_HZ);

        // ---- DATA INPUT ----

        vision_client.poll();
        ds.latest_tag_obs = vision_client.latest(
            exec_params.target_tag_id,
            chrono::Duration::milliseconds(ds.align_ctrl.pose_staleness_ms()),
        );

        let force_samples = plunger_client.drain_samples();

        match motion.get_tcp_pose() {
            Ok(pose) => {
                ds.tcp_pose = Some(pose);
                ds.num_consec_arm_errors = 0;
            }
            Err(e) => {
                warn!("Could not get the TCP pose: {}", e);
                ds.num_consec_arm_errors += 1;

                if ds.num_consec_arm_errors > MAX_ARM_ERROR_LIMIT {
                    error!(
                        "More than {} consecutive arm client errors, stopping",
                        MAX_ARM_ERROR_LIMIT
                    );
                    motion.halt_and_power_off().ok();
                    break;
                }
            }
        }

        // Status polling on the 1Hz is enough for collision latching
        if ds.is_1_hz_cycle {
            match motion.get_status() {
                Ok(status) => {
                    ds.safety.update_collision(status.collided);
                    ds.arm_status = Some(status);
                }
                Err(e) => warn!("Could not get the arm status: {}", e),
            }

            // Background snapshot of the latest controller reports
            session.save(
                "status_rpts.json",
                (ds.align_ctrl_status_rpt, ds.depth_ctrl_status_rpt),
            );
        }

        // ---- SAFETY SUPERVISION ----

        for event in ds.safety.ingest_cycle(&force_samples) {
            match event {
                SafetyEvent::PowerOff => {
                    ds.abort_active_op();
                    if let Err(e) = motion.halt_and_power_off() {
                        error!("Failed to power off after force trip: {}", e);
                    }
                }
                SafetyEvent::Pause => {
                    if let Err(e) = motion.pause() {
                        error!("Failed to pause after force warning: {}", e);
                    }
                }
                SafetyEvent::Unpause => {
                    if let Err(e) = motion.unpause() {
                        error!("Failed to unpause after force warning cleared: {}", e);
                    }
                }
            }
        }

        // ---- TELECOMMAND PROCESSING ----

        loop {
            match tc_server.recieve_tc() {
                Ok(Some(tc)) => {
                    let was_estopped = ds.safety.emergency_stopped();

                    let response = tc_processor::exec(&mut ds, &exec_params, &tc);

                    if let Err(e) = tc_server.send_response(&response) {
                        warn!("Could not respond to TC: {}", e);
                    }

                    // Act on a fresh emergency stop immediately
                    if ds.safety.emergency_stopped() && !was_estopped {
                        if let Err(e) = motion.halt_and_power_off() {
                            error!("Failed to halt on emergency stop: {}", e);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("TC receive error: {}", e);
                    break;
                }
            }
        }

        // ---- ONE-SHOT REQUESTS ----

        if let Some(paused) = ds.pause_request.take() {
            let result = if paused { motion.pause() } else { motion.unpause() };
            if let Err(e) = result {
                warn!("Pause request failed: {}", e);
            }
        }

        if let Some(mode) = ds.mode_request.take() {
            if let Err(e) = motion.set_mode(mode) {
                warn!("Mode switch failed: {}", e);
            }
        }

        if ds.reset_request {
            ds.reset_request = false;
            match motion.reset_collision() {
                Ok(()) => ds.safety.reset(),
                Err(e) => warn!("Collision reset failed: {}", e),
            }
        }

        if let Some(req) = ds.move_request.take() {
            if ds.safety.motion_allowed() {
                if let Err(e) = motion.move_linear(&req.waypoints, exec_params.move_speed_ms) {
                    error!("Linear move failed: {}", e);
                }
            } else {
                warn!("Move request dropped, motion is blocked");
            }
        }

        for dems in ds.plunger_dems_queue.drain(..) {
            if let Err(e) = plunger_client.send_demands(&dems) {
                warn!("Plunger demand failed: {}", e);
            }
        }

        // ---- CONTROL ALGORITHM PROCESSING ----

        // AlignCtrl processing
        if ds.align_ctrl.is_active() {
            ds.align_ctrl_input.observation = ds.latest_tag_obs;

            if ds.safety.hard_blocked() {
                ds.align_ctrl.abort();
                ds.release_arm();
                motion.stop_jog().ok();
            } else if !ds.safety.motion_allowed() {
                // Warning-band pause: hold the operation, the arm is already
                // paused and resumes when the band clears
            } else {
                match ds.align_ctrl.proc(&ds.align_ctrl_input) {
                    Ok((out, rpt)) => {
                        ds.align_ctrl_output = out;
                        ds.align_ctrl_status_rpt = rpt;

                        if let Err(e) = align_arch.serialise(&ds.align_ctrl_status_rpt) {
                            warn!("Could not write AlignCtrl archive: {}", e);
                        }

                        if out.complete {
                            info!("Alignment complete");
                            motion.stop_jog().ok();
                            ds.release_arm();
                        } else if let Err(e) = motion.jog(out.jog_vector) {
                            error!("Jog demand failed, aborting alignment: {}", e);
                            ds.align_ctrl.abort();
                            ds.release_arm();
                            motion.stop_jog().ok();
                        }
                    }
                    Err(e) => {
                        error!("Alignment failed: {}", e);
                        motion.stop_jog().ok();
                        ds.release_arm();
                    }
                }
            }
        }

        // DepthCtrl processing, also driven during a grip re-seat
        if ds.depth_ctrl.is_active() {
            ds.depth_ctrl_input = depth_ctrl::InputData {
                force: plunger_client.latest_sample().map(|s| s.force),
                tcp_z_m: ds.tcp_pose.map(|p| p.position_m.z),
            };

            if ds.safety.hard_blocked() {
                ds.depth_ctrl.abort();
                ds.release_arm();
                motion.stop_jog().ok();
            } else if !ds.safety.motion_allowed() {
                // Warning-band pause: hold the operation, the arm is already
                // paused and resumes when the band clears
            } else {
                match ds.depth_ctrl.proc(&ds.depth_ctrl_input) {
                    Ok((out, rpt)) => {
                        ds.depth_ctrl_output = out;
                        ds.depth_ctrl_status_rpt = rpt;

                        if let Err(e) = depth_arch.serialise(&ds.depth_ctrl_status_rpt) {
                            warn!("Could not write DepthCtrl archive: {}", e);
                        }

                        if out.complete {
                            info!("Press complete");
                            motion.stop_jog().ok();
                            if ds.active_op == ActiveOp::Press {
                                ds.release_arm();
                            }
                        } else if let Err(e) = motion.jog(out.jog_vector) {
                            error!("Jog demand failed, aborting press: {}", e);
                            ds.depth_ctrl.abort();
                            ds.release_arm();
                            motion.stop_jog().ok();
                        }
                    }
                    Err(e) => {
                        error!("Press failed: {}", e);
                        motion.stop_jog().ok();
                        ds.release_arm();
                    }
                }
            }
        }

        // Grip/release sequencing
        if ds.active_op == ActiveOp::Grip && !ds.depth_ctrl.is_active() {
            let pump_sensor = plunger_client
                .latest_sample()
                .map(|s| s.pump_sensor)
                .unwrap_or(f64::MAX);

            match ds.grip_verifier.step(pump_sensor) {
                Ok(SequenceAction::Done) => {
                    info!("Grip verified");
                    ds.release_arm();
                }
                Ok(SequenceAction::Reseat) => match (ds.last_press_cmd, ds.tcp_pose) {
                    (Some(cmd), Some(pose)) => {
                        ds.safety.elevate_press_threshold();
                        ds.depth_ctrl.start(cmd, pose.position_m.z);
                    }
                    _ => {
                        error!("Cannot re-seat, no previous press to replay");
                        ds.abort_active_op();
                    }
                },
                Ok(action) => tc_processor::queue_sequence_action(&mut ds, action),
                Err(e) => {
                    error!("Grip verification failed: {}", e);
                    ds.plunger_dems_queue
                        .push(comms_if::eqpt::plunger::PlungerDems::pump(0));
                    ds.release_arm();
                }
            }
        }

        if ds.active_op == ActiveOp::Release {
            let pump_sensor = plunger_client
                .latest_sample()
                .map(|s| s.pump_sensor)
                .unwrap_or(0.0);

            match ds.release_verifier.step(pump_sensor) {
                Ok(SequenceAction::Done) => {
                    info!("Release verified");
                    ds.release_arm();
                }
                Ok(action) => tc_processor::queue_sequence_action(&mut ds, action),
                Err(e) => {
                    error!("Release verification failed: {}", e);
                    ds.release_arm();
                }
            }
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        // Increment cycle counter
        ds.num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    // Flush any pending session saves before exiting
    session.exit();

    info!("End of execution");

    Ok(())
}
