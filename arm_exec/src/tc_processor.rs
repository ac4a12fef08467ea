//! # Telecommand processor module
//!
//! The telecommand processor handles TCs coming from the operator console.
//! It mutates the datastore only, actuator calls happen in the main loop, so
//! every command here is testable without hardware.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};

// Internal
use comms_if::{
    eqpt::plunger::PlungerDems,
    tc::{Tc, TcResponse},
};

use crate::{
    align_ctrl::AlignCmd,
    data_store::{ActiveOp, DataStore, MoveRequest},
    depth_ctrl::DepthCmd,
    params::ArmExecParams,
    spatial::Pose,
};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Execute a telecommand.
///
/// Mutates the datastore to send commands to different modules, and returns
/// the response to give the console.
pub fn exec(ds: &mut DataStore, params: &ArmExecParams, tc: &Tc) -> TcResponse {
    debug!("Recieved TC: {:?}", tc);

    match tc {
        Tc::AlignToTag {
            offset_x_mm,
            offset_y_mm,
        } => {
            if !ds.safety.motion_allowed() {
                return motion_blocked_response(ds);
            }
            if !ds.station.target_taught() {
                return TcResponse::CannotExecute(format!(
                    "{}",
                    crate::align_ctrl::AlignCtrlError::NoTargetTaught
                ));
            }
            if !ds.claim_arm(ActiveOp::Align) {
                return TcResponse::CannotExecute("Another operation owns the arm".into());
            }

            ds.align_ctrl.start(AlignCmd {
                tag_id: params.target_tag_id,
                target_camera_translation_m: ds.station.target_camera_translation_m,
                offset_x_m: offset_x_mm * 1e-3,
                offset_y_m: offset_y_mm * 1e-3,
            });

            TcResponse::Ok
        }

        Tc::MoveToCell { row, col } => {
            match approach_move(ds, params, *row, *col, params.approach_height_m) {
                Ok(response) => {
                    ds.last_cell = Some((*row, *col));
                    response
                }
                Err(response) => response,
            }
        }

        Tc::MoveToCellRetract => match ds.last_cell {
            Some((row, col)) => {
                match approach_move(ds, params, row, col, params.retract_distance_m) {
                    Ok(r) | Err(r) => r,
                }
            }
            None => TcResponse::CannotExecute("No cell has been commanded yet".into()),
        },

        Tc::MoveToSocket => {
            socket_move(ds, params.approach_height_m)
        }

        Tc::MoveToSocketRetract => {
            socket_move(ds, params.retract_distance_m)
        }

        Tc::MoveUntilPressure {
            pressure,
            wiggle_room,
        } => {
            if !ds.safety.motion_allowed() {
                return motion_blocked_response(ds);
            }

            let tcp_pose = match ds.tcp_pose {
                Some(p) => p,
                None => return TcResponse::CannotExecute("TCP pose is not known".into()),
            };

            if !ds.claim_arm(ActiveOp::Press) {
                return TcResponse::CannotExecute("Another operation owns the arm".into());
            }

            // A press legitimately loads the plunger, raise the interlock
            // threshold until the force has dwelt low again
            ds.safety.elevate_press_threshold();

            let cmd = DepthCmd {
                target_force: *pressure,
                wiggle_room: *wiggle_room,
            };
            ds.last_press_cmd = Some(cmd);
            ds.depth_ctrl.start(cmd, tcp_pose.position_m.z);

            TcResponse::Ok
        }

        Tc::GripSample => {
            if !ds.safety.motion_allowed() {
                return motion_blocked_response(ds);
            }
            if !ds.claim_arm(ActiveOp::Grip) {
                return TcResponse::CannotExecute("Another operation owns the arm".into());
            }

            let action = ds.grip_verifier.start();
            queue_sequence_action(ds, action);

            TcResponse::Ok
        }

        Tc::ReleaseSample => {
            if !ds.claim_arm(ActiveOp::Release) {
                return TcResponse::CannotExecute("Another operation owns the arm".into());
            }

            let action = ds.release_verifier.start();
            queue_sequence_action(ds, action);

            TcResponse::Ok
        }

        Tc::Retract { distance_m } => {
            if !ds.safety.motion_allowed() {
                return motion_blocked_response(ds);
            }
            if ds.active_op != ActiveOp::None {
                return TcResponse::CannotExecute("Another operation owns the arm".into());
            }

            let tcp_pose = match ds.tcp_pose {
                Some(p) => p,
                None => return TcResponse::CannotExecute("TCP pose is not known".into()),
            };

            // Withdrawing from a seated sample perturbs the force reading
            ds.safety.elevate_press_threshold();

            let mut target = tcp_pose;
            target.position_m.z += distance_m.abs();
            ds.move_request = Some(MoveRequest {
                waypoints: vec![target],
            });

            TcResponse::Ok
        }

        Tc::TeachTray => match ds.tcp_pose {
            Some(pose) => teach_result(ds.station.teach_tray(pose)),
            None => TcResponse::CannotExecute("TCP pose is not known".into()),
        },

        Tc::TeachSocket => match ds.tcp_pose {
            Some(pose) => teach_result(ds.station.teach_socket(pose)),
            None => TcResponse::CannotExecute("TCP pose is not known".into()),
        },

        Tc::TeachTarget => match ds.latest_tag_obs {
            Some(obs) => teach_result(ds.station.teach_target(obs.pose.position_m)),
            None => TcResponse::CannotExecute("No tag is visible".into()),
        },

        Tc::SetPause { paused } => {
            ds.pause_request = Some(*paused);
            TcResponse::Ok
        }

        Tc::SetMode { mode } => {
            ds.mode_request = Some(*mode);
            TcResponse::Ok
        }

        Tc::TogglePump { power } => {
            ds.plunger_dems_queue.push(PlungerDems::pump(*power));
            TcResponse::Ok
        }

        Tc::Tare => {
            ds.plunger_dems_queue.push(PlungerDems::tare());
            TcResponse::Ok
        }

        Tc::SetLeds {
            hue,
            saturation,
            lightness,
        } => {
            ds.plunger_dems_queue
                .push(PlungerDems::hsl(*hue, *saturation, *lightness));
            TcResponse::Ok
        }

        Tc::SetBrightness { level } => {
            ds.plunger_dems_queue.push(PlungerDems::brightness(*level));
            TcResponse::Ok
        }

        Tc::SetHeater { temp_degc } => {
            ds.plunger_dems_queue.push(PlungerDems::set_temp(*temp_degc));
            TcResponse::Ok
        }

        Tc::EmergencyStop => {
            warn!("Emergency stop TC recieved");
            ds.safety.emergency_stop();
            ds.abort_active_op();
            TcResponse::Ok
        }

        Tc::ResetCollision => {
            ds.reset_request = true;
            TcResponse::Ok
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Raise a move request above the given tray cell.
fn approach_move(
    ds: &mut DataStore,
    _params: &ArmExecParams,
    row: u32,
    col: u32,
    height_m: f64,
) -> Result<TcResponse, TcResponse> {
    if !ds.safety.motion_allowed() {
        return Err(motion_blocked_response(ds));
    }
    if ds.active_op != ActiveOp::None {
        return Err(TcResponse::CannotExecute("Another operation owns the arm".into()));
    }

    let cell = match ds.station.tray.cell_approach_pose(row, col) {
        Ok(p) => p,
        Err(e) => return Err(TcResponse::Error(format!("{}", e))),
    };

    ds.move_request = Some(MoveRequest {
        waypoints: vec![raised(cell, height_m)],
    });

    Ok(TcResponse::Ok)
}

/// Raise a move request above the socket.
fn socket_move(ds: &mut DataStore, height_m: f64) -> TcResponse {
    if !ds.safety.motion_allowed() {
        return motion_blocked_response(ds);
    }
    if ds.active_op != ActiveOp::None {
        return TcResponse::CannotExecute("Another operation owns the arm".into());
    }

    let target = raised(ds.station.socket_pose, height_m);
    ds.move_request = Some(MoveRequest {
        waypoints: vec![target],
    });

    TcResponse::Ok
}

/// The rejection for a motion TC while safety blocks the arm.
///
/// A tripped interlock names the force that caused it, anything else gets the
/// generic block message.
fn motion_blocked_response(ds: &DataStore) -> TcResponse {
    match ds.safety.trip_error() {
        Some(e) => TcResponse::CannotExecute(format!("{}", e)),
        None => TcResponse::CannotExecute("Motion is blocked by safety".into()),
    }
}

/// Queue the plunger side effect of a sequence action.
pub fn queue_sequence_action(ds: &mut DataStore, action: crate::sequence::SequenceAction) {
    if let crate::sequence::SequenceAction::SetPump(power) = action {
        ds.plunger_dems_queue.push(PlungerDems::pump(power));
    }
}

fn raised(mut pose: Pose, height_m: f64) -> Pose {
    pose.position_m.z += height_m;
    pose
}

fn teach_result(result: Result<(), crate::station::StationError>) -> TcResponse {
    match result {
        Ok(()) => TcResponse::Ok,
        Err(e) => TcResponse::Error(format!("{}", e)),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_params() -> ArmExecParams {
        ArmExecParams {
            target_tag_id: 3,
            approach_height_m: 0.05,
            retract_distance_m: 0.08,
            move_speed_ms: 0.1,
            station_file: "station.json".into(),
        }
    }

    /// A datastore with an alignment target taught into the station.
    fn taught_ds() -> DataStore {
        let mut ds = DataStore::default();
        ds.station.target_camera_translation_m = nalgebra::Vector3::new(0.001, -0.0005, 0.045);
        ds
    }

    #[test]
    fn test_align_is_rejected_while_press_active() {
        let mut ds = taught_ds();
        let params = test_params();

        assert!(ds.claim_arm(ActiveOp::Press));

        let response = exec(
            &mut ds,
            &params,
            &Tc::AlignToTag {
                offset_x_mm: 0.0,
                offset_y_mm: 0.0,
            },
        );

        assert!(matches!(response, TcResponse::CannotExecute(_)));
        assert!(!ds.align_ctrl.is_active());
    }

    #[test]
    fn test_align_rejected_without_taught_target() {
        let mut ds = DataStore::default();
        let params = test_params();

        let response = exec(
            &mut ds,
            &params,
            &Tc::AlignToTag {
                offset_x_mm: 0.0,
                offset_y_mm: 0.0,
            },
        );

        match response {
            TcResponse::CannotExecute(msg) => assert!(msg.contains("no alignment target")),
            other => panic!("expected CannotExecute, got {:?}", other),
        }
        assert!(!ds.align_ctrl.is_active());
        assert_eq!(ds.active_op, ActiveOp::None);
    }

    #[test]
    fn test_tripped_interlock_named_in_rejection() {
        use comms_if::eqpt::plunger::PlungerSample;

        let mut ds = DataStore::default();
        let params = test_params();

        ds.safety.ingest_cycle(&[PlungerSample {
            force: 12000.0,
            pump_sensor: 0.0,
            temperature: 0.0,
        }]);

        let response = exec(&mut ds, &params, &Tc::MoveToSocket);

        match response {
            TcResponse::CannotExecute(msg) => assert!(msg.contains("exceeded the threshold")),
            other => panic!("expected CannotExecute, got {:?}", other),
        }
    }

    #[test]
    fn test_align_claims_the_arm() {
        let mut ds = taught_ds();
        let params = test_params();

        let response = exec(
            &mut ds,
            &params,
            &Tc::AlignToTag {
                offset_x_mm: 1.0,
                offset_y_mm: -2.0,
            },
        );

        assert!(matches!(response, TcResponse::Ok));
        assert_eq!(ds.active_op, ActiveOp::Align);
        assert!(ds.align_ctrl.is_active());

        let cmd = ds.align_ctrl.current_cmd().unwrap();
        assert!((cmd.offset_x_m - 0.001).abs() < 1e-12);
        assert!((cmd.offset_y_m + 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_cell_is_an_error() {
        let mut ds = DataStore::default();
        let params = test_params();

        let response = exec(&mut ds, &params, &Tc::MoveToCell { row: 7, col: 0 });

        assert!(matches!(response, TcResponse::Error(_)));
        assert!(ds.move_request.is_none());
        assert!(ds.last_cell.is_none());
    }

    #[test]
    fn test_press_requires_known_pose() {
        let mut ds = DataStore::default();
        let params = test_params();

        let response = exec(
            &mut ds,
            &params,
            &Tc::MoveUntilPressure {
                pressure: 5000.0,
                wiggle_room: 200.0,
            },
        );

        assert!(matches!(response, TcResponse::CannotExecute(_)));
        assert_eq!(ds.active_op, ActiveOp::None);
    }

    #[test]
    fn test_press_elevates_threshold_and_claims_arm() {
        let mut ds = DataStore::default();
        ds.tcp_pose = Some(Pose::default());
        let params = test_params();

        let response = exec(
            &mut ds,
            &params,
            &Tc::MoveUntilPressure {
                pressure: 5000.0,
                wiggle_room: 200.0,
            },
        );

        assert!(matches!(response, TcResponse::Ok));
        assert_eq!(ds.active_op, ActiveOp::Press);
        assert!(ds.depth_ctrl.is_active());
        assert!(ds.safety.active_threshold() > 10000.0);
    }

    #[test]
    fn test_emergency_stop_aborts_active_op() {
        let mut ds = DataStore::default();
        ds.tcp_pose = Some(Pose::default());
        let params = test_params();

        exec(
            &mut ds,
            &params,
            &Tc::MoveUntilPressure {
                pressure: 5000.0,
                wiggle_room: 200.0,
            },
        );
        assert_eq!(ds.active_op, ActiveOp::Press);

        let response = exec(&mut ds, &params, &Tc::EmergencyStop);

        assert!(matches!(response, TcResponse::Ok));
        assert_eq!(ds.active_op, ActiveOp::None);
        assert!(!ds.depth_ctrl.is_active());
        assert!(!ds.safety.motion_allowed());
    }

    #[test]
    fn test_plunger_demands_are_queued() {
        let mut ds = DataStore::default();
        let params = test_params();

        exec(&mut ds, &params, &Tc::Tare);
        exec(&mut ds, &params, &Tc::TogglePump { power: 100 });
        exec(&mut ds, &params, &Tc::SetHeater { temp_degc: 41.5 });

        assert_eq!(ds.plunger_dems_queue.len(), 3);
        assert_eq!(ds.plunger_dems_queue[0], PlungerDems::tare());
        assert_eq!(ds.plunger_dems_queue[1], PlungerDems::pump(100));
    }
}
