//! Implementations for the DepthCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Serialize;

// Internal
use super::{DepthCtrlError, Params};
use util::{module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Depth/force controller module state
#[derive(Default)]
pub struct DepthCtrl {
    pub(crate) params: Params,

    /// The command being executed, `None` when idle
    current_cmd: Option<DepthCmd>,

    phase: DepthPhase,

    /// TCP height at the start of the operation, the depth datum
    start_z_m: f64,

    /// Ticks spent in the current phase
    phase_ticks: u32,

    /// Consecutive in-band readings during fine adjustment
    stable_readings: u32,

    /// Consecutive ticks processed without force or pose data, limited by the
    /// grace window
    ticks_without_data: u32,
}

/// A press command.
#[derive(Debug, Clone, Copy)]
pub struct DepthCmd {
    /// Contact force to settle at, in load cell counts
    pub target_force: f64,

    /// Acceptable band around the target force
    pub wiggle_room: f64,
}

/// Input data to the depth controller.
#[derive(Default)]
pub struct InputData {
    /// Latest force reading in load cell counts, `None` if the plunger feed
    /// is silent
    pub force: Option<f64>,

    /// Current TCP height in meters, `None` if the pose read failed
    pub tcp_z_m: Option<f64>,
}

/// Output jog demand from the depth controller.
#[derive(Clone, Copy, Serialize, Debug)]
pub struct OutputData {
    /// Jog velocity `[vx, vy, vz, wx, wy, wz]`
    pub jog_vector: [f64; 6],

    /// True on the tick the press settles
    pub complete: bool,
}

/// Status report for DepthCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    pub phase: DepthPhase,
    pub depth_m: f64,
    pub force: f64,
    pub stable_readings: u32,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Phase of the press state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DepthPhase {
    Idle,
    CoarseDescent,
    FineAdjust,
    Settled,
    Failed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for DepthPhase {
    fn default() -> Self {
        DepthPhase::Idle
    }
}

impl Default for OutputData {
    fn default() -> Self {
        OutputData {
            jog_vector: [0.0; 6],
            complete: false,
        }
    }
}

impl State for DepthCtrl {
    type InitData = &'static str;
    type InitError = params::LoadError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = DepthCtrlError;

    /// Initialise the DepthCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, _session: &Session) -> Result<(), Self::InitError> {
        self.params = params::load(init_data)?;

        Ok(())
    }

    /// Perform cyclic processing of the depth controller.
    ///
    /// Every exit path, settled or failed, leaves the internal demand zeroed
    /// so nothing leaks into a later operation.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let cmd = match self.current_cmd {
            Some(c) => c,
            None => return Ok((OutputData::default(), StatusReport::default())),
        };

        self.phase_ticks += 1;

        // A press must never descend blind, so a silent feed holds position
        // through a short grace window and then fails the operation
        let (force, tcp_z_m) = match (input_data.force, input_data.tcp_z_m) {
            (Some(f), Some(z)) => {
                self.ticks_without_data = 0;
                (f, z)
            }
            _ => {
                self.ticks_without_data += 1;

                if self.ticks_without_data > self.params.no_data_grace_ticks {
                    let ticks = self.ticks_without_data;
                    self.fail();
                    return Err(DepthCtrlError::NoSensorData(ticks));
                }

                return Ok((
                    OutputData::default(),
                    StatusReport {
                        phase: self.phase,
                        stable_readings: self.stable_readings,
                        ..StatusReport::default()
                    },
                ));
            }
        };

        let depth_m = self.start_z_m - tcp_z_m;

        let mut report = StatusReport {
            phase: self.phase,
            depth_m,
            force,
            stable_readings: self.stable_readings,
        };

        let output = match self.phase {
            DepthPhase::CoarseDescent => self.proc_coarse(&cmd, force, depth_m)?,
            DepthPhase::FineAdjust => self.proc_fine(&cmd, force)?,
            _ => OutputData::default(),
        };

        report.phase = self.phase;
        report.stable_readings = self.stable_readings;

        Ok((output, report))
    }
}

impl DepthCtrl {
    /// Begin a press from the current TCP height.
    pub fn start(&mut self, cmd: DepthCmd, start_z_m: f64) {
        info!(
            "Press started, target force {:.0} +/- {:.0}",
            cmd.target_force, cmd.wiggle_room
        );

        self.current_cmd = Some(cmd);
        self.phase = DepthPhase::CoarseDescent;
        self.start_z_m = start_z_m;
        self.phase_ticks = 0;
        self.stable_readings = 0;
        self.ticks_without_data = 0;
    }

    /// Abort the current press.
    pub fn abort(&mut self) {
        if self.current_cmd.is_some() {
            warn!("Press aborted");
        }
        self.current_cmd = None;
        self.phase = DepthPhase::Idle;
    }

    pub fn is_active(&self) -> bool {
        self.current_cmd.is_some()
    }

    pub fn phase(&self) -> DepthPhase {
        self.phase
    }

    fn fail(&mut self) {
        self.current_cmd = None;
        self.phase = DepthPhase::Failed;
    }

    fn settle(&mut self) -> OutputData {
        info!("Press settled");
        self.current_cmd = None;
        self.phase = DepthPhase::Settled;

        OutputData {
            jog_vector: [0.0; 6],
            complete: true,
        }
    }

    fn proc_coarse(
        &mut self,
        cmd: &DepthCmd,
        force: f64,
        depth_m: f64,
    ) -> Result<OutputData, DepthCtrlError> {
        // Depth abort is checked before anything else, contact or not
        if depth_m >= self.params.max_depth_m {
            let max_depth_m = self.params.max_depth_m;
            self.fail();
            return Err(DepthCtrlError::MaxDepthExceeded { max_depth_m });
        }

        if self.phase_ticks > self.params.coarse_max_ticks {
            let budget = self.params.coarse_max_ticks;
            self.fail();
            return Err(DepthCtrlError::DescentTimeout(budget));
        }

        // Contact: hand over to fine adjustment if it came up hard,
        // otherwise the press is done
        if force > cmd.target_force - cmd.wiggle_room {
            if force > self.params.high_force_cutover {
                info!("Contact at force {:.0}, entering fine adjustment", force);
                self.phase = DepthPhase::FineAdjust;
                self.phase_ticks = 0;
                self.stable_readings = 0;

                return Ok(OutputData {
                    jog_vector: [0.0; 6],
                    complete: false,
                });
            }

            return Ok(self.settle());
        }

        let mut jog = [0.0; 6];
        jog[2] = -self.params.descent_speed_ms;

        Ok(OutputData {
            jog_vector: jog,
            complete: false,
        })
    }

    fn proc_fine(&mut self, cmd: &DepthCmd, force: f64) -> Result<OutputData, DepthCtrlError> {
        if self.phase_ticks > self.params.fine_max_ticks {
            let budget = self.params.fine_max_ticks;
            self.fail();
            return Err(DepthCtrlError::StabilizationTimeout(budget));
        }

        let mut jog = [0.0; 6];

        if force < cmd.target_force - cmd.wiggle_room {
            jog[2] = -self.params.nudge_speed_ms;
            self.stable_readings = 0;
        } else if force > cmd.target_force + cmd.wiggle_room {
            jog[2] = self.params.nudge_speed_ms;
            self.stable_readings = 0;
        } else {
            self.stable_readings += 1;

            if self.stable_readings >= self.params.required_stable_readings {
                return Ok(self.settle());
            }
        }

        Ok(OutputData {
            jog_vector: jog,
            complete: false,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const DT_S: f64 = 0.02;

    fn test_ctrl(target: f64, wiggle: f64) -> DepthCtrl {
        let mut ctrl = DepthCtrl::default();
        ctrl.params = Params::default();
        ctrl.start(
            DepthCmd {
                target_force: target,
                wiggle_room: wiggle,
            },
            0.2,
        );
        ctrl
    }

    #[test]
    fn test_max_depth_aborts_with_zero_velocity() {
        let mut ctrl = test_ctrl(5000.0, 200.0);

        let mut z = 0.2;
        let mut aborted = false;

        for _ in 0..ctrl.params.coarse_max_ticks {
            let input = InputData {
                force: Some(0.0),
                tcp_z_m: Some(z),
            };

            match ctrl.proc(&input) {
                Ok((out, _)) => {
                    z += out.jog_vector[2] * DT_S;
                }
                Err(DepthCtrlError::MaxDepthExceeded { .. }) => {
                    aborted = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert!(aborted, "descent never hit the depth limit");
        assert!((0.2 - z) >= ctrl.params.max_depth_m - 1e-9);

        // Immediately after the abort the controller commands nothing
        let (out, _) = ctrl
            .proc(&InputData {
                force: Some(0.0),
                tcp_z_m: Some(z),
            })
            .unwrap();
        assert_eq!(out.jog_vector, [0.0; 6]);
        assert!(!ctrl.is_active());
    }

    #[test]
    fn test_silent_feed_holds_then_fails() {
        let mut ctrl = test_ctrl(5000.0, 200.0);

        // With the force feed silent the controller holds position, it must
        // never descend blind
        for _ in 0..ctrl.params.no_data_grace_ticks {
            let (out, _) = ctrl
                .proc(&InputData {
                    force: None,
                    tcp_z_m: Some(0.2),
                })
                .unwrap();
            assert_eq!(out.jog_vector, [0.0; 6]);
        }

        // Past the grace window the press fails with motion zeroed
        match ctrl.proc(&InputData {
            force: None,
            tcp_z_m: Some(0.2),
        }) {
            Err(DepthCtrlError::NoSensorData(_)) => (),
            other => panic!("expected NoSensorData, got {:?}", other.map(|_| ())),
        }
        assert!(!ctrl.is_active());
        assert_eq!(ctrl.phase(), DepthPhase::Failed);

        // Data returning mid-grace resets the counter
        let mut ctrl = test_ctrl(5000.0, 200.0);
        for _ in 0..10 {
            ctrl.proc(&InputData {
                force: None,
                tcp_z_m: None,
            })
            .unwrap();
        }
        ctrl.proc(&InputData {
            force: Some(0.0),
            tcp_z_m: Some(0.2),
        })
        .unwrap();
        for _ in 0..ctrl.params.no_data_grace_ticks {
            assert!(ctrl
                .proc(&InputData {
                    force: None,
                    tcp_z_m: Some(0.2),
                })
                .is_ok());
        }
    }

    #[test]
    fn test_soft_contact_settles_directly() {
        let mut ctrl = test_ctrl(2000.0, 200.0);

        // Below contact force, descending
        let (out, rpt) = ctrl
            .proc(&InputData {
                force: Some(100.0),
                tcp_z_m: Some(0.2),
            })
            .unwrap();
        assert!(out.jog_vector[2] < 0.0);
        assert_eq!(rpt.phase, DepthPhase::CoarseDescent);

        // Contact below the hard cutover settles without fine adjustment
        let (out, _) = ctrl
            .proc(&InputData {
                force: Some(1900.0),
                tcp_z_m: Some(0.199),
            })
            .unwrap();
        assert!(out.complete);
        assert_eq!(out.jog_vector, [0.0; 6]);
        assert_eq!(ctrl.phase(), DepthPhase::Settled);
    }

    #[test]
    fn test_hard_contact_enters_fine_adjust() {
        let mut ctrl = test_ctrl(5000.0, 200.0);

        let (out, _) = ctrl
            .proc(&InputData {
                force: Some(4900.0),
                tcp_z_m: Some(0.2),
            })
            .unwrap();
        assert!(!out.complete);
        assert_eq!(ctrl.phase(), DepthPhase::FineAdjust);

        // Under the band nudges down, over the band nudges up
        let (out, _) = ctrl
            .proc(&InputData {
                force: Some(4000.0),
                tcp_z_m: Some(0.2),
            })
            .unwrap();
        assert!(out.jog_vector[2] < 0.0);

        let (out, _) = ctrl
            .proc(&InputData {
                force: Some(6000.0),
                tcp_z_m: Some(0.2),
            })
            .unwrap();
        assert!(out.jog_vector[2] > 0.0);

        // Ten consecutive in-band readings settle the press
        for i in 0..10 {
            let (out, _) = ctrl
                .proc(&InputData {
                    force: Some(5050.0),
                    tcp_z_m: Some(0.2),
                })
                .unwrap();

            if i < 9 {
                assert!(!out.complete);
                assert_eq!(out.jog_vector, [0.0; 6]);
            } else {
                assert!(out.complete);
            }
        }

        assert_eq!(ctrl.phase(), DepthPhase::Settled);
    }

    #[test]
    fn test_out_of_band_resets_stability_counter() {
        let mut ctrl = test_ctrl(5000.0, 200.0);

        // Force straight to fine adjustment
        ctrl.proc(&InputData {
            force: Some(4900.0),
            tcp_z_m: Some(0.2),
        })
        .unwrap();

        for _ in 0..9 {
            ctrl.proc(&InputData {
                force: Some(5000.0),
                tcp_z_m: Some(0.2),
            })
            .unwrap();
        }

        // An excursion resets the counter, so nine more in-band readings are
        // not enough
        ctrl.proc(&InputData {
            force: Some(6000.0),
            tcp_z_m: Some(0.2),
        })
        .unwrap();

        for _ in 0..9 {
            let (out, _) = ctrl
                .proc(&InputData {
                    force: Some(5000.0),
                    tcp_z_m: Some(0.2),
                })
                .unwrap();
            assert!(!out.complete);
        }
    }

    #[test]
    fn test_fine_adjust_times_out() {
        let mut ctrl = test_ctrl(5000.0, 200.0);
        ctrl.params.fine_max_ticks = 20;

        ctrl.proc(&InputData {
            force: Some(4900.0),
            tcp_z_m: Some(0.2),
        })
        .unwrap();

        let mut timed_out = false;
        for _ in 0..=20 {
            // Alternating readings never settle
            for force in [4000.0, 6000.0] {
                match ctrl.proc(&InputData {
                    force: Some(force),
                    tcp_z_m: Some(0.2),
                }) {
                    Ok(_) => (),
                    Err(DepthCtrlError::StabilizationTimeout(_)) => {
                        timed_out = true;
                        break;
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
            if timed_out {
                break;
            }
        }

        assert!(timed_out);
        assert_eq!(ctrl.phase(), DepthPhase::Failed);
    }
}
