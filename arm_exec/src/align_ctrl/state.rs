//! Implementations for the AlignCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::Vector3;
use serde::Serialize;

// Internal
use super::{AlignCtrlError, Params};
use crate::vision_client::TagObservation;
use util::{
    maths::shortest_ang_dist,
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Alignment controller module state
#[derive(Default)]
pub struct AlignCtrl {
    pub(crate) params: Params,

    /// The command being executed, `None` when idle
    current_cmd: Option<AlignCmd>,

    phase: AlignPhase,

    /// Ticks spent on the current command
    ticks: u32,

    /// Consecutive ticks without a fresh observation
    ticks_without_data: u32,

    /// Jog commanded on the last tick with data, held through the no-data
    /// grace window
    last_jog: [f64; 6],
}

/// An alignment command.
#[derive(Debug, Clone, Copy)]
pub struct AlignCmd {
    /// The tag to align over
    pub tag_id: u32,

    /// Taught camera-to-tag translation at which alignment is complete. The
    /// Z component is the stand-off height.
    pub target_camera_translation_m: Vector3<f64>,

    /// Operator offset from the tag centre along camera X in meters
    pub offset_x_m: f64,

    /// Operator offset from the tag centre along camera Y in meters
    pub offset_y_m: f64,
}

/// Input data to the alignment controller.
#[derive(Default)]
pub struct InputData {
    /// The freshest tag observation this cycle, or `None` if nothing new
    /// arrived
    pub observation: Option<TagObservation>,
}

/// Output jog demand from the alignment controller.
#[derive(Clone, Copy, Serialize, Debug)]
pub struct OutputData {
    /// Jog velocity `[vx, vy, vz, wx, wy, wz]` in meters/second and
    /// radians/second
    pub jog_vector: [f64; 6],

    /// True on the tick the alignment completes
    pub complete: bool,
}

/// Status report for AlignCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    pub phase: AlignPhase,
    pub yaw_error_rad: f64,
    pub xy_error_m: [f64; 2],
    pub z_to_target_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Phase of the alignment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlignPhase {
    Idle,
    RotationGate,
    Translating,
    FineApproach,
    Reached,
    Failed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for AlignPhase {
    fn default() -> Self {
        AlignPhase::Idle
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

impl State for AlignCtrl {
    type InitData = &'static str;
    type InitError = params::LoadError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = AlignCtrlError;

    /// Initialise the AlignCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, _session: &Session) -> Result<(), Self::InitError> {
        self.params = params::load(init_data)?;

        Ok(())
    }

    /// Perform cyclic processing of the alignment controller.
    ///
    /// One call produces one jog demand. Both error paths zero the jog
    /// internally before returning so a failed controller can never leave a
    /// stale motion demand behind.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let cmd = match self.current_cmd {
            Some(c) => c,
            None => return Ok((OutputData::default(), StatusReport::default())),
        };

        self.ticks += 1;

        if self.ticks > self.params.max_ticks {
            let budget = self.params.max_ticks;
            self.fail();
            return Err(AlignCtrlError::BudgetExhausted(budget));
        }

        let obs = match input_data.observation {
            Some(obs) => {
                self.ticks_without_data = 0;
                obs
            }
            None => {
                self.ticks_without_data += 1;

                if self.ticks_without_data > self.params.no_data_grace_ticks {
                    let grace = self.ticks_without_data;
                    self.fail();
                    return Err(AlignCtrlError::NoPoseData(grace));
                }

                // Hold the last demand through the grace window
                return Ok((
                    OutputData {
                        jog_vector: self.last_jog,
                        complete: false,
                    },
                    StatusReport {
                        phase: self.phase,
                        ..StatusReport::default()
                    },
                ));
            }
        };

        // Errors between the observed tag and the taught target, in the
        // camera frame
        let x_err_m =
            obs.pose.position_m.x - (cmd.target_camera_translation_m.x + cmd.offset_x_m);
        let y_err_m =
            obs.pose.position_m.y - (cmd.target_camera_translation_m.y + cmd.offset_y_m);
        let z_to_target_m = obs.pose.position_m.z - cmd.target_camera_translation_m.z;
        let yaw_err_rad = shortest_ang_dist(0.0, obs.yaw_rad);

        let report = StatusReport {
            phase: self.phase,
            yaw_error_rad: yaw_err_rad,
            xy_error_m: [x_err_m, y_err_m],
            z_to_target_m,
        };

        let mut jog = [0.0; 6];
        let mut complete = false;

        // The gate is re-evaluated every tick, so yaw drifting back out of
        // tolerance during the approach re-engages pure rotation
        if yaw_err_rad.abs() > self.rot_tol(z_to_target_m) {
            self.phase = AlignPhase::RotationGate;
            jog[5] = -yaw_err_rad.signum() * self.params.rot_speed_rads;
        } else if !self.xy_within_tol(x_err_m, y_err_m, z_to_target_m) {
            self.phase = AlignPhase::Translating;
            let cap = self.speed_cap(z_to_target_m);
            jog[0] = self.p_speed(x_err_m, cap);
            jog[1] = self.p_speed(y_err_m, cap);
        } else if z_to_target_m.abs() > self.params.standoff_tol_m {
            self.phase = AlignPhase::FineApproach;
            jog[2] = self.p_speed(z_to_target_m, self.speed_cap(z_to_target_m));
        } else {
            info!(
                "Alignment on tag {} complete, residual ({:.2e}, {:.2e}, {:.2e}) m",
                cmd.tag_id, x_err_m, y_err_m, z_to_target_m
            );
            self.phase = AlignPhase::Reached;
            self.current_cmd = None;
            complete = true;
        }

        self.last_jog = jog;

        Ok((
            OutputData {
                jog_vector: jog,
                complete,
            },
            StatusReport {
                phase: self.phase,
                ..report
            },
        ))
    }
}

impl AlignCtrl {
    /// Begin executing a new alignment command.
    ///
    /// Always starts from a clean state, no residue of a previous operation
    /// survives.
    pub fn start(&mut self, cmd: AlignCmd) {
        info!(
            "Alignment started on tag {}, offset ({:.1}, {:.1}) mm",
            cmd.tag_id,
            cmd.offset_x_m * 1e3,
            cmd.offset_y_m * 1e3
        );

        self.current_cmd = Some(cmd);
        self.phase = AlignPhase::RotationGate;
        self.ticks = 0;
        self.ticks_without_data = 0;
        self.last_jog = [0.0; 6];
    }

    /// Abort the current command, zeroing the held jog.
    pub fn abort(&mut self) {
        if self.current_cmd.is_some() {
            warn!("Alignment aborted");
        }
        self.current_cmd = None;
        self.phase = AlignPhase::Idle;
        self.last_jog = [0.0; 6];
    }

    pub fn is_active(&self) -> bool {
        self.current_cmd.is_some()
    }

    pub fn phase(&self) -> AlignPhase {
        self.phase
    }

    pub fn current_cmd(&self) -> Option<AlignCmd> {
        self.current_cmd
    }

    /// Staleness window for pose observations, for the executive's vision
    /// polling.
    pub fn pose_staleness_ms(&self) -> i64 {
        self.params.pose_staleness_ms
    }

    fn fail(&mut self) {
        self.current_cmd = None;
        self.phase = AlignPhase::Failed;
        self.last_jog = [0.0; 6];
    }

    /// Yaw tolerance for the current height-to-target. Looser while far so
    /// the gate doesn't fight small detection noise at range.
    fn rot_tol(&self, z_to_target_m: f64) -> f64 {
        if z_to_target_m > self.params.rot_tol_boundary_m {
            self.params.rot_tol_far_rad
        } else {
            self.params.rot_tol_near_rad
        }
    }

    /// Index of the tier for the current height-to-target.
    fn tier(&self, z_to_target_m: f64) -> usize {
        for (i, boundary) in self.params.z_tier_boundaries_m.iter().enumerate() {
            if z_to_target_m > *boundary {
                return i;
            }
        }
        self.params.z_tier_boundaries_m.len()
    }

    fn xy_tol(&self, z_to_target_m: f64) -> f64 {
        self.params.xy_tol_tiers_m[self.tier(z_to_target_m)]
    }

    fn speed_cap(&self, z_to_target_m: f64) -> f64 {
        self.params.z_speed_tiers_ms[self.tier(z_to_target_m)]
    }

    fn xy_within_tol(&self, x_err_m: f64, y_err_m: f64, z_to_target_m: f64) -> bool {
        let tol = self.xy_tol(z_to_target_m);
        x_err_m.abs() <= tol && y_err_m.abs() <= tol
    }

    /// Proportional speed for an error, clamped between the fine tune speed
    /// and the tier cap, with a dead band so the controller settles rather
    /// than hunting around zero.
    fn p_speed(&self, err_m: f64, cap_ms: f64) -> f64 {
        if err_m.abs() < self.params.deadband_m {
            return 0.0;
        }

        let mag = (self.params.kp * err_m.abs())
            .clamp(self.params.fine_tune_speed_ms, cap_ms);

        -err_m.signum() * mag
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::spatial::Pose;
    use chrono::Utc;
    use nalgebra::{UnitQuaternion, Vector3};

    const DT_S: f64 = 0.02;

    fn obs(x: f64, y: f64, z: f64, yaw: f64) -> TagObservation {
        TagObservation {
            tag_id: 3,
            pose: Pose::new(Vector3::new(x, y, z), UnitQuaternion::identity()),
            yaw_rad: yaw,
            observed_at: Utc::now(),
        }
    }

    fn test_cmd() -> AlignCmd {
        AlignCmd {
            tag_id: 3,
            target_camera_translation_m: Vector3::new(0.0, 0.0, 0.005),
            offset_x_m: 0.0,
            offset_y_m: 0.0,
        }
    }

    fn test_ctrl() -> AlignCtrl {
        let mut ctrl = AlignCtrl::default();
        ctrl.params = Params::default();
        ctrl.start(test_cmd());
        ctrl
    }

    #[test]
    fn test_rotation_gate_suppresses_translation() {
        let mut ctrl = test_ctrl();

        // Yaw well outside even the far tolerance
        for _ in 0..50 {
            let input = InputData {
                observation: Some(obs(0.05, 0.02, 0.1, 1.0)),
            };
            let (out, rpt) = ctrl.proc(&input).unwrap();

            assert_eq!(rpt.phase, AlignPhase::RotationGate);
            assert_eq!(out.jog_vector[0], 0.0);
            assert_eq!(out.jog_vector[1], 0.0);
            assert_eq!(out.jog_vector[2], 0.0);
            assert!(out.jog_vector[5] < 0.0);
        }
    }

    #[test]
    fn test_gate_reengages_when_near() {
        let mut ctrl = test_ctrl();

        // 0.02 rad passes the far tolerance
        let (out, rpt) = ctrl
            .proc(&InputData {
                observation: Some(obs(0.05, 0.0, 0.1, 0.02)),
            })
            .unwrap();
        assert_ne!(rpt.phase, AlignPhase::RotationGate);
        assert!(out.jog_vector[0] != 0.0);

        // The same yaw fails the near tolerance once close
        let (out, rpt) = ctrl
            .proc(&InputData {
                observation: Some(obs(0.05, 0.0, 0.03, 0.02)),
            })
            .unwrap();
        assert_eq!(rpt.phase, AlignPhase::RotationGate);
        assert_eq!(out.jog_vector[0], 0.0);
    }

    #[test]
    fn test_tolerance_tightens_through_tiers() {
        let ctrl = test_ctrl();

        // Sample just above each boundary and below the last
        let heights = [0.06, 0.04, 0.02, 0.003];
        let mut last_tol = f64::INFINITY;

        for z in heights {
            let tol = ctrl.xy_tol(z);
            assert!(
                tol < last_tol,
                "tolerance did not tighten at z = {}",
                z
            );
            last_tol = tol;
        }

        assert_eq!(ctrl.xy_tol(0.06), 0.01);
        assert_eq!(ctrl.xy_tol(0.003), 0.0001);
    }

    #[test]
    fn test_no_data_grace_then_failure() {
        let mut ctrl = test_ctrl();

        // One good tick to establish a jog
        let (out, _) = ctrl
            .proc(&InputData {
                observation: Some(obs(0.02, 0.0, 0.1, 0.0)),
            })
            .unwrap();
        let held = out.jog_vector;
        assert!(held[0] != 0.0);

        // The last demand is held through the grace window
        for _ in 0..ctrl.params.no_data_grace_ticks {
            let (out, _) = ctrl.proc(&InputData { observation: None }).unwrap();
            assert_eq!(out.jog_vector, held);
        }

        // One more tick without data fails the operation
        match ctrl.proc(&InputData { observation: None }) {
            Err(AlignCtrlError::NoPoseData(_)) => (),
            other => panic!("expected NoPoseData, got {:?}", other.map(|_| ())),
        }

        assert_eq!(ctrl.phase(), AlignPhase::Failed);
        assert!(!ctrl.is_active());

        // Once failed the controller emits nothing but zeros
        let (out, _) = ctrl.proc(&InputData { observation: None }).unwrap();
        assert_eq!(out.jog_vector, [0.0; 6]);
    }

    #[test]
    fn test_budget_exhaustion_fails() {
        let mut ctrl = test_ctrl();
        ctrl.params.max_ticks = 10;

        for _ in 0..10 {
            ctrl.proc(&InputData {
                observation: Some(obs(0.05, 0.0, 0.1, 0.0)),
            })
            .unwrap();
        }

        assert!(matches!(
            ctrl.proc(&InputData {
                observation: Some(obs(0.05, 0.0, 0.1, 0.0))
            }),
            Err(AlignCtrlError::BudgetExhausted(10))
        ));
        assert!(!ctrl.is_active());
    }

    /// Simulates the tag drifting under the commanded jog and checks the
    /// controller walks through its phases to completion.
    #[test]
    fn test_end_to_end_alignment() {
        let mut ctrl = test_ctrl();

        let mut x = 0.02;
        let mut y = -0.01;
        let mut z = 0.08;
        let mut yaw = 0.02;

        let mut phases_seen = Vec::new();
        let mut z_speeds = Vec::new();
        let mut final_out = OutputData::default();

        for _ in 0..ctrl.params.max_ticks {
            let input = InputData {
                observation: Some(obs(x, y, z, yaw)),
            };
            let (out, rpt) = ctrl.proc(&input).unwrap();

            if phases_seen.last() != Some(&rpt.phase) {
                phases_seen.push(rpt.phase);
            }
            if out.jog_vector[2] != 0.0 {
                z_speeds.push(out.jog_vector[2].abs());
            }

            // Tag motion in the camera frame mirrors the tool jog
            x += out.jog_vector[0] * DT_S;
            y += out.jog_vector[1] * DT_S;
            z += out.jog_vector[2] * DT_S;
            yaw += out.jog_vector[5] * DT_S;

            if out.complete {
                final_out = out;
                break;
            }
        }

        assert!(final_out.complete, "alignment never completed");
        assert_eq!(final_out.jog_vector, [0.0; 6]);
        assert_eq!(ctrl.phase(), AlignPhase::Reached);

        // All phases are traversed, the gate engaging again near the target
        assert!(phases_seen.contains(&AlignPhase::RotationGate));
        assert!(phases_seen.contains(&AlignPhase::Translating));
        assert!(phases_seen.contains(&AlignPhase::FineApproach));
        assert_eq!(*phases_seen.last().unwrap(), AlignPhase::Reached);

        // Descent speed never increases as the target nears
        for pair in z_speeds.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }

        // Final height is inside the stand-off tolerance
        assert!((z - 0.005).abs() <= ctrl.params.standoff_tol_m);
    }
}
