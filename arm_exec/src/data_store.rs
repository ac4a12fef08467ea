//! # Data Store

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::eqpt::{arm::ArmStatus, plunger::PlungerDems};
use log::warn;

use crate::{
    align_ctrl,
    depth_ctrl,
    safety::SafetySupervisor,
    spatial::Pose,
    station::Station,
};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// The motion-issuing operation currently owning the arm.
///
/// The arm is a single shared resource, so at most one of these may be active
/// at a time. Telecommands which would start a second one are rejected with
/// `CannotExecute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveOp {
    None,
    Align,
    Press,
    Grip,
    Release,
}

/// A one-shot linear move requested by a telecommand, executed by the main
/// loop.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub waypoints: Vec<Pose>,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    // Arm state, refreshed every cycle
    pub tcp_pose: Option<Pose>,
    pub arm_status: Option<ArmStatus>,

    // Station geometry
    pub station: Station,

    /// Last tray cell commanded, for the retract move
    pub last_cell: Option<(u32, u32)>,

    // Mutual exclusion over the arm
    pub active_op: ActiveOp,

    // AlignCtrl
    pub align_ctrl: align_ctrl::AlignCtrl,
    pub align_ctrl_input: align_ctrl::InputData,
    pub align_ctrl_output: align_ctrl::OutputData,
    pub align_ctrl_status_rpt: align_ctrl::StatusReport,

    // DepthCtrl
    pub depth_ctrl: depth_ctrl::DepthCtrl,
    pub depth_ctrl_input: depth_ctrl::InputData,
    pub depth_ctrl_output: depth_ctrl::OutputData,
    pub depth_ctrl_status_rpt: depth_ctrl::StatusReport,

    // Safety
    pub safety: SafetySupervisor,

    // Grip and release verification
    pub grip_verifier: crate::sequence::GripVerifier,
    pub release_verifier: crate::sequence::ReleaseVerifier,

    /// Last press command, replayed when a grip has to re-seat
    pub last_press_cmd: Option<depth_ctrl::DepthCmd>,

    /// Freshest tag observation this cycle, used by alignment and teaching
    pub latest_tag_obs: Option<crate::vision_client::TagObservation>,

    // One-shot requests raised by telecommands for the main loop
    pub move_request: Option<MoveRequest>,
    pub plunger_dems_queue: Vec<PlungerDems>,
    pub pause_request: Option<bool>,
    pub mode_request: Option<comms_if::eqpt::arm::ArmMode>,
    pub reset_request: bool,

    // Monitoring counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,

    /// Number of consecutive arm client errors
    pub num_consec_arm_errors: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for ActiveOp {
    fn default() -> Self {
        ActiveOp::None
    }
}

impl DataStore {
    /// Try to claim the arm for the given operation.
    ///
    /// Returns false if another operation already owns it.
    pub fn claim_arm(&mut self, op: ActiveOp) -> bool {
        if self.active_op != ActiveOp::None {
            warn!(
                "{:?} requested while {:?} owns the arm, rejected",
                op, self.active_op
            );
            return false;
        }

        self.active_op = op;
        true
    }

    /// Release the arm. Every controller exit path must end up here.
    pub fn release_arm(&mut self) {
        self.active_op = ActiveOp::None;
    }

    /// Abort whatever operation owns the arm, zeroing controller state.
    pub fn abort_active_op(&mut self) {
        match self.active_op {
            ActiveOp::Align => self.align_ctrl.abort(),
            ActiveOp::Press => self.depth_ctrl.abort(),
            // Re-seating may have a press in flight under a grip
            ActiveOp::Grip | ActiveOp::Release => self.depth_ctrl.abort(),
            ActiveOp::None => (),
        }
        self.release_arm();
    }

    /// Perform actions required at the start of a cycle.
    ///
    /// Clears those items that need clearing at the start of a cycle, and
    /// sets the 1Hz cycle flag.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        self.is_1_hz_cycle = self.num_cycles % (cycle_frequency_hz as u128) == 0;

        self.align_ctrl_input = align_ctrl::InputData::default();
        self.align_ctrl_output = align_ctrl::OutputData::default();
        self.align_ctrl_status_rpt = align_ctrl::StatusReport::default();

        self.depth_ctrl_input = depth_ctrl::InputData::default();
        self.depth_ctrl_output = depth_ctrl::OutputData::default();
        self.depth_ctrl_status_rpt = depth_ctrl::StatusReport::default();
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_arm_claim_is_exclusive() {
        let mut ds = DataStore::default();

        assert!(ds.claim_arm(ActiveOp::Align));
        assert!(!ds.claim_arm(ActiveOp::Press));

        ds.release_arm();
        assert!(ds.claim_arm(ActiveOp::Press));
    }
}
