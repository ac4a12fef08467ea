//! # Arm actuator service commands
//!
//! The arm server exposes the robot's Cartesian move, jog, mode, pause and
//! power primitives over a REQ/REP channel. Jog demands are perishable on the
//! robot side: they expire after a few tens of milliseconds unless refreshed,
//! which is why `JogRefresh` exists as its own demand.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A pose on the wire: TCP position in meters plus orientation as a
/// quaternion in `[x, y, z, w]` component order.
///
/// This is a plain record, not a maths type. It is validated and converted
/// into proper spatial types at the service boundary.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PoseWire {
    pub position_m: [f64; 3],
    pub orientation_q: [f64; 4],
}

/// Status data returned by the arm server.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct ArmStatus {
    /// Current operating mode
    pub mode: ArmMode,

    /// True if motion is currently paused
    pub paused: bool,

    /// True if the robot controller has flagged a collision
    pub collided: bool,

    /// True if the arm is powered
    pub powered: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Robot operating modes
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArmMode {
    Teach,
    SemiAutomatic,
    Automatic,
}

/// Demands sent from the ArmClient to the arm server
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ArmDems {
    /// Move the TCP in a straight line through the given waypoints.
    MoveLinear {
        waypoints: Vec<PoseWire>,

        /// Translation speed limit for the move in meters/second
        speed_ms: f64,

        /// Acceleration limit for the move in meters/second^2
        accel_ms2: f64,
    },

    /// Begin a Cartesian jog with the given velocity vector
    /// `[vx, vy, vz, wx, wy, wz]` (meters/second, radians/second).
    JogStart { velocity: [f64; 6] },

    /// Refresh the last jog demand. The robot treats jogs as perishable and
    /// will stop unless a refresh arrives within its expiry window.
    JogRefresh,

    /// Stop jogging and zero all axes.
    JogStop,

    /// Switch the robot operating mode.
    SetMode(ArmMode),

    /// Pause motion, holding position.
    Pause,

    /// Resume from a pause.
    Unpause,

    /// Power the arm on or off. Powering off drops any active motion.
    Power { on: bool },

    /// Request the current TCP pose.
    GetTcpPose,

    /// Request the current arm status.
    GetStatus,

    /// Clear a latched collision flag on the robot controller.
    ResetCollision,
}

/// Response from the arm server based on the demands sent by the client.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ArmResponse {
    /// Demands were valid and will be executed
    DemsOk,

    /// The current TCP pose
    TcpPose(PoseWire),

    /// The joint angles resulting from a linear move, in radians
    JointAngles(Vec<f64>),

    /// The current arm status
    Status(ArmStatus),

    /// Demands were invalid and have been rejected
    DemsInvalid(String),

    /// The robot controller reported an error (IK failure, mode switch
    /// refused, etc.)
    EqptError(String),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl FromStr for ArmMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "teach" => Ok(ArmMode::Teach),
            "semiautomatic" => Ok(ArmMode::SemiAutomatic),
            "automatic" => Ok(ArmMode::Automatic),
            _ => Err(format!("{} is not a recognised arm mode", s)),
        }
    }
}

impl PoseWire {
    /// A zeroed pose with identity orientation.
    pub fn identity() -> Self {
        Self {
            position_m: [0.0; 3],
            orientation_q: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_arm_mode_from_str() {
        assert_eq!(ArmMode::from_str("teach").unwrap(), ArmMode::Teach);
        assert_eq!(
            ArmMode::from_str("SemiAutomatic").unwrap(),
            ArmMode::SemiAutomatic
        );
        assert!(ArmMode::from_str("freedrive").is_err());
    }

    #[test]
    fn test_dems_round_trip() {
        let dems = ArmDems::JogStart {
            velocity: [0.0, 0.0, -0.001, 0.0, 0.0, 0.0],
        };
        let json = serde_json::to_string(&dems).unwrap();
        let back: ArmDems = serde_json::from_str(&json).unwrap();
        match back {
            ArmDems::JogStart { velocity } => assert_eq!(velocity[2], -0.001),
            _ => panic!("wrong variant"),
        }
    }
}
