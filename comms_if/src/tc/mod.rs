//! # Telecommand module
//!
//! Telecommands are instructions sent to the handler by an operator console.
//! The enum derives both serde, for the JSON wire format, and StructOpt, so
//! the console client can parse the same commands from a terminal line.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use thiserror::Error;

use crate::eqpt::arm::ArmMode;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A telecommand that can be executed by the handler.
#[derive(Debug, Clone, Serialize, Deserialize, StructOpt)]
pub enum Tc {
    /// Visually servo the plunger tip over the alignment tag, with an optional
    /// lateral offset from the tag centre.
    #[structopt(name = "align")]
    AlignToTag {
        /// Offset from the tag centre along camera X in millimeters
        #[structopt(default_value = "0.0")]
        offset_x_mm: f64,

        /// Offset from the tag centre along camera Y in millimeters
        #[structopt(default_value = "0.0")]
        offset_y_mm: f64,
    },

    /// Move the plunger over a tray cell at the approach height.
    #[structopt(name = "cell")]
    MoveToCell { row: u32, col: u32 },

    /// Move to the retract pose above the last commanded tray cell.
    #[structopt(name = "cell_retract")]
    MoveToCellRetract,

    /// Move the plunger over the socket at the approach height.
    #[structopt(name = "socket")]
    MoveToSocket,

    /// Move to the retract pose above the socket.
    #[structopt(name = "socket_retract")]
    MoveToSocketRetract,

    /// Descend until the contact force reaches the given pressure, within
    /// the depth limit.
    #[structopt(name = "press")]
    MoveUntilPressure {
        /// Target contact force in load cell counts
        pressure: f64,

        /// Acceptable band around the target before the press is considered
        /// settled, in load cell counts
        #[structopt(default_value = "200.0")]
        wiggle_room: f64,
    },

    /// Withdraw vertically by the given distance.
    #[structopt(name = "retract")]
    Retract {
        /// Withdraw distance in meters, positive up
        distance_m: f64,
    },

    /// Switch the vacuum pump on and verify the sample is held, re-seating
    /// if not.
    #[structopt(name = "grip")]
    GripSample,

    /// Switch the vacuum pump off and verify the sample released.
    #[structopt(name = "release")]
    ReleaseSample,

    /// Record the current TCP pose as the tray origin.
    #[structopt(name = "teach_tray")]
    TeachTray,

    /// Record the current TCP pose as the socket pose.
    #[structopt(name = "teach_socket")]
    TeachSocket,

    /// Record the current camera-to-tag offset as the alignment target.
    #[structopt(name = "teach_target")]
    TeachTarget,

    /// Pause or unpause arm motion.
    #[structopt(name = "pause")]
    SetPause {
        #[structopt(parse(try_from_str))]
        paused: bool,
    },

    /// Switch the arm operating mode.
    #[structopt(name = "mode")]
    SetMode { mode: ArmMode },

    /// Set the vacuum pump power.
    #[structopt(name = "pump")]
    TogglePump {
        /// Pump power, 0 to 100 percent
        power: u8,
    },

    /// Zero the plunger load cell.
    #[structopt(name = "tare")]
    Tare,

    /// Set the ring light colour from hue/saturation/lightness.
    #[structopt(name = "leds")]
    SetLeds {
        hue: f64,
        saturation: f64,
        lightness: f64,
    },

    /// Set the ring light brightness.
    #[structopt(name = "brightness")]
    SetBrightness { level: u8 },

    /// Set the heater block temperature setpoint.
    #[structopt(name = "heater")]
    SetHeater { temp_degc: f64 },

    /// Zero all motion, power the arm off and abort any active operation.
    #[structopt(name = "stop")]
    EmergencyStop,

    /// Clear a latched collision flag on the arm.
    #[structopt(name = "reset_collision")]
    ResetCollision,
}

/// Response to a telecommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TcResponse {
    /// The TC was accepted and will be executed
    Ok,

    /// The TC is valid but cannot be executed right now, for example because
    /// another motion operation is active
    CannotExecute(String),

    /// The TC could not be parsed or failed during setup
    Error(String),
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Tc {
    /// Parse a new TC from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)
    }

    /// Serialise this TC to a JSON packet
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tc_json_round_trip() {
        let tc = Tc::MoveToCell { row: 2, col: 1 };
        let json = tc.to_json().unwrap();
        match Tc::from_json(&json).unwrap() {
            Tc::MoveToCell { row, col } => {
                assert_eq!(row, 2);
                assert_eq!(col, 1);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_tc_invalid_json() {
        assert!(matches!(
            Tc::from_json("{not json"),
            Err(TcParseError::InvalidJson(_))
        ));
    }
}
