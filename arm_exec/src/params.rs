//! Parameters structure for the arm executable

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Top level parameters for the arm executable.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmExecParams {
    /// The tag the alignment controller servos over
    pub target_tag_id: u32,

    /// Height above a taught pose at which approach moves stop.
    ///
    /// Units: meters
    pub approach_height_m: f64,

    /// Default withdraw distance for retract moves.
    ///
    /// Units: meters
    pub retract_distance_m: f64,

    /// Speed for linear approach and retract moves.
    ///
    /// Units: meters/second
    pub move_speed_ms: f64,

    /// Path of the station geometry file, relative to the software root
    pub station_file: String,
}
