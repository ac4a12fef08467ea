//! # Depth/force controller
//!
//! Force-guarded descent of the plunger, used both to seat a sample into the
//! socket and to press onto a sample before lifting it. The controller runs
//! as a cyclic module: a coarse constant-speed descent until contact force
//! appears, then, if the contact came up hard, a fine nudging phase which
//! settles the force inside a tolerance band.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

pub use params::Params;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during DepthCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum DepthCtrlError {
    #[error("Descent reached the maximum depth of {max_depth_m} m without contact")]
    MaxDepthExceeded { max_depth_m: f64 },

    #[error("Force did not stabilise within {0} ticks")]
    StabilizationTimeout(u32),

    #[error("Coarse descent did not make contact within {0} ticks")]
    DescentTimeout(u32),

    #[error("No force or pose data recieved for {0} ticks")]
    NoSensorData(u32),
}
