//! Parameters structure for DepthCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the depth/force controller.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Maximum descent from the start pose before the operation aborts.
    ///
    /// Units: meters
    pub max_depth_m: f64,

    /// Constant descent speed during the coarse phase.
    ///
    /// Units: meters/second
    pub descent_speed_ms: f64,

    /// Force above which the coarse phase hands over to fine adjustment
    /// instead of declaring success directly.
    ///
    /// Units: load cell counts
    pub high_force_cutover: f64,

    /// Nudge speed during fine adjustment.
    ///
    /// Units: meters/second
    pub nudge_speed_ms: f64,

    /// Consecutive in-band force readings required to declare the press
    /// settled.
    pub required_stable_readings: u32,

    /// Tick budget for the coarse descent phase.
    pub coarse_max_ticks: u32,

    /// Tick budget for the fine adjustment phase.
    pub fine_max_ticks: u32,

    /// Ticks the controller will hold position without force or pose data
    /// before the press is failed.
    pub no_data_grace_ticks: u32,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            max_depth_m: 0.010,
            descent_speed_ms: 0.001,
            high_force_cutover: 3000.0,
            nudge_speed_ms: 0.0002,
            required_stable_readings: 10,
            coarse_max_ticks: 1000,
            fine_max_ticks: 1000,
            no_data_grace_ticks: 25,
        }
    }
}
