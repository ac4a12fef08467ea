//! Parameters structure for AlignCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the alignment controller.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    // ---- ROTATION GATE ----

    /// Yaw tolerance while far from the target.
    ///
    /// Units: radians
    pub rot_tol_far_rad: f64,

    /// Yaw tolerance once below `rot_tol_boundary_m` height-to-target.
    ///
    /// Units: radians
    pub rot_tol_near_rad: f64,

    /// Height-to-target below which the near yaw tolerance applies.
    ///
    /// Units: meters
    pub rot_tol_boundary_m: f64,

    /// Yaw correction rate while in the rotation gate.
    ///
    /// Units: radians/second
    pub rot_speed_rads: f64,

    // ---- TRANSLATION ----

    /// Proportional gain mapping position error to speed.
    ///
    /// Units: 1/second
    pub kp: f64,

    /// Upper clamp on translation speed.
    ///
    /// Units: meters/second
    pub normal_speed_ms: f64,

    /// Lower clamp on translation speed, the slowest correction worth
    /// commanding.
    ///
    /// Units: meters/second
    pub fine_tune_speed_ms: f64,

    /// Position errors below this are treated as zero.
    ///
    /// Units: meters
    pub deadband_m: f64,

    /// Height-to-target boundaries separating the tolerance and speed tiers,
    /// in descending order.
    ///
    /// Units: meters
    pub z_tier_boundaries_m: [f64; 3],

    /// Allowed XY error per tier, one more entry than boundaries. Tier `i`
    /// applies above boundary `i`, the last tier below the last boundary.
    ///
    /// Units: meters
    pub xy_tol_tiers_m: [f64; 4],

    /// Descent speed per tier.
    ///
    /// Units: meters/second
    pub z_speed_tiers_ms: [f64; 4],

    // ---- TERMINATION ----

    /// Height-to-target error below which the alignment is complete.
    ///
    /// Units: meters
    pub standoff_tol_m: f64,

    /// Ticks the last jog is held after pose data stops arriving. Once
    /// exceeded the operation fails with motion zeroed.
    pub no_data_grace_ticks: u32,

    /// Total tick budget for one alignment operation.
    pub max_ticks: u32,

    /// Staleness window for pose observations.
    ///
    /// Units: milliseconds
    pub pose_staleness_ms: i64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            rot_tol_far_rad: 0.5,
            rot_tol_near_rad: 0.01,
            rot_tol_boundary_m: 0.05,
            rot_speed_rads: 0.05,
            kp: 0.5,
            normal_speed_ms: 0.01,
            fine_tune_speed_ms: 0.0002,
            deadband_m: 0.0001,
            z_tier_boundaries_m: [0.05, 0.03, 0.005],
            xy_tol_tiers_m: [0.01, 0.001, 0.0005, 0.0001],
            z_speed_tiers_ms: [0.01, 0.005, 0.001, 0.0003],
            standoff_tol_m: 0.0005,
            no_data_grace_ticks: 100,
            max_ticks: 6000,
            pose_staleness_ms: 300,
        }
    }
}
