//! Tray grid geometry

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::spatial::Pose;

use super::StationError;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Geometric model of the sample tray.
///
/// The tray is a `rows x cols` grid of cells derived from a single taught
/// anchor pose, the pose of cell `(0, 0)`. Cell offsets are expressed in the
/// anchor's own frame so the model is valid however the tray sits in the
/// workspace.
///
/// The taught pose is the arm approach pose. Each cell's tag is mounted
/// rotated by `yaw_bias_rad` relative to the approach orientation, so the
/// pose the camera expects to see is the approach pose rotated by the bias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrayModel {
    /// Approach pose of cell (0, 0)
    pub anchor_pose: Pose,

    /// Spacing between rows along the tray Y axis in meters
    pub row_pitch_m: f64,

    /// Spacing between columns along the tray X axis in meters
    pub col_pitch_m: f64,

    /// Number of rows in the grid
    pub rows: u32,

    /// Number of columns in the grid
    pub cols: u32,

    /// Rotation of the tag mount relative to the approach orientation in
    /// radians
    pub yaw_bias_rad: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrayModel {
    /// Approach pose of the given cell, the pose the arm must reach.
    ///
    /// Fails with `CellOutOfRange` if the indices fall outside the grid.
    pub fn cell_approach_pose(&self, row: u32, col: u32) -> Result<Pose, StationError> {
        if row >= self.rows || col >= self.cols {
            return Err(StationError::CellOutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }

        let local_offset_m = Vector3::new(
            self.col_pitch_m * col as f64,
            self.row_pitch_m * row as f64,
            0.0,
        );

        // Rotate the grid offset into the frame the anchor is expressed in
        let offset_m = self.anchor_pose.attitude_q * local_offset_m;

        Ok(Pose::new(
            self.anchor_pose.position_m + offset_m,
            self.anchor_pose.attitude_q,
        ))
    }

    /// Tag-presentation pose of the given cell, the pose the camera sees.
    pub fn cell_visual_pose(&self, row: u32, col: u32) -> Result<Pose, StationError> {
        Ok(self
            .cell_approach_pose(row, col)?
            .rotated_about_z(self.yaw_bias_rad))
    }

    /// Re-teach the tray by setting the given pose as cell (0, 0).
    pub fn set_anchor(&mut self, pose: Pose) {
        self.anchor_pose = pose;
    }
}

impl Default for TrayModel {
    fn default() -> Self {
        Self {
            anchor_pose: Pose::default(),
            row_pitch_m: 0.014605,
            col_pitch_m: -0.016,
            rows: 3,
            cols: 3,
            yaw_bias_rad: 24.0_f64.to_radians(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::UnitQuaternion;

    fn test_tray() -> TrayModel {
        TrayModel {
            anchor_pose: Pose::new(
                Vector3::new(0.4, -0.1, 0.2),
                UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_anchor_cell_is_anchor_pose() {
        let tray = test_tray();
        let cell = tray.cell_approach_pose(0, 0).unwrap();
        assert!((cell.position_m - tray.anchor_pose.position_m).norm() < 1e-12);
    }

    #[test]
    fn test_cell_offsets_follow_anchor_frame() {
        let tray = test_tray();
        let cell = tray.cell_approach_pose(2, 1).unwrap();

        let expected_local = Vector3::new(tray.col_pitch_m, tray.row_pitch_m * 2.0, 0.0);
        let expected = tray.anchor_pose.position_m + tray.anchor_pose.attitude_q * expected_local;

        assert!((cell.position_m - expected).norm() < 1e-12);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let tray = test_tray();
        assert!(matches!(
            tray.cell_approach_pose(3, 0),
            Err(StationError::CellOutOfRange { .. })
        ));
        assert!(matches!(
            tray.cell_approach_pose(0, 3),
            Err(StationError::CellOutOfRange { .. })
        ));
    }

    #[test]
    fn test_visual_pose_is_yaw_biased() {
        let tray = test_tray();
        let approach = tray.cell_approach_pose(1, 1).unwrap();
        let visual = tray.cell_visual_pose(1, 1).unwrap();

        assert!((visual.position_m - approach.position_m).norm() < 1e-12);
        assert!(
            (approach.attitude_q.angle_to(&visual.attitude_q) - tray.yaw_bias_rad).abs() < 1e-9
        );
    }
}
