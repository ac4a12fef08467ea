//! # Station module
//!
//! The station is the taught geometry of the workspace: the sample tray, the
//! measurement socket, and the camera alignment target. All three are taught
//! by the operator and persisted to a JSON file so they survive restarts.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod tray;

pub use tray::TrayModel;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use log::info;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::spatial::Pose;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Persisted station geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Station {
    /// Approach pose of the measurement socket
    pub socket_pose: Pose,

    /// The sample tray model
    pub tray: TrayModel,

    /// The taught camera-to-tag translation at which alignment is complete,
    /// in meters in the camera frame
    pub target_camera_translation_m: Vector3<f64>,

    /// Path the station was loaded from, used for saves. Not persisted.
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by station geometry operations.
#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error(
        "Cell ({row}, {col}) is outside the {rows}x{cols} tray grid"
    )]
    CellOutOfRange {
        row: u32,
        col: u32,
        rows: u32,
        cols: u32,
    },

    #[error("Cannot access the station file: {0}")]
    FileError(std::io::Error),

    #[error("The station file is malformed: {0}")]
    FormatError(serde_json::Error),

    #[error("The station has no file path to save to")]
    NoFilePath,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Station {
    /// Load the station from the given JSON file.
    pub fn load(path: &Path) -> Result<Self, StationError> {
        let raw = std::fs::read_to_string(path).map_err(StationError::FileError)?;

        let mut station: Station =
            serde_json::from_str(&raw).map_err(StationError::FormatError)?;
        station.file_path = Some(path.to_path_buf());

        info!("Station geometry loaded from {:?}", path);

        Ok(station)
    }

    /// Load the station, falling back to defaults if the file doesn't exist.
    ///
    /// A missing file is normal on a fresh install, the operator teaches the
    /// geometry and the first save creates it.
    pub fn load_or_default(path: &Path) -> Result<Self, StationError> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(
                "No station file at {:?}, starting with untaught geometry",
                path
            );
            Ok(Self {
                file_path: Some(path.to_path_buf()),
                ..Self::default()
            })
        }
    }

    /// Save the station back to the file it was loaded from.
    pub fn save(&self) -> Result<(), StationError> {
        let path = self.file_path.as_ref().ok_or(StationError::NoFilePath)?;

        let raw = serde_json::to_string_pretty(self).map_err(StationError::FormatError)?;
        std::fs::write(path, raw).map_err(StationError::FileError)?;

        info!("Station geometry saved to {:?}", path);

        Ok(())
    }

    /// Record the given pose as the socket approach pose and persist.
    pub fn teach_socket(&mut self, pose: Pose) -> Result<(), StationError> {
        self.socket_pose = pose;
        self.save()
    }

    /// Record the given pose as the tray anchor and persist.
    pub fn teach_tray(&mut self, pose: Pose) -> Result<(), StationError> {
        self.tray.set_anchor(pose);
        self.save()
    }

    /// Record the given camera-to-tag translation as the alignment target and
    /// persist.
    pub fn teach_target(&mut self, translation_m: Vector3<f64>) -> Result<(), StationError> {
        self.target_camera_translation_m = translation_m;
        self.save()
    }

    /// True once an alignment target has been taught.
    ///
    /// An untaught target sits at the camera origin, which is never a
    /// physical standoff.
    pub fn target_taught(&self) -> bool {
        self.target_camera_translation_m != Vector3::zeros()
    }
}

impl Default for Station {
    fn default() -> Self {
        Self {
            socket_pose: Pose::default(),
            tray: TrayModel::default(),
            target_camera_translation_m: Vector3::zeros(),
            file_path: None,
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

    #[test]
    fn test_station_round_trip() {
        let station = Station {
            socket_pose: Pose::new(
                Vector3::new(0.55, 0.02, 0.31),
                UnitQuaternion::from_euler_angles(0.0, 0.0, -1.1),
            ),
            tray: TrayModel {
                anchor_pose: Pose::new(
                    Vector3::new(0.4, -0.1, 0.2),
                    UnitQuaternion::from_euler_angles(0.01, 0.0, 0.5),
                ),
                ..Default::default()
            },
            target_camera_translation_m: Vector3::new(0.001, -0.0005, 0.045),
            file_path: None,
        };

        let json = serde_json::to_string(&station).unwrap();
        let back: Station = serde_json::from_str(&json).unwrap();

        assert_eq!(station, back);

        // Cell poses must be reproduced exactly by the round-tripped model
        for row in 0..station.tray.rows {
            for col in 0..station.tray.cols {
                let a = station.tray.cell_approach_pose(row, col).unwrap();
                let b = back.tray.cell_approach_pose(row, col).unwrap();
                assert!((a.position_m - b.position_m).norm() < 1e-12);
            }
        }
    }
}
