//! # Spatial maths module
//!
//! Pose and transform types used to chain the arm TCP, camera, tag and
//! user-offset frames. All types are plain values, no frame bookkeeping is
//! done at runtime so the frame each pose is expressed in is documented at
//! each use site.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::arm::PoseWire;
use nalgebra::{
    Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// A position and attitude pair.
///
/// The attitude quaternion rotates vectors from the pose's local frame into
/// the frame the pose is expressed in. Construction from wire data
/// renormalises the quaternion so downstream maths can assume unit norm.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    /// Position in meters
    pub position_m: Vector3<f64>,

    /// Attitude as a unit quaternion
    pub attitude_q: UnitQuaternion<f64>,
}

/// A rigid transform between two frames.
///
/// Thin wrapper over [`nalgebra::Isometry3`] which keeps the operations the
/// controllers actually use in one place.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform(pub Isometry3<f64>);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Pose {
    fn default() -> Self {
        Self {
            position_m: Vector3::zeros(),
            attitude_q: UnitQuaternion::identity(),
        }
    }
}

impl Pose {
    pub fn new(position_m: Vector3<f64>, attitude_q: UnitQuaternion<f64>) -> Self {
        Self {
            position_m,
            attitude_q,
        }
    }

    /// Build a pose from wire data, renormalising the quaternion.
    pub fn from_wire(wire: &PoseWire) -> Self {
        let q = Quaternion::new(
            wire.orientation_q[3],
            wire.orientation_q[0],
            wire.orientation_q[1],
            wire.orientation_q[2],
        );

        Self {
            position_m: Vector3::from(wire.position_m),
            attitude_q: UnitQuaternion::from_quaternion(q),
        }
    }

    /// Convert to the wire representation, `[x, y, z, w]` component order.
    pub fn to_wire(&self) -> PoseWire {
        let q = self.attitude_q.quaternion();
        PoseWire {
            position_m: self.position_m.into(),
            orientation_q: [q.i, q.j, q.k, q.w],
        }
    }

    /// Convert this pose to the transform from its local frame to the frame
    /// it's expressed in.
    pub fn to_transform(&self) -> Transform {
        Transform(Isometry3::from_parts(
            Translation3::from(self.position_m),
            self.attitude_q,
        ))
    }

    /// Return the attitude as XYZ euler angles (roll, pitch, yaw) in radians.
    pub fn to_euler(&self) -> (f64, f64, f64) {
        self.attitude_q.euler_angles()
    }

    /// Return the yaw (rotation about Z) of this pose in radians.
    pub fn get_yaw(&self) -> f64 {
        self.to_euler().2
    }

    /// Return a copy of this pose rotated about its local Z axis by the given
    /// angle in radians.
    pub fn rotated_about_z(&self, angle_rad: f64) -> Self {
        Self {
            position_m: self.position_m,
            attitude_q: self.attitude_q * UnitQuaternion::from_euler_angles(0.0, 0.0, angle_rad),
        }
    }
}

impl Transform {
    pub fn identity() -> Self {
        Transform(Isometry3::identity())
    }

    /// Chain this transform with another, `self` applied second.
    pub fn compose(&self, other: &Transform) -> Transform {
        Transform(self.0 * other.0)
    }

    pub fn inverse(&self) -> Transform {
        Transform(self.0.inverse())
    }

    /// The motion needed in the `current` frame to reach the `desired` frame.
    pub fn delta(current: &Transform, desired: &Transform) -> Transform {
        current.inverse().compose(desired)
    }

    /// Transform a point expressed in this transform's source frame.
    pub fn transform_point(&self, point_m: &Vector3<f64>) -> Vector3<f64> {
        self.0
            .transform_point(&nalgebra::Point3::from(*point_m))
            .coords
    }

    /// Split into translation and rotation parts.
    pub fn decompose(&self) -> (Vector3<f64>, UnitQuaternion<f64>) {
        (self.0.translation.vector, self.0.rotation)
    }

    pub fn to_pose(&self) -> Pose {
        Pose {
            position_m: self.0.translation.vector,
            attitude_q: self.0.rotation,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_pose() -> Pose {
        Pose::new(
            Vector3::new(0.31, -0.12, 0.45),
            UnitQuaternion::from_euler_angles(0.1, -0.4, 1.2),
        )
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let poses = [
            test_pose(),
            Pose::new(
                Vector3::new(-1.0, 2.5, 0.001),
                UnitQuaternion::from_euler_angles(-3.0, 0.7, 2.9),
            ),
            Pose::default(),
        ];

        for pose in &poses {
            let t = pose.to_transform();
            let ident = t.compose(&t.inverse());
            let (trans, rot) = ident.decompose();

            assert!(trans.norm() < 1e-6);
            assert!(rot.angle() < 1e-6);
        }
    }

    #[test]
    fn test_delta_recovers_target() {
        let current = test_pose().to_transform();
        let desired = Pose::new(
            Vector3::new(0.2, 0.0, 0.6),
            UnitQuaternion::from_euler_angles(0.0, 0.0, -0.3),
        )
        .to_transform();

        let delta = Transform::delta(&current, &desired);
        let recovered = current.compose(&delta);

        let (dt, dr) = Transform::delta(&recovered, &desired).decompose();
        assert!(dt.norm() < 1e-9);
        assert!(dr.angle() < 1e-9);
    }

    #[test]
    fn test_wire_round_trip() {
        let pose = test_pose();
        let back = Pose::from_wire(&pose.to_wire());

        assert!((pose.position_m - back.position_m).norm() < 1e-12);
        assert!(pose.attitude_q.angle_to(&back.attitude_q) < 1e-12);
    }

    #[test]
    fn test_wire_quaternion_renormalised() {
        let wire = PoseWire {
            position_m: [0.0; 3],
            orientation_q: [0.0, 0.0, 0.0, 2.0],
        };

        let pose = Pose::from_wire(&wire);
        assert!((pose.attitude_q.norm() - 1.0).abs() < 1e-12);
    }
}
