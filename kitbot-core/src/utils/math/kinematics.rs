//! Arcade kinematics for a four-wheel differential drive base.
//!
//! `ArcadeKinematics` combines a forward and a rotate axis additively per
//! side. Both wheels on a side are mechanically coupled, so they always
//! receive the same magnitude.
//!
//! # Example
//! ```rust
//! use kitbot_core::utils::math::kinematics::{ArcadeKinematics, DriveVector};
//! let kin = ArcadeKinematics::new();
//! let wheels = kin.compute_wheel_outputs(DriveVector::new(0.6, 0.3));
//! assert!((wheels.front_left - 0.9).abs() < 1e-6);
//! ```
use serde::{Deserialize, Serialize};

/// Clamp into `[-1, 1]`. NaN collapses to zero.
pub(crate) fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-1.0, 1.0)
    }
}

/// Intended base motion for a single control cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveVector {
    /// Translation, positive is forward.
    pub forward: f32,
    /// Rotation, positive is clockwise seen from above.
    pub rotate: f32,
}

impl DriveVector {
    pub const STOP: Self = Self {
        forward: 0.0,
        rotate: 0.0,
    };

    /// Build a vector with both axes clamped into `[-1, 1]`.
    pub fn new(
        forward: f32,
        rotate: f32,
    ) -> Self {
        Self {
            forward: clamp_unit(forward),
            rotate: clamp_unit(rotate),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.forward == 0.0 && self.rotate == 0.0
    }
}

/// Per-wheel actuation magnitudes in `[-1, 1]`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelOutputs {
    pub front_left: f32,
    pub front_right: f32,
    pub back_left: f32,
    pub back_right: f32,
}

impl WheelOutputs {
    pub const STOP: Self = Self {
        front_left: 0.0,
        front_right: 0.0,
        back_left: 0.0,
        back_right: 0.0,
    };

    fn from_sides(
        left: f32,
        right: f32,
    ) -> Self {
        Self {
            front_left: left,
            front_right: right,
            back_left: left,
            back_right: right,
        }
    }

    pub fn left(&self) -> f32 {
        self.front_left
    }

    pub fn right(&self) -> f32 {
        self.front_right
    }

    /// Wheel magnitudes ordered front-left, front-right, back-left, back-right.
    pub fn as_array(&self) -> [f32; 4] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }
}

/// Arcade mapping from a `DriveVector` to four wheel outputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArcadeKinematics;

impl ArcadeKinematics {
    pub fn new() -> Self {
        Self
    }

    /// Compute wheel outputs for the desired motion.
    ///
    /// Left side is `forward + rotate`, right side is `forward - rotate`, each
    /// clamped independently so a saturated side does not rescale the other.
    pub fn compute_wheel_outputs(
        &self,
        vector: DriveVector,
    ) -> WheelOutputs {
        let forward = clamp_unit(vector.forward);
        let rotate = clamp_unit(vector.rotate);
        WheelOutputs::from_sides(clamp_unit(forward + rotate), clamp_unit(forward - rotate))
    }

    /// Recover the drive vector that produced the given side outputs.
    ///
    /// Exact only while neither side saturated.
    pub fn compute_drive_vector(
        &self,
        outputs: WheelOutputs,
    ) -> DriveVector {
        let (l, r) = (outputs.left(), outputs.right());
        DriveVector::new((l + r) / 2.0, (l - r) / 2.0)
    }
}
