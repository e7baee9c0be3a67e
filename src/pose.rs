// pose.rs — 相机姿态、朝向模式与视场角

use crate::config::{DEFAULT_FOV, MAX_FOV, MIN_FOV};
use glam::{EulerRot, Quat};

/// Pitch never reaches the poles; past ±85° the yaw axis degenerates.
pub const PITCH_LIMIT: f32 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationMode {
    Manual,
    SensorFusion,
}

/// Camera-facing direction in degrees.
///
/// Positive yaw turns left (counter-clockwise seen from above), positive pitch
/// looks up, roll is only ever non-zero while sensor fusion drives the pose.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraPose {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl CameraPose {
    pub const FORWARD: CameraPose = CameraPose { yaw: 0.0, pitch: 0.0, roll: 0.0 };

    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        let mut pose = Self { yaw, pitch, roll };
        pose.normalize();
        pose
    }

    /// Wrap yaw into [-180, 180) and clamp pitch.
    pub fn normalize(&mut self) {
        self.yaw = wrap_degrees(self.yaw);
        self.roll = wrap_degrees(self.roll);
        self.pitch = self.pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// YXZ composition: yaw outermost, then pitch, then roll.
    pub fn to_quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.yaw.to_radians(),
            self.pitch.to_radians(),
            self.roll.to_radians(),
        )
    }

    pub fn from_quat(q: Quat) -> Self {
        let (y, x, z) = q.normalize().to_euler(EulerRot::YXZ);
        Self::new(y.to_degrees(), x.to_degrees(), z.to_degrees())
    }

    /// Angular distance from the forward default, ignoring roll.
    pub fn magnitude(&self) -> f32 {
        (self.yaw * self.yaw + self.pitch * self.pitch).sqrt()
    }
}

pub fn wrap_degrees(deg: f32) -> f32 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Vertical field of view in degrees, always inside [MIN_FOV, MAX_FOV].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView(f32);

impl FieldOfView {
    pub fn new(deg: f32) -> Self {
        Self(deg.clamp(MIN_FOV, MAX_FOV))
    }

    pub fn degrees(self) -> f32 {
        self.0
    }

    pub fn radians(self) -> f32 {
        self.0.to_radians()
    }

    pub fn zoom_in(self, step: f32) -> Self {
        Self::new(self.0 - step)
    }

    pub fn zoom_out(self, step: f32) -> Self {
        Self::new(self.0 + step)
    }
}

impl Default for FieldOfView {
    fn default() -> Self {
        Self(DEFAULT_FOV)
    }
}
