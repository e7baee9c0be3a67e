// camera.rs — 视图 / 投影矩阵
//
// 相机固定在球心，只旋转；立体模式下沿相机右方向平移半个瞳距。

use crate::pose::{CameraPose, FieldOfView};
use glam::{Mat4, Vec3};

pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 1000.0;

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub pose: CameraPose,
    pub fov: FieldOfView,
    pub aspect: f32,
}

impl Camera {
    pub fn new(pose: CameraPose, fov: FieldOfView, aspect: f32) -> Self {
        Self { pose, fov, aspect }
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.eye_view_matrix(0.0)
    }

    /// View matrix for an eye shifted `offset` world units along the camera's
    /// right vector, still looking along the shared forward direction.
    pub fn eye_view_matrix(&self, offset: f32) -> Mat4 {
        let orientation = self.pose.to_quat();
        let eye = orientation * Vec3::new(offset, 0.0, 0.0);
        Mat4::from_rotation_translation(orientation, eye).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.radians(), self.aspect.max(1e-3), Z_NEAR, Z_FAR)
    }

    pub fn view_proj(&self, offset: f32) -> Mat4 {
        self.projection_matrix() * self.eye_view_matrix(offset)
    }

    pub fn forward(&self) -> Vec3 {
        self.pose.to_quat() * Vec3::NEG_Z
    }
}
