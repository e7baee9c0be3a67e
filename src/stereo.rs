// stereo.rs — 左右眼分屏：视口/裁剪矩形与眼睛偏移

use crate::camera::Camera;
use glam::Mat4;

pub const EYE_SEPARATION: f32 = 0.064;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Mono,
    Left,
    Right,
}

/// Pixel rectangle used for both the viewport and the scissor of one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoState {
    pub enabled: bool,
    pub eye_separation: f32,
}

impl Default for StereoState {
    fn default() -> Self {
        Self { enabled: false, eye_separation: EYE_SEPARATION }
    }
}

/// Left and right halves of a `width` x `height` target. An odd pixel goes
/// to the right half so the two always tile the target exactly.
pub fn split_viewport(width: u32, height: u32) -> (Viewport, Viewport) {
    let left_w = width / 2;
    (
        Viewport { x: 0, y: 0, width: left_w, height },
        Viewport { x: left_w, y: 0, width: width - left_w, height },
    )
}

/// One draw of the panorama: where it goes and how it is projected.
#[derive(Debug, Clone, Copy)]
pub struct EyePass {
    pub eye: Eye,
    pub viewport: Viewport,
    pub view_proj: Mat4,
}

pub fn mono_pass(camera: &Camera, target: Viewport) -> EyePass {
    let cam = Camera { aspect: target.aspect(), ..*camera };
    EyePass { eye: Eye::Mono, viewport: target, view_proj: cam.view_proj(0.0) }
}

/// Two passes offset by half the eye separation in opposite directions.
pub fn stereo_passes(camera: &Camera, target: Viewport, separation: f32) -> [EyePass; 2] {
    let (left, right) = split_viewport(target.width, target.height);
    let half = separation / 2.0;
    let pass = |eye: Eye, vp: Viewport, offset: f32| {
        let cam = Camera { aspect: vp.aspect(), ..*camera };
        EyePass { eye, viewport: vp, view_proj: cam.view_proj(offset) }
    };
    [pass(Eye::Left, left, -half), pass(Eye::Right, right, half)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{CameraPose, FieldOfView};

    #[test]
    fn even_split_is_exact_halves() {
        let (l, r) = split_viewport(1920, 1080);
        assert_eq!(l, Viewport { x: 0, y: 0, width: 960, height: 1080 });
        assert_eq!(r, Viewport { x: 960, y: 0, width: 960, height: 1080 });
    }

    #[test]
    fn split_has_no_gap_or_overlap() {
        for w in [1u32, 2, 3, 799, 800, 1081] {
            let (l, r) = split_viewport(w, 600);
            assert_eq!(l.x + l.width, r.x);
            assert_eq!(r.x + r.width, w);
            assert_eq!(l.width, w / 2);
            assert_eq!(l.height, 600);
            assert_eq!(r.height, 600);
        }
    }

    #[test]
    fn eyes_use_half_width_aspect() {
        let cam = Camera::new(CameraPose::FORWARD, FieldOfView::default(), 2.0);
        let [l, r] = stereo_passes(&cam, Viewport::full(1600, 800), EYE_SEPARATION);
        assert_eq!(l.eye, Eye::Left);
        assert_eq!(r.eye, Eye::Right);
        assert_eq!(l.viewport.aspect(), 1.0);
        assert_ne!(l.view_proj, r.view_proj);
    }

    #[test]
    fn mono_pass_covers_target() {
        let cam = Camera::new(CameraPose::FORWARD, FieldOfView::default(), 1.0);
        let p = mono_pass(&cam, Viewport::full(640, 480));
        assert_eq!(p.viewport, Viewport::full(640, 480));
        assert_eq!(p.eye, Eye::Mono);
    }
}
