// filter.rs — 采样时的逐像素调色 / 锐化
//
// 顺序固定：锐化 -> 亮度 -> 对比度 -> 饱和度 -> 色调。调换顺序结果不同。
// GPU 版本在 shader_panorama.wgsl 中，与这里的 CPU 参考实现逐步一致。

use glam::Vec3;
use image::{Rgba, RgbaImage};

const LUMA: Vec3 = Vec3::new(0.299, 0.587, 0.114);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorProfile {
    #[default]
    Standard,
    Cinema,
    Vivid,
    Natural,
}

impl ColorProfile {
    pub const ALL: [ColorProfile; 4] = [
        ColorProfile::Standard,
        ColorProfile::Cinema,
        ColorProfile::Vivid,
        ColorProfile::Natural,
    ];

    pub fn tint(self) -> Vec3 {
        match self {
            ColorProfile::Standard => Vec3::ONE,
            ColorProfile::Cinema => Vec3::new(0.95, 0.95, 0.85),
            ColorProfile::Vivid => Vec3::splat(1.1),
            ColorProfile::Natural => Vec3::new(1.0, 1.0, 0.95),
        }
    }

    pub fn next(self) -> Self {
        match self {
            ColorProfile::Standard => ColorProfile::Cinema,
            ColorProfile::Cinema => ColorProfile::Vivid,
            ColorProfile::Vivid => ColorProfile::Natural,
            ColorProfile::Natural => ColorProfile::Standard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QualityParams {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    /// 0 = untouched, 1 = fully sharpened.
    pub sharpness: f32,
    pub profile: ColorProfile,
}

/// std140-compatible block bound next to the video texture.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FilterUniform {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub sharpness: f32,
    pub tint: [f32; 4],
    /// One source pixel in texture coordinates, for neighbour sampling.
    pub texel: [f32; 2],
    pub pad: [f32; 2],
}

/// Filter state: user quality settings plus the source resolution the binder reports.
#[derive(Debug, Clone, Copy)]
pub struct PostFilter {
    params: QualityParams,
    resolution: (u32, u32),
}

impl Default for PostFilter {
    fn default() -> Self {
        Self { params: QualityParams::default(), resolution: (1920, 1080) }
    }
}

impl PostFilter {
    pub fn params(&self) -> QualityParams {
        self.params
    }

    pub fn set_params(&mut self, params: QualityParams) {
        self.params = params;
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn set_source_resolution(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.resolution = (width, height);
        }
    }

    pub fn uniform(&self) -> FilterUniform {
        let p = self.params;
        let tint = p.profile.tint();
        FilterUniform {
            brightness: p.brightness,
            contrast: p.contrast,
            saturation: p.saturation,
            sharpness: p.sharpness,
            tint: [tint.x, tint.y, tint.z, 1.0],
            texel: [1.0 / self.resolution.0 as f32, 1.0 / self.resolution.1 as f32],
            pad: [0.0; 2],
        }
    }
}

/// Grade one pixel. `neighbours` are up, down, left, right; only read when
/// sharpening is enabled.
pub fn shade(params: &QualityParams, center: [f32; 4], neighbours: impl FnOnce() -> [Vec3; 4]) -> [f32; 4] {
    let mut color = Vec3::new(center[0], center[1], center[2]);

    if params.sharpness > 0.0 {
        let [up, down, left, right] = neighbours();
        let sharpened = color * 5.0 - up - down - left - right;
        color = color.lerp(sharpened, params.sharpness);
    }

    color += Vec3::splat(params.brightness);
    color = (color - Vec3::splat(0.5)) * (1.0 + params.contrast) + Vec3::splat(0.5);
    let gray = Vec3::splat(color.dot(LUMA));
    color = gray.lerp(color, 1.0 + params.saturation);
    color *= params.profile.tint();

    [color.x, color.y, color.z, center[3]]
}

/// CPU reference over a whole frame (clamp-to-edge neighbours), used for
/// snapshots and tests; the renderer does the same work in the fragment shader.
pub fn apply_to_image(params: &QualityParams, src: &RgbaImage) -> RgbaImage {
    let (w, h) = src.dimensions();
    let fetch = |x: i64, y: i64| -> Vec3 {
        let x = x.clamp(0, w as i64 - 1) as u32;
        let y = y.clamp(0, h as i64 - 1) as u32;
        let p = src.get_pixel(x, y).0;
        Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32) / 255.0
    };

    RgbaImage::from_fn(w, h, |x, y| {
        let p = src.get_pixel(x, y).0;
        let center = [
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
            p[3] as f32 / 255.0,
        ];
        let (xi, yi) = (x as i64, y as i64);
        let out = shade(params, center, || {
            [fetch(xi, yi - 1), fetch(xi, yi + 1), fetch(xi - 1, yi), fetch(xi + 1, yi)]
        });
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([to_u8(out[0]), to_u8(out[1]), to_u8(out[2]), p[3]])
    })
}
