// mesh.rs — 投影几何：完整球面 / 半球 / 120° 楔形
//
// 观察者位于球心向外看，三角形从球心看为逆时针（与普通球体相反），
// 否则背面剔除后什么都看不到。

use std::f32::consts::PI;

pub const SURFACE_RADIUS: f32 = 250.0;
pub const SURFACE_SEGMENTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewSpan {
    Full360,
    Half180,
    Wedge120,
}

impl ViewSpan {
    pub const ALL: [ViewSpan; 3] = [ViewSpan::Full360, ViewSpan::Half180, ViewSpan::Wedge120];

    /// Horizontal (azimuth) extent in radians.
    pub fn phi_length(self) -> f32 {
        match self {
            ViewSpan::Full360 => 2.0 * PI,
            ViewSpan::Half180 => PI,
            ViewSpan::Wedge120 => 2.0 * PI / 3.0,
        }
    }

    /// Inclination range (start, length) in radians, 0 = straight up.
    pub fn theta_range(self) -> (f32, f32) {
        match self {
            ViewSpan::Full360 | ViewSpan::Half180 => (0.0, PI),
            ViewSpan::Wedge120 => (PI / 4.0, PI / 2.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewSpan::Full360 => "360°",
            ViewSpan::Half180 => "180°",
            ViewSpan::Wedge120 => "120°",
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// CPU-side surface the video frame is mapped onto.
#[derive(Debug, Clone)]
pub struct SurfaceDescriptor {
    pub span: ViewSpan,
    pub radius: f32,
    pub lat_segments: usize,
    pub lon_segments: usize,
    /// Azimuth of the first column; non-full spans are centred on forward (-Z).
    pub phi_start: f32,
    pub phi_length: f32,
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl SurfaceDescriptor {
    pub fn vertices(&self) -> Vec<Vertex> {
        self.positions
            .iter()
            .zip(&self.uvs)
            .map(|(p, uv)| Vertex { position: *p, uv: *uv })
            .collect()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Horizontal angle covered by the generated vertices, in degrees.
    pub fn horizontal_extent_degrees(&self) -> f32 {
        let row = self.lat_segments / 2;
        let start = row * (self.lon_segments + 1);
        let ring = &self.positions[start..=start + self.lon_segments];
        // 逐段累加，跨越接缝时不会归零
        ring.windows(2)
            .map(|w| {
                let mut d = azimuth(w[1]) - azimuth(w[0]);
                if d > PI {
                    d -= 2.0 * PI;
                } else if d <= -PI {
                    d += 2.0 * PI;
                }
                d
            })
            .sum::<f32>()
            .to_degrees()
    }
}

/// Azimuth of a point, 0 = forward (-Z), increasing towards +X.
fn azimuth(p: [f32; 3]) -> f32 {
    p[0].atan2(-p[2])
}

pub fn build(span: ViewSpan) -> SurfaceDescriptor {
    build_with(span, SURFACE_RADIUS, SURFACE_SEGMENTS)
}

pub fn build_with(span: ViewSpan, radius: f32, segments: usize) -> SurfaceDescriptor {
    let lat = segments;
    let lon = segments;
    let phi_length = span.phi_length();
    let phi_start = -phi_length / 2.0;
    let (theta_start, theta_length) = span.theta_range();

    let mut positions = Vec::with_capacity((lat + 1) * (lon + 1));
    let mut uvs = Vec::with_capacity((lat + 1) * (lon + 1));
    let mut indices = Vec::with_capacity(lat * lon * 6);

    for i in 0..=lat {
        let v = (i as f32) / (lat as f32);
        let theta = theta_start + theta_length * v;
        let y = radius * theta.cos();
        let sin_t = theta.sin();

        for j in 0..=lon {
            let u = (j as f32) / (lon as f32);
            let phi = phi_start + phi_length * u;

            // 从内部看：u 向右递增，v 向下递增（等距柱状投影）
            let x = radius * phi.sin() * sin_t;
            let z = -radius * phi.cos() * sin_t;

            positions.push([x, y, z]);
            uvs.push([u, v]);
        }
    }

    for i in 0..lat {
        for j in 0..lon {
            let a = (i * (lon + 1) + j) as u32;
            let b = a + (lon + 1) as u32;

            indices.extend_from_slice(&[
                a, b, a + 1,
                b, b + 1, a + 1,
            ]);
        }
    }

    SurfaceDescriptor {
        span,
        radius,
        lat_segments: lat,
        lon_segments: lon,
        phi_start,
        phi_length,
        positions,
        uvs,
        indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn every_vertex_sits_on_the_radius() {
        for span in ViewSpan::ALL {
            let s = build(span);
            for p in &s.positions {
                let r = Vec3::from(*p).length();
                assert!((r - SURFACE_RADIUS).abs() < 1e-2, "{span:?} r={r}");
            }
        }
    }

    #[test]
    fn horizontal_extent_matches_span() {
        assert!((build(ViewSpan::Full360).horizontal_extent_degrees() - 360.0).abs() < 0.1);
        assert!((build(ViewSpan::Half180).horizontal_extent_degrees() - 180.0).abs() < 0.1);
        assert!((build(ViewSpan::Wedge120).horizontal_extent_degrees() - 120.0).abs() < 0.1);
    }

    #[test]
    fn partial_spans_are_centred_forward() {
        for span in [ViewSpan::Half180, ViewSpan::Wedge120] {
            let s = build(span);
            let row = s.lat_segments / 2;
            let mid = s.positions[row * (s.lon_segments + 1) + s.lon_segments / 2];
            let dir = Vec3::from(mid).normalize();
            assert!(dir.dot(Vec3::NEG_Z) > 0.99, "{span:?} centre {dir:?}");
        }
    }

    #[test]
    fn triangles_face_the_viewer_inside() {
        for span in ViewSpan::ALL {
            let s = build_with(span, 10.0, 16);
            for tri in s.indices.chunks(3) {
                let p0 = Vec3::from(s.positions[tri[0] as usize]);
                let p1 = Vec3::from(s.positions[tri[1] as usize]);
                let p2 = Vec3::from(s.positions[tri[2] as usize]);
                let normal = (p1 - p0).cross(p2 - p0);
                if normal.length_squared() < 1e-10 {
                    continue; // degenerate pole triangles
                }
                let centroid = (p0 + p1 + p2) / 3.0;
                assert!(normal.dot(centroid) < 0.0, "{span:?} triangle faces outward");
            }
        }
    }

    #[test]
    fn uv_is_equirectangular() {
        let s = build_with(ViewSpan::Full360, 1.0, 8);
        assert_eq!(s.uvs[0], [0.0, 0.0]);
        assert_eq!(*s.uvs.last().unwrap(), [1.0, 1.0]);
        // top row at the zenith, v grows downward
        assert!((s.positions[0][1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tessellation_density() {
        let s = build(ViewSpan::Half180);
        assert_eq!(s.positions.len(), 65 * 65);
        assert_eq!(s.triangle_count(), 64 * 64 * 2);
    }
}
