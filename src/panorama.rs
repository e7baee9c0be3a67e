// panorama.rs — 渲染核心：持有全部状态，每帧 tick 一次
//
// 宿主只下发命令（视角范围、缩放、画质、朝向模式、立体）并读取姿态；
// 几何体 / 纹理都只属于这里，每个命令只动自己负责的那部分资源。

use crate::camera::Camera;
use crate::config::ViewerConfig;
use crate::error::{CoreNotice, ViewerError};
use crate::filter::{FilterUniform, PostFilter, QualityParams};
use crate::mesh::{self, SurfaceDescriptor, ViewSpan};
use crate::orientation::{OrientationModel, OrientationSettings};
use crate::pose::{CameraPose, FieldOfView, OrientationMode};
use crate::resource::{DisposalProbe, GpuBackend, ResourceLedger, Tracked};
use crate::sensor::SensorGate;
use crate::stereo::{mono_pass, stereo_passes, EyePass, StereoState, Viewport};
use crate::video::{FrameSource, RefreshOutcome, ResolutionCap, VideoSurface};
use glam::{Mat4, Vec2};
use std::time::Instant;

/// Everything the renderer needs for one frame.
pub struct FramePlan<'a, G: GpuBackend> {
    pub pose: CameraPose,
    pub mesh: &'a G::Mesh,
    /// `None` until a frame has been uploaded; draw black.
    pub texture: Option<&'a G::Texture>,
    pub filter: FilterUniform,
    /// One pass in mono, left + right in stereo, none for a zero-sized target.
    pub passes: Vec<EyePass>,
    pub refresh: RefreshOutcome,
}

pub struct PanoramaCore<G: GpuBackend> {
    config: ViewerConfig,
    orientation: OrientationModel,
    sensor: Box<dyn SensorGate>,
    span: ViewSpan,
    surface: SurfaceDescriptor,
    geometry: Option<Tracked<G::Mesh>>,
    geometry_ledger: ResourceLedger,
    video: VideoSurface<G::Texture>,
    filter: PostFilter,
    stereo: StereoState,
    viewport: Viewport,
    camera: Camera,
    projection: Mat4,
    running: bool,
}

impl<G: GpuBackend> PanoramaCore<G> {
    pub fn new(
        config: ViewerConfig,
        sensor: Box<dyn SensorGate>,
        gpu: &mut G,
        width: u32,
        height: u32,
        now: Instant,
    ) -> Self {
        let span = ViewSpan::Full360;
        let surface = mesh::build_with(span, config.surface_radius, config.segments as usize);
        let geometry_ledger = ResourceLedger::new();
        let geometry = geometry_ledger.track("surface geometry", gpu.create_mesh(&surface));
        let fov = FieldOfView::new(config.fov);
        let stereo = StereoState { enabled: false, eye_separation: config.eye_separation };

        let mut core = Self {
            orientation: OrientationModel::new(OrientationSettings::from(&config), now),
            sensor,
            span,
            surface,
            geometry: Some(geometry),
            geometry_ledger,
            video: VideoSurface::new(config.resolution),
            filter: PostFilter::default(),
            stereo,
            viewport: Viewport::full(width, height),
            camera: Camera::new(CameraPose::FORWARD, fov, 1.0),
            projection: Mat4::IDENTITY,
            running: true,
            config,
        };
        core.resize(width, height);
        core
    }

    // ---- 状态读取 ----

    pub fn pose(&self) -> CameraPose {
        self.orientation.current_pose()
    }

    pub fn orientation_mode(&self) -> OrientationMode {
        self.orientation.mode()
    }

    pub fn view_span(&self) -> ViewSpan {
        self.span
    }

    pub fn surface(&self) -> &SurfaceDescriptor {
        &self.surface
    }

    pub fn fov(&self) -> FieldOfView {
        self.camera.fov
    }

    pub fn quality(&self) -> QualityParams {
        self.filter.params()
    }

    pub fn resolution_cap(&self) -> ResolutionCap {
        self.video.cap()
    }

    pub fn stereo(&self) -> StereoState {
        self.stereo
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Projection of the full-viewport mono camera, refreshed on every resize.
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn geometry_ledger(&self) -> &ResourceLedger {
        &self.geometry_ledger
    }

    pub fn texture_ledger(&self) -> &ResourceLedger {
        self.video.ledger()
    }

    pub fn geometry_probe(&self) -> Option<DisposalProbe> {
        self.geometry.as_ref().map(|g| g.probe())
    }

    pub fn video(&self) -> &VideoSurface<G::Texture> {
        &self.video
    }

    /// Conditions to surface to the user since the last call.
    pub fn take_notices(&mut self) -> Vec<CoreNotice> {
        let mut notices = self.orientation.take_notices();
        notices.extend(self.video.take_notices());
        notices
    }

    // ---- 输入 ----

    pub fn on_drag_start(&mut self, point: Vec2, now: Instant) {
        self.orientation.on_drag_start(point, now);
    }

    pub fn on_drag_move(&mut self, point: Vec2, now: Instant) {
        self.orientation.on_drag_move(point, now);
    }

    pub fn on_drag_end(&mut self, now: Instant) {
        self.orientation.on_drag_end(now);
    }

    // ---- 命令 ----

    pub fn set_orientation_mode(&mut self, mode: OrientationMode, now: Instant) {
        self.orientation.set_mode(mode, self.sensor.as_mut(), now);
    }

    pub fn reset_view(&mut self, now: Instant) {
        self.orientation.reset(now);
        self.camera.fov = FieldOfView::new(self.config.fov);
        self.update_projection();
    }

    /// Rebuild the projection surface. The old mesh is released before the
    /// new one is created.
    pub fn set_view_span(&mut self, span: ViewSpan, gpu: &mut G) {
        if !self.running {
            log::warn!("view span change after teardown ignored");
            return;
        }
        if span == self.span && self.geometry.is_some() {
            return;
        }

        let surface = mesh::build_with(span, self.config.surface_radius, self.config.segments as usize);
        if let Some(mut old) = self.geometry.take() {
            if let Some(inner) = old.dispose() {
                gpu.release_mesh(inner);
            }
        }
        self.geometry = Some(self.geometry_ledger.track("surface geometry", gpu.create_mesh(&surface)));
        log::info!(
            "surface rebuilt for {} ({:.1}° wide, {} triangles)",
            span.label(),
            surface.horizontal_extent_degrees(),
            surface.triangle_count()
        );
        self.surface = surface;
        self.span = span;
    }

    pub fn set_fov(&mut self, degrees: f32) {
        self.camera.fov = FieldOfView::new(degrees);
        self.update_projection();
    }

    pub fn zoom_in(&mut self) {
        self.camera.fov = self.camera.fov.zoom_in(self.config.zoom_step);
        self.update_projection();
    }

    pub fn zoom_out(&mut self) {
        self.camera.fov = self.camera.fov.zoom_out(self.config.zoom_step);
        self.update_projection();
    }

    pub fn set_quality(&mut self, params: QualityParams) {
        self.filter.set_params(params);
    }

    pub fn set_resolution_cap(&mut self, cap: ResolutionCap, gpu: &mut G) {
        self.video.set_cap(cap, gpu);
    }

    pub fn set_stereo(&mut self, enabled: bool) {
        if self.stereo.enabled == enabled {
            return;
        }
        self.stereo.enabled = enabled;
        log::info!("stereo {}", if enabled { "on" } else { "off" });
    }

    pub fn bind_source(&mut self, source: Box<dyn FrameSource>, gpu: &mut G) {
        if !self.running {
            log::warn!("frame source bind after teardown ignored");
            return;
        }
        self.video.bind(source, gpu);
    }

    pub fn unbind_source(&mut self, gpu: &mut G) {
        self.video.unbind(gpu);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::full(width, height);
        self.camera.aspect = self.viewport.aspect();
        self.update_projection();
    }

    fn update_projection(&mut self) {
        self.projection = self.camera.projection_matrix();
    }

    // ---- 帧循环 ----

    /// One scheduler tick: recenter, read pose, refresh video, plan the draws.
    pub fn tick(&mut self, now: Instant, gpu: &mut G) -> Result<FramePlan<'_, G>, ViewerError> {
        if !self.running {
            return Err(ViewerError::LoopStopped);
        }

        self.orientation.poll_sensor();
        self.orientation.advance(now);
        let pose = self.orientation.current_pose();
        self.camera.pose = pose;

        let refresh = self.video.refresh(gpu, &mut self.filter);

        let passes = if self.viewport.is_empty() {
            Vec::new()
        } else if self.stereo.enabled {
            stereo_passes(&self.camera, self.viewport, self.stereo.eye_separation).to_vec()
        } else {
            vec![mono_pass(&self.camera, self.viewport)]
        };

        let mesh = self
            .geometry
            .as_ref()
            .ok_or(ViewerError::DisposedResource("surface geometry"))?
            .get()?;
        let texture = match self.video.texture() {
            Some(t) => Some(t.get()?),
            None => None,
        };

        Ok(FramePlan {
            pose,
            mesh,
            texture,
            filter: self.filter.uniform(),
            passes,
            refresh,
        })
    }

    /// Stop the loop, then release every GPU resource it touches.
    pub fn teardown(&mut self, gpu: &mut G) {
        if !self.running {
            return;
        }
        self.running = false;

        self.orientation.shutdown(self.sensor.as_mut());
        self.video.unbind(gpu);
        if let Some(mut geometry) = self.geometry.take() {
            if let Some(inner) = geometry.dispose() {
                gpu.release_mesh(inner);
            }
        }
        log::info!("panorama core torn down");
    }
}
