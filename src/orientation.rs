// orientation.rs — 拖拽 + 设备朝向融合为统一的相机姿态，含空闲回正

use crate::error::{CoreNotice, ViewerError};
use crate::pose::{CameraPose, OrientationMode};
use crate::sensor::{EulerSample, Permission, SensorFeed, SensorGate, SensorSample};
use glam::{EulerRot, Quat, Vec2};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct OrientationSettings {
    /// Degrees per pixel of drag.
    pub sensitivity: f32,
    pub idle_threshold: Duration,
    pub recenter_rate: f32,
}

impl Default for OrientationSettings {
    fn default() -> Self {
        Self {
            sensitivity: 0.15,
            idle_threshold: Duration::from_secs(5),
            recenter_rate: 0.05,
        }
    }
}

impl From<&crate::config::ViewerConfig> for OrientationSettings {
    fn from(cfg: &crate::config::ViewerConfig) -> Self {
        Self {
            sensitivity: cfg.drag_sensitivity,
            idle_threshold: Duration::try_from_secs_f32(cfg.idle_recenter_secs)
                .unwrap_or_else(|_| Self::default().idle_threshold),
            recenter_rate: cfg.recenter_rate,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InteractionState {
    pub is_dragging: bool,
    pub last_pointer: Option<Vec2>,
    pub last_activity: Instant,
}

/// Portrait mapping: heading is yaw, upright device (beta = 90) looks at the horizon.
pub fn portrait_orientation(s: EulerSample) -> Quat {
    Quat::from_euler(
        EulerRot::YXZ,
        s.alpha.to_radians(),
        (s.beta - 90.0).to_radians(),
        (-s.gamma).to_radians(),
    )
}

/// Landscape mapping: heading is offset by 90° and the tilt sign flips.
pub fn landscape_orientation(s: EulerSample) -> Quat {
    Quat::from_euler(
        EulerRot::YXZ,
        (s.alpha + 90.0).to_radians(),
        (90.0 - s.beta).to_radians(),
        (-s.gamma).to_radians(),
    )
}

pub fn sample_orientation(sample: SensorSample) -> Quat {
    match sample {
        SensorSample::Portrait(s) => portrait_orientation(s),
        SensorSample::Landscape(s) => landscape_orientation(s),
    }
}

pub struct OrientationModel {
    settings: OrientationSettings,
    mode: OrientationMode,
    pose: CameraPose,
    interaction: InteractionState,
    /// Sensor access result, asked once per session.
    permission: Option<Permission>,
    feed: Option<SensorFeed>,
    /// Rotation about Y that keeps the pose at the switch-over as the baseline.
    heading_offset: Option<Quat>,
    notices: Vec<CoreNotice>,
}

impl OrientationModel {
    pub fn new(settings: OrientationSettings, now: Instant) -> Self {
        Self {
            settings,
            mode: OrientationMode::Manual,
            pose: CameraPose::FORWARD,
            interaction: InteractionState {
                is_dragging: false,
                last_pointer: None,
                last_activity: now,
            },
            permission: None,
            feed: None,
            heading_offset: None,
            notices: Vec::new(),
        }
    }

    pub fn mode(&self) -> OrientationMode {
        self.mode
    }

    pub fn current_pose(&self) -> CameraPose {
        self.pose
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    pub fn take_notices(&mut self) -> Vec<CoreNotice> {
        std::mem::take(&mut self.notices)
    }

    pub fn on_drag_start(&mut self, point: Vec2, now: Instant) {
        self.interaction.is_dragging = true;
        self.interaction.last_pointer = Some(point);
        self.interaction.last_activity = now;
    }

    pub fn on_drag_move(&mut self, point: Vec2, now: Instant) {
        if !self.interaction.is_dragging {
            return;
        }
        self.interaction.last_activity = now;

        let Some(last) = self.interaction.last_pointer.replace(point) else {
            return;
        };
        // 传感器模式下由设备朝向决定姿态，拖拽只计为活动
        if self.mode != OrientationMode::Manual {
            return;
        }

        let s = self.settings.sensitivity;
        let dx = point.x - last.x;
        let dy_up = last.y - point.y; // screen y grows downward
        let mut pose = self.pose;
        pose.yaw += dx * s;
        pose.pitch -= dy_up * s;
        pose.normalize();
        self.pose = pose;
    }

    pub fn on_drag_end(&mut self, now: Instant) {
        self.interaction.is_dragging = false;
        self.interaction.last_pointer = None;
        self.interaction.last_activity = now;
    }

    /// Apply one sensor reading. Ignored outside sensor fusion.
    pub fn on_sensor_sample(&mut self, sample: SensorSample) {
        if self.mode != OrientationMode::SensorFusion {
            return;
        }

        let device = sample_orientation(sample);
        let offset = *self.heading_offset.get_or_insert_with(|| {
            let (device_yaw, _, _) = device.to_euler(EulerRot::YXZ);
            Quat::from_rotation_y(self.pose.yaw.to_radians() - device_yaw)
        });

        // 整体替换姿态：渲染帧不会读到半更新的角度
        self.pose = CameraPose::from_quat(offset * device);
    }

    /// Drain whatever the attached sensor pushed since the last tick.
    pub fn poll_sensor(&mut self) {
        if let Some(sample) = self.feed.as_ref().and_then(|f| f.latest()) {
            self.on_sensor_sample(sample);
        }
    }

    /// Switch modes. A refused or failed sensor request leaves the model in
    /// manual mode and queues a notice instead of failing the caller. Any
    /// drag in progress ends either way.
    pub fn set_mode(&mut self, mode: OrientationMode, gate: &mut dyn SensorGate, now: Instant) {
        if mode == self.mode {
            return;
        }

        self.interaction.is_dragging = false;
        self.interaction.last_pointer = None;
        self.interaction.last_activity = now;

        match mode {
            OrientationMode::Manual => self.leave_sensor_mode(gate),
            OrientationMode::SensorFusion => {
                if let Err(e) = self.enter_sensor_mode(gate) {
                    log::warn!("staying in manual orientation: {}", e);
                    return;
                }
            }
        }
        log::info!("orientation mode -> {:?}", self.mode);
    }

    fn enter_sensor_mode(&mut self, gate: &mut dyn SensorGate) -> Result<(), ViewerError> {
        let permission = match self.permission {
            Some(p) => p,
            None => {
                let p = gate.request_permission();
                self.permission = Some(p);
                if p == Permission::Denied {
                    self.notices.push(CoreNotice::PermissionDenied);
                }
                p
            }
        };
        if permission == Permission::Denied {
            return Err(ViewerError::PermissionDenied);
        }

        match gate.attach() {
            Ok(feed) => {
                self.feed = Some(feed);
                self.heading_offset = None;
                self.mode = OrientationMode::SensorFusion;
                Ok(())
            }
            Err(e) => {
                self.notices.push(CoreNotice::SensorUnavailable(e.to_string()));
                Err(e)
            }
        }
    }

    fn leave_sensor_mode(&mut self, gate: &mut dyn SensorGate) {
        gate.detach();
        self.feed = None;
        self.heading_offset = None;
        self.pose.roll = 0.0;
        self.mode = OrientationMode::Manual;
    }

    /// Stop any sensor delivery; used on teardown.
    pub fn shutdown(&mut self, gate: &mut dyn SensorGate) {
        if self.mode == OrientationMode::SensorFusion {
            self.leave_sensor_mode(gate);
        }
    }

    /// Per-tick idle recenter. Returns true when the pose moved.
    pub fn advance(&mut self, now: Instant) -> bool {
        if self.mode != OrientationMode::Manual || self.interaction.is_dragging {
            return false;
        }
        if now.saturating_duration_since(self.interaction.last_activity) < self.settings.idle_threshold {
            return false;
        }
        if self.pose.yaw == 0.0 && self.pose.pitch == 0.0 {
            return false;
        }

        let keep = 1.0 - self.settings.recenter_rate;
        self.pose.yaw *= keep;
        self.pose.pitch *= keep;
        if self.pose.yaw.abs() < 1e-4 {
            self.pose.yaw = 0.0;
        }
        if self.pose.pitch.abs() < 1e-4 {
            self.pose.pitch = 0.0;
        }
        true
    }

    /// Jump straight back to the forward default.
    pub fn reset(&mut self, now: Instant) {
        self.pose = CameraPose::FORWARD;
        self.heading_offset = None;
        self.interaction.last_activity = now;
    }
}
