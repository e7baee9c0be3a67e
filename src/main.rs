// main.rs — 窗口宿主：事件 -> 核心命令，菜单 / 状态栏，渲染循环

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // 在 Release 模式下隐藏控制台窗口

use anyhow::Context;
use pano360_viewer::config::{arg_value, ViewerConfig, MAX_FOV, MIN_FOV};
use pano360_viewer::error::{CoreNotice, ViewerError};
use pano360_viewer::filter::{ColorProfile, QualityParams};
use pano360_viewer::mesh::ViewSpan;
use pano360_viewer::panorama::PanoramaCore;
use pano360_viewer::pose::{CameraPose, OrientationMode};
use pano360_viewer::renderer::Renderer;
use pano360_viewer::sensor::{NoSensor, ReplaySensor, SensorGate};
use pano360_viewer::sources::{self, ImageSequenceSource, PlaybackHandle, StillImageSource};
use pano360_viewer::video::{FrameSource, ResolutionCap};

use glam::Vec2;
use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
const DEFAULT_SEQUENCE_FPS: f32 = 30.0;

/// Everything the menus, shortcuts and drag-and-drop can ask for.
#[derive(Debug, Clone)]
enum Command {
    OpenImage(PathBuf),
    OpenFrames(PathBuf),
    ResetView,
    ToggleFullscreen,
    SetStereo(bool),
    SetOrientation(OrientationMode),
    SetSpan(ViewSpan),
    SetFov(f32),
    ZoomIn,
    ZoomOut,
    SetQuality(QualityParams),
    SetResolution(ResolutionCap),
    TogglePlayback,
    SetVsync(bool),
    Exit,
}

/// Read-only snapshot for one frame of UI.
struct Hud {
    pose: CameraPose,
    fov: f32,
    mode: OrientationMode,
    span: ViewSpan,
    quality: QualityParams,
    cap: ResolutionCap,
    stereo: bool,
    fullscreen: bool,
    playing: Option<bool>,
    loading: bool,
    native: Option<(u32, u32)>,
    vsync: bool,
    fps: f32,
    status: Option<String>,
}

struct Host {
    window: Arc<Window>,
    renderer: Renderer,
    core: PanoramaCore<Renderer>,
    playback: Option<PlaybackHandle>,
    sequence_fps: f32,
    is_fullscreen: bool,
    // 进入立体模式时顺带开的全屏，退出立体时一起退
    stereo_fullscreen: bool,
    vsync: bool,
    status: Option<(String, Instant)>,

    // 交互状态
    cursor: PhysicalPosition<f64>,
    mouse_pressed: bool,
    active_touch: Option<u64>,

    // FPS 计算
    last_fps_time: Instant,
    frame_count: u32,
    fps: f32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let config = ViewerConfig::resolve(&args);
    let sequence_fps = parse_fps(arg_value(&args, "--fps").as_deref());

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Pano360 Viewer")
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)
            .context("failed to create window")?,
    );

    let mut renderer = pollster::block_on(Renderer::new(window.clone(), config.vsync))
        .context("failed to initialise GPU renderer")?;

    let sensor: Box<dyn SensorGate> = match arg_value(&args, "--sensor-log") {
        Some(path) => {
            log::info!("orientation samples replayed from {}", path);
            Box::new(ReplaySensor::new(path))
        }
        None => Box::new(NoSensor),
    };

    let size = window.inner_size();
    let vsync = config.vsync;
    let core = PanoramaCore::new(config, sensor, &mut renderer, size.width, size.height, Instant::now());

    let mut host = Host {
        window: window.clone(),
        renderer,
        core,
        playback: None,
        sequence_fps,
        is_fullscreen: false,
        stereo_fullscreen: false,
        vsync,
        status: None,
        cursor: PhysicalPosition::new(0.0, 0.0),
        mouse_pressed: false,
        active_touch: None,
        last_fps_time: Instant::now(),
        frame_count: 0,
        fps: 0.0,
    };

    if let Some(dir) = arg_value(&args, "--frames") {
        host.apply(Command::OpenFrames(PathBuf::from(dir)), Instant::now());
    } else if let Some(path) = positional_path(&args) {
        host.apply(Command::OpenImage(path), Instant::now());
    }

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => {
                // 先让 egui 处理事件
                let response = host.renderer.egui_state.on_event(&host.renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                let now = Instant::now();
                let command = match event {
                    WindowEvent::CloseRequested => Some(Command::Exit),
                    WindowEvent::Resized(new_size) => {
                        host.resize_to(new_size);
                        None
                    }
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        host.resize_to(*new_inner_size);
                        None
                    }
                    WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                        input.virtual_keycode.and_then(|key| host.shortcut(key))
                    }
                    WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                        host.mouse_pressed = state == ElementState::Pressed;
                        let point = to_point(host.cursor);
                        if host.mouse_pressed {
                            host.core.on_drag_start(point, now);
                        } else {
                            host.core.on_drag_end(now);
                        }
                        None
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        host.cursor = position;
                        if host.mouse_pressed {
                            host.core.on_drag_move(to_point(position), now);
                        }
                        None
                    }
                    WindowEvent::Touch(touch) => {
                        host.on_touch(touch, now);
                        None
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let scroll = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                        };
                        if scroll > 0.0 {
                            Some(Command::ZoomIn)
                        } else if scroll < 0.0 {
                            Some(Command::ZoomOut)
                        } else {
                            None
                        }
                    }
                    WindowEvent::DroppedFile(path) => {
                        if path.is_dir() {
                            Some(Command::OpenFrames(path))
                        } else {
                            Some(Command::OpenImage(path))
                        }
                    }
                    _ => None,
                };

                if let Some(command) = command {
                    if host.apply(command, now) {
                        *control_flow = ControlFlow::Exit;
                    }
                }
            }

            Event::RedrawRequested(_) => {
                let now = Instant::now();
                host.count_frame(now);

                let hud = host.hud(now);
                let mut commands = Vec::new();

                let render_result = match host.core.tick(now, &mut host.renderer) {
                    Ok(plan) => host.renderer.render(&plan, &host.window, |ctx| {
                        if !hud.stereo {
                            draw_ui(ctx, &hud, &mut commands);
                        }
                    }),
                    Err(e @ ViewerError::LoopStopped) | Err(e @ ViewerError::DisposedResource(_)) => {
                        log::error!("render loop ended: {}", e);
                        *control_flow = ControlFlow::Exit;
                        return;
                    }
                    Err(e) => {
                        log::error!("frame skipped: {}", e);
                        Ok(())
                    }
                };

                for notice in host.core.take_notices() {
                    host.notify(&notice, now);
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => host.renderer.resize(host.renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("GPU out of memory");
                        host.core.teardown(&mut host.renderer);
                        *control_flow = ControlFlow::Exit;
                    }
                    Err(e) => log::warn!("render error: {:?}", e),
                }

                for command in commands {
                    if host.apply(command, now) {
                        *control_flow = ControlFlow::Exit;
                    }
                }
            }

            Event::MainEventsCleared => {
                host.window.request_redraw();
            }

            _ => {}
        }
    })
}

impl Host {
    /// Returns `true` when the event loop should exit.
    fn apply(&mut self, command: Command, now: Instant) -> bool {
        match command {
            Command::OpenImage(path) => {
                self.playback = None;
                let source: Box<dyn FrameSource> = Box::new(StillImageSource::spawn(path.clone()));
                self.core.bind_source(source, &mut self.renderer);
                self.window.set_title(&format!("Pano360 Viewer - {}", file_label(&path)));
            }
            Command::OpenFrames(dir) => match ImageSequenceSource::open(&dir, self.sequence_fps) {
                Ok((source, handle)) => {
                    self.playback = Some(handle);
                    self.core.bind_source(Box::new(source), &mut self.renderer);
                    self.window.set_title(&format!("Pano360 Viewer - {}", file_label(&dir)));
                }
                Err(e) => {
                    log::warn!("{}", e);
                    self.set_status(e.to_string(), now);
                }
            },
            Command::ResetView => self.core.reset_view(now),
            Command::ToggleFullscreen => {
                self.set_fullscreen(!self.is_fullscreen);
                self.stereo_fullscreen = false;
            }
            Command::SetStereo(enabled) => {
                self.core.set_stereo(enabled);
                if enabled && !self.is_fullscreen {
                    self.set_fullscreen(true);
                    self.stereo_fullscreen = true;
                } else if !enabled && self.stereo_fullscreen {
                    self.set_fullscreen(false);
                    self.stereo_fullscreen = false;
                }
            }
            Command::SetOrientation(mode) => self.core.set_orientation_mode(mode, now),
            Command::SetSpan(span) => self.core.set_view_span(span, &mut self.renderer),
            Command::SetFov(deg) => self.core.set_fov(deg),
            Command::ZoomIn => self.core.zoom_in(),
            Command::ZoomOut => self.core.zoom_out(),
            Command::SetQuality(params) => self.core.set_quality(params),
            Command::SetResolution(cap) => self.core.set_resolution_cap(cap, &mut self.renderer),
            Command::TogglePlayback => {
                if let Some(handle) = &self.playback {
                    let playing = handle.toggle();
                    self.set_status(if playing { "Playing" } else { "Paused" }.to_string(), now);
                }
            }
            Command::SetVsync(vsync) => {
                self.vsync = vsync;
                self.renderer.set_vsync(vsync);
            }
            Command::Exit => {
                self.core.teardown(&mut self.renderer);
                return true;
            }
        }
        false
    }

    fn shortcut(&self, key: VirtualKeyCode) -> Option<Command> {
        let command = match key {
            VirtualKeyCode::O => Command::OpenImage(pick_image()?),
            VirtualKeyCode::P => Command::OpenFrames(pick_frames()?),
            VirtualKeyCode::F11 => Command::ToggleFullscreen,
            VirtualKeyCode::V => Command::SetStereo(!self.core.stereo().enabled),
            VirtualKeyCode::Escape if self.core.stereo().enabled => Command::SetStereo(false),
            VirtualKeyCode::H => Command::SetOrientation(match self.core.orientation_mode() {
                OrientationMode::Manual => OrientationMode::SensorFusion,
                OrientationMode::SensorFusion => OrientationMode::Manual,
            }),
            VirtualKeyCode::Key1 => Command::SetSpan(ViewSpan::Full360),
            VirtualKeyCode::Key2 => Command::SetSpan(ViewSpan::Half180),
            VirtualKeyCode::Key3 => Command::SetSpan(ViewSpan::Wedge120),
            VirtualKeyCode::Space => Command::TogglePlayback,
            VirtualKeyCode::Equals | VirtualKeyCode::Plus | VirtualKeyCode::NumpadAdd => Command::ZoomIn,
            VirtualKeyCode::Minus | VirtualKeyCode::NumpadSubtract => Command::ZoomOut,
            VirtualKeyCode::C => {
                let mut params = self.core.quality();
                params.profile = params.profile.next();
                Command::SetQuality(params)
            }
            VirtualKeyCode::R => Command::SetResolution(next_cap(self.core.resolution_cap())),
            VirtualKeyCode::Home => Command::ResetView,
            _ => return None,
        };
        Some(command)
    }

    fn on_touch(&mut self, touch: Touch, now: Instant) {
        let point = to_point(touch.location);
        match touch.phase {
            TouchPhase::Started if self.active_touch.is_none() => {
                self.active_touch = Some(touch.id);
                self.core.on_drag_start(point, now);
            }
            TouchPhase::Moved if self.active_touch == Some(touch.id) => {
                self.core.on_drag_move(point, now);
            }
            TouchPhase::Ended | TouchPhase::Cancelled if self.active_touch == Some(touch.id) => {
                self.active_touch = None;
                self.core.on_drag_end(now);
            }
            _ => {}
        }
    }

    fn set_fullscreen(&mut self, on: bool) {
        self.is_fullscreen = on;
        if on {
            self.window.set_fullscreen(Some(Fullscreen::Borderless(None)));
        } else {
            self.window.set_fullscreen(None);
        }
        // 全屏切换不保证立即收到 Resized，按窗口当前尺寸重建一次
        self.resize_to(self.window.inner_size());
    }

    fn resize_to(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        self.renderer.resize(size);
        self.core.resize(size.width, size.height);
    }

    fn notify(&mut self, notice: &CoreNotice, now: Instant) {
        let text = match notice {
            CoreNotice::PermissionDenied => "Motion sensor access denied, staying in manual mode".to_string(),
            CoreNotice::SensorUnavailable(e) => format!("Motion sensor unavailable: {}", e),
            CoreNotice::SourceUnreadable(e) => format!("Cannot read source: {}", e),
            CoreNotice::SourceDimensions { width, height } => format!("Source {}x{}", width, height),
        };
        self.set_status(text, now);
    }

    fn set_status(&mut self, text: String, now: Instant) {
        log::info!("{}", text);
        self.status = Some((text, now));
    }

    fn count_frame(&mut self, now: Instant) {
        self.frame_count += 1;
        let elapsed = now.duration_since(self.last_fps_time).as_secs_f32();
        if elapsed >= 1.0 {
            self.fps = self.frame_count as f32 / elapsed;
            self.frame_count = 0;
            self.last_fps_time = now;
        }
    }

    fn hud(&self, now: Instant) -> Hud {
        let video = self.core.video();
        Hud {
            pose: self.core.pose(),
            fov: self.core.fov().degrees(),
            mode: self.core.orientation_mode(),
            span: self.core.view_span(),
            quality: self.core.quality(),
            cap: self.core.resolution_cap(),
            stereo: self.core.stereo().enabled,
            fullscreen: self.is_fullscreen,
            playing: self.playback.as_ref().map(|h| h.is_playing()),
            loading: video.is_bound() && video.texture().is_none(),
            native: video.native_dimensions(),
            vsync: self.vsync,
            fps: self.fps,
            status: self
                .status
                .as_ref()
                .filter(|(_, at)| now.duration_since(*at) < STATUS_TIMEOUT)
                .map(|(text, _)| text.clone()),
        }
    }
}

fn parse_fps(value: Option<&str>) -> f32 {
    match value.map(str::parse::<f32>) {
        Some(Ok(fps)) if fps.is_finite() && fps > 0.0 => fps,
        Some(_) => {
            log::warn!("ignoring --fps {:?}, using {}", value.unwrap_or_default(), DEFAULT_SEQUENCE_FPS);
            DEFAULT_SEQUENCE_FPS
        }
        None => DEFAULT_SEQUENCE_FPS,
    }
}

fn to_point(p: PhysicalPosition<f64>) -> Vec2 {
    Vec2::new(p.x as f32, p.y as f32)
}

fn next_cap(cap: ResolutionCap) -> ResolutionCap {
    match cap {
        ResolutionCap::Auto => ResolutionCap::P720,
        ResolutionCap::P720 => ResolutionCap::P1080,
        ResolutionCap::P1080 => ResolutionCap::P4K,
        ResolutionCap::P4K => ResolutionCap::Auto,
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// First argument that is neither a flag nor a flag's value.
fn positional_path(args: &[String]) -> Option<PathBuf> {
    const VALUE_FLAGS: [&str; 4] = ["--config", "--frames", "--fps", "--sensor-log"];
    let mut it = args.iter().skip(1);
    while let Some(a) = it.next() {
        if VALUE_FLAGS.contains(&a.as_str()) {
            it.next();
        } else if !a.starts_with("--") {
            return Some(PathBuf::from(a));
        }
    }
    None
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Panorama images", &sources::IMAGE_EXTENSIONS)
        .pick_file()
}

fn pick_frames() -> Option<PathBuf> {
    rfd::FileDialog::new().set_title("Frame sequence folder").pick_folder()
}

fn draw_ui(ctx: &egui::Context, hud: &Hud, commands: &mut Vec<Command>) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            // File
            ui.menu_button("File", |ui| {
                if ui.button("Open panorama... (O)").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_image() {
                        commands.push(Command::OpenImage(path));
                    }
                }
                if ui.button("Open frame folder... (P)").clicked() {
                    ui.close_menu();
                    if let Some(dir) = pick_frames() {
                        commands.push(Command::OpenFrames(dir));
                    }
                }
                if let Some(playing) = hud.playing {
                    if ui.button(if playing { "Pause (Space)" } else { "Play (Space)" }).clicked() {
                        commands.push(Command::TogglePlayback);
                        ui.close_menu();
                    }
                }
                ui.separator();
                if ui.button("Exit").clicked() {
                    commands.push(Command::Exit);
                }
            });

            // View
            ui.menu_button("View", |ui| {
                if ui.button("Reset view (Home)").clicked() {
                    commands.push(Command::ResetView);
                    ui.close_menu();
                }
                let fullscreen_label = if hud.fullscreen { "Exit fullscreen (F11)" } else { "Fullscreen (F11)" };
                if ui.button(fullscreen_label).clicked() {
                    commands.push(Command::ToggleFullscreen);
                    ui.close_menu();
                }
                if ui.button("Stereo split (V)").clicked() {
                    commands.push(Command::SetStereo(true));
                    ui.close_menu();
                }

                let mut tracking = hud.mode == OrientationMode::SensorFusion;
                if ui.checkbox(&mut tracking, "Head tracking (H)").clicked() {
                    commands.push(Command::SetOrientation(if tracking {
                        OrientationMode::SensorFusion
                    } else {
                        OrientationMode::Manual
                    }));
                }

                ui.separator();
                ui.menu_button("Projection span", |ui| {
                    for span in ViewSpan::ALL {
                        if ui.radio(hud.span == span, span.label()).clicked() {
                            commands.push(Command::SetSpan(span));
                            ui.close_menu();
                        }
                    }
                });

                let mut fov = hud.fov;
                if ui
                    .add(egui::Slider::new(&mut fov, MIN_FOV..=MAX_FOV).text("FOV"))
                    .changed()
                {
                    commands.push(Command::SetFov(fov));
                }

                ui.separator();
                let mut vsync = hud.vsync;
                if ui.checkbox(&mut vsync, "VSync").clicked() {
                    commands.push(Command::SetVsync(vsync));
                }
            });

            // Quality
            ui.menu_button("Quality", |ui| {
                let mut params = hud.quality;
                let mut changed = false;
                changed |= ui.add(egui::Slider::new(&mut params.brightness, -1.0..=1.0).text("Brightness")).changed();
                changed |= ui.add(egui::Slider::new(&mut params.contrast, -1.0..=1.0).text("Contrast")).changed();
                changed |= ui.add(egui::Slider::new(&mut params.saturation, -1.0..=1.0).text("Saturation")).changed();
                changed |= ui.add(egui::Slider::new(&mut params.sharpness, 0.0..=1.0).text("Sharpness")).changed();

                ui.separator();
                for profile in ColorProfile::ALL {
                    if ui.radio_value(&mut params.profile, profile, format!("{:?}", profile)).clicked() {
                        changed = true;
                    }
                }
                if ui.button("Reset quality").clicked() {
                    params = QualityParams::default();
                    changed = true;
                }
                if changed {
                    commands.push(Command::SetQuality(params));
                }

                ui.separator();
                ui.label("Resolution (R)");
                for cap in [ResolutionCap::Auto, ResolutionCap::P720, ResolutionCap::P1080, ResolutionCap::P4K] {
                    if ui.radio(hud.cap == cap, cap.label()).clicked() {
                        commands.push(Command::SetResolution(cap));
                        ui.close_menu();
                    }
                }
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if hud.loading {
                ui.label(egui::RichText::new("Loading...").color(egui::Color32::YELLOW));
                ui.label("|");
            }

            ui.label(hud.span.label());
            ui.label("|");
            ui.label(format!("FOV: {:.0}°", hud.fov));
            ui.label("|");

            {
                let fov_rad = hud.fov.to_radians();
                let full_frame_diag = ((36.0f32 * 36.0f32) + (24.0f32 * 24.0f32)).sqrt();
                let equiv_focal = full_frame_diag / (2.0 * (fov_rad * 0.5).tan());
                ui.label(format!("≈{:.1}mm", equiv_focal));
            }

            ui.label("|");
            ui.label(format!("Yaw: {:.1}°", hud.pose.yaw));
            ui.label("|");
            ui.label(format!("Pitch: {:.1}°", hud.pose.pitch));
            ui.label("|");
            ui.label(match hud.mode {
                OrientationMode::Manual => "Drag",
                OrientationMode::SensorFusion => "Head tracking",
            });

            if let Some((w, h)) = hud.native {
                ui.label("|");
                ui.label(format!("{}x{} @ {}", w, h, hud.cap.label()));
            }
            if hud.playing == Some(false) {
                ui.label("|");
                ui.label("Paused");
            }

            ui.label("|");
            ui.label(egui::RichText::new(format!("FPS: {:.1}", hud.fps)).color(egui::Color32::GREEN));

            if let Some(status) = &hud.status {
                ui.label("|");
                ui.label(egui::RichText::new(status).color(egui::Color32::LIGHT_BLUE));
            }
        });
    });
}
