// End-to-end behaviour of the panorama core through its public API, with a
// counting GPU standing in for wgpu.

use glam::Vec2;
use image::{Rgba, RgbaImage};
use pano360_viewer::config::ViewerConfig;
use pano360_viewer::error::{CoreNotice, ViewerError};
use pano360_viewer::filter::{apply_to_image, QualityParams};
use pano360_viewer::mesh::{SurfaceDescriptor, ViewSpan};
use pano360_viewer::panorama::PanoramaCore;
use pano360_viewer::pose::OrientationMode;
use pano360_viewer::resource::GpuBackend;
use pano360_viewer::sensor::{sensor_channel, NoSensor, Permission, SensorFeed, SensorGate, SensorSample, SensorSender};
use pano360_viewer::sources::StillImageSource;
use pano360_viewer::stereo::Eye;
use pano360_viewer::video::{FrameSource, RefreshOutcome};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct CountingGpu {
    meshes_created: usize,
    meshes_released: usize,
    textures_created: usize,
    textures_released: usize,
    writes: usize,
}

impl GpuBackend for CountingGpu {
    type Mesh = usize;
    type Texture = usize;

    fn create_mesh(&mut self, surface: &SurfaceDescriptor) -> usize {
        self.meshes_created += 1;
        surface.indices.len()
    }
    fn release_mesh(&mut self, _: usize) {
        self.meshes_released += 1;
    }
    fn create_texture(&mut self, _: u32, _: u32) -> usize {
        self.textures_created += 1;
        self.textures_created
    }
    fn write_texture(&mut self, _: &usize, _: &RgbaImage) {
        self.writes += 1;
    }
    fn release_texture(&mut self, _: usize) {
        self.textures_released += 1;
    }
    fn max_texture_dimension(&self) -> u32 {
        8192
    }
}

/// Grants access and shares the sender so the test can push readings.
#[derive(Default)]
struct ScriptedSensor {
    sender: Rc<RefCell<Option<SensorSender>>>,
}

impl SensorGate for ScriptedSensor {
    fn request_permission(&mut self) -> Permission {
        Permission::Granted
    }
    fn attach(&mut self) -> Result<SensorFeed, ViewerError> {
        let (tx, feed) = sensor_channel();
        *self.sender.borrow_mut() = Some(tx);
        Ok(feed)
    }
    fn detach(&mut self) {
        *self.sender.borrow_mut() = None;
    }
}

fn new_core(gpu: &mut CountingGpu, start: Instant) -> PanoramaCore<CountingGpu> {
    PanoramaCore::new(ViewerConfig::default(), Box::new(NoSensor), gpu, 1920, 1080, start)
}

#[test]
fn repeated_span_changes_keep_one_live_geometry() {
    let mut gpu = CountingGpu::default();
    let mut core = new_core(&mut gpu, Instant::now());

    for i in 0..30 {
        core.set_view_span(ViewSpan::ALL[i % 3], &mut gpu);
        assert_eq!(core.geometry_ledger().live(), 1);
    }
    assert_eq!(gpu.meshes_created, gpu.meshes_released + 1);
    assert_eq!(core.geometry_ledger().created(), gpu.meshes_created);
}

#[test]
fn wedge_after_full_sphere_disposes_old_geometry() {
    let mut gpu = CountingGpu::default();
    let mut core = new_core(&mut gpu, Instant::now());
    let full = core.geometry_probe().unwrap();
    assert!(!full.is_disposed());

    core.set_view_span(ViewSpan::Wedge120, &mut gpu);

    assert!(full.is_disposed());
    assert_eq!(core.view_span(), ViewSpan::Wedge120);
    assert!((core.surface().horizontal_extent_degrees() - 120.0).abs() < 0.01);
    assert!(!core.geometry_probe().unwrap().is_disposed());
}

#[test]
fn drag_right_fifty_pixels_turns_seven_and_a_half_degrees() {
    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let mut core = new_core(&mut gpu, start);

    core.on_drag_start(Vec2::new(100.0, 100.0), start);
    core.on_drag_move(Vec2::new(150.0, 100.0), start);
    core.on_drag_end(start);

    let pose = core.tick(start, &mut gpu).unwrap().pose;
    assert!((pose.yaw - 7.5).abs() < 1e-4);
    assert_eq!(pose.pitch, 0.0);
}

#[test]
fn pitch_stays_clamped_under_long_drags() {
    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let mut core = new_core(&mut gpu, start);

    core.on_drag_start(Vec2::new(0.0, 0.0), start);
    let mut y = 0.0;
    for step in 0..200 {
        y += if step < 120 { 37.0 } else { -91.0 };
        core.on_drag_move(Vec2::new(0.0, y), start);
        let pitch = core.pose().pitch;
        assert!((-85.0..=85.0).contains(&pitch), "pitch {} escaped", pitch);
    }
}

#[test]
fn idle_recenter_converges_without_overshoot() {
    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let mut core = new_core(&mut gpu, start);

    // (40, 20) via one drag: yaw +40 from dx, pitch +20 from a downward drag
    core.on_drag_start(Vec2::new(0.0, 0.0), start);
    core.on_drag_move(Vec2::new(40.0 / 0.15, 20.0 / 0.15), start);
    core.on_drag_end(start);
    let pose = core.pose();
    assert!((pose.yaw - 40.0).abs() < 1e-3 && (pose.pitch - 20.0).abs() < 1e-3);

    // still inside the idle threshold: nothing moves
    let early = core.tick(start + Duration::from_secs(4), &mut gpu).unwrap().pose;
    assert_eq!(early, pose);

    let mut last = pose.magnitude();
    let mut now = start + Duration::from_secs(5);
    for _ in 0..600 {
        now += Duration::from_millis(16);
        let p = core.tick(now, &mut gpu).unwrap().pose;
        assert!(p.yaw >= 0.0 && p.pitch >= 0.0, "overshot to {:?}", p);
        assert!(p.magnitude() <= last);
        last = p.magnitude();
    }
    assert!(last < 1e-3);
}

#[test]
fn sensor_readings_are_deterministic() {
    let start = Instant::now();
    let readings = [
        SensorSample::landscape(30.0, 80.0, 5.0),
        SensorSample::landscape(42.0, 70.0, -3.0),
        SensorSample::portrait(10.0, 95.0, 2.0),
    ];

    let run = || {
        let mut gpu = CountingGpu::default();
        let sensor = ScriptedSensor::default();
        let sender = sensor.sender.clone();
        let mut core = PanoramaCore::new(ViewerConfig::default(), Box::new(sensor), &mut gpu, 800, 600, start);
        core.set_orientation_mode(OrientationMode::SensorFusion, start);
        assert_eq!(core.orientation_mode(), OrientationMode::SensorFusion);

        readings
            .iter()
            .map(|sample| {
                if let Some(tx) = sender.borrow().as_ref() {
                    tx.send(*sample);
                }
                core.tick(start, &mut gpu).unwrap().pose
            })
            .collect::<Vec<_>>()
    };

    let (first, second) = (run(), run());
    assert_eq!(first, second);
    // the first reading sets the heading baseline: the view starts where it was
    assert!(first[0].yaw.abs() < 1e-3);
}

#[test]
fn neutral_quality_is_identity_on_pixels() {
    let mut img = RgbaImage::new(3, 3);
    for (i, p) in img.pixels_mut().enumerate() {
        *p = Rgba([(i * 25) as u8, 200 - (i * 10) as u8, 17, 255]);
    }
    assert_eq!(apply_to_image(&QualityParams::default(), &img), img);
}

#[test]
fn stereo_passes_split_the_target_without_gaps() {
    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let mut core = new_core(&mut gpu, start);

    for width in [1920u32, 1081] {
        core.resize(width, 1080);
        core.set_stereo(true);
        let plan = core.tick(start, &mut gpu).unwrap();
        assert_eq!(plan.passes.len(), 2);
        let (l, r) = (plan.passes[0], plan.passes[1]);
        assert_eq!((l.eye, r.eye), (Eye::Left, Eye::Right));
        assert_eq!(l.viewport.width, width / 2);
        assert_eq!(l.viewport.x + l.viewport.width, r.viewport.x);
        assert_eq!(r.viewport.x + r.viewport.width, width);
        assert_eq!((l.viewport.height, r.viewport.height), (1080, 1080));
        core.set_stereo(false);
    }

    let plan = core.tick(start, &mut gpu).unwrap();
    assert_eq!(plan.passes.len(), 1);
    assert_eq!(plan.passes[0].eye, Eye::Mono);
}

#[test]
fn swapping_sources_never_leaks_textures() {
    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let mut core = new_core(&mut gpu, start);

    for _ in 0..10 {
        let source: Box<dyn FrameSource> = Box::new(StillImageSource::from_image(RgbaImage::new(64, 32)));
        core.bind_source(source, &mut gpu);
        // nothing from the previous source may be drawn before the new one uploads
        assert!(core.video().texture().is_none());
        let plan = core.tick(start, &mut gpu).unwrap();
        assert_eq!(plan.refresh, RefreshOutcome::Uploaded);
        assert!(plan.texture.is_some());
        assert_eq!(core.texture_ledger().live(), 1);
    }
    assert_eq!(gpu.textures_created, 10);
    assert_eq!(gpu.textures_released, 9);

    // a still image is uploaded once and then left alone
    core.tick(start, &mut gpu).unwrap();
    assert_eq!(gpu.writes, 10);
}

#[test]
fn first_frame_size_reaches_the_same_ticks_filter() {
    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let mut core = new_core(&mut gpu, start);
    core.bind_source(Box::new(StillImageSource::from_image(RgbaImage::new(4000, 2000))), &mut gpu);

    let plan = core.tick(start, &mut gpu).unwrap();
    assert_eq!(plan.refresh, RefreshOutcome::Uploaded);
    assert_eq!(plan.filter.texel, [1.0 / 4000.0, 1.0 / 2000.0]);
    assert_eq!(
        core.take_notices(),
        vec![CoreNotice::SourceDimensions { width: 4000, height: 2000 }]
    );
}

#[test]
fn unreadable_source_goes_black_and_reports_once() {
    struct Broken;
    impl FrameSource for Broken {
        fn is_playing(&self) -> bool {
            true
        }
        fn dimensions(&self) -> Option<(u32, u32)> {
            None
        }
        fn next_frame(&mut self) -> Result<Option<RgbaImage>, ViewerError> {
            Err(ViewerError::SourceUnreadable("codec".into()))
        }
    }

    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let mut core = new_core(&mut gpu, start);
    core.bind_source(Box::new(Broken), &mut gpu);

    for _ in 0..3 {
        let plan = core.tick(start, &mut gpu).unwrap();
        assert!(plan.texture.is_none());
    }
    let notices = core.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(matches!(notices[0], CoreNotice::SourceUnreadable(_)));
}

#[test]
fn teardown_stops_the_loop_and_releases_everything() {
    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let mut core = new_core(&mut gpu, start);
    core.bind_source(Box::new(StillImageSource::from_image(RgbaImage::new(8, 4))), &mut gpu);
    core.tick(start, &mut gpu).unwrap();

    core.teardown(&mut gpu);

    assert!(!core.is_running());
    assert!(matches!(core.tick(start, &mut gpu), Err(ViewerError::LoopStopped)));
    assert_eq!(core.geometry_ledger().live(), 0);
    assert_eq!(core.texture_ledger().live(), 0);
    assert_eq!(gpu.meshes_released, 1);
    assert_eq!(gpu.textures_released, 1);
}

#[test]
fn leaving_sensor_mode_on_teardown_detaches_listener() {
    let mut gpu = CountingGpu::default();
    let start = Instant::now();
    let sensor = ScriptedSensor::default();
    let sender = sensor.sender.clone();
    let mut core = PanoramaCore::new(ViewerConfig::default(), Box::new(sensor), &mut gpu, 800, 600, start);
    core.set_orientation_mode(OrientationMode::SensorFusion, start);
    core.teardown(&mut gpu);
    assert_eq!(core.orientation_mode(), OrientationMode::Manual);
    assert!(sender.borrow().is_none());
}
