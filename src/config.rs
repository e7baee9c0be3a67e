// config.rs
//
// Runtime configuration:
// - Lives in a single JSON file, every field optional (missing -> default)
// - Lookup: --config <path> -> env PANO360_CONFIG -> <exe_dir>/assets/viewer.json
//   -> ./assets/viewer.json -> built-in defaults
// - A malformed file is logged and ignored

use crate::error::ViewerError;
use crate::video::ResolutionCap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_FOV: f32 = 75.0;
pub const MIN_FOV: f32 = 30.0;
pub const MAX_FOV: f32 = 120.0;

const MAX_IDLE_SECS: f32 = 3600.0;
const MAX_DRAG_SENSITIVITY: f32 = 10.0;
const MAX_SEGMENTS: u32 = 512;

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn positive_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Degrees of rotation per dragged pixel.
    pub drag_sensitivity: f32,
    pub idle_recenter_secs: f32,
    /// Fraction of the remaining offset removed per tick while recentering.
    pub recenter_rate: f32,
    pub fov: f32,
    pub zoom_step: f32,
    pub eye_separation: f32,
    pub surface_radius: f32,
    pub segments: u32,
    pub resolution: ResolutionCap,
    pub vsync: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            drag_sensitivity: 0.15,
            idle_recenter_secs: 5.0,
            recenter_rate: 0.05,
            fov: DEFAULT_FOV,
            zoom_step: 5.0,
            eye_separation: 0.064,
            surface_radius: 250.0,
            segments: 64,
            resolution: ResolutionCap::Auto,
            vsync: true,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(text: &str) -> Result<Self, ViewerError> {
        let mut cfg: ViewerConfig = serde_json::from_str(text)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ViewerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Resolve and load the config the same way every time; never fails.
    pub fn resolve(args: &[String]) -> Self {
        let Some(path) = find_config_file(args) else {
            log::info!("no config file found, using defaults");
            return Self::default();
        };

        match Self::load(&path) {
            Ok(cfg) => {
                log::info!("loaded config from {:?}", path);
                cfg
            }
            Err(e) => {
                log::warn!("ignoring config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    fn sanitize(&mut self) {
        let d = Self::default();
        self.fov = finite_or(self.fov, d.fov).clamp(MIN_FOV, MAX_FOV);
        self.recenter_rate = finite_or(self.recenter_rate, d.recenter_rate).clamp(0.0, 1.0);
        self.idle_recenter_secs = finite_or(self.idle_recenter_secs, d.idle_recenter_secs).clamp(0.0, MAX_IDLE_SECS);
        self.drag_sensitivity = positive_or(self.drag_sensitivity, d.drag_sensitivity).min(MAX_DRAG_SENSITIVITY);
        self.zoom_step = positive_or(self.zoom_step, d.zoom_step).min(MAX_FOV - MIN_FOV);
        self.segments = self.segments.clamp(3, MAX_SEGMENTS);
        self.surface_radius = positive_or(self.surface_radius, d.surface_radius);
        self.eye_separation = finite_or(self.eye_separation, d.eye_separation).abs();
    }
}

/// Value of a `--flag <value>` pair on the command line.
pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == flag {
            return it.next().cloned();
        }
    }
    None
}

fn find_config_file(args: &[String]) -> Option<PathBuf> {
    if let Some(p) = arg_value(args, "--config") {
        return Some(PathBuf::from(p));
    }

    if let Ok(v) = std::env::var("PANO360_CONFIG") {
        if !v.trim().is_empty() {
            return Some(PathBuf::from(v));
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("assets").join("viewer.json");
            if p.exists() {
                return Some(p);
            }
        }
    }

    let p = PathBuf::from("assets").join("viewer.json");
    if p.exists() {
        return Some(p);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let cfg = ViewerConfig::from_json("{}").unwrap();
        assert_eq!(cfg.drag_sensitivity, 0.15);
        assert_eq!(cfg.segments, 64);
        assert_eq!(cfg.resolution, ResolutionCap::Auto);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = ViewerConfig::from_json(r#"{"fov": 170, "recenter_rate": 3.0, "segments": 1}"#)
            .unwrap();
        assert_eq!(cfg.fov, MAX_FOV);
        assert_eq!(cfg.recenter_rate, 1.0);
        assert_eq!(cfg.segments, 3);
    }

    #[test]
    fn huge_idle_delay_is_capped() {
        let cfg = ViewerConfig::from_json(r#"{"idle_recenter_secs": 1e30}"#).unwrap();
        assert_eq!(cfg.idle_recenter_secs, MAX_IDLE_SECS);
        // overflows f32 entirely
        let cfg = ViewerConfig::from_json(r#"{"idle_recenter_secs": 1e300}"#).unwrap();
        assert_eq!(cfg.idle_recenter_secs, 5.0);
        let cfg = ViewerConfig::from_json(r#"{"idle_recenter_secs": -2}"#).unwrap();
        assert_eq!(cfg.idle_recenter_secs, 0.0);
    }

    #[test]
    fn non_positive_zoom_step_falls_back() {
        for json in [r#"{"zoom_step": -5}"#, r#"{"zoom_step": 0}"#, r#"{"zoom_step": 1e300}"#] {
            assert_eq!(ViewerConfig::from_json(json).unwrap().zoom_step, 5.0, "{}", json);
        }
        let cfg = ViewerConfig::from_json(r#"{"zoom_step": 500}"#).unwrap();
        assert_eq!(cfg.zoom_step, MAX_FOV - MIN_FOV);
    }

    #[test]
    fn drag_sensitivity_stays_positive_and_bounded() {
        let cfg = ViewerConfig::from_json(r#"{"drag_sensitivity": -0.3}"#).unwrap();
        assert_eq!(cfg.drag_sensitivity, 0.15);
        let cfg = ViewerConfig::from_json(r#"{"drag_sensitivity": 1e300}"#).unwrap();
        assert_eq!(cfg.drag_sensitivity, 0.15);
        let cfg = ViewerConfig::from_json(r#"{"drag_sensitivity": 99}"#).unwrap();
        assert_eq!(cfg.drag_sensitivity, MAX_DRAG_SENSITIVITY);
    }

    #[test]
    fn segment_count_is_bounded_both_ways() {
        let cfg = ViewerConfig::from_json(r#"{"segments": 4000000000}"#).unwrap();
        assert_eq!(cfg.segments, MAX_SEGMENTS);
        let cfg = ViewerConfig::from_json(r#"{"segments": 0}"#).unwrap();
        assert_eq!(cfg.segments, 3);
    }

    #[test]
    fn resolution_is_parsed_by_name() {
        let cfg = ViewerConfig::from_json(r#"{"resolution": "1080p"}"#).unwrap();
        assert_eq!(cfg.resolution, ResolutionCap::P1080);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            ViewerConfig::from_json("{ nope"),
            Err(ViewerError::ConfigParse(_))
        ));
    }

    #[test]
    fn arg_value_reads_flag_pairs() {
        let args: Vec<String> = ["bin", "--config", "a.json", "--frames"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(arg_value(&args, "--config").as_deref(), Some("a.json"));
        assert_eq!(arg_value(&args, "--frames"), None);
        assert_eq!(arg_value(&args, "--missing"), None);
    }
}
