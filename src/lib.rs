// lib.rs — 360° 全景查看器核心库；窗口宿主在 main.rs

pub mod camera;
pub mod config;
pub mod error;
pub mod filter;
pub mod mesh;
pub mod orientation;
pub mod panorama;
pub mod pose;
pub mod renderer;
pub mod resource;
pub mod sensor;
pub mod sources;
pub mod stereo;
pub mod video;

pub use config::ViewerConfig;
pub use error::{CoreNotice, ViewerError};
pub use panorama::{FramePlan, PanoramaCore};
