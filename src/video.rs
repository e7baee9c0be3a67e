// video.rs — 视频帧纹理绑定：每帧同步 GPU 纹理，暂停时跳过重复上传

use crate::error::{CoreNotice, ViewerError};
use crate::filter::PostFilter;
use crate::resource::{GpuBackend, ResourceLedger, Tracked};
use image::imageops::FilterType;
use image::RgbaImage;
use serde::Deserialize;

/// Anything that exposes a continuously updating RGBA surface.
///
/// Play/pause/seek belong to the host; the core only reads frames and status.
pub trait FrameSource {
    fn is_playing(&self) -> bool;
    /// Native frame size, once the source knows it.
    fn dimensions(&self) -> Option<(u32, u32)>;
    /// Newest frame not yet handed out, `Ok(None)` when nothing new is ready.
    fn next_frame(&mut self) -> Result<Option<RgbaImage>, ViewerError>;
}

/// Upper bound on uploaded frame height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ResolutionCap {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "4k")]
    P4K,
}

impl ResolutionCap {
    pub fn max_height(self) -> Option<u32> {
        match self {
            ResolutionCap::Auto => None,
            ResolutionCap::P720 => Some(720),
            ResolutionCap::P1080 => Some(1080),
            ResolutionCap::P4K => Some(2160),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResolutionCap::Auto => "AUTO",
            ResolutionCap::P720 => "720P",
            ResolutionCap::P1080 => "1080P",
            ResolutionCap::P4K => "4K",
        }
    }
}

/// Texture size for a frame under the cap and the GPU's dimension limit,
/// keeping the aspect ratio.
pub fn fit_dimensions(width: u32, height: u32, cap: ResolutionCap, max_dim: u32) -> (u32, u32) {
    let mut scale = 1.0f64;
    if let Some(h) = cap.max_height() {
        scale = scale.min(h as f64 / height as f64);
    }
    scale = scale.min(max_dim as f64 / width.max(height) as f64);
    if scale >= 1.0 {
        return (width, height);
    }
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_dim);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_dim);
    (w, h)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    NoSource,
    /// Paused with content already on the GPU; nothing uploaded.
    Paused,
    /// Source has not produced a new frame yet.
    Pending,
    Uploaded,
    /// Source failed; it was unbound and the surface is black.
    Unreadable,
}

struct SurfaceTexture<T> {
    handle: Tracked<T>,
    width: u32,
    height: u32,
}

pub struct VideoSurface<T> {
    source: Option<Box<dyn FrameSource>>,
    texture: Option<SurfaceTexture<T>>,
    ledger: ResourceLedger,
    cap: ResolutionCap,
    native: Option<(u32, u32)>,
    /// Last native frame, re-uploaded when the texture is rebuilt while the
    /// source has nothing new (still images, paused playback).
    last_frame: Option<RgbaImage>,
    has_content: bool,
    notices: Vec<CoreNotice>,
}

impl<T> VideoSurface<T> {
    pub fn new(cap: ResolutionCap) -> Self {
        Self {
            source: None,
            texture: None,
            ledger: ResourceLedger::new(),
            cap,
            native: None,
            last_frame: None,
            has_content: false,
            notices: Vec::new(),
        }
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    pub fn native_dimensions(&self) -> Option<(u32, u32)> {
        self.native
    }

    pub fn texture_dimensions(&self) -> Option<(u32, u32)> {
        self.texture.as_ref().map(|t| (t.width, t.height))
    }

    pub fn take_notices(&mut self) -> Vec<CoreNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Texture to sample this tick, `None` while nothing has been uploaded.
    pub fn texture(&self) -> Option<&Tracked<T>> {
        if self.has_content {
            self.texture.as_ref().map(|t| &t.handle)
        } else {
            None
        }
    }

    pub fn cap(&self) -> ResolutionCap {
        self.cap
    }

    /// Change the upload cap; the next refresh re-uploads at the new size.
    pub fn set_cap<G: GpuBackend<Texture = T>>(&mut self, cap: ResolutionCap, gpu: &mut G) {
        if cap == self.cap {
            return;
        }
        self.cap = cap;
        self.release_texture(gpu);
    }

    /// Replace the frame source. The old texture is released before the new
    /// source can produce anything, so no stale frame is ever sampled.
    pub fn bind<G: GpuBackend<Texture = T>>(&mut self, source: Box<dyn FrameSource>, gpu: &mut G) {
        self.unbind(gpu);
        self.source = Some(source);
        log::info!("frame source bound");
    }

    pub fn unbind<G: GpuBackend<Texture = T>>(&mut self, gpu: &mut G) {
        self.release_texture(gpu);
        self.source = None;
        self.native = None;
        self.last_frame = None;
    }

    fn release_texture<G: GpuBackend<Texture = T>>(&mut self, gpu: &mut G) {
        if let Some(mut tex) = self.texture.take() {
            if let Some(inner) = tex.handle.dispose() {
                gpu.release_texture(inner);
            }
            log::debug!("video texture {}x{} released", tex.width, tex.height);
        }
        self.has_content = false;
    }

    /// Once per render tick.
    pub fn refresh<G: GpuBackend<Texture = T>>(&mut self, gpu: &mut G, filter: &mut PostFilter) -> RefreshOutcome {
        let Some(reported) = self.source.as_ref().map(|s| s.dimensions()) else {
            return RefreshOutcome::NoSource;
        };
        // 尺寸信息与帧数据异步到达
        self.note_dimensions(reported, filter);
        let Some(source) = self.source.as_mut() else {
            return RefreshOutcome::NoSource;
        };

        if !source.is_playing() && self.has_content {
            return RefreshOutcome::Paused;
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => match self.last_frame.take() {
                Some(frame) if self.texture.is_none() => frame,
                retained => {
                    self.last_frame = retained;
                    return RefreshOutcome::Pending;
                }
            },
            Err(e) => {
                log::warn!("unbinding frame source: {}", e);
                self.notices.push(CoreNotice::SourceUnreadable(e.to_string()));
                self.unbind(gpu);
                return RefreshOutcome::Unreadable;
            }
        };
        if frame.width() == 0 || frame.height() == 0 {
            return RefreshOutcome::Pending;
        }
        // 部分帧源只有拿到第一帧才知道尺寸
        let reported = self.source.as_ref().and_then(|s| s.dimensions());
        self.note_dimensions(reported.or(Some(frame.dimensions())), filter);

        self.upload(gpu, &frame);
        self.last_frame = Some(frame);
        RefreshOutcome::Uploaded
    }

    fn note_dimensions(&mut self, dims: Option<(u32, u32)>, filter: &mut PostFilter) {
        let Some((w, h)) = dims else { return };
        if self.native == Some((w, h)) || w == 0 || h == 0 {
            return;
        }
        self.native = Some((w, h));
        filter.set_source_resolution(w, h);
        self.notices.push(CoreNotice::SourceDimensions { width: w, height: h });
        log::info!("frame source resolution {}x{}", w, h);
    }

    fn upload<G: GpuBackend<Texture = T>>(&mut self, gpu: &mut G, frame: &RgbaImage) {
        let (w, h) = fit_dimensions(frame.width(), frame.height(), self.cap, gpu.max_texture_dimension());
        let resampled;
        let frame = if (w, h) != frame.dimensions() {
            resampled = image::imageops::resize(frame, w, h, FilterType::Triangle);
            &resampled
        } else {
            frame
        };

        let needs_creation = match &self.texture {
            Some(t) => t.width != w || t.height != h,
            None => true,
        };
        if needs_creation {
            self.release_texture(gpu);
            let handle = self.ledger.track("video texture", gpu.create_texture(w, h));
            self.texture = Some(SurfaceTexture { handle, width: w, height: h });
            log::info!("video texture created {}x{}", w, h);
        }

        if let Some(tex) = &self.texture {
            if let Ok(inner) = tex.handle.get() {
                gpu.write_texture(inner, &frame);
                self.has_content = true;
            }
        }
    }
}
