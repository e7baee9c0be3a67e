// sources.rs — 宿主侧帧源：单张全景图 / 图片序列（后台线程解码）
//
// 这里不做视频解码，只把已经是图像的帧按节奏送给核心。

use crate::error::ViewerError;
use crate::video::FrameSource;
use image::io::Reader as ImageReader;
use image::{GenericImage, Rgba, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, sync_channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

type FrameResult = Result<RgbaImage, String>;

pub fn load_image(path: &Path) -> Result<RgbaImage, ViewerError> {
    let file = File::open(path).map_err(|e| ViewerError::SourceUnreadable(format!("{:?}: {}", path, e)))?;
    let reader = BufReader::new(file);

    let img = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })
        .map_err(|e| ViewerError::SourceUnreadable(format!("{:?}: {}", path, e)))?;

    Ok(img.to_rgba8())
}

/// Pad a frame shorter than 2:1 up to equirectangular proportions, keeping the
/// image at the bottom so the missing sky renders black.
pub fn pad_to_equirect(img: RgbaImage) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();
    let target_h = src_w / 2;
    if target_h == 0 || src_h >= target_h {
        return img;
    }

    let mut canvas = RgbaImage::from_pixel(src_w, target_h, Rgba([0, 0, 0, 255]));
    // y_offset 已保证不会越界
    let _ = canvas.copy_from(&img, 0, target_h - src_h);
    canvas
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// A single panorama, decoded in the background. Never "playing": the core
/// uploads it once and then keeps the texture.
pub struct StillImageSource {
    rx: Receiver<FrameResult>,
    dims: Option<(u32, u32)>,
}

impl StillImageSource {
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = channel();
        thread::spawn(move || {
            log::info!("loading panorama {:?}", path);
            let result = load_image(&path).map(pad_to_equirect).map_err(|e| e.to_string());
            if let Ok(img) = &result {
                log::info!("panorama decoded {}x{}", img.width(), img.height());
            }
            let _ = tx.send(result);
        });
        Self { rx, dims: None }
    }

    pub fn from_image(img: RgbaImage) -> Self {
        let (tx, rx) = channel();
        let _ = tx.send(Ok(img));
        Self { rx, dims: None }
    }
}

impl FrameSource for StillImageSource {
    fn is_playing(&self) -> bool {
        false
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dims
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>, ViewerError> {
        match self.rx.try_recv() {
            Ok(Ok(img)) => {
                self.dims = Some(img.dimensions());
                Ok(Some(img))
            }
            Ok(Err(e)) => Err(ViewerError::SourceUnreadable(e)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }
}

/// Play / pause handle the host keeps after handing the source to the core.
#[derive(Clone)]
pub struct PlaybackHandle {
    playing: Arc<AtomicBool>,
}

impl PlaybackHandle {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn toggle(&self) -> bool {
        !self.playing.fetch_xor(true, Ordering::Relaxed)
    }
}

/// Numbered frames in a directory, decoded ahead on a worker thread and
/// looped at a fixed frame rate.
pub struct ImageSequenceSource {
    rx: Receiver<FrameResult>,
    playing: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    dims: Option<(u32, u32)>,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f32) -> Result<(Self, PlaybackHandle), ViewerError> {
        let frames = list_frames(dir)?;
        let frame_time = frame_interval(fps);
        log::info!("image sequence {:?}: {} frames at {:.1} fps", dir, frames.len(), fps);

        let (tx, rx) = sync_channel::<FrameResult>(2);
        let playing = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        let (playing_w, stop_w) = (playing.clone(), stop.clone());
        thread::spawn(move || {
            let mut next_due = Instant::now();
            'outer: loop {
                for path in &frames {
                    while !playing_w.load(Ordering::Relaxed) {
                        if stop_w.load(Ordering::Relaxed) {
                            break 'outer;
                        }
                        thread::sleep(Duration::from_millis(10));
                        next_due = Instant::now();
                    }
                    if stop_w.load(Ordering::Relaxed) {
                        break 'outer;
                    }

                    let frame = load_image(path).map_err(|e| e.to_string());
                    let failed = frame.is_err();
                    if tx.send(frame).is_err() || failed {
                        break 'outer;
                    }

                    next_due += frame_time;
                    let now = Instant::now();
                    if next_due > now {
                        thread::sleep(next_due - now);
                    } else {
                        next_due = now;
                    }
                }
            }
            log::debug!("image sequence worker stopped");
        });

        let handle = PlaybackHandle { playing: playing.clone() };
        Ok((Self { rx, playing, stop, dims: None }, handle))
    }
}

/// Per-frame delay for a playback rate, limited to 1..=240 fps. A rate that
/// is not a number plays at 30 fps.
fn frame_interval(fps: f32) -> Duration {
    let fps = if fps.is_nan() { 30.0 } else { fps.clamp(1.0, 240.0) };
    Duration::from_secs_f32(1.0 / fps)
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, ViewerError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ViewerError::SourceUnreadable(format!("{:?}: {}", dir, e)))?;
    let mut frames: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| is_image_path(p))
        .collect();
    frames.sort();
    if frames.is_empty() {
        return Err(ViewerError::SourceUnreadable(format!("{:?}: no image frames", dir)));
    }
    Ok(frames)
}

impl FrameSource for ImageSequenceSource {
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dims
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>, ViewerError> {
        match self.rx.try_recv() {
            Ok(Ok(img)) => {
                self.dims = Some(img.dimensions());
                Ok(Some(img))
            }
            Ok(Err(e)) => Err(ViewerError::SourceUnreadable(e)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(ViewerError::SourceUnreadable("frame worker stopped".to_string()))
            }
        }
    }
}

impl Drop for ImageSequenceSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_images_are_padded_at_the_top() {
        let img = RgbaImage::from_pixel(8, 2, Rgba([9, 9, 9, 255]));
        let padded = pad_to_equirect(img);
        assert_eq!(padded.dimensions(), (8, 4));
        assert_eq!(padded.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(padded.get_pixel(0, 3).0, [9, 9, 9, 255]);
    }

    #[test]
    fn equirect_images_are_untouched() {
        let img = RgbaImage::new(8, 4);
        assert_eq!(pad_to_equirect(img.clone()), img);
    }

    #[test]
    fn still_source_hands_out_one_frame() {
        let mut src = StillImageSource::from_image(RgbaImage::new(4, 2));
        assert!(!src.is_playing());
        assert_eq!(src.dimensions(), None);
        assert!(src.next_frame().unwrap().is_some());
        assert_eq!(src.dimensions(), Some((4, 2)));
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn image_extension_filter() {
        assert!(is_image_path(Path::new("frame_0001.PNG")));
        assert!(is_image_path(Path::new("a/b.jpeg")));
        assert!(!is_image_path(Path::new("clip.mp4")));
        assert!(!is_image_path(Path::new("noext")));
    }

    #[test]
    fn missing_sequence_directory_is_unreadable() {
        assert!(matches!(
            ImageSequenceSource::open(Path::new("/no/such/dir"), 30.0),
            Err(ViewerError::SourceUnreadable(_))
        ));
    }

    #[test]
    fn frame_interval_survives_bad_rates() {
        assert_eq!(frame_interval(f32::NAN), Duration::from_secs_f32(1.0 / 30.0));
        assert_eq!(frame_interval(f32::INFINITY), Duration::from_secs_f32(1.0 / 240.0));
        assert_eq!(frame_interval(-5.0), Duration::from_secs(1));
        assert_eq!(frame_interval(32.0), Duration::from_micros(31_250));
    }

    #[test]
    fn playback_handle_toggles() {
        let h = PlaybackHandle { playing: Arc::new(AtomicBool::new(true)) };
        assert!(!h.toggle());
        assert!(!h.is_playing());
        assert!(h.toggle());
    }
}
