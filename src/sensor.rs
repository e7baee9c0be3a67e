// sensor.rs — 设备朝向传感器输入（异步推送源）

use crate::error::ViewerError;
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Raw device-orientation angles in degrees.
///
/// `alpha` is the compass heading, `beta` the front-back tilt and `gamma` the
/// left-right tilt, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerSample {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

/// A sensor reading tagged with the screen orientation it was taken in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorSample {
    Portrait(EulerSample),
    Landscape(EulerSample),
}

impl SensorSample {
    pub fn portrait(alpha: f32, beta: f32, gamma: f32) -> Self {
        Self::Portrait(EulerSample { alpha, beta, gamma })
    }

    pub fn landscape(alpha: f32, beta: f32, gamma: f32) -> Self {
        Self::Landscape(EulerSample { alpha, beta, gamma })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Host-side access to the orientation sensor.
pub trait SensorGate {
    /// Ask the platform for sensor access. Called at most once per session.
    fn request_permission(&mut self) -> Permission;
    /// Start delivering samples.
    fn attach(&mut self) -> Result<SensorFeed, ViewerError>;
    /// Stop delivering samples. Must be safe to call when not attached.
    fn detach(&mut self);
}

/// Sending half handed to whatever thread or callback produces samples.
#[derive(Clone)]
pub struct SensorSender {
    tx: Sender<SensorSample>,
}

impl SensorSender {
    /// Returns false once the receiving side is gone.
    pub fn send(&self, sample: SensorSample) -> bool {
        self.tx.send(sample).is_ok()
    }
}

/// Receiving half, drained by the render loop between ticks.
pub struct SensorFeed {
    rx: Receiver<SensorSample>,
}

impl SensorFeed {
    /// Newest pending sample, discarding older ones. Samples arrive whole, so
    /// a tick never sees a partially written orientation.
    pub fn latest(&self) -> Option<SensorSample> {
        let mut newest = None;
        loop {
            match self.rx.try_recv() {
                Ok(s) => newest = Some(s),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        newest
    }
}

pub fn sensor_channel() -> (SensorSender, SensorFeed) {
    let (tx, rx) = channel();
    (SensorSender { tx }, SensorFeed { rx })
}

/// Platforms without an orientation sensor.
#[derive(Debug, Default)]
pub struct NoSensor;

impl SensorGate for NoSensor {
    fn request_permission(&mut self) -> Permission {
        Permission::Denied
    }

    fn attach(&mut self) -> Result<SensorFeed, ViewerError> {
        Err(ViewerError::SensorUnavailable("no orientation sensor".to_string()))
    }

    fn detach(&mut self) {}
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    alpha: f32,
    beta: f32,
    gamma: f32,
    #[serde(default)]
    landscape: bool,
    #[serde(default = "default_dt_ms")]
    dt_ms: u64,
}

fn default_dt_ms() -> u64 {
    16
}

/// Replays a JSON-lines orientation log on its own thread.
pub struct ReplaySensor {
    path: PathBuf,
    stop: Option<Arc<AtomicBool>>,
}

impl ReplaySensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), stop: None }
    }
}

impl SensorGate for ReplaySensor {
    fn request_permission(&mut self) -> Permission {
        if std::fs::metadata(&self.path).map(|m| m.is_file()).unwrap_or(false) {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    fn attach(&mut self) -> Result<SensorFeed, ViewerError> {
        self.detach();

        let file = std::fs::File::open(&self.path)
            .map_err(|e| ViewerError::SensorUnavailable(format!("{:?}: {}", self.path, e)))?;
        let (sender, feed) = sensor_channel();
        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Some(stop.clone());

        let path = self.path.clone();
        thread::spawn(move || {
            log::info!("replaying orientation log {:?}", path);
            for (n, line) in BufReader::new(file).lines().enumerate() {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let rec: ReplayLine = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("orientation log line {}: {}", n + 1, e);
                        continue;
                    }
                };
                let sample = if rec.landscape {
                    SensorSample::landscape(rec.alpha, rec.beta, rec.gamma)
                } else {
                    SensorSample::portrait(rec.alpha, rec.beta, rec.gamma)
                };
                if !sender.send(sample) {
                    break;
                }
                thread::sleep(Duration::from_millis(rec.dt_ms));
            }
            log::debug!("orientation replay finished");
        });

        Ok(feed)
    }

    fn detach(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
    }
}

impl Drop for ReplaySensor {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_returns_only_the_newest_sample() {
        let (tx, feed) = sensor_channel();
        assert_eq!(feed.latest(), None);
        tx.send(SensorSample::portrait(1.0, 90.0, 0.0));
        tx.send(SensorSample::portrait(2.0, 90.0, 0.0));
        tx.send(SensorSample::portrait(3.0, 90.0, 0.0));
        assert_eq!(feed.latest(), Some(SensorSample::portrait(3.0, 90.0, 0.0)));
        assert_eq!(feed.latest(), None);
    }

    #[test]
    fn sender_notices_dropped_feed() {
        let (tx, feed) = sensor_channel();
        drop(feed);
        assert!(!tx.send(SensorSample::portrait(0.0, 0.0, 0.0)));
    }

    #[test]
    fn missing_replay_file_is_denied() {
        let mut gate = ReplaySensor::new("/definitely/not/here.jsonl");
        assert_eq!(gate.request_permission(), Permission::Denied);
        assert!(gate.attach().is_err());
    }

    #[test]
    fn replay_line_defaults() {
        let rec: ReplayLine = serde_json::from_str(r#"{"alpha":1,"beta":2,"gamma":3}"#).unwrap();
        assert!(!rec.landscape);
        assert_eq!(rec.dt_ms, 16);
    }
}
