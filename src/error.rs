// error.rs — 错误类型与上报给宿主的通知

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("orientation sensor permission denied")]
    PermissionDenied,
    #[error("orientation sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("frame source unreadable: {0}")]
    SourceUnreadable(String),
    #[error("{0} used after dispose")]
    DisposedResource(&'static str),
    #[error("render loop already stopped")]
    LoopStopped,
    #[error("GPU error: {0}")]
    Gpu(String),
    #[error("config IO error: {0}")]
    Config(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Non-fatal conditions the core hands back to the host instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreNotice {
    /// Sensor access refused; the model stayed in (or reverted to) manual mode.
    PermissionDenied,
    /// Sensor listener could not be attached.
    SensorUnavailable(String),
    /// The bound frame source stopped producing readable frames.
    SourceUnreadable(String),
    /// Native frame dimensions became known or changed.
    SourceDimensions { width: u32, height: u32 },
}
