//! Video source acquisition.
//!
//! This module turns an operator's source request into a live media handle:
//! - Camera devices (ideal 1280x720, `default-camera` lets the platform pick)
//! - Network streams (RTSP/HTTP/WS URLs)
//! - Local video files
//!
//! Platform access sits behind `MediaProvider`. `SourceAcquirer` validates
//! requests before any state changes and maps provider failures onto
//! `SessionError::Acquisition` with a remediation hint.
//!
//! The acquirer MUST NOT:
//! - Hold more than the handle it returns
//! - Raise on camera enumeration failure (the list degrades to empty)

pub mod camera;
pub mod file;
pub mod stream;
pub mod synthetic;

use anyhow::Result;

use crate::error::SessionError;
use crate::frame::Frame;
use crate::prefs::InputMode;

pub use camera::{CameraDevice, VideoConstraints, DEFAULT_CAMERA};
pub use file::VideoFile;
pub use synthetic::SyntheticProvider;

/// A source the operator asked to attach.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Camera { device_id: String },
    Stream { url: String },
    File(VideoFile),
}

impl Source {
    pub fn camera(device_id: impl Into<String>) -> Self {
        Self::Camera {
            device_id: device_id.into(),
        }
    }

    pub fn stream(url: impl Into<String>) -> Self {
        Self::Stream { url: url.into() }
    }

    pub fn input_mode(&self) -> InputMode {
        match self {
            Self::Camera { .. } => InputMode::Camera,
            Self::Stream { .. } => InputMode::Stream,
            Self::File(_) => InputMode::File,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.input_mode().as_str()
    }
}

/// Live handle on an acquired source.
pub trait MediaTrack: Send {
    /// Still of the current frame.
    fn grab_frame(&mut self) -> Result<Frame>;

    /// Stop all underlying tracks. Idempotent.
    fn stop(&mut self);

    fn is_live(&self) -> bool;

    /// Locally addressable reference a player can open, if the source has one.
    /// Camera handles have none.
    fn playable_ref(&self) -> Option<String>;

    fn stats(&self) -> TrackStats;
}

#[derive(Clone, Debug)]
pub struct TrackStats {
    pub frames_captured: u64,
    pub width: u32,
    pub height: u32,
    pub label: String,
}

/// Platform seam for camera, stream and file access.
#[allow(async_fn_in_trait)]
pub trait MediaProvider {
    async fn enumerate_cameras(&mut self) -> Result<Vec<CameraDevice>>;

    async fn open_camera(&mut self, constraints: &VideoConstraints) -> Result<Box<dyn MediaTrack>>;

    /// Perform the stream handshake for an already validated URL.
    async fn open_stream(&mut self, url: &url::Url) -> Result<Box<dyn MediaTrack>>;

    async fn open_file(&mut self, file: &VideoFile) -> Result<Box<dyn MediaTrack>>;
}

pub struct SourceAcquirer<P> {
    provider: P,
}

impl<P: MediaProvider> SourceAcquirer<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Reject malformed requests without touching any state.
    pub fn validate(source: &Source) -> Result<(), SessionError> {
        match source {
            Source::Camera { .. } => Ok(()),
            Source::Stream { url } => stream::validate_stream_url(url).map(|_| ()),
            Source::File(file) => file::validate_video_file(file),
        }
    }

    pub async fn acquire(&mut self, source: &Source) -> Result<Box<dyn MediaTrack>, SessionError> {
        Self::validate(source)?;
        match source {
            Source::Camera { device_id } => {
                let constraints = VideoConstraints::for_device(device_id);
                self.provider
                    .open_camera(&constraints)
                    .await
                    .map_err(|e| SessionError::Acquisition {
                        source_kind: "camera",
                        reason: e.to_string(),
                        hint: "check camera permissions and that the device is connected",
                    })
            }
            Source::Stream { url } => {
                let url = stream::validate_stream_url(url)?;
                self.provider
                    .open_stream(&url)
                    .await
                    .map_err(|e| SessionError::Acquisition {
                        source_kind: "stream",
                        reason: e.to_string(),
                        hint: "check the stream URL and that the stream is reachable",
                    })
            }
            Source::File(file) => {
                self.provider
                    .open_file(file)
                    .await
                    .map_err(|e| SessionError::Acquisition {
                        source_kind: "file",
                        reason: e.to_string(),
                        hint: "check that the file exists and is readable",
                    })
            }
        }
    }

    /// Best-effort device list. Failures degrade to an empty list.
    pub async fn enumerate_cameras(&mut self) -> Vec<CameraDevice> {
        match self.provider.enumerate_cameras().await {
            Ok(devices) => camera::normalize_devices(devices),
            Err(e) => {
                log::error!("failed to enumerate cameras: {}", e);
                Vec::new()
            }
        }
    }
}
