//! Synthetic media provider.
//!
//! Generates patterned frames for cameras, streams and files without touching
//! real devices. The stream "handshake" is a fixed delay: it stands in for a
//! real RTSP/WS negotiation and logs a warning whenever it is used.

use anyhow::{anyhow, Result};
use std::time::Duration;

use super::camera::{CameraDevice, VideoConstraints};
use super::file::VideoFile;
use super::{MediaProvider, MediaTrack, TrackStats};
use crate::frame::Frame;

pub const DEFAULT_STREAM_CONNECT_DELAY: Duration = Duration::from_secs(2);

const STREAM_WIDTH: u32 = 640;
const STREAM_HEIGHT: u32 = 480;

pub struct SyntheticProvider {
    cameras: Vec<CameraDevice>,
    camera_denied: bool,
    enumeration_fails: bool,
    stream_delay: Duration,
    frame_size: Option<(u32, u32)>,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self {
            cameras: vec![CameraDevice {
                device_id: "stub-camera-0".to_string(),
                label: "Synthetic camera".to_string(),
            }],
            camera_denied: false,
            enumeration_fails: false,
            stream_delay: DEFAULT_STREAM_CONNECT_DELAY,
            frame_size: None,
        }
    }

    pub fn with_cameras(mut self, cameras: Vec<CameraDevice>) -> Self {
        self.cameras = cameras;
        self
    }

    /// Simulate the operator refusing camera permission.
    pub fn with_camera_denied(mut self, denied: bool) -> Self {
        self.camera_denied = denied;
        self
    }

    pub fn with_enumeration_failure(mut self, fails: bool) -> Self {
        self.enumeration_fails = fails;
        self
    }

    pub fn with_stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = delay;
        self
    }

    /// Override the generated frame size for every source kind.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    fn size_or(&self, width: u32, height: u32) -> (u32, u32) {
        self.frame_size.unwrap_or((width, height))
    }
}

impl MediaProvider for SyntheticProvider {
    async fn enumerate_cameras(&mut self) -> Result<Vec<CameraDevice>> {
        if self.enumeration_fails {
            return Err(anyhow!("device enumeration unavailable"));
        }
        Ok(self.cameras.clone())
    }

    async fn open_camera(&mut self, constraints: &VideoConstraints) -> Result<Box<dyn MediaTrack>> {
        if self.camera_denied {
            return Err(anyhow!("permission denied"));
        }
        let device = match &constraints.device_id {
            Some(id) => self
                .cameras
                .iter()
                .find(|camera| &camera.device_id == id)
                .ok_or_else(|| anyhow!("camera '{}' not found", id))?,
            None => self
                .cameras
                .first()
                .ok_or_else(|| anyhow!("no camera available"))?,
        };
        let (width, height) = self.size_or(constraints.ideal_width, constraints.ideal_height);
        log::info!(
            "SyntheticProvider: camera {} opened at {}x{}",
            device.device_id,
            width,
            height
        );
        Ok(Box::new(SyntheticTrack::new(
            device.label.clone(),
            width,
            height,
            None,
        )))
    }

    async fn open_stream(&mut self, url: &url::Url) -> Result<Box<dyn MediaTrack>> {
        log::warn!(
            "SyntheticProvider: simulating stream handshake for {} ({}ms delay)",
            url,
            self.stream_delay.as_millis()
        );
        tokio::time::sleep(self.stream_delay).await;
        let (width, height) = self.size_or(STREAM_WIDTH, STREAM_HEIGHT);
        Ok(Box::new(SyntheticTrack::new(
            url.to_string(),
            width,
            height,
            Some(url.to_string()),
        )))
    }

    async fn open_file(&mut self, file: &VideoFile) -> Result<Box<dyn MediaTrack>> {
        let metadata = tokio::fs::metadata(&file.path)
            .await
            .map_err(|e| anyhow!("cannot open {}: {}", file.path.display(), e))?;
        if !metadata.is_file() {
            return Err(anyhow!("{} is not a regular file", file.path.display()));
        }
        let playable = file
            .playable_url()
            .unwrap_or_else(|| file.path.display().to_string());
        let (width, height) = self.size_or(STREAM_WIDTH, STREAM_HEIGHT);
        log::info!("SyntheticProvider: file {} loaded", file.name);
        Ok(Box::new(SyntheticTrack::new(
            file.name.clone(),
            width,
            height,
            Some(playable),
        )))
    }
}

struct SyntheticTrack {
    label: String,
    width: u32,
    height: u32,
    playable: Option<String>,
    frame_count: u64,
    /// Changes every 50 frames to simulate scene changes.
    scene_state: u8,
    stopped: bool,
}

impl SyntheticTrack {
    fn new(label: String, width: u32, height: u32, playable: Option<String>) -> Self {
        Self {
            label,
            width,
            height,
            playable,
            frame_count: 0,
            scene_state: 0,
            stopped: false,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width * self.height * 3) as usize;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl MediaTrack for SyntheticTrack {
    fn grab_frame(&mut self) -> Result<Frame> {
        if self.stopped {
            return Err(anyhow!("track {} is stopped", self.label));
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::from_rgb(self.width, self.height, pixels)
    }

    fn stop(&mut self) {
        if !self.stopped {
            log::info!("SyntheticProvider: track {} stopped", self.label);
        }
        self.stopped = true;
    }

    fn is_live(&self) -> bool {
        !self.stopped
    }

    fn playable_ref(&self) -> Option<String> {
        self.playable.clone()
    }

    fn stats(&self) -> TrackStats {
        TrackStats {
            frames_captured: self.frame_count,
            width: self.width,
            height: self.height,
            label: self.label.clone(),
        }
    }
}
