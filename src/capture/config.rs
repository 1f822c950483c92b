//! Capture configuration

use std::time::Duration;

use crate::error::CaptureError;

/// Default device node (first camera, as `VideoCapture(0)` would pick)
pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// Highest accepted compression quality
pub const MAX_QUALITY: u8 = 100;

/// Immutable capture settings
///
/// Set once when the pipeline is constructed; the running loop never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device path or backend-specific locator
    pub device: String,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Frames-per-second ceiling (must be > 0)
    pub target_fps: u32,

    /// Internal device buffer depth in frames
    pub buffer_depth: u32,

    /// Compression quality, 0-100
    pub quality: u8,

    /// Bounded wait for a single frame
    pub grab_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
            buffer_depth: 1,
            quality: 70,
            grab_timeout: Duration::from_secs(2),
        }
    }
}

impl CaptureConfig {
    /// Create a config for the given device with default settings
    pub fn with_device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the device path
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Set the resolution
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target frame rate
    pub fn target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Set the device buffer depth
    pub fn buffer_depth(mut self, frames: u32) -> Self {
        self.buffer_depth = frames;
        self
    }

    /// Set the compression quality (clamped to 0-100)
    pub fn quality(mut self, quality: u32) -> Self {
        self.quality = quality.min(MAX_QUALITY as u32) as u8;
        self
    }

    /// Set the per-frame grab timeout
    pub fn grab_timeout(mut self, timeout: Duration) -> Self {
        self.grab_timeout = timeout;
        self
    }

    /// Interval between frames at the target rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }

    /// Bytes in one RGB24 frame at the configured resolution
    pub fn frame_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(3)
    }

    /// Reject settings no device could honour
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "resolution {}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        if self.frame_len().is_none() {
            return Err(CaptureError::InvalidConfig(format!(
                "resolution {}x{} overflows",
                self.width, self.height
            )));
        }
        if self.target_fps == 0 {
            return Err(CaptureError::InvalidConfig(
                "target_fps must be greater than zero".into(),
            ));
        }
        if self.buffer_depth == 0 {
            return Err(CaptureError::InvalidConfig(
                "buffer_depth must be at least one frame".into(),
            ));
        }
        if self.grab_timeout.is_zero() {
            return Err(CaptureError::InvalidConfig(
                "grab_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
